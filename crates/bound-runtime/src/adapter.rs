#![forbid(unsafe_code)]

//! Binding adapters: wiring one node's value and change props to a path.
//!
//! A [`BindAdapter`] is the retained state behind an [`Element::Bind`]: it
//! owns a mounted [`BoundValue`], a component-local echo of the value, and
//! renders its node with
//!
//! - the value prop set to the echo,
//! - the change prop set to a handler that extracts a value from the
//!   callback arguments, updates the echo, and (unless deferred) writes,
//! - `onBlur` chained in front of the node's own handler, committing the echo
//!   in deferred (`blur`) mode,
//!
//! and then raises the runtime's property pipeline over the result.
//!
//! # Invariants
//!
//! 1. In `blur` mode nothing is written until `onBlur`; then at most one
//!    write happens, of the last echoed value.
//! 2. `transform_out` runs before every write; `transform_in` runs whenever
//!    the stored value changes from outside the adapter.
//! 3. An extractor result of [`Extracted::Skip`] changes nothing.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use bound_core::{ObjectRef, Value, title_case_label};

use crate::element::{BindElement, Element, Node, Prop, Props, prop_value};
use crate::extract::{Extracted, Extractor};
use crate::func::{Func, Outcome};
use crate::properties::PropertyMeta;
use crate::scope::Scope;
use crate::value_binding::{BoundValue, Setter, Write};

/// Props consumed by the tree binding pass and never forwarded to the node.
pub const BINDING_PROPS: [&str; 10] = [
    "field",
    "defaultValue",
    "valueProp",
    "changeProp",
    "labelProp",
    "extract",
    "transformIn",
    "transformOut",
    "blur",
    "target",
];

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// BindOptions
// ---------------------------------------------------------------------------

/// How an adapter binds its node.
///
/// Unset prop names and default value fall back to the runtime's
/// [`BindingConfig`](crate::config::BindingConfig).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BindOptions {
    pub field: String,
    pub default_value: Option<Value>,
    pub value_prop: Option<String>,
    pub change_prop: Option<String>,
    /// Prop the [`bind`] factory defaults to a derived label.
    pub label_prop: Option<String>,
    pub extract: Extractor,
    pub transform_in: Option<Func>,
    pub transform_out: Option<Func>,
    /// Defer writes until `onBlur`.
    pub blur: bool,
    /// Root object overriding the scope's target.
    pub target: Option<ObjectRef>,
}

impl BindOptions {
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn value_prop(mut self, name: impl Into<String>) -> Self {
        self.value_prop = Some(name.into());
        self
    }

    #[must_use]
    pub fn change_prop(mut self, name: impl Into<String>) -> Self {
        self.change_prop = Some(name.into());
        self
    }

    #[must_use]
    pub fn label_prop(mut self, name: impl Into<String>) -> Self {
        self.label_prop = Some(name.into());
        self
    }

    #[must_use]
    pub fn extract(mut self, extract: Extractor) -> Self {
        self.extract = extract;
        self
    }

    #[must_use]
    pub fn transform_in(mut self, f: Func) -> Self {
        self.transform_in = Some(f);
        self
    }

    #[must_use]
    pub fn transform_out(mut self, f: Func) -> Self {
        self.transform_out = Some(f);
        self
    }

    #[must_use]
    pub fn blur(mut self, blur: bool) -> Self {
        self.blur = blur;
        self
    }

    #[must_use]
    pub fn target(mut self, target: ObjectRef) -> Self {
        self.target = Some(target);
        self
    }

    /// Take binding options out of `props`.
    ///
    /// Returns `None`, leaving `props` untouched, unless `field` is non-empty
    /// text. Otherwise every entry of [`BINDING_PROPS`] is removed.
    pub fn from_props(props: &mut Props) -> Option<Self> {
        let field = prop_value(props, "field");
        let field = field.as_str().filter(|f| !f.is_empty())?.to_owned();
        let mut taken: Props = BINDING_PROPS
            .iter()
            .filter_map(|key| props.remove_entry(*key))
            .collect();
        let value_prop = take_text(&mut taken, "valueProp");
        let change_prop = take_text(&mut taken, "changeProp");
        let label_prop = take_text(&mut taken, "labelProp");
        let extract = take_func(&mut taken, "extract")
            .map(extractor_from_func)
            .unwrap_or_default();
        let transform_in = take_func(&mut taken, "transformIn");
        let transform_out = take_func(&mut taken, "transformOut");
        let default_value = taken
            .remove("defaultValue")
            .and_then(|p| p.as_value().cloned())
            .filter(|v| !matches!(v, Value::Missing));
        let blur = prop_value(&taken, "blur").is_truthy();
        let target = prop_value(&taken, "target").as_object().cloned();
        Some(Self {
            field,
            default_value,
            value_prop,
            change_prop,
            label_prop,
            extract,
            transform_in,
            transform_out,
            blur,
            target,
        })
    }
}

fn take_text(props: &mut Props, key: &str) -> Option<String> {
    props
        .remove(key)
        .and_then(|p| p.as_str().map(str::to_owned))
}

fn take_func(props: &mut Props, key: &str) -> Option<Func> {
    props.remove(key).and_then(|p| p.as_func().cloned())
}

/// Adapt a function prop into an extractor; a `Missing` result skips the write.
#[must_use]
pub fn extractor_from_func(func: Func) -> Extractor {
    Extractor::new(move |args| match func.call_ready(args) {
        Ok(Value::Missing) => Extracted::Skip,
        Ok(value) => Extracted::Value(value),
        Err(err) => {
            tracing::warn!(%err, "extractor failed; skipping write");
            Extracted::Skip
        }
    })
}

fn apply_transform(transform: Option<&Func>, value: Value) -> Value {
    let Some(f) = transform else {
        return value;
    };
    match f.call_ready(std::slice::from_ref(&value)) {
        Ok(out) => out,
        Err(err) => {
            tracing::warn!(%err, "transform failed; passing value through");
            value
        }
    }
}

// ---------------------------------------------------------------------------
// BindAdapter
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Echo {
    current: RefCell<Value>,
    dirty: Cell<bool>,
}

/// Retained state of one rendered [`Element::Bind`].
pub struct BindAdapter {
    options: BindOptions,
    scope: Scope,
    binding: BoundValue,
    echo: Rc<Echo>,
    external: Value,
    instance: u64,
}

impl BindAdapter {
    /// Mount an adapter in `scope`.
    #[must_use]
    pub fn mount(scope: &Scope, options: BindOptions) -> Self {
        let default = default_for(scope, &options);
        let mut binding = BoundValue::new(scope, &options.field, default, options.target.as_ref());
        binding.mount();
        let external = binding.get();
        let echo = Rc::new(Echo {
            current: RefCell::new(apply_transform(options.transform_in.as_ref(), external.clone())),
            dirty: Cell::new(false),
        });
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(field = %options.field, instance, "adapter mounted");
        Self {
            options,
            scope: scope.clone(),
            binding,
            echo,
            external,
            instance,
        }
    }

    /// Adopt the scope and options of a new render.
    pub fn update(&mut self, scope: &Scope, options: BindOptions) {
        self.binding
            .retarget(scope, &options.field, options.target.as_ref());
        let default = default_for(scope, &options);
        if !default.same(self.binding.default_value()) {
            self.binding.set_default(default);
        }
        self.scope = scope.clone();
        self.options = options;
    }

    /// Whether a write or local edit requires this adapter to render again.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.echo.dirty.get() || self.binding.is_dirty()
    }

    fn value_prop(&self) -> String {
        self.options
            .value_prop
            .clone()
            .unwrap_or_else(|| self.scope.config().value_prop.clone())
    }

    fn change_prop(&self) -> String {
        self.options
            .change_prop
            .clone()
            .unwrap_or_else(|| self.scope.config().change_prop.clone())
    }

    /// Render `node` with live value and handlers.
    pub fn render(&mut self, node: &Node) -> Node {
        self.echo.dirty.set(false);
        self.binding.take_dirty();
        let stored = self.binding.get();
        if !stored.same(&self.external) {
            *self.echo.current.borrow_mut() =
                apply_transform(self.options.transform_in.as_ref(), stored.clone());
            self.external = stored;
        }
        let current = self.echo.current.borrow().clone();
        let value_prop = self.value_prop();
        let change_prop = self.change_prop();

        let mut props = node.props.clone();
        props.remove("field");
        let own_blur = props.get("onBlur").and_then(Prop::as_func).cloned();
        props.insert("onBlur".into(), Prop::Func(self.blur_handler(own_blur)));
        props.insert(value_prop.clone(), Prop::Value(current.clone()));
        props.insert(change_prop.clone(), Prop::Func(self.change_handler()));

        let meta = PropertyMeta {
            field: self.options.field.clone(),
            value: apply_transform(self.options.transform_out.as_ref(), current),
            target: self.binding.root().clone(),
            scope: self.scope.clone(),
            value_prop,
            change_prop,
            refresh: self.refresh_handle(),
            instance: self.instance,
        };
        let props = self.scope.properties().raise(props, &meta);
        Node {
            ty: Rc::clone(&node.ty),
            props,
            children: node.children.clone(),
        }
    }

    fn change_handler(&self) -> Func {
        let echo = Rc::clone(&self.echo);
        let setter = self.binding.setter().clone();
        let extract = self.options.extract.clone();
        let transform_out = self.options.transform_out.clone();
        let blur = self.options.blur;
        Func::new(move |args| {
            let Extracted::Value(value) = extract.extract(args) else {
                return Ok(Outcome::Ready(Value::Missing));
            };
            *echo.current.borrow_mut() = value.clone();
            echo.dirty.set(true);
            if blur {
                return Ok(Outcome::Ready(Value::Missing));
            }
            commit(&setter, apply_transform(transform_out.as_ref(), value))
        })
    }

    fn blur_handler(&self, own: Option<Func>) -> Func {
        let echo = Rc::clone(&self.echo);
        let setter = self.binding.setter().clone();
        let transform_out = self.options.transform_out.clone();
        let blur = self.options.blur;
        Func::new(move |args| {
            if let Some(own) = &own {
                own.call(args)?;
            }
            if !blur {
                return Ok(Outcome::Ready(Value::Missing));
            }
            let current = echo.current.borrow().clone();
            commit(&setter, apply_transform(transform_out.as_ref(), current))
        })
    }

    fn refresh_handle(&self) -> Func {
        let echo = Rc::clone(&self.echo);
        Func::action(move |_| echo.dirty.set(true))
    }

    #[must_use]
    pub fn options(&self) -> &BindOptions {
        &self.options
    }

    #[must_use]
    pub fn binding(&self) -> &BoundValue {
        &self.binding
    }

    /// The component-local value shown by the node.
    #[must_use]
    pub fn current(&self) -> Value {
        self.echo.current.borrow().clone()
    }

    #[must_use]
    pub fn instance(&self) -> u64 {
        self.instance
    }
}

fn default_for(scope: &Scope, options: &BindOptions) -> Value {
    options
        .default_value
        .clone()
        .unwrap_or_else(|| Value::from(scope.config().default_value.as_str()))
}

fn commit(setter: &Setter, value: Value) -> crate::error::Result<Outcome> {
    Ok(match setter.set(value)? {
        Write::Committed(outcome) => outcome,
        Write::Unchanged => Outcome::Ready(Value::Missing),
    })
}

impl Drop for BindAdapter {
    fn drop(&mut self) {
        #[cfg(feature = "validation")]
        if let Some(tracker) = self
            .scope
            .shared::<crate::validate::ValidationTracker>(crate::validate::VALIDATION_KEY)
        {
            tracker.release(self.instance);
        }
        tracing::trace!(field = %self.options.field, instance = self.instance, "adapter dropped");
    }
}

impl fmt::Debug for BindAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindAdapter")
            .field("field", &self.options.field)
            .field("instance", &self.instance)
            .field("current", &*self.echo.current.borrow())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// bind factory
// ---------------------------------------------------------------------------

/// A reusable bound component made by [`bind`].
#[derive(Clone, Debug, PartialEq)]
pub struct BoundComponent {
    template: Node,
    options: BindOptions,
}

/// Make a component that renders `template` bound to whatever field it is
/// given.
///
/// `options.field` is ignored; `label_prop` defaults to `"label"`.
#[must_use]
pub fn bind(template: Node, options: BindOptions) -> BoundComponent {
    let options = BindOptions {
        label_prop: options.label_prop.or_else(|| Some("label".into())),
        ..options
    };
    BoundComponent { template, options }
}

impl BoundComponent {
    /// Render bound to `field`. A `defaultValue` prop overrides the default.
    #[must_use]
    pub fn render(&self, field: &str, props: Props) -> Element {
        let mut merged = self.template.props.clone();
        merged.extend(props);
        let mut options = BindOptions {
            field: field.to_owned(),
            ..self.options.clone()
        };
        if let Some(default) = merged
            .remove("defaultValue")
            .and_then(|p| p.as_value().cloned())
        {
            options.default_value = Some(default);
        }
        merged.remove("field");
        if let Some(label_prop) = options.label_prop.as_deref().filter(|l| !l.is_empty()) {
            let unset = merged
                .get(label_prop)
                .is_none_or(|p| p.as_value().is_some_and(Value::is_unset));
            if unset {
                merged.insert(label_prop.to_owned(), Prop::from(title_case_label(field)));
            }
        }
        Element::Bind(BindElement {
            options,
            children: vec![Element::Node(Node {
                ty: Rc::clone(&self.template.ty),
                props: merged,
                children: self.template.children.clone(),
            })],
        })
    }
}
