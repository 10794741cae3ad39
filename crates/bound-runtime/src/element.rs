#![forbid(unsafe_code)]

//! Declarative element trees.
//!
//! Bindings never look inside a node's `ty`; an element is an opaque
//! `{ty, props, children}` record plus a few variants the binding layer
//! evaluates itself:
//!
//! | Variant | Meaning |
//! |---------|---------|
//! | [`Element::Node`] | a renderable element owned by the host framework |
//! | [`Element::Component`] | a function of the current scope, called at render |
//! | [`Element::Bound`] | a scope layer around a subtree or a scope render function |
//! | [`Element::Bind`] | a binding adapter around exactly one node |
//! | [`Element::Fragment`] | a list of siblings |

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use bound_core::{ObjectRef, Value};

use crate::adapter::BindOptions;
use crate::error::{BindError, Result};
use crate::func::Func;
use crate::scope::{Scope, ScopeProps};
use crate::tree::with_data_binding;

// ---------------------------------------------------------------------------
// Props
// ---------------------------------------------------------------------------

/// A prop value: data or a callback.
#[derive(Clone)]
pub enum Prop {
    Value(Value),
    Func(Func),
}

impl Prop {
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Func(_) => None,
        }
    }

    #[must_use]
    pub fn as_func(&self) -> Option<&Func> {
        match self {
            Self::Func(f) => Some(f),
            Self::Value(_) => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }
}

impl PartialEq for Prop {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::Func(a), Self::Func(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => v.fmt(f),
            Self::Func(func) => func.fmt(f),
        }
    }
}

impl From<Value> for Prop {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<Func> for Prop {
    fn from(f: Func) -> Self {
        Self::Func(f)
    }
}

impl From<ObjectRef> for Prop {
    fn from(o: ObjectRef) -> Self {
        Self::Value(Value::Object(o))
    }
}

impl From<&str> for Prop {
    fn from(s: &str) -> Self {
        Self::Value(Value::from(s))
    }
}

impl From<String> for Prop {
    fn from(s: String) -> Self {
        Self::Value(Value::from(s))
    }
}

impl From<bool> for Prop {
    fn from(b: bool) -> Self {
        Self::Value(Value::from(b))
    }
}

impl From<f64> for Prop {
    fn from(n: f64) -> Self {
        Self::Value(Value::from(n))
    }
}

impl From<i32> for Prop {
    fn from(n: i32) -> Self {
        Self::Value(Value::from(n))
    }
}

/// Element props, ordered by name.
pub type Props = BTreeMap<String, Prop>;

/// Read a prop as a plain value; callbacks and absent props read as `Missing`.
#[must_use]
pub fn prop_value(props: &Props, key: &str) -> Value {
    props
        .get(key)
        .and_then(Prop::as_value)
        .cloned()
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A host-framework element.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub ty: Rc<str>,
    pub props: Props,
    pub children: Vec<Element>,
}

impl Node {
    #[must_use]
    pub fn new(ty: &str) -> Self {
        Self {
            ty: Rc::from(ty),
            props: Props::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Prop>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn child(mut self, child: impl Into<Element>) -> Self {
        self.children.push(child.into());
        self
    }

    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    /// A prop as a plain value.
    #[must_use]
    pub fn value(&self, key: &str) -> Value {
        prop_value(&self.props, key)
    }

    /// A prop as a callback.
    #[must_use]
    pub fn func(&self, key: &str) -> Option<&Func> {
        self.props.get(key).and_then(Prop::as_func)
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Renders an element from the current scope.
pub type RenderFn = Rc<dyn Fn(&Scope) -> Element>;

/// A function component.
#[derive(Clone)]
pub struct Component {
    name: Rc<str>,
    render: RenderFn,
    rewrites: bool,
}

impl Component {
    pub fn new(name: &str, render: impl Fn(&Scope) -> Element + 'static) -> Self {
        Self {
            name: Rc::from(name),
            render: Rc::new(render),
            rewrites: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call the component.
    #[must_use]
    pub fn render(&self, scope: &Scope) -> Element {
        (self.render)(scope)
    }

    /// Whether every render output passes through the tree binding pass.
    #[must_use]
    pub fn rewrites_output(&self) -> bool {
        self.rewrites
    }

    /// This component with its output rewritten by the tree binding pass.
    /// Idempotent.
    #[must_use]
    pub fn with_data_binding(self) -> Self {
        if self.rewrites {
            return self;
        }
        let inner = self.render;
        Self {
            name: self.name,
            render: Rc::new(move |scope: &Scope| with_data_binding(inner(scope))),
            rewrites: true,
        }
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.render, &other.render)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("rewrites", &self.rewrites)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Bound and Bind
// ---------------------------------------------------------------------------

/// Children of a scope layer.
#[derive(Clone)]
pub enum ScopeChildren {
    Tree(Vec<Element>),
    /// Called with the composed scope.
    Render(RenderFn),
}

impl PartialEq for ScopeChildren {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Tree(a), Self::Tree(b)) => a == b,
            (Self::Render(a), Self::Render(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ScopeChildren {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tree(children) => f.debug_tuple("Tree").field(children).finish(),
            Self::Render(_) => f.write_str("Render(..)"),
        }
    }
}

/// A scope layer: `props` over the enclosing scope for `children`.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundElement {
    pub props: ScopeProps,
    pub children: ScopeChildren,
}

/// A binding adapter around its children, which must be a single node.
#[derive(Clone, Debug, PartialEq)]
pub struct BindElement {
    pub options: BindOptions,
    pub children: Vec<Element>,
}

impl BindElement {
    /// The single bound node.
    ///
    /// # Errors
    ///
    /// [`BindError::BindingArity`] unless there is exactly one child and it
    /// is a node.
    pub fn node(&self) -> Result<&Node> {
        match self.children.as_slice() {
            [Element::Node(node)] => Ok(node),
            children => Err(BindError::BindingArity {
                field: self.options.field.clone(),
                count: children.len(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Element
// ---------------------------------------------------------------------------

/// A declarative element tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Element {
    #[default]
    Empty,
    Text(String),
    Node(Node),
    Fragment(Vec<Element>),
    Component(Component),
    Bound(BoundElement),
    Bind(BindElement),
}

impl Element {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    #[must_use]
    pub fn fragment(children: impl IntoIterator<Item = Element>) -> Self {
        Self::Fragment(children.into_iter().collect())
    }

    pub fn component(name: &str, render: impl Fn(&Scope) -> Element + 'static) -> Self {
        Self::Component(Component::new(name, render))
    }

    /// A scope layer around a subtree.
    #[must_use]
    pub fn bound(props: ScopeProps, children: impl IntoIterator<Item = Element>) -> Self {
        Self::Bound(BoundElement {
            props,
            children: ScopeChildren::Tree(children.into_iter().collect()),
        })
    }

    /// A scope layer whose children are rendered from the composed scope.
    pub fn bound_with(props: ScopeProps, render: impl Fn(&Scope) -> Element + 'static) -> Self {
        Self::Bound(BoundElement {
            props,
            children: ScopeChildren::Render(Rc::new(render)),
        })
    }

    /// A binding adapter. Arity is checked when the element is rendered.
    #[must_use]
    pub fn bind(options: BindOptions, children: impl IntoIterator<Item = Element>) -> Self {
        Self::Bind(BindElement {
            options,
            children: children.into_iter().collect(),
        })
    }

    /// Children with every `field`-annotated node bound.
    #[must_use]
    pub fn binding(children: impl IntoIterator<Item = Element>) -> Self {
        with_data_binding(Self::fragment(children))
    }

    #[must_use]
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Find the first node, depth-first, matching `pred`.
    #[must_use]
    pub fn find(&self, pred: &dyn Fn(&Node) -> bool) -> Option<&Node> {
        match self {
            Self::Node(node) if pred(node) => Some(node),
            Self::Node(node) => node.children.iter().find_map(|c| c.find(pred)),
            Self::Fragment(children) => children.iter().find_map(|c| c.find(pred)),
            Self::Bound(bound) => match &bound.children {
                ScopeChildren::Tree(children) => children.iter().find_map(|c| c.find(pred)),
                ScopeChildren::Render(_) => None,
            },
            Self::Bind(bind) => bind.children.iter().find_map(|c| c.find(pred)),
            Self::Empty | Self::Text(_) | Self::Component(_) => None,
        }
    }

    /// Concatenated text content.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Self::Text(t) => out.push_str(t),
            Self::Node(node) => node.children.iter().for_each(|c| c.collect_text(out)),
            Self::Fragment(children) => children.iter().for_each(|c| c.collect_text(out)),
            Self::Bind(bind) => bind.children.iter().for_each(|c| c.collect_text(out)),
            Self::Bound(BoundElement {
                children: ScopeChildren::Tree(children),
                ..
            }) => children.iter().for_each(|c| c.collect_text(out)),
            _ => {}
        }
    }
}

impl From<Node> for Element {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl From<Component> for Element {
    fn from(component: Component) -> Self {
        Self::Component(component)
    }
}

impl From<&str> for Element {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_builder_collects_props_and_children() {
        let node = Node::new("input")
            .prop("type", "text")
            .prop("disabled", false)
            .child("hint");
        assert_eq!(node.value("type"), Value::from("text"));
        assert_eq!(node.value("missing"), Value::Missing);
        assert_eq!(node.children, vec![Element::text("hint")]);
    }

    #[test]
    fn func_props_compare_by_identity() {
        let f = Func::sync(|_| Value::Null);
        let g = Func::sync(|_| Value::Null);
        assert_eq!(Prop::from(f.clone()), Prop::from(f));
        assert_ne!(Prop::from(g), Prop::from(Func::sync(|_| Value::Null)));
    }

    #[test]
    fn bind_arity_is_checked() {
        let options = BindOptions::new("name");
        let none = BindElement {
            options: options.clone(),
            children: vec![],
        };
        assert!(matches!(
            none.node(),
            Err(BindError::BindingArity { count: 0, .. })
        ));

        let two = BindElement {
            options: options.clone(),
            children: vec![Node::new("a").into(), Node::new("b").into()],
        };
        assert!(matches!(
            two.node(),
            Err(BindError::BindingArity { count: 2, .. })
        ));

        let text = BindElement {
            options: options.clone(),
            children: vec![Element::text("x")],
        };
        assert!(text.node().is_err());

        let one = BindElement {
            options,
            children: vec![Node::new("input").into()],
        };
        assert_eq!(&*one.node().unwrap().ty, "input");
    }

    #[test]
    fn find_walks_depth_first() {
        let tree = Element::fragment([
            Element::from(Node::new("p").child("x")),
            Element::from(
                Node::new("section").child(Node::new("input").prop("id", "deep")),
            ),
        ]);
        let found = tree.find(&|n: &Node| &*n.ty == "input").unwrap();
        assert_eq!(found.value("id"), Value::from("deep"));
        assert_eq!(tree.text_content(), "x");
    }

    #[test]
    fn component_rewrite_wrapping_is_idempotent() {
        let c = Component::new("Form", |_| Element::Empty);
        assert!(!c.rewrites_output());
        let once = c.with_data_binding();
        let twice = once.clone().with_data_binding();
        assert!(once.rewrites_output());
        assert_eq!(once, twice);
    }
}
