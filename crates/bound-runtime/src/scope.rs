#![forbid(unsafe_code)]

//! Nestable binding scopes.
//!
//! A [`Scope`] is an immutable key/value map inherited down a component tree.
//! [`Scope::child`] layers new entries over the current ones; the result is
//! what every descendant sees until another layer shadows it. The special
//! `target` entry is the ambient root object used by value bindings that are
//! not given an explicit target, and `onChange` is the hook invoked after
//! every committed write.
//!
//! Every scope in a tree shares one [`BindingRuntime`], created with the root
//! scope: the subscriber registry, the property pipeline, and the
//! configuration. Independent trees get independent runtimes.
//!
//! # Invariants
//!
//! 1. A scope never changes after creation; composition builds a new one.
//! 2. A child entry shadows the inherited entry of the same key, except when
//!    the child entry is a function tagged with [`also`](crate::func::also)
//!    and the inherited entry is a function: then the child holds their
//!    composition. The overlay is computed once, in [`Scope::child`].
//! 3. Looking up a key absent from every layer yields `None`.
//! 4. [`Scope::new`] is the empty scope: no entries, fresh runtime.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use bound_core::{ObjectRef, ReactiveStore, Value};

use crate::config::BindingConfig;
use crate::func::{Func, compose};
use crate::properties::PropertyPipeline;

/// Key holding the ambient root object.
pub const TARGET_KEY: &str = "target";
/// Key holding the post-write hook.
pub const ON_CHANGE_KEY: &str = "onChange";

// ---------------------------------------------------------------------------
// ScopeValue
// ---------------------------------------------------------------------------

/// A value stored in a scope.
#[derive(Clone)]
pub enum ScopeValue {
    Value(Value),
    Func(Func),
    /// Arbitrary shared state (e.g. a validation tracker).
    Shared(Rc<dyn Any>),
}

impl ScopeValue {
    /// Wrap shared state.
    pub fn shared<T: 'static>(value: Rc<T>) -> Self {
        Self::Shared(value)
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_func(&self) -> Option<&Func> {
        match self {
            Self::Func(f) => Some(f),
            _ => None,
        }
    }
}

impl PartialEq for ScopeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::Func(a), Self::Func(b)) => a.ptr_eq(b),
            (Self::Shared(a), Self::Shared(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => v.fmt(f),
            Self::Func(func) => func.fmt(f),
            Self::Shared(_) => f.write_str("Shared(..)"),
        }
    }
}

impl From<Value> for ScopeValue {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<Func> for ScopeValue {
    fn from(f: Func) -> Self {
        Self::Func(f)
    }
}

impl From<ObjectRef> for ScopeValue {
    fn from(o: ObjectRef) -> Self {
        Self::Value(Value::Object(o))
    }
}

impl From<&str> for ScopeValue {
    fn from(s: &str) -> Self {
        Self::Value(Value::from(s))
    }
}

impl From<f64> for ScopeValue {
    fn from(n: f64) -> Self {
        Self::Value(Value::from(n))
    }
}

impl From<i32> for ScopeValue {
    fn from(n: i32) -> Self {
        Self::Value(Value::from(n))
    }
}

impl From<bool> for ScopeValue {
    fn from(b: bool) -> Self {
        Self::Value(Value::from(b))
    }
}

// ---------------------------------------------------------------------------
// ScopeProps
// ---------------------------------------------------------------------------

/// Ordered entries for a new scope layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScopeProps {
    entries: Vec<(String, ScopeValue)>,
}

impl ScopeProps {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ScopeValue>) -> Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    /// Set the ambient root object.
    #[must_use]
    pub fn target(self, target: ObjectRef) -> Self {
        self.with(TARGET_KEY, target)
    }

    /// Set the post-write hook.
    #[must_use]
    pub fn on_change(self, hook: Func) -> Self {
        self.with(ON_CHANGE_KEY, hook)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<ScopeValue>> FromIterator<(K, V)> for ScopeProps {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for ScopeProps {
    type Item = (String, ScopeValue);
    type IntoIter = std::vec::IntoIter<(String, ScopeValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ---------------------------------------------------------------------------
// BindingRuntime
// ---------------------------------------------------------------------------

/// State shared by every scope of one binding tree.
pub struct BindingRuntime {
    store: ReactiveStore,
    properties: PropertyPipeline,
    config: BindingConfig,
}

impl BindingRuntime {
    /// Runtime with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BindingConfig::default())
    }

    /// Runtime with explicit configuration. Built-in property subscribers are
    /// installed according to `config`.
    #[must_use]
    pub fn with_config(config: BindingConfig) -> Self {
        Self {
            store: ReactiveStore::new(),
            properties: PropertyPipeline::with_defaults(&config),
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &ReactiveStore {
        &self.store
    }

    #[must_use]
    pub fn properties(&self) -> &PropertyPipeline {
        &self.properties
    }

    #[must_use]
    pub fn config(&self) -> &BindingConfig {
        &self.config
    }
}

impl Default for BindingRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BindingRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingRuntime")
            .field("store", &self.store)
            .field("properties", &self.properties.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// An immutable, inherited binding scope.
#[derive(Clone)]
pub struct Scope {
    entries: Rc<AHashMap<String, ScopeValue>>,
    runtime: Rc<BindingRuntime>,
    depth: usize,
}

impl Scope {
    /// The empty scope with a fresh runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_runtime(Rc::new(BindingRuntime::new()))
    }

    /// The empty scope over an existing runtime.
    #[must_use]
    pub fn with_runtime(runtime: Rc<BindingRuntime>) -> Self {
        Self {
            entries: Rc::new(AHashMap::new()),
            runtime,
            depth: 0,
        }
    }

    /// A root scope holding `props` over a fresh runtime.
    #[must_use]
    pub fn root(props: ScopeProps) -> Self {
        Self::new().child(props)
    }

    /// Compose a child scope: `props` layered over this scope.
    #[must_use]
    pub fn child(&self, props: ScopeProps) -> Scope {
        let mut entries = (*self.entries).clone();
        let mut merged = 0usize;
        for (key, value) in props {
            let composed = match (&value, entries.get(&key)) {
                (ScopeValue::Func(own), Some(ScopeValue::Func(inherited))) => own
                    .combiner()
                    .map(|combine| compose(own.clone(), inherited.clone(), Rc::clone(combine))),
                _ => None,
            };
            let value = match composed {
                Some(func) => {
                    merged += 1;
                    ScopeValue::Func(func)
                }
                None => value,
            };
            entries.insert(key, value);
        }
        tracing::debug!(
            depth = self.depth + 1,
            entries = entries.len(),
            merged,
            "scope composed"
        );
        Scope {
            entries: Rc::new(entries),
            runtime: Rc::clone(&self.runtime),
            depth: self.depth + 1,
        }
    }

    /// Look up an entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ScopeValue> {
        self.entries.get(key)
    }

    /// Look up a plain value; functions and shared state read as `Missing`.
    #[must_use]
    pub fn value(&self, key: &str) -> Value {
        self.get(key)
            .and_then(ScopeValue::as_value)
            .cloned()
            .unwrap_or_default()
    }

    /// Look up a function.
    #[must_use]
    pub fn func(&self, key: &str) -> Option<&Func> {
        self.get(key).and_then(ScopeValue::as_func)
    }

    /// Look up shared state of type `T`.
    #[must_use]
    pub fn shared<T: 'static>(&self, key: &str) -> Option<Rc<T>> {
        match self.get(key)? {
            ScopeValue::Shared(any) => Rc::clone(any).downcast::<T>().ok(),
            _ => None,
        }
    }

    /// The ambient root object, if the scope provides one.
    #[must_use]
    pub fn target(&self) -> Option<ObjectRef> {
        match self.get(TARGET_KEY)? {
            ScopeValue::Value(Value::Object(o)) => Some(o.clone()),
            _ => None,
        }
    }

    /// The post-write hook, if any.
    #[must_use]
    pub fn on_change(&self) -> Option<Func> {
        self.func(ON_CHANGE_KEY).cloned()
    }

    #[must_use]
    pub fn runtime(&self) -> &Rc<BindingRuntime> {
        &self.runtime
    }

    #[must_use]
    pub fn store(&self) -> &ReactiveStore {
        self.runtime.store()
    }

    #[must_use]
    pub fn properties(&self) -> &PropertyPipeline {
        self.runtime.properties()
    }

    #[must_use]
    pub fn config(&self) -> &BindingConfig {
        self.runtime.config()
    }

    /// Nesting depth; the empty scope is 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Keys visible in this scope.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether both scopes share one runtime (belong to the same tree).
    #[must_use]
    pub fn same_tree(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.runtime, &other.runtime)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = self.keys();
        keys.sort_unstable();
        f.debug_struct("Scope")
            .field("depth", &self.depth)
            .field("keys", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BindError;
    use crate::func::{Outcome, also, also_first};
    use std::cell::RefCell;

    #[test]
    fn empty_scope_has_nothing() {
        let scope = Scope::new();
        assert!(scope.is_empty());
        assert!(scope.target().is_none());
        assert!(scope.on_change().is_none());
        assert_eq!(scope.value("anything"), Value::Missing);
    }

    #[test]
    fn child_shadows_values() {
        let root = Scope::root(ScopeProps::new().with("chartHeight", 180));
        let child = root.child(ScopeProps::new().with("chartHeight", 300).with("type", "line"));
        assert_eq!(root.value("chartHeight"), Value::from(180));
        assert_eq!(child.value("chartHeight"), Value::from(300));
        assert_eq!(child.value("type"), Value::from("line"));
        assert_eq!(child.depth(), 2);
        assert!(child.same_tree(&root));
    }

    #[test]
    fn target_is_inherited() {
        let state = ObjectRef::new();
        let root = Scope::root(ScopeProps::new().target(state.clone()));
        let child = root.child(ScopeProps::new().with("type", "radar"));
        assert!(child.target().unwrap().ptr_eq(&state));
    }

    #[test]
    fn untagged_function_replaces_inherited() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = Rc::clone(&log);
        let l2 = Rc::clone(&log);
        let root = Scope::root(
            ScopeProps::new().on_change(Func::action(move |_| l1.borrow_mut().push("root"))),
        );
        let child = root.child(
            ScopeProps::new().on_change(Func::action(move |_| l2.borrow_mut().push("child"))),
        );
        child.on_change().unwrap().call(&[]).unwrap();
        assert_eq!(*log.borrow(), vec!["child"]);
    }

    #[test]
    fn tagged_function_merges_with_inherited() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = Rc::clone(&log);
        let l2 = Rc::clone(&log);
        let root = Scope::root(
            ScopeProps::new().on_change(Func::action(move |_| l1.borrow_mut().push("root"))),
        );
        let child = root.child(ScopeProps::new().on_change(also_first(Func::action(
            move |_| l2.borrow_mut().push("child"),
        ))));
        child.on_change().unwrap().call(&[]).unwrap();
        assert_eq!(*log.borrow(), vec!["child", "root"]);
        assert!(!child.on_change().unwrap().is_mergeable());
    }

    #[test]
    fn tagged_function_without_inherited_is_plain_override() {
        let f = also_first(Func::sync(|_| Value::from(1)));
        let scope = Scope::root(ScopeProps::new().with("f", f.clone()));
        assert!(scope.func("f").unwrap().ptr_eq(&f));
    }

    #[test]
    fn merges_stack_across_three_layers() {
        let sum = |a: Value, b: Value| {
            Value::from(a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default())
        };
        let scope = Scope::root(ScopeProps::new().with("f", Func::sync(|_| Value::from(1))))
            .child(ScopeProps::new().with("f", also(Func::sync(|_| Value::from(10)), sum)))
            .child(ScopeProps::new().with("f", also(Func::sync(|_| Value::from(100)), sum)));
        let result = scope.func("f").unwrap().call_ready(&[]).unwrap();
        assert_eq!(result, Value::from(111));
    }

    #[test]
    fn cancel_short_circuits_through_scope() {
        let reached = Rc::new(RefCell::new(false));
        let r = Rc::clone(&reached);
        let scope = Scope::root(ScopeProps::new().with("f", Func::action(move |_| *r.borrow_mut() = true)))
            .child(ScopeProps::new().with(
                "f",
                also_first(Func::new(|_| Err(BindError::Cancel(Value::from("stop"))))),
            ));
        let out = scope.func("f").unwrap().call(&[]).unwrap();
        assert!(matches!(out, Outcome::Ready(ref v) if *v == Value::from("stop")));
        assert!(!*reached.borrow());
    }

    #[test]
    fn shared_state_downcasts() {
        let scope = Scope::root(ScopeProps::new().with("counter", ScopeValue::shared(Rc::new(5u32))));
        assert_eq!(scope.shared::<u32>("counter").as_deref(), Some(&5));
        assert!(scope.shared::<String>("counter").is_none());
    }

    #[test]
    fn independent_roots_do_not_share_runtime() {
        let a = Scope::new();
        let b = Scope::new();
        assert!(!a.same_tree(&b));
        assert!(a.child(ScopeProps::new()).same_tree(&a));
    }
}
