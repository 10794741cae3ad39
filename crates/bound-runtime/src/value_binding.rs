#![forbid(unsafe_code)]

//! Per-instance value bindings.
//!
//! A [`BoundValue`] ties one mounted component instance to one path in the
//! scope's target object. It combines path resolution with the runtime's
//! [`ReactiveStore`]: reads return the slot's current value, writes go through
//! a [`Setter`] that commits, notifies, and then calls the scope's `onChange`
//! hook.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --mount--> Subscribed --unmount/drop--> Unsubscribed
//!                     |  ^
//!                     +--+ retarget (fresh subscription)
//! ```
//!
//! # Invariants
//!
//! 1. Once mounted, the slot is never unset while the binding has a non-unset
//!    default: the default is written into the object.
//! 2. A write identical to the current value does nothing: no notification
//!    and no `onChange` call.
//! 3. A committed write bumps [`BoundValue::version`] only for instances
//!    whose resolved container is the written container.
//! 4. The [`Setter`] is the same allocation for as long as target and path
//!    are unchanged.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | No target | scope has no `target` and none is given | binds into a detached object (logged), kept for the binding's lifetime |
//! | `onChange` error | hook returns `Err` | value stays written; error returned from [`Setter::set`] |

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use bound_core::{ObjectRef, PathResolver, ReactiveStore, Slot, Subscription, Value};

use crate::error::Result;
use crate::func::{Func, Outcome};
use crate::scope::Scope;

// ---------------------------------------------------------------------------
// Update / Write
// ---------------------------------------------------------------------------

/// A write request: a literal value or a function of the previous value.
pub enum Update {
    Value(Value),
    With(Box<dyn FnOnce(&Value) -> Value>),
}

impl Update {
    /// Functional update.
    pub fn with(f: impl FnOnce(&Value) -> Value + 'static) -> Self {
        Self::With(Box::new(f))
    }

    fn apply(self, current: &Value) -> Value {
        match self {
            Self::Value(v) => v,
            Self::With(f) => f(current),
        }
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::With(_) => f.write_str("With(..)"),
        }
    }
}

impl From<Value> for Update {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<ObjectRef> for Update {
    fn from(value: ObjectRef) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<&str> for Update {
    fn from(value: &str) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<String> for Update {
    fn from(value: String) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<bool> for Update {
    fn from(value: bool) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<f64> for Update {
    fn from(value: f64) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<i32> for Update {
    fn from(value: i32) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<i64> for Update {
    fn from(value: i64) -> Self {
        Self::Value(Value::from(value))
    }
}

/// Result of [`Setter::set`].
#[derive(Debug)]
pub enum Write {
    /// Identical to the current value; nothing happened.
    Unchanged,
    /// Written and notified; carries the `onChange` hook's outcome.
    Committed(Outcome),
}

impl Write {
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    /// The hook outcome, if the write was committed.
    #[must_use]
    pub fn into_outcome(self) -> Option<Outcome> {
        match self {
            Self::Committed(outcome) => Some(outcome),
            Self::Unchanged => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Setter
// ---------------------------------------------------------------------------

struct SetterInner {
    slot: Slot,
    store: ReactiveStore,
    on_change: Option<Func>,
}

/// Write handle for one slot. Clones share identity.
#[derive(Clone)]
pub struct Setter {
    inner: Rc<SetterInner>,
}

impl Setter {
    /// A setter for `slot` in `store`, calling `on_change` after each commit.
    #[must_use]
    pub fn new(slot: Slot, store: ReactiveStore, on_change: Option<Func>) -> Self {
        Self {
            inner: Rc::new(SetterInner {
                slot,
                store,
                on_change,
            }),
        }
    }

    /// Write a value or apply a functional update.
    ///
    /// # Errors
    ///
    /// Propagates an error returned by the `onChange` hook. The value has
    /// already been written and handlers notified when that happens.
    pub fn set(&self, update: impl Into<Update>) -> Result<Write> {
        let inner = &*self.inner;
        let value = update.into().apply(&inner.slot.get());
        if !inner.store.commit(&inner.slot, value.clone()).is_changed() {
            return Ok(Write::Unchanged);
        }
        let outcome = match &inner.on_change {
            Some(hook) => hook.call(&[Value::Object(inner.slot.container().clone()), value])?,
            None => Outcome::Ready(Value::Missing),
        };
        Ok(Write::Committed(outcome))
    }

    #[must_use]
    pub fn slot(&self) -> &Slot {
        &self.inner.slot
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Setter) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Setter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter")
            .field("key", &self.inner.slot.key())
            .field("on_change", &self.inner.on_change.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// BoundValue
// ---------------------------------------------------------------------------

/// Lifecycle of a [`BoundValue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingState {
    Idle,
    Subscribed,
    Unsubscribed,
}

#[derive(Debug, Default)]
struct RenderSignal {
    version: Cell<u64>,
    dirty: Cell<bool>,
}

impl RenderSignal {
    fn bump(&self) {
        self.version.set(self.version.get() + 1);
        self.dirty.set(true);
    }
}

/// A component instance's binding to one path.
pub struct BoundValue {
    path: String,
    default: Value,
    root: ObjectRef,
    detached: Option<ObjectRef>,
    resolver: PathResolver,
    setter: Setter,
    store: ReactiveStore,
    state: BindingState,
    subscription: Option<Subscription>,
    signal: Rc<RenderSignal>,
}

impl BoundValue {
    /// Bind `path` in `target`, or in the scope's target when `None`.
    #[must_use]
    pub fn new(scope: &Scope, path: &str, default: Value, target: Option<&ObjectRef>) -> Self {
        let mut detached = None;
        let root = effective_target(scope, path, target, &mut detached);
        let mut resolver = PathResolver::new();
        let slot = resolver.resolve(&root, path).clone();
        let store = scope.store().clone();
        let setter = Setter::new(slot, store.clone(), scope.on_change());
        Self {
            path: path.to_owned(),
            default,
            root,
            detached,
            resolver,
            setter,
            store,
            state: BindingState::Idle,
            subscription: None,
            signal: Rc::new(RenderSignal::default()),
        }
    }

    /// Materialize the default and start listening for writes.
    pub fn mount(&mut self) {
        if self.state != BindingState::Idle {
            return;
        }
        self.setter.slot().materialize(&self.default);
        self.subscribe();
        self.state = BindingState::Subscribed;
    }

    fn subscribe(&mut self) {
        let own = self.setter.slot().container().clone();
        let signal = Rc::clone(&self.signal);
        self.subscription = Some(self.store.subscribe(self.setter.slot(), move |container, _| {
            if container.ptr_eq(&own) {
                signal.bump();
            }
        }));
    }

    /// Stop listening. Terminal.
    pub fn unmount(&mut self) {
        self.subscription = None;
        self.state = BindingState::Unsubscribed;
    }

    /// Follow a change of scope, explicit target, or path.
    ///
    /// Returns `true` when the binding now addresses a different slot; the
    /// setter is replaced and a mounted binding is resubscribed.
    pub fn retarget(&mut self, scope: &Scope, path: &str, target: Option<&ObjectRef>) -> bool {
        let root = effective_target(scope, path, target, &mut self.detached);
        if root.ptr_eq(&self.root) && path == self.path {
            return false;
        }
        let slot = self.resolver.resolve(&root, path).clone();
        tracing::trace!(from = %self.path, to = path, "binding retargeted");
        self.root = root;
        self.path = path.to_owned();
        self.store = scope.store().clone();
        self.setter = Setter::new(slot, self.store.clone(), scope.on_change());
        if self.state == BindingState::Subscribed {
            self.subscription = None;
            self.setter.slot().materialize(&self.default);
            self.subscribe();
        }
        true
    }

    /// Replace the default; it is written the next time the slot is read
    /// while unset.
    pub fn set_default(&mut self, default: Value) {
        self.default = default;
    }

    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// The root object `path` is resolved against.
    #[must_use]
    pub fn root(&self) -> &ObjectRef {
        &self.root
    }

    /// Current value; the default is written into an unset slot.
    #[must_use]
    pub fn get(&self) -> Value {
        self.setter.slot().materialize(&self.default)
    }

    /// The stable write handle.
    #[must_use]
    pub fn setter(&self) -> &Setter {
        &self.setter
    }

    /// Shorthand for `self.setter().set(update)`.
    ///
    /// # Errors
    ///
    /// See [`Setter::set`].
    pub fn set(&self, update: impl Into<Update>) -> Result<Write> {
        self.setter.set(update)
    }

    #[must_use]
    pub fn state(&self) -> BindingState {
        self.state
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn slot(&self) -> &Slot {
        self.setter.slot()
    }

    /// Number of relevant writes observed (the re-render counter).
    #[must_use]
    pub fn version(&self) -> u64 {
        self.signal.version.get()
    }

    /// Whether a relevant write arrived since the last [`take_dirty`](Self::take_dirty).
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.signal.dirty.get()
    }

    /// Whether a relevant write arrived since the last call; clears the flag.
    pub fn take_dirty(&self) -> bool {
        self.signal.dirty.replace(false)
    }

    /// Number of full path resolutions performed.
    #[must_use]
    pub fn resolutions(&self) -> u64 {
        self.resolver.resolutions()
    }
}

impl Drop for BoundValue {
    fn drop(&mut self) {
        if self.state == BindingState::Subscribed {
            self.unmount();
        }
    }
}

impl fmt::Debug for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundValue")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("version", &self.version())
            .finish()
    }
}

/// The explicit target, else the scope's, else the binding's detached root
/// (created once).
fn effective_target(
    scope: &Scope,
    path: &str,
    target: Option<&ObjectRef>,
    detached: &mut Option<ObjectRef>,
) -> ObjectRef {
    if let Some(target) = target {
        return target.clone();
    }
    if let Some(target) = scope.target() {
        return target;
    }
    detached
        .get_or_insert_with(|| {
            tracing::warn!(path, "no target in scope; binding into a detached object");
            ObjectRef::new()
        })
        .clone()
}

// ---------------------------------------------------------------------------
// ChangeWatch
// ---------------------------------------------------------------------------

/// Calls back for every committed write into the scope target's root object.
///
/// Writes into nested objects are not reported; watch those with a
/// [`BoundValue`].
pub struct ChangeWatch {
    _subscription: Subscription,
}

impl fmt::Debug for ChangeWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChangeWatch")
    }
}

/// Watch writes into `scope`'s target. Dropping the watch stops it.
///
/// Returns `None` when the scope has no target.
#[must_use]
pub fn use_changes(
    scope: &Scope,
    callback: impl Fn(&ObjectRef, &Value) + 'static,
) -> Option<ChangeWatch> {
    let target = scope.target()?;
    let subscription = scope.store().observe_all(move |container, value| {
        if container.ptr_eq(&target) {
            callback(container, value);
        }
    });
    Some(ChangeWatch {
        _subscription: subscription,
    })
}
