#![forbid(unsafe_code)]

//! Subscriber registry and write path for bound slots.
//!
//! A [`ReactiveStore`] maps a slot location `(container identity, key)` to an
//! ordered list of change handlers. [`ReactiveStore::commit`] assigns a value
//! into a [`Slot`] and synchronously notifies every handler registered for
//! that location, plus any global observers.
//!
//! Handlers receive the changed container and the new value; a handler bound
//! to one component instance compares the container against its own and
//! ignores anything else. Registering by location makes that filter a safety
//! net rather than the only line of defence: two unrelated objects that
//! happen to share a leaf key name no longer cross-notify. Code that wants
//! every change (persistence, change feeds) uses [`ReactiveStore::observe_all`].
//!
//! # Invariants
//!
//! 1. Handlers for a location are notified in registration order.
//! 2. Committing a value identical to the current one ([`Value::same`]) is a
//!    no-op: nothing is written and no handler runs.
//! 3. Notification iterates a snapshot, so handlers may subscribe,
//!    unsubscribe, or commit further writes while being notified.
//! 4. Dropping a [`Subscription`] removes its handler before the next
//!    notification cycle.
//!
//! The store is `!Send`; it belongs to one UI dispatch thread.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::path::Slot;
use crate::value::{ObjectRef, Value};

/// Callback invoked with `(container, new value)` after a committed write.
pub type ChangeHandler = Rc<dyn Fn(&ObjectRef, &Value)>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct Location {
    container: usize,
    key: String,
}

impl Location {
    fn of(slot: &Slot) -> Self {
        Self {
            container: slot.container().id(),
            key: slot.key().to_owned(),
        }
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    buckets: AHashMap<Location, Vec<(u64, ChangeHandler)>>,
    observers: Vec<(u64, ChangeHandler)>,
}

impl Registry {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Result of [`ReactiveStore::commit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Commit {
    /// The new value was identical to the current one.
    Unchanged,
    /// The value was written; `notified` handlers ran.
    Changed { notified: usize },
}

impl Commit {
    #[must_use]
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

/// Per-slot change registry. Cloning shares the registry.
#[derive(Clone, Default)]
pub struct ReactiveStore {
    inner: Rc<RefCell<Registry>>,
}

impl ReactiveStore {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for writes to `slot`'s location.
    #[must_use = "dropping the subscription unregisters the handler"]
    pub fn subscribe(&self, slot: &Slot, handler: impl Fn(&ObjectRef, &Value) + 'static) -> Subscription {
        let location = Location::of(slot);
        let mut registry = self.inner.borrow_mut();
        let id = registry.next_id();
        registry
            .buckets
            .entry(location.clone())
            .or_default()
            .push((id, Rc::new(handler)));
        tracing::trace!(key = %location.key, id, "subscribed");
        Subscription {
            registry: Rc::downgrade(&self.inner),
            location: Some(location),
            id,
        }
    }

    /// Register `handler` for every committed write in this store.
    #[must_use = "dropping the subscription unregisters the handler"]
    pub fn observe_all(&self, handler: impl Fn(&ObjectRef, &Value) + 'static) -> Subscription {
        let mut registry = self.inner.borrow_mut();
        let id = registry.next_id();
        registry.observers.push((id, Rc::new(handler)));
        Subscription {
            registry: Rc::downgrade(&self.inner),
            location: None,
            id,
        }
    }

    /// Number of handlers registered for `slot`'s location.
    #[must_use]
    pub fn handler_count(&self, slot: &Slot) -> usize {
        self.inner
            .borrow()
            .buckets
            .get(&Location::of(slot))
            .map_or(0, Vec::len)
    }

    /// Total handlers across all locations, excluding global observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().buckets.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the value at `slot`.
    #[must_use]
    pub fn read(&self, slot: &Slot) -> Value {
        slot.get()
    }

    /// Assign `value` into `slot` and notify. No-op if identical.
    pub fn commit(&self, slot: &Slot, value: Value) -> Commit {
        if slot.get().same(&value) {
            tracing::trace!(key = slot.key(), "commit skipped: value unchanged");
            return Commit::Unchanged;
        }
        slot.container().insert(slot.key(), value.clone());
        let notified = self.notify(slot, &value);
        Commit::Changed { notified }
    }

    /// Notify handlers for `slot` with `value` without writing.
    ///
    /// Returns the number of location handlers that ran (global observers are
    /// not counted).
    pub fn notify(&self, slot: &Slot, value: &Value) -> usize {
        let (handlers, observers) = {
            let registry = self.inner.borrow();
            let handlers: Vec<ChangeHandler> = registry
                .buckets
                .get(&Location::of(slot))
                .map(|bucket| bucket.iter().map(|(_, h)| Rc::clone(h)).collect())
                .unwrap_or_default();
            let observers: Vec<ChangeHandler> =
                registry.observers.iter().map(|(_, h)| Rc::clone(h)).collect();
            (handlers, observers)
        };
        tracing::trace!(
            key = slot.key(),
            handlers = handlers.len(),
            observers = observers.len(),
            "notify"
        );
        for handler in &handlers {
            handler(slot.container(), value);
        }
        for observer in &observers {
            observer(slot.container(), value);
        }
        handlers.len()
    }
}

impl fmt::Debug for ReactiveStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.borrow();
        f.debug_struct("ReactiveStore")
            .field("locations", &registry.buckets.len())
            .field("observers", &registry.observers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// RAII guard for a registered change handler.
///
/// Dropping the guard unregisters the handler. The guard holds only a weak
/// reference to the store, so it never keeps a registry alive.
pub struct Subscription {
    registry: Weak<RefCell<Registry>>,
    location: Option<Location>,
    id: u64,
}

impl Subscription {
    /// Unregister now. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Handler id (unique within its store).
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.borrow_mut();
        let id = self.id;
        match &self.location {
            Some(location) => {
                if let Some(bucket) = registry.buckets.get_mut(location) {
                    bucket.retain(|(hid, _)| *hid != id);
                    if bucket.is_empty() {
                        registry.buckets.remove(location);
                    }
                }
                tracing::trace!(key = %location.key, id, "unsubscribed");
            }
            None => registry.observers.retain(|(hid, _)| *hid != id),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("global", &self.location.is_none())
            .finish()
    }
}
