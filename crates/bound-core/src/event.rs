#![forbid(unsafe_code)]

//! Synchronous multi-subscriber event.
//!
//! An [`Event<A, M>`] threads a mutable payload `A` through every subscribed
//! handler, in registration order, alongside read-only metadata `M`, and hands
//! the payload back. It is the hook the property pipeline is built on.
//!
//! # Invariants
//!
//! 1. Handlers run in registration order.
//! 2. `raise` iterates a snapshot: handlers added during a raise first run on
//!    the next raise; handlers removed during a raise still run this once.
//! 3. A `once` handler runs at most one time.
//! 4. Dropping an [`EventSubscription`] removes its handler.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Handler<A, M> = Rc<dyn Fn(&mut A, &M)>;

struct Entry<A, M> {
    id: u64,
    once: bool,
    handler: Handler<A, M>,
}

struct Inner<A, M> {
    next_id: u64,
    entries: Vec<Entry<A, M>>,
}

/// A synchronous event with payload `A` and metadata `M`.
pub struct Event<A, M = ()> {
    inner: Rc<RefCell<Inner<A, M>>>,
}

impl<A, M> Clone for Event<A, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: 'static, M: 'static> Default for Event<A, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: 'static, M: 'static> Event<A, M> {
    /// Create an event with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    fn push(&self, handler: Handler<A, M>, once: bool) -> u64 {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.entries.push(Entry { id, once, handler });
        id
    }

    /// Subscribe a handler. Dropping the returned guard removes it.
    #[must_use = "dropping the subscription removes the handler"]
    pub fn subscribe(&self, handler: impl Fn(&mut A, &M) + 'static) -> EventSubscription {
        let id = self.push(Rc::new(handler), false);
        EventSubscription {
            remove: Some(self.remover(id)),
        }
    }

    /// Subscribe a handler for the lifetime of the event.
    pub fn on(&self, handler: impl Fn(&mut A, &M) + 'static) {
        self.push(Rc::new(handler), false);
    }

    /// Subscribe a handler that runs on the next raise only.
    pub fn once(&self, handler: impl Fn(&mut A, &M) + 'static) {
        self.push(Rc::new(handler), true);
    }

    fn remover(&self, id: u64) -> Box<dyn FnOnce()> {
        let weak: Weak<RefCell<Inner<A, M>>> = Rc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().entries.retain(|e| e.id != id);
            }
        })
    }

    /// Run every handler over `payload` and return it.
    pub fn raise(&self, mut payload: A, meta: &M) -> A {
        let snapshot: Vec<Handler<A, M>> = {
            let mut inner = self.inner.borrow_mut();
            let handlers = inner.entries.iter().map(|e| Rc::clone(&e.handler)).collect();
            inner.entries.retain(|e| !e.once);
            handlers
        };
        for handler in &snapshot {
            handler(&mut payload, meta);
        }
        payload
    }

    /// Number of subscribed handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<A, M> fmt::Debug for Event<A, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("handlers", &self.inner.borrow().entries.len())
            .finish()
    }
}

/// RAII guard returned by [`Event::subscribe`].
#[must_use = "dropping the subscription removes the handler"]
pub struct EventSubscription {
    remove: Option<Box<dyn FnOnce()>>,
}

impl EventSubscription {
    /// Keep the handler registered for the lifetime of the event.
    pub fn detach(mut self) {
        self.remove = None;
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("attached", &self.remove.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_threads_payload_in_order() {
        let event: Event<Vec<u8>> = Event::new();
        event.on(|v, _| v.push(1));
        event.on(|v, _| v.push(2));
        assert_eq!(event.raise(Vec::new(), &()), vec![1, 2]);
    }

    #[test]
    fn metadata_is_visible() {
        let event: Event<String, &'static str> = Event::new();
        event.on(|s, meta| s.push_str(meta));
        assert_eq!(event.raise(String::from(">"), &"field"), ">field");
    }

    #[test]
    fn dropped_subscription_is_removed() {
        let event: Event<u32> = Event::new();
        let sub = event.subscribe(|n, _| *n += 1);
        assert_eq!(event.raise(0, &()), 1);
        drop(sub);
        assert!(event.is_empty());
        assert_eq!(event.raise(0, &()), 0);
    }

    #[test]
    fn detached_subscription_stays() {
        let event: Event<u32> = Event::new();
        event.subscribe(|n, _| *n += 1).detach();
        assert_eq!(event.raise(0, &()), 1);
    }

    #[test]
    fn once_runs_one_time() {
        let event: Event<u32> = Event::new();
        event.once(|n, _| *n += 10);
        event.on(|n, _| *n += 1);
        assert_eq!(event.raise(0, &()), 11);
        assert_eq!(event.raise(0, &()), 1);
        assert_eq!(event.len(), 1);
    }

    #[test]
    fn handler_added_during_raise_runs_next_time() {
        let event: Event<u32> = Event::new();
        let inner = event.clone();
        event.once(move |n, _| {
            *n += 1;
            inner.on(|n, _| *n += 100);
        });
        assert_eq!(event.raise(0, &()), 1);
        assert_eq!(event.raise(0, &()), 100);
    }
}
