#![forbid(unsafe_code)]

//! Dot-separated path resolution against a root object.
//!
//! `resolve(root, "a.b.c")` walks `a` then `b`, creating empty objects for
//! unset intermediates, and returns the [`Slot`] `(container = root.a.b, key = "c")`.
//!
//! # Invariants
//!
//! 1. Resolution never fails and never overwrites an existing value.
//! 2. Resolving the same `(root, path)` twice without intervening writes to the
//!    intermediate keys yields the same container object (by identity) and
//!    the same key.
//! 3. [`PathResolver`] recomputes only when the root identity or the path
//!    string changes.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Scalar intermediate | `a` holds `3` and path is `a.b` | Resolves into a detached empty object; nothing is written to `root` (logged) |
//! | Empty path | `""` | Slot is `(root, "")` |

use crate::value::{ObjectRef, Value};

/// A resolved location: the immediate container and the final key.
#[derive(Clone, Debug)]
pub struct Slot {
    container: ObjectRef,
    key: String,
}

impl Slot {
    /// Build a slot directly from a container and key.
    #[must_use]
    pub fn new(container: ObjectRef, key: impl Into<String>) -> Self {
        Self {
            container,
            key: key.into(),
        }
    }

    /// The object holding the value.
    #[must_use]
    pub fn container(&self) -> &ObjectRef {
        &self.container
    }

    /// The final path segment.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current value at this slot.
    #[must_use]
    pub fn get(&self) -> Value {
        self.container.get(&self.key)
    }

    /// Write `default` into the slot if it is unset. Returns the value now held.
    pub fn materialize(&self, default: &Value) -> Value {
        let current = self.get();
        if current.is_unset() && !default.is_unset() {
            self.container.insert(self.key.clone(), default.clone());
            return default.clone();
        }
        current
    }

    /// Whether two slots address the same key of the same container.
    #[must_use]
    pub fn same_location(&self, other: &Slot) -> bool {
        self.container.ptr_eq(&other.container) && self.key == other.key
    }
}

/// Resolve `path` against `root`, creating unset intermediates.
pub fn resolve(root: &ObjectRef, path: &str) -> Slot {
    let mut segments = path.split('.').peekable();
    let mut container = root.clone();
    let mut last = "";
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            last = segment;
            break;
        }
        container = match container.child_object(segment) {
            Some(child) => child,
            None => {
                tracing::warn!(
                    path,
                    segment,
                    "path crosses a non-object value; resolving into a detached object"
                );
                ObjectRef::new()
            }
        };
    }
    Slot::new(container, last)
}

/// Memoizing resolver keyed on `(root identity, path)`.
///
/// Holding one of these per binding keeps the returned [`Slot`] (and anything
/// derived from it) referentially stable across renders.
#[derive(Debug, Default)]
pub struct PathResolver {
    cached: Option<(ObjectRef, String, Slot)>,
    resolutions: u64,
}

impl PathResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve, reusing the previous result when root and path are unchanged.
    pub fn resolve(&mut self, root: &ObjectRef, path: &str) -> &Slot {
        let fresh = match &self.cached {
            Some((cached_root, cached_path, _)) => {
                !cached_root.ptr_eq(root) || cached_path != path
            }
            None => true,
        };
        if fresh {
            self.resolutions += 1;
            self.cached = None;
        }
        let (_, _, slot) = self
            .cached
            .get_or_insert_with(|| (root.clone(), path.to_owned(), resolve(root, path)));
        slot
    }

    /// Number of times a fresh resolution was computed.
    #[must_use]
    pub fn resolutions(&self) -> u64 {
        self.resolutions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn single_segment_uses_root() {
        let root = ObjectRef::new();
        let slot = resolve(&root, "name");
        assert!(slot.container().ptr_eq(&root));
        assert_eq!(slot.key(), "name");
    }

    #[test]
    fn nested_creates_intermediates() {
        let root = ObjectRef::new();
        let slot = resolve(&root, "a.b.c");
        assert_eq!(slot.key(), "c");
        let a = root.get("a");
        let b = a.as_object().unwrap().get("b");
        assert!(b.as_object().unwrap().ptr_eq(slot.container()));
    }

    #[test]
    fn resolution_is_idempotent() {
        let root = ObjectRef::new();
        let first = resolve(&root, "x.y");
        let second = resolve(&root, "x.y");
        assert!(first.same_location(&second));
    }

    #[test]
    fn existing_intermediate_is_reused() {
        let inner = ObjectRef::from_pairs([("k", 1)]);
        let root = ObjectRef::from_pairs([("a", inner.clone())]);
        let slot = resolve(&root, "a.k");
        assert!(slot.container().ptr_eq(&inner));
        assert_eq!(slot.get(), Value::from(1));
    }

    #[traced_test]
    #[test]
    fn scalar_intermediate_is_not_overwritten() {
        let root = ObjectRef::from_pairs([("a", 3)]);
        let slot = resolve(&root, "a.b");
        assert!(!slot.container().ptr_eq(&root));
        assert_eq!(root.get("a"), Value::from(3));
        assert!(logs_contain("path crosses a non-object value"));
    }

    #[traced_test]
    #[test]
    fn object_intermediates_resolve_quietly() {
        resolve(&ObjectRef::new(), "a.b.c");
        assert!(!logs_contain("non-object"));
    }

    #[test]
    fn materialize_only_fills_unset() {
        let root = ObjectRef::from_pairs([("set", "yes")]);
        let set = resolve(&root, "set");
        assert_eq!(set.materialize(&Value::from("default")), Value::from("yes"));
        let unset = resolve(&root, "unset");
        assert_eq!(unset.materialize(&Value::from("default")), Value::from("default"));
        assert_eq!(root.get("unset"), Value::from("default"));
    }

    #[test]
    fn resolver_caches_until_inputs_change() {
        let root = ObjectRef::new();
        let mut resolver = PathResolver::new();
        let first = resolver.resolve(&root, "a.b").clone();
        let second = resolver.resolve(&root, "a.b").clone();
        assert!(first.same_location(&second));
        assert_eq!(resolver.resolutions(), 1);

        resolver.resolve(&root, "a.c");
        assert_eq!(resolver.resolutions(), 2);

        let other = ObjectRef::new();
        resolver.resolve(&other, "a.c");
        assert_eq!(resolver.resolutions(), 3);
    }
}
