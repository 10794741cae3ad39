#![forbid(unsafe_code)]

//! Change-callback value extraction.

use std::fmt;
use std::rc::Rc;

use bound_core::Value;

/// What an extractor pulled out of a change-callback invocation.
#[derive(Clone, Debug, PartialEq)]
pub enum Extracted {
    Value(Value),
    /// Nothing to write; the invocation carried no value.
    Skip,
}

/// Normalizes change-callback arguments into a value to write.
#[derive(Clone)]
pub struct Extractor(Rc<dyn Fn(&[Value]) -> Extracted>);

impl Extractor {
    pub fn new(f: impl Fn(&[Value]) -> Extracted + 'static) -> Self {
        Self(Rc::new(f))
    }

    #[must_use]
    pub fn extract(&self, args: &[Value]) -> Extracted {
        (self.0)(args)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Extractor) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(default_extractor)
    }
}

impl PartialEq for Extractor {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Extractor(..)")
    }
}

/// Whether `value` looks like a UI event: an object with `type` and `target`.
#[must_use]
pub fn is_event(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.contains_key("type") && o.contains_key("target"))
}

/// The standard extractor for `(event, explicit)` change callbacks.
///
/// An explicit second argument wins, then `event.target.value`, then a first
/// argument that is not an event. Events without a value are skipped.
#[must_use]
pub fn default_extractor(args: &[Value]) -> Extracted {
    let event = args.first().cloned().unwrap_or_default();
    let explicit = args.get(1).cloned().unwrap_or_default();
    if !matches!(explicit, Value::Missing) {
        return Extracted::Value(explicit);
    }
    let from_target = event
        .as_object()
        .map(|o| o.get("target"))
        .and_then(|t| t.as_object().map(|t| t.get("value")))
        .unwrap_or_default();
    if !matches!(from_target, Value::Missing) {
        return Extracted::Value(from_target);
    }
    if !is_event(&event) {
        return Extracted::Value(event);
    }
    Extracted::Skip
}
