#![forbid(unsafe_code)]

//! Rule-string validation for bound fields.
//!
//! A node bound through an adapter may carry a rules prop such as
//! `validate = "string.required.min(3)"`. The validation subscriber parses
//! the rules into a [`RuleSet`], checks the current value, and rewrites the
//! node's props: `error` becomes a boolean and the helper-text prop carries
//! the first violation message.
//!
//! Rules are a dot-separated pipeline over a closed vocabulary; nothing in a
//! rule string is ever evaluated as code.
//!
//! | Rule | Passes when |
//! |------|-------------|
//! | `required` | the value is set and not empty text |
//! | `string` | the value is unset, text, a number or a boolean |
//! | `number` | the value is unset, a number, or text parsing as one |
//! | `min(n)` / `max(n)` | text length (or, with `number`, magnitude) is within bounds |
//! | `pattern(re)` | text matches `re` (quotes or slashes around `re` are stripped) |
//!
//! With `string` in the set, numbers and booleans are checked in their text
//! form, so `string.max(3)` rejects `1234`.
//!
//! A [`ValidationTracker`] placed in scope under [`VALIDATION_KEY`] collects
//! failing adapters and reports when the form as a whole flips between valid
//! and invalid.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use bound_core::{Event, EventSubscription, Value};
use regex::Regex;

use crate::element::{Element, Prop, Props, prop_value};
use crate::error::{BindError, Result};
use crate::properties::PropertyMeta;
use crate::scope::{ScopeProps, ScopeValue};

/// Scope key holding the [`ValidationTracker`].
pub const VALIDATION_KEY: &str = "validation";
/// Prop naming which prop receives the violation message.
pub const HELPER_TEXT_PROP: &str = "validateHelperText";
/// Prop overriding the type-check message.
pub const TYPE_ERROR_PROP: &str = "typeError";

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
enum Rule {
    Required,
    String,
    Number,
    Min(f64),
    Max(f64),
    Pattern(Regex),
}

/// A failed check.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct RuleViolation {
    /// Name of the rule that failed.
    pub rule: &'static str,
    pub message: String,
}

impl RuleViolation {
    fn new(rule: &'static str, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }
}

/// A parsed rule pipeline.
#[derive(Clone, Debug)]
pub struct RuleSet {
    rules: Vec<Rule>,
    type_error: Option<String>,
}

impl RuleSet {
    /// Parse a dot-separated rule string.
    ///
    /// # Errors
    ///
    /// [`BindError::InvalidRule`] for unknown names, malformed arguments, or
    /// invalid patterns.
    pub fn parse(source: &str) -> Result<Self> {
        let rules = split_rules(source)?
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(parse_rule)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            rules,
            type_error: None,
        })
    }

    /// Replace the message reported by `string` and `number`.
    #[must_use]
    pub fn with_type_error(mut self, message: impl Into<String>) -> Self {
        self.type_error = Some(message.into());
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Check `value` against every rule in order; the first failure wins.
    ///
    /// # Errors
    ///
    /// The first [`RuleViolation`].
    pub fn check(&self, value: &Value) -> std::result::Result<(), RuleViolation> {
        let numeric = self.rules.iter().any(|r| matches!(r, Rule::Number));
        let textual = self.rules.iter().any(|r| matches!(r, Rule::String));
        let text = if textual { cast_text(value) } else { value.as_str().map(str::to_owned) };
        for rule in &self.rules {
            match rule {
                Rule::Required => {
                    if value.is_unset() || value.as_str() == Some("") {
                        return Err(RuleViolation::new("required", "this is a required field"));
                    }
                }
                Rule::String => {
                    if !value.is_unset() && text.is_none() {
                        return Err(self.type_violation("string"));
                    }
                }
                Rule::Number => {
                    if !value.is_unset() && number_of(value).is_none() {
                        return Err(self.type_violation("number"));
                    }
                }
                Rule::Min(min) => {
                    if let Some(measured) = measure(value, text.as_deref(), numeric) {
                        if measured < *min {
                            let message = bound_message(numeric, "at least", "greater than or equal to", *min);
                            return Err(RuleViolation::new("min", message));
                        }
                    }
                }
                Rule::Max(max) => {
                    if let Some(measured) = measure(value, text.as_deref(), numeric) {
                        if measured > *max {
                            let message = bound_message(numeric, "at most", "less than or equal to", *max);
                            return Err(RuleViolation::new("max", message));
                        }
                    }
                }
                Rule::Pattern(re) => {
                    if let Some(text) = &text {
                        if !re.is_match(text) {
                            return Err(RuleViolation::new(
                                "pattern",
                                format!("this must match the following: \"{}\"", re.as_str()),
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn type_violation(&self, ty: &'static str) -> RuleViolation {
        let message = self
            .type_error
            .clone()
            .unwrap_or_else(|| format!("this must be a `{ty}` type"));
        RuleViolation::new(ty, message)
    }
}

fn bound_message(numeric: bool, text_word: &str, number_word: &str, n: f64) -> String {
    if numeric {
        format!("this must be {number_word} {n}")
    } else {
        format!("this must be {text_word} {n} characters")
    }
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) if !n.is_nan() => Some(*n),
        Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| !n.is_nan()),
        _ => None,
    }
}

/// Text form of a scalar, the way a `string` rule sees it.
fn cast_text(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn measure(value: &Value, text: Option<&str>, numeric: bool) -> Option<f64> {
    if numeric {
        return number_of(value);
    }
    if let Some(text) = text {
        return Some(text.chars().count() as f64);
    }
    match value {
        Value::Number(n) => Some(*n),
        Value::List(items) => Some(items.len() as f64),
        _ => None,
    }
}

/// Split on `.` outside parentheses and quotes.
fn split_rules(source: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in source.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth = depth.checked_sub(1).ok_or_else(|| invalid(source, "unbalanced `)`"))?;
            }
            (None, '.') if depth == 0 => {
                parts.push(source[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 || quote.is_some() {
        return Err(invalid(source, "unterminated argument list"));
    }
    parts.push(source[start..].trim());
    Ok(parts)
}

fn parse_rule(part: &str) -> Result<Rule> {
    let (name, arg) = match part.find('(') {
        Some(open) => {
            let Some(inner) = part[open + 1..].strip_suffix(')') else {
                return Err(invalid(part, "trailing text after `)`"));
            };
            (part[..open].trim(), inner.trim())
        }
        None => (part, ""),
    };
    let rule = match name {
        "required" => Rule::Required,
        "string" => Rule::String,
        "number" => Rule::Number,
        "min" => Rule::Min(parse_number(part, arg)?),
        "max" => Rule::Max(parse_number(part, arg)?),
        "pattern" | "matches" => {
            let source = unquote(arg);
            Rule::Pattern(Regex::new(source).map_err(|err| invalid(part, &err.to_string()))?)
        }
        _ => return Err(invalid(part, "unknown rule")),
    };
    Ok(rule)
}

fn parse_number(part: &str, arg: &str) -> Result<f64> {
    arg.parse::<f64>()
        .map_err(|_| invalid(part, "expected a numeric argument"))
}

fn unquote(arg: &str) -> &str {
    for q in ['"', '\'', '/'] {
        if arg.len() >= 2 && arg.starts_with(q) && arg.ends_with(q) {
            return &arg[1..arg.len() - 1];
        }
    }
    arg
}

fn invalid(rule: &str, reason: &str) -> BindError {
    BindError::InvalidRule {
        rule: rule.to_owned(),
        reason: reason.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// ValidationTracker
// ---------------------------------------------------------------------------

/// Aggregate validity of the adapters rendered under one scope.
pub struct ValidationTracker {
    failing: RefCell<BTreeMap<u64, String>>,
    invalid: Cell<bool>,
    changed: Event<bool>,
}

impl ValidationTracker {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            failing: RefCell::new(BTreeMap::new()),
            invalid: Cell::new(false),
            changed: Event::new(),
        })
    }

    /// Record a failure for adapter `instance`.
    pub fn fail(&self, instance: u64, message: impl Into<String>) {
        let newly = self
            .failing
            .borrow_mut()
            .insert(instance, message.into())
            .is_none();
        if newly {
            self.settle();
        }
    }

    /// Record that adapter `instance` passes.
    pub fn clear(&self, instance: u64) {
        let was = self.failing.borrow_mut().remove(&instance).is_some();
        if was {
            self.settle();
        }
    }

    /// Forget an unmounted adapter.
    pub fn release(&self, instance: u64) {
        self.clear(instance);
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.failing.borrow().is_empty()
    }

    /// Failure messages by adapter instance.
    #[must_use]
    pub fn errors(&self) -> Vec<(u64, String)> {
        self.failing
            .borrow()
            .iter()
            .map(|(id, msg)| (*id, msg.clone()))
            .collect()
    }

    /// Call `handler(has_errors)` whenever aggregate validity flips.
    #[must_use = "dropping the subscription removes the handler"]
    pub fn on_validity(&self, handler: impl Fn(bool) + 'static) -> EventSubscription {
        self.changed.subscribe(move |invalid, _| handler(*invalid))
    }

    fn settle(&self) {
        let invalid = self.has_errors();
        if invalid != self.invalid.replace(invalid) {
            tracing::debug!(invalid, "validity changed");
            self.changed.raise(invalid, &());
        }
    }
}

impl fmt::Debug for ValidationTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationTracker")
            .field("failing", &self.failing.borrow().len())
            .finish()
    }
}

/// A scope layer exposing `tracker` to the adapters in `children`.
#[must_use]
pub fn validation_scope(
    tracker: &Rc<ValidationTracker>,
    children: impl IntoIterator<Item = Element>,
) -> Element {
    Element::bound(
        ScopeProps::new().with(VALIDATION_KEY, ScopeValue::shared(Rc::clone(tracker))),
        children,
    )
}

// ---------------------------------------------------------------------------
// Property subscriber
// ---------------------------------------------------------------------------

/// Subscriber applying the rules in `rules_prop`, reporting into
/// `helper_text_prop` unless the props name another target.
pub fn validation_subscriber(
    rules_prop: &str,
    helper_text_prop: &str,
) -> impl Fn(&mut Props, &PropertyMeta) + 'static {
    let rules_prop = rules_prop.to_owned();
    let helper_default = helper_text_prop.to_owned();
    move |props, meta| {
        let Some(rules) = props.remove(&rules_prop) else {
            return;
        };
        let helper = props
            .remove(HELPER_TEXT_PROP)
            .and_then(|p| p.as_str().map(str::to_owned))
            .unwrap_or_else(|| helper_default.clone());
        let type_error = prop_value(props, TYPE_ERROR_PROP).as_str().map(str::to_owned);
        props.remove(TYPE_ERROR_PROP);
        props.insert("error".into(), Prop::from(false));
        props.remove(&helper);

        let tracker = meta.scope.shared::<ValidationTracker>(VALIDATION_KEY);
        let verdict = match RuleSet::parse(rules.as_str().unwrap_or("")) {
            Ok(set) => {
                let set = match type_error {
                    Some(msg) => set.with_type_error(msg),
                    None => set,
                };
                set.check(&meta.value).map_err(|v| v.message)
            }
            Err(err) => {
                tracing::warn!(field = %meta.field, %err, "ignoring malformed rules");
                Err(err.to_string())
            }
        };
        match verdict {
            Ok(()) => {
                if let Some(tracker) = &tracker {
                    tracker.clear(meta.instance);
                }
            }
            Err(message) => {
                props.insert("error".into(), Prop::from(true));
                if !helper.is_empty() {
                    props.insert(helper.clone(), Prop::from(message.clone()));
                }
                if let Some(tracker) = &tracker {
                    tracker.fail(meta.instance, message);
                }
            }
        }
    }
}
