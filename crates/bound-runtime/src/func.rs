#![forbid(unsafe_code)]

//! Callable scope values and the `also` merge marker.
//!
//! A [`Func`] is a shared callable over `&[Value]`. It returns an [`Outcome`]
//! that is either ready or pending (a local future), so the same type covers
//! synchronous callbacks and asynchronous ones.
//!
//! [`also`] tags a `Func` with a *combiner*. When a child scope defines a key
//! with a tagged function and an ancestor scope already holds a function at
//! that key, the child's entry becomes a composition of both (see
//! [`compose`]) instead of replacing the ancestor's function.
//!
//! # Composition
//!
//! Calling the composed function with `args`:
//!
//! 1. `a = own(args)`
//! 2. `b = inherited(args)`
//! 3. If either outcome is pending, return a pending outcome that drives both
//!    concurrently and applies the combiner to the resolved pair.
//! 4. Otherwise return `combiner(a, b)`.
//!
//! A [`BindError::Cancel`] raised synchronously by `own` returns its payload
//! and skips steps 2–4; raised by `inherited` it returns `a` and skips the
//! combiner. Any other error propagates, including one returned by the
//! combiner. Inside a pending outcome a cancel is an ordinary error.

use std::fmt;
use std::rc::Rc;

use bound_core::Value;
use futures_util::FutureExt;
use futures_util::future::{LocalBoxFuture, join};

use crate::error::{BindError, Result};
use crate::scope::ScopeValue;

type FuncFn = dyn Fn(&[Value]) -> Result<Outcome>;

/// Merges the own and inherited results of a composed function.
pub type Combiner = Rc<dyn Fn(Value, Value) -> Result<Value>>;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of calling a [`Func`].
pub enum Outcome {
    Ready(Value),
    Pending(LocalBoxFuture<'static, Result<Value>>),
}

impl Outcome {
    /// Wrap a future as a pending outcome.
    pub fn pending(future: impl Future<Output = Result<Value>> + 'static) -> Self {
        Self::Pending(future.boxed_local())
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// The value if ready, `None` if pending.
    #[must_use]
    pub fn into_ready(self) -> Option<Value> {
        match self {
            Self::Ready(v) => Some(v),
            Self::Pending(_) => None,
        }
    }

    /// Await the outcome regardless of form.
    pub async fn resolve(self) -> Result<Value> {
        match self {
            Self::Ready(v) => Ok(v),
            Self::Pending(fut) => fut.await,
        }
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Self::Ready(value)
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(v) => f.debug_tuple("Ready").field(v).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Func
// ---------------------------------------------------------------------------

/// A shared callable, optionally tagged with a merge combiner.
#[derive(Clone)]
pub struct Func {
    call: Rc<FuncFn>,
    merge: Option<Combiner>,
}

impl Func {
    /// Wrap a fallible callable.
    pub fn new(f: impl Fn(&[Value]) -> Result<Outcome> + 'static) -> Self {
        Self {
            call: Rc::new(f),
            merge: None,
        }
    }

    /// Wrap an infallible synchronous callable.
    pub fn sync(f: impl Fn(&[Value]) -> Value + 'static) -> Self {
        Self::new(move |args| Ok(Outcome::Ready(f(args))))
    }

    /// Wrap a callable run for its side effect; it returns `Missing`.
    pub fn action(f: impl Fn(&[Value]) + 'static) -> Self {
        Self::new(move |args| {
            f(args);
            Ok(Outcome::Ready(Value::Missing))
        })
    }

    /// Wrap a callable that produces a future.
    pub fn future<F>(f: impl Fn(&[Value]) -> F + 'static) -> Self
    where
        F: Future<Output = Result<Value>> + 'static,
    {
        Self::new(move |args| Ok(Outcome::pending(f(args))))
    }

    /// Invoke the function.
    pub fn call(&self, args: &[Value]) -> Result<Outcome> {
        (self.call)(args)
    }

    /// Invoke and require a ready result.
    ///
    /// # Errors
    ///
    /// Whatever the function raises, and [`BindError::Failed`] if it returns
    /// a pending outcome. The pending future is dropped unpolled.
    pub fn call_ready(&self, args: &[Value]) -> Result<Value> {
        match self.call(args)? {
            Outcome::Ready(v) => Ok(v),
            Outcome::Pending(_) => Err(BindError::failed(
                "function returned a pending outcome where a ready value was required",
            )),
        }
    }

    /// Whether this function carries an `also` combiner.
    #[must_use]
    pub fn is_mergeable(&self) -> bool {
        self.merge.is_some()
    }

    /// The combiner attached by [`also`], if any.
    #[must_use]
    pub fn combiner(&self) -> Option<&Combiner> {
        self.merge.as_ref()
    }

    /// Whether both handles share one callable.
    #[must_use]
    pub fn ptr_eq(&self, other: &Func) -> bool {
        Rc::ptr_eq(&self.call, &other.call)
    }
}

impl PartialEq for Func {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Func")
            .field("mergeable", &self.merge.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// also
// ---------------------------------------------------------------------------

/// Tag `func` so a child scope merges it with an inherited function of the
/// same name; results are combined by `combine(own, inherited)`.
pub fn also(func: Func, combine: impl Fn(Value, Value) -> Value + 'static) -> Func {
    also_try(func, move |a, b| Ok(combine(a, b)))
}

/// [`also`] with a fallible combiner. Its error fails the composed call.
pub fn also_try(
    mut func: Func,
    combine: impl Fn(Value, Value) -> Result<Value> + 'static,
) -> Func {
    func.merge = Some(Rc::new(combine));
    func
}

/// [`also`] with the default combiner, which keeps the own result.
pub fn also_first(func: Func) -> Func {
    also(func, |a, _b| a)
}

/// Dynamic form of [`also`] for scope values of unknown shape.
///
/// A function `combine` is called with `[own, inherited]` and must return a
/// ready value; an error or a pending outcome fails the composed call.
///
/// # Errors
///
/// [`BindError::InvalidArgument`] if `value` or `combine` is not a function.
pub fn also_value(value: &ScopeValue, combine: Option<&ScopeValue>) -> Result<ScopeValue> {
    let ScopeValue::Func(func) = value else {
        return Err(BindError::InvalidArgument(
            "also must be called with functions as parameters".into(),
        ));
    };
    let func = match combine {
        None => also_first(func.clone()),
        Some(ScopeValue::Func(combiner)) => {
            let combiner = combiner.clone();
            also_try(func.clone(), move |a, b| combiner.call_ready(&[a, b]))
        }
        Some(_) => {
            return Err(BindError::InvalidArgument(
                "also must be called with functions as parameters".into(),
            ));
        }
    };
    Ok(ScopeValue::Func(func))
}

/// Compose a tagged `own` function over an `inherited` one.
///
/// The result carries no combiner of its own.
pub(crate) fn compose(own: Func, inherited: Func, combine: Combiner) -> Func {
    Func::new(move |args| {
        let a = match own.call(args) {
            Ok(a) => a,
            Err(BindError::Cancel(value)) => return Ok(Outcome::Ready(value)),
            Err(err) => return Err(err),
        };
        let b = match inherited.call(args) {
            Ok(b) => b,
            Err(BindError::Cancel(_)) => return Ok(a),
            Err(err) => return Err(err),
        };
        match (a, b) {
            (Outcome::Ready(a), Outcome::Ready(b)) => Ok(Outcome::Ready(combine(a, b)?)),
            (a, b) => {
                let combine = Rc::clone(&combine);
                Ok(Outcome::pending(async move {
                    let (a, b) = join(a.resolve(), b.resolve()).await;
                    combine(a?, b?)
                }))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn also_tags_and_returns_same_callable() {
        let f = Func::sync(|_| Value::from(1));
        let tagged = also_first(f.clone());
        assert!(tagged.is_mergeable());
        assert!(tagged.ptr_eq(&f));
    }

    #[test]
    fn also_value_rejects_non_functions() {
        let err = also_value(&ScopeValue::Value(Value::from(3)), None).unwrap_err();
        assert!(matches!(err, BindError::InvalidArgument(_)));

        let f = ScopeValue::Func(Func::sync(|_| Value::Null));
        let bad = ScopeValue::Value(Value::from("nope"));
        assert!(matches!(
            also_value(&f, Some(&bad)),
            Err(BindError::InvalidArgument(_))
        ));
    }

    #[test]
    fn also_value_uses_function_combiner() {
        let own = ScopeValue::Func(Func::sync(|_| Value::from(2)));
        let combine = ScopeValue::Func(Func::sync(|args| {
            let a = args[0].as_f64().unwrap_or_default();
            let b = args[1].as_f64().unwrap_or_default();
            Value::from(a * 10.0 + b)
        }));
        let ScopeValue::Func(tagged) = also_value(&own, Some(&combine)).unwrap() else {
            panic!("expected function");
        };
        let merged = compose(
            tagged.clone(),
            Func::sync(|_| Value::from(3)),
            Rc::clone(tagged.combiner().unwrap()),
        );
        assert_eq!(merged.call_ready(&[]).unwrap(), Value::from(23));
    }

    #[test]
    fn compose_calls_own_then_inherited() {
        let log = recorder();
        let l1 = Rc::clone(&log);
        let own = Func::sync(move |_| {
            l1.borrow_mut().push("own");
            Value::from("a")
        });
        let l2 = Rc::clone(&log);
        let inherited = Func::sync(move |_| {
            l2.borrow_mut().push("inherited");
            Value::from("b")
        });
        let merged = compose(
            own,
            inherited,
            Rc::new(|a: Value, b: Value| {
                Ok(Value::from(format!("{}{}", a.as_str().unwrap(), b.as_str().unwrap())))
            }),
        );
        assert_eq!(merged.call_ready(&[]).unwrap(), Value::from("ab"));
        assert_eq!(*log.borrow(), vec!["own", "inherited"]);
    }

    #[test]
    fn cancel_in_own_skips_inherited() {
        let called = Rc::new(RefCell::new(false));
        let c = Rc::clone(&called);
        let own = Func::new(|_| Err(BindError::Cancel(Value::from("early"))));
        let inherited = Func::action(move |_| *c.borrow_mut() = true);
        let merged = compose(own, inherited, Rc::new(|_: Value, _: Value| Ok(Value::from("combined"))));
        assert_eq!(merged.call_ready(&[]).unwrap(), Value::from("early"));
        assert!(!*called.borrow());
    }

    #[test]
    fn cancel_in_inherited_returns_own() {
        let own = Func::sync(|_| Value::from("mine"));
        let inherited = Func::new(|_| Err(BindError::cancel()));
        let merged = compose(own, inherited, Rc::new(|_: Value, _: Value| Ok(Value::from("combined"))));
        assert_eq!(merged.call_ready(&[]).unwrap(), Value::from("mine"));
    }

    #[test]
    fn other_errors_propagate() {
        let own = Func::new(|_| Err(BindError::failed("boom")));
        let merged = compose(own, Func::sync(|_| Value::Null), Rc::new(|a: Value, _: Value| Ok(a)));
        let err = merged.call(&[]).unwrap_err();
        assert!(matches!(err, BindError::Failed(msg) if msg == "boom"));
    }

    #[test]
    fn pending_results_are_combined_after_both_settle() {
        let own = Func::future(|_| async { Ok(Value::from(1)) });
        let inherited = Func::sync(|_| Value::from(2));
        let merged = compose(
            own,
            inherited,
            Rc::new(|a: Value, b: Value| {
                Ok(Value::from(a.as_f64().unwrap() + b.as_f64().unwrap()))
            }),
        );
        let outcome = merged.call(&[]).unwrap();
        assert!(outcome.is_pending());
        assert_eq!(pollster::block_on(outcome.resolve()).unwrap(), Value::from(3));
    }

    #[test]
    fn call_ready_rejects_pending_outcomes() {
        let f = Func::future(|_| async { Ok(Value::from(1)) });
        assert!(matches!(f.call_ready(&[]), Err(BindError::Failed(_))));
    }

    fn merged_with(combine: Func) -> Func {
        let own = ScopeValue::Func(Func::sync(|_| Value::from("own")));
        let ScopeValue::Func(tagged) = also_value(&own, Some(&ScopeValue::Func(combine))).unwrap()
        else {
            panic!("expected function");
        };
        let combiner = Rc::clone(tagged.combiner().unwrap());
        compose(tagged, Func::sync(|_| Value::from("inherited")), combiner)
    }

    #[test]
    fn failing_dynamic_combiner_fails_the_call() {
        let merged = merged_with(Func::new(|_| Err(BindError::failed("bad merge"))));
        let err = merged.call(&[]).unwrap_err();
        assert!(matches!(err, BindError::Failed(msg) if msg == "bad merge"));
    }

    #[test]
    fn pending_dynamic_combiner_fails_the_call() {
        let merged = merged_with(Func::future(|_| async { Ok(Value::Null) }));
        assert!(matches!(merged.call(&[]), Err(BindError::Failed(_))));
    }

    #[test]
    fn fallible_combiner_error_surfaces_after_pending_results() {
        let own = also_try(Func::future(|_| async { Ok(Value::from(1)) }), |_, _| {
            Err(BindError::failed("late"))
        });
        let combiner = Rc::clone(own.combiner().unwrap());
        let merged = compose(own, Func::sync(|_| Value::from(2)), combiner);
        let outcome = merged.call(&[]).unwrap();
        let err = pollster::block_on(outcome.resolve()).unwrap_err();
        assert!(matches!(err, BindError::Failed(msg) if msg == "late"));
    }
}
