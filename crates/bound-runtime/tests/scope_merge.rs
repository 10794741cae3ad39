//! Function merging across nested scopes.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use bound_core::Value;
use bound_runtime::{BindError, Func, Outcome, Scope, ScopeProps, also, also_first};
use proptest::prelude::*;

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn recording(log: &Log, name: &'static str, result: Value) -> Func {
    let log = Rc::clone(log);
    Func::sync(move |args| {
        log.borrow_mut().push(format!("{name}({})", args[0].as_str().unwrap_or("")));
        result.clone()
    })
}

/// Pends once, then completes.
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

fn slow(log: &Log, name: &'static str, result: f64) -> Func {
    let log = Rc::clone(log);
    Func::future(move |_| {
        let log = Rc::clone(&log);
        async move {
            log.borrow_mut().push(format!("{name} start"));
            YieldOnce(false).await;
            log.borrow_mut().push(format!("{name} end"));
            Ok(Value::from(result))
        }
    })
}

#[test]
fn child_function_runs_before_inherited_and_results_combine() {
    let calls = log();
    let outer = Scope::root(ScopeProps::new().with("f", recording(&calls, "h", Value::from("H"))));
    let inner = outer.child(ScopeProps::new().with(
        "f",
        also(recording(&calls, "g", Value::from("G")), |a, b| {
            Value::from(format!("{}+{}", a.as_str().unwrap_or(""), b.as_str().unwrap_or("")))
        }),
    ));

    let f = inner.func("f").unwrap();
    assert!(!f.is_mergeable());
    assert_eq!(f.call_ready(&[Value::from("x")]).unwrap(), Value::from("G+H"));
    assert_eq!(*calls.borrow(), vec!["g(x)", "h(x)"]);

    // The outer scope still sees only its own function.
    calls.borrow_mut().clear();
    outer.func("f").unwrap().call_ready(&[Value::from("y")]).unwrap();
    assert_eq!(*calls.borrow(), vec!["h(y)"]);
}

#[test]
fn cancel_in_child_function_skips_inherited() {
    let calls = log();
    let outer = Scope::root(ScopeProps::new().with("f", recording(&calls, "h", Value::from("H"))));
    let inner = outer.child(ScopeProps::new().with(
        "f",
        also_first(Func::new(|_| Err(BindError::Cancel(Value::from("stop"))))),
    ));

    let result = inner.func("f").unwrap().call_ready(&[Value::from("x")]).unwrap();
    assert_eq!(result, Value::from("stop"));
    assert!(calls.borrow().is_empty());
}

#[test]
fn untagged_child_function_shadows() {
    let calls = log();
    let outer = Scope::root(ScopeProps::new().with("f", recording(&calls, "h", Value::Null)));
    let inner = outer.child(ScopeProps::new().with("f", recording(&calls, "g", Value::Null)));
    inner.func("f").unwrap().call_ready(&[Value::from("x")]).unwrap();
    assert_eq!(*calls.borrow(), vec!["g(x)"]);
}

#[test]
fn merges_stack_across_three_layers() {
    let sum = |a: Value, b: Value| Value::from(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0));
    let root = Scope::root(ScopeProps::new().with("n", Func::sync(|_| Value::from(1))));
    let middle = root.child(ScopeProps::new().with("n", also(Func::sync(|_| Value::from(10)), sum)));
    let leaf = middle.child(ScopeProps::new().with("n", also(Func::sync(|_| Value::from(100)), sum)));
    assert_eq!(leaf.func("n").unwrap().call_ready(&[]).unwrap(), Value::from(111));
}

#[test]
fn pending_functions_start_together_and_combine_after_both_settle() {
    let events = log();
    let combine_log = Rc::clone(&events);
    let outer = Scope::root(ScopeProps::new().with("load", slow(&events, "h", 2.0)));
    let inner = outer.child(ScopeProps::new().with(
        "load",
        also(slow(&events, "g", 1.0), move |a, b| {
            combine_log.borrow_mut().push("combine".into());
            Value::list([a, b])
        }),
    ));

    let outcome = inner.func("load").unwrap().call(&[]).unwrap();
    assert!(outcome.is_pending());
    let value = pollster::block_on(outcome.resolve()).unwrap();
    assert_eq!(value, Value::list([Value::from(1), Value::from(2)]));

    let events = events.borrow();
    let position = |entry: &str| events.iter().position(|e| e == entry).unwrap();
    let last_start = position("g start").max(position("h start"));
    let first_end = position("g end").min(position("h end"));
    assert!(last_start < first_end, "both must start before either ends: {events:?}");
    assert_eq!(events.last().map(String::as_str), Some("combine"));
}

#[test]
fn mixed_ready_and_pending_results_still_combine() {
    let outer = Scope::root(ScopeProps::new().with("f", Func::sync(|_| Value::from("sync"))));
    let inner = outer.child(ScopeProps::new().with(
        "f",
        also(
            Func::future(|_| async { Ok(Value::from("async")) }),
            |a, b| Value::from(format!("{}/{}", a.as_str().unwrap_or(""), b.as_str().unwrap_or(""))),
        ),
    ));
    let outcome = inner.func("f").unwrap().call(&[]).unwrap();
    let Outcome::Pending(future) = outcome else {
        panic!("expected a pending outcome");
    };
    assert_eq!(pollster::block_on(future).unwrap(), Value::from("async/sync"));
}

fn digit(log: &Log, d: u8) -> Func {
    let log = Rc::clone(log);
    Func::sync(move |_| {
        log.borrow_mut().push(d.to_string());
        Value::from(d.to_string())
    })
}

fn concat(a: Value, b: Value) -> Value {
    Value::from(format!("{}{}", a.as_str().unwrap_or(""), b.as_str().unwrap_or("")))
}

proptest! {
    #[test]
    fn nested_merges_run_innermost_first(digits in prop::collection::vec(0u8..10, 1..6)) {
        let calls = log();
        let mut scope = Scope::root(ScopeProps::new().with("f", digit(&calls, digits[0])));
        for d in &digits[1..] {
            scope = scope.child(ScopeProps::new().with("f", also(digit(&calls, *d), concat)));
        }

        let expected: Vec<String> = digits.iter().rev().map(u8::to_string).collect();
        let result = scope.func("f").unwrap().call_ready(&[]).unwrap();
        prop_assert_eq!(result, Value::from(expected.concat()));
        prop_assert_eq!(&*calls.borrow(), &expected);
    }
}
