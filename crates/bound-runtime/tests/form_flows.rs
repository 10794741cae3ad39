//! End-to-end flows: a rewritten tree rendered by a host over shared state.

#![cfg(all(feature = "persistence", feature = "validation"))]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bound_core::{ObjectRef, Value};
use bound_runtime::{
    BoundValue, Element, Func, Host, JsonFileStore, Node, RuleSet, Scope, ScopeProps,
    ValidationTracker, Write, persist_on_change, use_changes, validation_scope, with_data_binding,
};

fn counting_hook() -> (Func, Rc<Cell<usize>>) {
    let count = Rc::new(Cell::new(0));
    let c = Rc::clone(&count);
    (Func::action(move |_| c.set(c.get() + 1)), count)
}

fn input(field: &str) -> Node {
    Node::new("input").prop("field", field)
}

fn find_input<'a>(tree: &'a Element, label: &str) -> &'a Node {
    tree.find(&|n: &Node| &*n.ty == "input" && n.value("label") == Value::from(label))
        .unwrap_or_else(|| panic!("no input labelled {label}"))
}

#[test]
fn rewritten_form_binds_nested_fields_to_shared_state() {
    let state = ObjectRef::new();
    let (hook, writes) = counting_hook();
    let scope = Scope::root(ScopeProps::new().target(state.clone()).on_change(hook));
    let tree = with_data_binding(
        Node::new("form")
            .child(input("firstName"))
            .child(Node::new("fieldset").child(input("address.city").prop("defaultValue", "Oslo")))
            .child(Node::new("p").child("static"))
            .into(),
    );
    let mut host = Host::new(scope, tree);
    let out = host.render();

    assert_eq!(host.bound_fields(), vec!["address.city", "firstName"]);
    let city = find_input(&out, "Address.city");
    assert_eq!(city.value("value"), Value::from("Oslo"));
    assert_eq!(
        state.get("address").as_object().unwrap().get("city"),
        Value::from("Oslo")
    );
    assert_eq!(writes.get(), 0);

    let first = find_input(&out, "First Name");
    first.func("onChange").unwrap().call(&[Value::from("Ada")]).unwrap();
    assert_eq!(state.get("firstName"), Value::from("Ada"));
    assert_eq!(writes.get(), 1);

    let out = host.render_if_needed().unwrap();
    assert_eq!(find_input(&out, "First Name").value("value"), Value::from("Ada"));
    assert!(out.text_content().contains("static"));
}

#[test]
fn blur_mode_writes_once_with_the_last_edit() {
    let state = ObjectRef::new();
    let (hook, writes) = counting_hook();
    let scope = Scope::root(ScopeProps::new().target(state.clone()).on_change(hook));
    let notified = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&notified);
    let _watch = use_changes(&scope, move |_, value| seen.borrow_mut().push(value.clone())).unwrap();

    let tree = with_data_binding(input("title").prop("blur", true).into());
    let mut host = Host::new(scope, tree);
    let out = host.render();
    let node = out.as_node().unwrap();
    let on_change = node.func("onChange").unwrap().clone();
    let on_blur = node.func("onBlur").unwrap().clone();

    for edit in ["a", "ab", "abc"] {
        on_change.call(&[Value::from(edit)]).unwrap();
    }
    assert_eq!(writes.get(), 0);
    assert!(notified.borrow().is_empty());
    assert_eq!(state.get("title"), Value::from(""));
    assert!(host.needs_render());
    let shown = host.render();
    assert_eq!(shown.as_node().unwrap().value("value"), Value::from("abc"));

    on_blur.call(&[]).unwrap();
    assert_eq!(writes.get(), 1);
    assert_eq!(*notified.borrow(), vec![Value::from("abc")]);
    assert_eq!(state.get("title"), Value::from("abc"));

    // A second blur without edits is a no-op.
    on_blur.call(&[]).unwrap();
    assert_eq!(writes.get(), 1);
}

#[test]
fn equal_writes_notify_nobody() {
    let state = ObjectRef::from_pairs([("n", 5)]);
    let (hook, writes) = counting_hook();
    let scope = Scope::root(ScopeProps::new().target(state).on_change(hook));
    let heard = Rc::new(Cell::new(0));
    let h = Rc::clone(&heard);
    let _watch = use_changes(&scope, move |_, _| h.set(h.get() + 1)).unwrap();

    let mut binding = BoundValue::new(&scope, "n", Value::Missing, None);
    binding.mount();
    assert!(matches!(binding.set(5), Ok(Write::Unchanged)));
    assert_eq!((writes.get(), heard.get()), (0, 0));
    assert!(!binding.is_dirty());

    assert!(binding.set(6).unwrap().is_committed());
    assert_eq!((writes.get(), heard.get()), (1, 1));
}

#[test]
fn defaults_materialize_for_later_bindings() {
    let state = ObjectRef::new();
    let scope = Scope::root(ScopeProps::new().target(state));
    let mut first = BoundValue::new(&scope, "settings.theme", Value::from("dark"), None);
    first.mount();
    let fresh = BoundValue::new(&scope, "settings.theme", Value::Missing, None);
    assert_eq!(fresh.get(), Value::from("dark"));
}

#[test]
fn committed_writes_persist_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = JsonFileStore::new(&path);
    let root = store.load().unwrap();
    let scope = Scope::root(
        ScopeProps::new()
            .target(root.clone())
            .on_change(persist_on_change(store.clone(), root)),
    );
    let mut host = Host::new(scope, with_data_binding(input("profile.name").into()));
    let out = host.render();
    out.as_node()
        .unwrap()
        .func("onChange")
        .unwrap()
        .call(&[Value::from("Grace")])
        .unwrap();

    let reloaded = JsonFileStore::new(&path).load().unwrap();
    assert_eq!(
        reloaded.get("profile").as_object().unwrap().get("name"),
        Value::from("Grace")
    );
}

#[test]
fn validation_tracks_form_validity() {
    let state = ObjectRef::new();
    let tracker = ValidationTracker::new();
    let flips = Rc::new(RefCell::new(Vec::new()));
    let f = Rc::clone(&flips);
    let _sub = tracker.on_validity(move |invalid| f.borrow_mut().push(invalid));

    let tree = with_data_binding(validation_scope(
        &tracker,
        [Element::from(input("email").prop("validate", "string.required.min(3)"))],
    ));
    let mut host = Host::new(Scope::root(ScopeProps::new().target(state)), tree);
    let out = host.render();
    let email = find_input(&out, "Email");
    assert_eq!(email.value("error"), Value::from(true));
    assert!(email.value("helperText").as_str().is_some_and(|m| !m.is_empty()));
    assert!(!email.props.contains_key("validate"));
    assert!(tracker.has_errors());

    email.func("onChange").unwrap().call(&[Value::from("a@b.c")]).unwrap();
    let out = host.render();
    let email = find_input(&out, "Email");
    assert_eq!(email.value("error"), Value::from(false));
    assert!(!tracker.has_errors());
    assert_eq!(*flips.borrow(), vec![true, false]);

    assert!(RuleSet::parse("string.required.min(3)")
        .unwrap()
        .check(&Value::from("a@b.c"))
        .is_ok());
}

#[test]
fn unmounting_releases_validation_failures() {
    let tracker = ValidationTracker::new();
    let tree = with_data_binding(validation_scope(
        &tracker,
        [Element::from(input("code").prop("validate", "required"))],
    ));
    let mut host = Host::new(Scope::root(ScopeProps::new().target(ObjectRef::new())), tree);
    host.render();
    assert!(tracker.has_errors());
    host.unmount();
    assert!(!tracker.has_errors());
}
