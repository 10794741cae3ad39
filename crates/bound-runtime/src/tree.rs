#![forbid(unsafe_code)]

//! The tree binding pass.
//!
//! [`with_data_binding`] rewrites an element tree so that every node carrying
//! a non-empty `field` prop is wrapped in a binding adapter. Children are
//! rewritten before their parent is wrapped, so nested fields bind to their
//! own paths independently of any ancestor.
//!
//! The pass is pure and idempotent: binding props are stripped from the
//! nodes it wraps, so a second pass finds nothing new. Components are wrapped
//! so their output is rewritten when they render.

use std::rc::Rc;

use crate::adapter::BindOptions;
use crate::element::{BindElement, BoundElement, Element, Node, ScopeChildren};
use crate::scope::Scope;

/// Rewrite `element`, wrapping every `field`-annotated node.
#[must_use]
pub fn with_data_binding(element: Element) -> Element {
    let _span = tracing::debug_span!("with_data_binding").entered();
    rewrite(element)
}

/// Wrap a render function so every output is rewritten.
pub fn with_data_binding_fn(
    render: impl Fn(&Scope) -> Element + 'static,
) -> impl Fn(&Scope) -> Element + 'static {
    move |scope: &Scope| with_data_binding(render(scope))
}

fn rewrite(element: Element) -> Element {
    match element {
        Element::Node(node) => rewrite_node(node),
        Element::Fragment(children) => Element::Fragment(rewrite_all(children)),
        Element::Component(component) => Element::Component(component.with_data_binding()),
        Element::Bound(BoundElement { props, children }) => {
            let children = match children {
                ScopeChildren::Tree(children) => ScopeChildren::Tree(rewrite_all(children)),
                ScopeChildren::Render(render) => ScopeChildren::Render(Rc::new(
                    move |scope: &Scope| with_data_binding(render(scope)),
                )),
            };
            Element::Bound(BoundElement { props, children })
        }
        Element::Bind(BindElement { options, children }) => Element::Bind(BindElement {
            options,
            children: children.into_iter().map(rewrite_bound_child).collect(),
        }),
        Element::Empty | Element::Text(_) => element,
    }
}

fn rewrite_all(children: Vec<Element>) -> Vec<Element> {
    children.into_iter().map(rewrite).collect()
}

fn rewrite_node(node: Node) -> Element {
    let Node {
        ty,
        mut props,
        children,
    } = node;
    let children = rewrite_all(children);
    let options = BindOptions::from_props(&mut props);
    let node = Node {
        ty,
        props,
        children,
    };
    match options {
        Some(options) => {
            tracing::trace!(field = %options.field, ty = %node.ty, "wrapping bound node");
            Element::Bind(BindElement {
                options,
                children: vec![Element::Node(node)],
            })
        }
        None => Element::Node(node),
    }
}

/// The node under an existing adapter keeps its props; only its subtree is
/// rewritten.
fn rewrite_bound_child(child: Element) -> Element {
    match child {
        Element::Node(Node {
            ty,
            props,
            children,
        }) => Element::Node(Node {
            ty,
            props,
            children: rewrite_all(children),
        }),
        other => rewrite(other),
    }
}
