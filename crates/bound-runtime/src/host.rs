#![forbid(unsafe_code)]

//! A retained host for element trees.
//!
//! [`Host`] stands in for a rendering framework's reconciler. Each
//! [`Host::render`] evaluates the binding variants of the tree (scope
//! layers, components, adapters) into plain nodes, text, and fragments.
//! Adapter state is retained by tree position between renders, so an
//! adapter's subscription and echo survive re-rendering and are dropped
//! once its position disappears from the output.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Adapter with zero or several children | renders `<div>{field} Must be bound to a single component</div>` (logged) |

use ahash::{AHashMap, AHashSet};

use crate::adapter::BindAdapter;
use crate::element::{BindElement, Element, Node, ScopeChildren};
use crate::scope::Scope;

type Position = Vec<usize>;

/// Mounts an element tree and re-renders it on demand.
pub struct Host {
    scope: Scope,
    root: Element,
    adapters: AHashMap<Position, BindAdapter>,
    renders: u64,
}

impl Host {
    /// A host rendering `root` in `scope`. Nothing mounts until the first
    /// [`render`](Self::render).
    #[must_use]
    pub fn new(scope: Scope, root: Element) -> Self {
        Self {
            scope,
            root,
            adapters: AHashMap::new(),
            renders: 0,
        }
    }

    /// Render the tree, mounting new adapters and dropping vanished ones.
    pub fn render(&mut self) -> Element {
        self.renders += 1;
        let _span = tracing::debug_span!("host_render", pass = self.renders).entered();
        let root = self.root.clone();
        let scope = self.scope.clone();
        let mut position = Vec::new();
        let mut seen = AHashSet::new();
        let output = self.walk(&root, &scope, &mut position, &mut seen);
        let before = self.adapters.len();
        self.adapters.retain(|pos, _| seen.contains(pos));
        if self.adapters.len() != before {
            tracing::debug!(dropped = before - self.adapters.len(), "adapters unmounted");
        }
        output
    }

    fn walk(
        &mut self,
        element: &Element,
        scope: &Scope,
        position: &mut Position,
        seen: &mut AHashSet<Position>,
    ) -> Element {
        match element {
            Element::Empty | Element::Text(_) => element.clone(),
            Element::Node(node) => Element::Node(self.walk_node(node, scope, position, seen)),
            Element::Fragment(children) => {
                Element::Fragment(self.walk_children(children, scope, position, seen))
            }
            Element::Component(component) => {
                let rendered = component.render(scope);
                self.nested(&rendered, scope, position, seen, 0)
            }
            Element::Bound(bound) => {
                let child_scope = scope.child(bound.props.clone());
                match &bound.children {
                    ScopeChildren::Tree(children) => {
                        Element::Fragment(self.walk_children(children, &child_scope, position, seen))
                    }
                    ScopeChildren::Render(render) => {
                        let rendered = render(&child_scope);
                        self.nested(&rendered, &child_scope, position, seen, 0)
                    }
                }
            }
            Element::Bind(bind) => self.walk_bind(bind, scope, position, seen),
        }
    }

    fn nested(
        &mut self,
        element: &Element,
        scope: &Scope,
        position: &mut Position,
        seen: &mut AHashSet<Position>,
        index: usize,
    ) -> Element {
        position.push(index);
        let out = self.walk(element, scope, position, seen);
        position.pop();
        out
    }

    fn walk_children(
        &mut self,
        children: &[Element],
        scope: &Scope,
        position: &mut Position,
        seen: &mut AHashSet<Position>,
    ) -> Vec<Element> {
        children
            .iter()
            .enumerate()
            .map(|(i, child)| self.nested(child, scope, position, seen, i))
            .collect()
    }

    fn walk_node(
        &mut self,
        node: &Node,
        scope: &Scope,
        position: &mut Position,
        seen: &mut AHashSet<Position>,
    ) -> Node {
        Node {
            ty: node.ty.clone(),
            props: node.props.clone(),
            children: self.walk_children(&node.children, scope, position, seen),
        }
    }

    fn walk_bind(
        &mut self,
        bind: &BindElement,
        scope: &Scope,
        position: &mut Position,
        seen: &mut AHashSet<Position>,
    ) -> Element {
        let node = match bind.node() {
            Ok(node) => node,
            Err(err) => {
                tracing::warn!(%err, "binding adapter misconfigured");
                return Node::new("div")
                    .child(Element::text(format!(
                        "{} Must be bound to a single component",
                        bind.options.field
                    )))
                    .into();
            }
        };
        seen.insert(position.clone());
        let rendered = match self.adapters.get_mut(position.as_slice()) {
            Some(adapter) => {
                adapter.update(scope, bind.options.clone());
                adapter.render(node)
            }
            None => {
                let mut adapter = BindAdapter::mount(scope, bind.options.clone());
                let rendered = adapter.render(node);
                self.adapters.insert(position.clone(), adapter);
                rendered
            }
        };
        let children = self.walk_children(&rendered.children, scope, position, seen);
        Element::Node(Node {
            children,
            ..rendered
        })
    }

    /// Whether any mounted adapter saw a relevant write or local edit since
    /// it last rendered.
    #[must_use]
    pub fn needs_render(&self) -> bool {
        self.adapters.values().any(BindAdapter::is_dirty)
    }

    /// Render only if something changed.
    pub fn render_if_needed(&mut self) -> Option<Element> {
        self.needs_render().then(|| self.render())
    }

    /// Replace the tree; takes effect at the next render.
    pub fn set_root(&mut self, root: Element) {
        self.root = root;
    }

    /// Drop every adapter.
    pub fn unmount(&mut self) {
        self.adapters.clear();
    }

    #[must_use]
    pub fn mounted_bindings(&self) -> usize {
        self.adapters.len()
    }

    /// Fields of the mounted adapters, sorted.
    #[must_use]
    pub fn bound_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .adapters
            .values()
            .map(|a| a.options().field.clone())
            .collect();
        fields.sort();
        fields
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Number of completed renders.
    #[must_use]
    pub fn renders(&self) -> u64 {
        self.renders
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("scope", &self.scope)
            .field("adapters", &self.adapters.len())
            .field("renders", &self.renders)
            .finish()
    }
}
