#![forbid(unsafe_code)]

//! Scopes, bindings, and the tree binding pass.
//!
//! A UI tree declares which parts of a shared object graph its inputs edit.
//! This crate turns those declarations into live two-way bindings:
//!
//! - [`Scope`] is the inherited context (`target`, `onChange`, arbitrary
//!   props) that nested [`Element::Bound`] layers extend. Mergeable
//!   [`Func`]s compose with the inherited value instead of shadowing it.
//! - [`BoundValue`] reads a path through the scope's target and subscribes
//!   to writes on exactly that slot; its [`Setter`] commits through the
//!   shared [`ReactiveStore`](bound_core::ReactiveStore) and then calls the
//!   inherited `onChange` hook.
//! - [`BindAdapter`] wraps one element, injecting its value and change
//!   handler and running the [`PropertyPipeline`] over its props.
//! - [`with_data_binding`] wraps every node carrying a `field` prop in such
//!   an adapter; [`Host`] renders the result and retains adapter state
//!   between renders.
//!
//! # Features
//!
//! | Feature | Adds |
//! |---------|------|
//! | `persistence` | `JsonFileStore`, `persist_on_change` |
//! | `validation` | `RuleSet`, `ValidationTracker`, the validation subscriber |
//! | `config` | loading [`BindingConfig`] from TOML or JSON |

pub mod adapter;
pub mod config;
pub mod element;
pub mod error;
pub mod extract;
pub mod func;
pub mod host;
#[cfg(feature = "persistence")]
pub mod persist;
pub mod properties;
pub mod scope;
pub mod tree;
#[cfg(feature = "validation")]
pub mod validate;
pub mod value_binding;

pub use adapter::{BINDING_PROPS, BindAdapter, BindOptions, BoundComponent, bind};
pub use config::BindingConfig;
pub use element::{
    BindElement, BoundElement, Component, Element, Node, Prop, Props, RenderFn, ScopeChildren,
};
pub use error::{BindError, Result};
pub use extract::{Extracted, Extractor, default_extractor, is_event};
pub use func::{Combiner, Func, Outcome, also, also_first, also_try, also_value};
pub use host::Host;
#[cfg(feature = "persistence")]
pub use persist::{JsonFileStore, persist_on_change};
pub use properties::{PropertyMeta, PropertyPipeline, label_subscriber};
pub use scope::{BindingRuntime, Scope, ScopeProps, ScopeValue};
pub use tree::{with_data_binding, with_data_binding_fn};
#[cfg(feature = "validation")]
pub use validate::{
    RuleSet, RuleViolation, ValidationTracker, validation_scope, validation_subscriber,
};
pub use value_binding::{
    BindingState, BoundValue, ChangeWatch, Setter, Update, Write, use_changes,
};
