#![forbid(unsafe_code)]

//! Core data layer for bound.
//!
//! This crate provides:
//! - [`Value`] and [`ObjectRef`], the shared, identity-bearing object graph
//!   that bindings read from and write into.
//! - [`PathResolver`] for turning a dot-separated path into a
//!   `(container, key)` [`Slot`].
//! - [`ReactiveStore`], the per-slot subscriber registry that commits writes
//!   and notifies observers.
//! - [`Event`], a synchronous multi-subscriber hook used by the property
//!   pipeline.
//! - [`title_case_label`] for deriving display labels from field names.
//!
//! Everything here is single-threaded (`Rc`/`RefCell`); the binding layer runs
//! on the UI dispatch thread.

pub mod event;
pub mod label;
pub mod path;
pub mod store;
pub mod value;

pub use event::{Event, EventSubscription};
pub use label::title_case_label;
pub use path::{PathResolver, Slot, resolve};
pub use store::{ChangeHandler, Commit, ReactiveStore, Subscription};
pub use value::{ObjectRef, Value};
