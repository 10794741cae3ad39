#![forbid(unsafe_code)]

//! Declarative two-way data binding for element trees.
//!
//! `bound` re-exports the data layer ([`bound_core`]) and the binding
//! runtime ([`bound_runtime`]). Most applications only need the
//! [`prelude`]:
//!
//! ```
//! use bound::prelude::*;
//!
//! let state = ObjectRef::new();
//! let scope = Scope::root(ScopeProps::new().target(state.clone()));
//! let form = with_data_binding(
//!     Node::new("form")
//!         .child(Node::new("input").prop("field", "user.name"))
//!         .into(),
//! );
//!
//! let mut host = Host::new(scope, form);
//! let out = host.render();
//! let input = out.find(&|n: &Node| &*n.ty == "input").unwrap();
//! input.func("onChange").unwrap().call(&[Value::from("Ada")]).unwrap();
//!
//! assert_eq!(
//!     state.get("user").as_object().unwrap().get("name"),
//!     Value::from("Ada")
//! );
//! ```

pub use bound_core::{ObjectRef, ReactiveStore, Slot, Value, resolve, title_case_label};
pub use bound_runtime::{
    BindAdapter, BindError, BindOptions, BindingConfig, BindingRuntime, BoundComponent,
    BoundValue, Element, Extracted, Extractor, Func, Host, Node, Outcome, Prop, PropertyMeta,
    PropertyPipeline, Props, Result, Scope, ScopeProps, ScopeValue, Setter, Update, Write, also,
    also_first, also_try, bind, use_changes, with_data_binding, with_data_binding_fn,
};

#[cfg(feature = "persistence")]
pub use bound_runtime::{JsonFileStore, persist_on_change};
#[cfg(feature = "validation")]
pub use bound_runtime::{RuleSet, ValidationTracker, validation_scope};

/// The types and functions an application binding a form needs.
pub mod prelude {
    pub use crate::{
        BindOptions, BindingConfig, BoundValue, Element, Func, Host, Node, ObjectRef, Outcome,
        Scope, ScopeProps, Value, also, also_first, bind, use_changes, with_data_binding,
    };

    #[cfg(feature = "persistence")]
    pub use crate::{JsonFileStore, persist_on_change};
    #[cfg(feature = "validation")]
    pub use crate::{ValidationTracker, validation_scope};
}
