#![forbid(unsafe_code)]

//! Per-field property derivation.
//!
//! Every binding adapter raises the runtime's [`PropertyPipeline`] with the
//! props it is about to hand to its node. Subscribers mutate the props in
//! registration order: the built-ins default a label from the field name and
//! apply validation rules, and applications add their own.

use std::fmt;

use bound_core::{Event, EventSubscription, ObjectRef, Value, title_case_label};

use crate::config::BindingConfig;
use crate::element::{Prop, Props};
use crate::func::Func;
use crate::scope::Scope;

/// What a property subscriber knows about the binding being rendered.
#[derive(Clone)]
pub struct PropertyMeta {
    /// Bound path.
    pub field: String,
    /// Current value in stored representation.
    pub value: Value,
    /// Root object the path was resolved against.
    pub target: ObjectRef,
    /// Scope the adapter renders in.
    pub scope: Scope,
    pub value_prop: String,
    pub change_prop: String,
    /// Requests a re-render of the adapter.
    pub refresh: Func,
    /// Identifies the adapter instance across renders.
    pub instance: u64,
}

impl fmt::Debug for PropertyMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMeta")
            .field("field", &self.field)
            .field("value", &self.value)
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

/// The multi-subscriber props hook.
#[derive(Clone, Debug, Default)]
pub struct PropertyPipeline {
    event: Event<Props, PropertyMeta>,
}

impl PropertyPipeline {
    /// A pipeline with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A pipeline with the built-in subscribers `config` enables.
    #[must_use]
    pub fn with_defaults(config: &BindingConfig) -> Self {
        let pipeline = Self::new();
        if config.derive_labels {
            if let Some(label_prop) = config.label_prop() {
                pipeline.on(label_subscriber(label_prop));
            }
        }
        #[cfg(feature = "validation")]
        if config.validate {
            pipeline.on(crate::validate::validation_subscriber(
                &config.rules_prop,
                &config.helper_text_prop,
            ));
        }
        pipeline
    }

    /// Add a subscriber; dropping the guard removes it.
    #[must_use = "dropping the subscription removes the handler"]
    pub fn subscribe(
        &self,
        handler: impl Fn(&mut Props, &PropertyMeta) + 'static,
    ) -> EventSubscription {
        self.event.subscribe(handler)
    }

    /// Add a subscriber for the lifetime of the pipeline.
    pub fn on(&self, handler: impl Fn(&mut Props, &PropertyMeta) + 'static) {
        self.event.on(handler);
    }

    /// Run every subscriber over `props`.
    #[must_use]
    pub fn raise(&self, props: Props, meta: &PropertyMeta) -> Props {
        self.event.raise(props, meta)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.event.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.event.is_empty()
    }
}

/// Subscriber that fills an unset `label_prop` from the field name.
pub fn label_subscriber(label_prop: &str) -> impl Fn(&mut Props, &PropertyMeta) + 'static {
    let label_prop = label_prop.to_owned();
    move |props, meta| {
        let unset = match props.get(&label_prop) {
            None => true,
            Some(Prop::Value(v)) => v.is_unset(),
            Some(Prop::Func(_)) => false,
        };
        if unset {
            props.insert(
                label_prop.clone(),
                Prop::from(title_case_label(&meta.field)),
            );
        }
    }
}
