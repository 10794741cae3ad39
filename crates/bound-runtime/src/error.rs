use bound_core::Value;
use thiserror::Error;

/// Errors raised by the binding runtime.
#[derive(Debug, Clone, Error)]
pub enum BindError {
    /// A non-callable value was passed where a function was required.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A binding adapter was given zero or several children.
    #[error("{field} must be bound to a single component (got {count} children)")]
    BindingArity { field: String, count: usize },

    /// Merge cancellation. Raised by a merged scope function to skip the
    /// inherited function and the combiner; the payload becomes the result.
    #[error("merge cancelled")]
    Cancel(Value),

    /// An ordinary failure raised by a user-supplied function.
    #[error("{0}")]
    Failed(String),

    #[error("invalid validation rule `{rule}`: {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("persistence error: {0}")]
    Persist(String),

    #[error("config error: {0}")]
    Config(String),
}

impl BindError {
    /// Cancellation carrying no value.
    #[must_use]
    pub fn cancel() -> Self {
        Self::Cancel(Value::Missing)
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    #[must_use]
    pub fn is_cancel(&self) -> bool {
        matches!(self, Self::Cancel(_))
    }
}

/// Result alias for runtime operations.
pub type Result<T> = std::result::Result<T, BindError>;
