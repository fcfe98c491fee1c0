use std::fmt;

/// Boxed error returned by command handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The operation a [`ReadOnlyView`](crate::access::ReadOnlyView) refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Assigning a field.
    Write,
    /// Removing a field.
    Delete,
    /// Invoking a method whose name does not start with `get`.
    Call,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Write => f.write_str("write"),
            Access::Delete => f.write_str("delete"),
            Access::Call => f.write_str("call"),
        }
    }
}

/// Errors raised while reading, writing or invoking a [`Model`](crate::Model).
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A view tried to mutate a model or call a non-getter method.
    ///
    /// This is a programmer error. It is never caught by the framework.
    #[error("can't {access} `{member}` of {model} from a view")]
    AccessViolation {
        model: &'static str,
        member: String,
        access: Access,
    },

    /// The model has no field with this name.
    #[error("{model} has no field `{field}`")]
    UnknownField { model: &'static str, field: String },

    /// The model exposes no method with this name.
    #[error("{model} has no method `{method}`")]
    UnknownMethod { model: &'static str, method: String },

    /// A value could not be converted into (or out of) the model's fields.
    #[error("invalid value for {model}: {source}")]
    InvalidValue {
        model: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The model does not serialize to a map of named fields.
    #[error("{model} does not serialize to an object")]
    NotAnObject { model: &'static str },
}

impl ModelError {
    /// Returns `true` for [`ModelError::AccessViolation`].
    pub fn is_access_violation(&self) -> bool {
        matches!(self, ModelError::AccessViolation { .. })
    }
}

/// Failure of a command dispatch.
///
/// Dispatch resolves with the first handler failure it observes. Handlers
/// still running at that point are not cancelled.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A handler returned an error.
    #[error("handler for {command} failed: {source}")]
    Handler {
        command: String,
        #[source]
        source: BoxError,
    },

    /// A handler task panicked or was aborted.
    #[error("handler for {command} did not complete: {source}")]
    Join {
        command: String,
        #[source]
        source: tokio::task::JoinError,
    },
}
