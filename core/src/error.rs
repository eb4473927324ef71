use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SqlError {
    /// The builder has no method with the requested name
    #[error("unknown query builder method \"{0}\"")]
    UnknownMethod(String),

    /// A builder method was called with arguments it cannot use
    #[error("invalid arguments for \"{method}\": {message}")]
    InvalidArguments {
        method: &'static str,
        message: String,
    },

    /// Raw SQL with a different number of `?`/`??` markers than bindings
    #[error("expected {expected} bindings for raw query, got {actual}")]
    BindingCount { expected: usize, actual: usize },

    /// A clause that only makes sense for one statement kind was used with another
    #[error("statement error: {0}")]
    Statement(String),
}

impl SqlError {
    pub(crate) fn args(method: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            method,
            message: message.into(),
        }
    }
}

/// Result type for SQL building
pub type Result<T> = std::result::Result<T, SqlError>;
