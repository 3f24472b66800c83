//! Error types for the foldscope display system.

use thiserror::Error;

/// Scope stack errors. Always indicate a bug in the caller's scoping discipline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("Scope for '{context}' released out of order: override #{token} is not the innermost")]
    OutOfOrder { context: String, token: u64 },

    #[error("Scope for '{context}' is not active: override #{token} was already removed")]
    NotActive { context: String, token: u64 },
}

/// Rendering errors for a single value or subtree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("Failed to render {path}: {message}")]
    SubtreeFailed { path: String, message: String },

    #[error("Renderer panicked at {path}: {message}")]
    Panicked { path: String, message: String },

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl RenderError {
    pub fn subtree(path: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::SubtreeFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Short message used inside inline error markers.
    pub fn marker_message(&self) -> &str {
        match self {
            RenderError::SubtreeFailed { message, .. } => message,
            RenderError::Panicked { message, .. } => message,
            RenderError::Serialization(message) => message,
        }
    }
}

/// Top-level API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Cannot use `{0}` outside of a notebook host")]
    HostUnavailable(&'static str),

    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    #[error("Invariant violation: {0}")]
    Scope(#[from] ScopeError),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Raised by user-supplied expressions; the message is the host's, unchanged.
    #[error("{0}")]
    UserExpression(String),

    #[error("Host error: {0}")]
    Host(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ApiError {
    /// Whether this error signals a core bug rather than a user or environment problem.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, ApiError::Scope(_) | ApiError::InvariantViolation(_))
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

/// Render a caught panic payload as a message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
