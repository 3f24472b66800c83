//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::UserExpression(message) => message.clone(),
        ApiError::Scope(_) | ApiError::InvariantViolation(_) => {
            format!("internal error: {}", e)
        }
        other => other.to_string(),
    }
}
