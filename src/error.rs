//! Error taxonomy for the study core
//!
//! Synchronous operations return `StudyError`; the background pipeline never
//! surfaces errors to a caller and only logs them.

use thiserror::Error;

use crate::ai::upstream::UpstreamError;

/// Result alias used by the service layer
pub type StudyResult<T> = std::result::Result<T, StudyError>;

#[derive(Debug, Error)]
pub enum StudyError {
    /// Input rejected before any state was touched
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced entry, user or word does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The operation would create a duplicate
    #[error("conflict: {0}")]
    Conflict(String),

    /// The generative-AI service failed before a response was produced
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The durable store failed
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl StudyError {
    pub fn validation(msg: impl Into<String>) -> Self {
        StudyError::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        StudyError::NotFound { kind, id: id.into() }
    }

    /// HTTP-equivalent status code for the error class
    pub fn status_code(&self) -> u16 {
        match self {
            StudyError::Validation(_) => 400,
            StudyError::NotFound { .. } => 404,
            StudyError::Conflict(_) => 409,
            StudyError::Upstream(e) => e.category().status_code(),
            StudyError::Storage(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::upstream::UpstreamError;

    #[test]
    fn test_status_codes() {
        assert_eq!(StudyError::validation("amount must be positive").status_code(), 400);
        assert_eq!(StudyError::not_found("user", "u1").status_code(), 404);
        assert_eq!(StudyError::Conflict("dup".into()).status_code(), 409);
        assert_eq!(StudyError::Storage(anyhow::anyhow!("disk")).status_code(), 500);
        assert_eq!(StudyError::from(UpstreamError::http(429, "slow down")).status_code(), 429);
    }

    #[test]
    fn test_not_found_message() {
        let err = StudyError::not_found("personal vocabulary", "abc");
        assert_eq!(err.to_string(), "personal vocabulary not found: abc");
    }
}
