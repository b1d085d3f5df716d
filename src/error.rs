//! Error taxonomy for pipeline operations.
//!
//! Validation failures (`PreconditionFailed`, `NotPermitted`, `Conflict`) are
//! raised before anything is written, so the caller's last-read application is
//! still the source of truth when one of them comes back.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A referenced pipeline, job, application, stage, interview or offer does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// The requested target stage is not part of the pipeline.
    #[error("invalid transition: stage '{to_stage_key}' is not part of this pipeline")]
    InvalidTransition { to_stage_key: String },

    /// The offer-stage gate is not satisfied.
    #[error("{0}")]
    PreconditionFailed(String),

    /// An interview or offer action is not allowed in the entity's current state.
    #[error("action not permitted: {0}")]
    NotPermitted(String),

    /// The application changed since it was read.
    #[error("application '{application_id}' was modified since version {expected}; reload and retry")]
    Conflict {
        application_id: String,
        expected: u64,
        actual: Option<u64>,
    },

    /// A pipeline definition breaks its own invariants.
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("malformed data: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        PipelineError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Errors the user can act on, as opposed to transport or storage failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidTransition { .. }
                | PipelineError::PreconditionFailed(_)
                | PipelineError::NotPermitted(_)
                | PipelineError::Conflict { .. }
                | PipelineError::InvalidPipeline(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = PipelineError::not_found("pipeline", "job-9");
        assert_eq!(err.to_string(), "pipeline 'job-9' not found");
        assert!(!err.is_validation());
    }

    #[test]
    fn test_precondition_message_is_verbatim() {
        let err = PipelineError::PreconditionFailed("Cannot proceed without an accepted offer".into());
        assert_eq!(err.to_string(), "Cannot proceed without an accepted offer");
        assert!(err.is_validation());
    }
}
