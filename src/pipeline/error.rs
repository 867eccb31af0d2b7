//! Error taxonomy for the processing pipeline.

use thiserror::Error;
use uuid::Uuid;

use super::status::{Step, StepStatus};
use crate::db::StoreError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("meeting {0} not found")]
    NotFound(Uuid),

    #[error("unknown step: {0:?}")]
    UnknownStep(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("illegal transition for {step}: {from} -> {to} ({reason})")]
    IllegalTransition {
        step: Step,
        from: StepStatus,
        to: StepStatus,
        reason: String,
    },

    #[error("record store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl PipelineError {
    /// Whether the caller may redeliver the same event later and expect a
    /// different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::IllegalTransition { .. } | Self::StoreUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(!PipelineError::NotFound(Uuid::nil()).is_retryable());
        assert!(!PipelineError::UnknownStep("x".into()).is_retryable());
        assert!(PipelineError::IllegalTransition {
            step: Step::Blog,
            from: StepStatus::Pending,
            to: StepStatus::Completed,
            reason: "test".into(),
        }
        .is_retryable());
        assert!(PipelineError::StoreUnavailable(StoreError::Poisoned).is_retryable());
    }

    #[test]
    fn test_display_mentions_transition() {
        let err = PipelineError::IllegalTransition {
            step: Step::FacebookPost,
            from: StepStatus::Pending,
            to: StepStatus::Completed,
            reason: "not in transition table".into(),
        };
        assert_eq!(
            err.to_string(),
            "illegal transition for facebook_post: pending -> completed (not in transition table)"
        );
    }
}
