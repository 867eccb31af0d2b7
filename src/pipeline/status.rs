//! Step status model and the legal transition table.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::PipelineError;

/// Status of a single processing slot on a meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal statuses close a log entry (`completed_at` is set).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is in the transition table.
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
                | (Self::Failed, Self::InProgress)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the four per-meeting processing slots.
///
/// Dependency order: transcription → blog → {poster, facebook_post}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Transcription,
    Blog,
    Poster,
    FacebookPost,
}

impl Step {
    pub const ALL: [Step; 4] = [
        Step::Transcription,
        Step::Blog,
        Step::Poster,
        Step::FacebookPost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcription => "transcription",
            Self::Blog => "blog",
            Self::Poster => "poster",
            Self::FacebookPost => "facebook_post",
        }
    }

    /// Parses a canonical step name. Legacy automation names such as
    /// `transcription_complete` are rejected rather than mapped.
    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        match s {
            "transcription" => Ok(Self::Transcription),
            "blog" => Ok(Self::Blog),
            "poster" => Ok(Self::Poster),
            "facebook_post" => Ok(Self::FacebookPost),
            other => Err(PipelineError::UnknownStep(other.to_string())),
        }
    }

    /// Column on the `meetings` table holding this slot's status.
    pub fn status_column(&self) -> &'static str {
        match self {
            Self::Transcription => "transcription_status",
            Self::Blog => "blog_status",
            Self::Poster => "poster_status",
            Self::FacebookPost => "facebook_post_status",
        }
    }

    /// The step that must be `completed` before this one may start.
    pub fn prerequisite(&self) -> Option<Step> {
        match self {
            Self::Transcription => None,
            Self::Blog => Some(Self::Transcription),
            Self::Poster | Self::FacebookPost => Some(Self::Blog),
        }
    }

    /// Steps unlocked when this one completes.
    pub fn successors(&self) -> &'static [Step] {
        match self {
            Self::Transcription => &[Step::Blog],
            Self::Blog => &[Step::Poster, Step::FacebookPost],
            Self::Poster | Self::FacebookPost => &[],
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of all four slot statuses for one meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStatuses {
    pub transcription: StepStatus,
    pub blog: StepStatus,
    pub poster: StepStatus,
    pub facebook_post: StepStatus,
}

impl Default for StepStatuses {
    fn default() -> Self {
        Self {
            transcription: StepStatus::Pending,
            blog: StepStatus::Pending,
            poster: StepStatus::Pending,
            facebook_post: StepStatus::Pending,
        }
    }
}

impl StepStatuses {
    pub fn get(&self, step: Step) -> StepStatus {
        match step {
            Step::Transcription => self.transcription,
            Step::Blog => self.blog,
            Step::Poster => self.poster,
            Step::FacebookPost => self.facebook_post,
        }
    }

    pub fn all_completed(&self) -> bool {
        Step::ALL
            .iter()
            .all(|step| self.get(*step) == StepStatus::Completed)
    }

    /// Checks a requested transition against the table and the prerequisite
    /// ordering. Returns the current status on success.
    pub fn check(&self, step: Step, target: StepStatus) -> Result<StepStatus, PipelineError> {
        let current = self.get(step);
        if !current.can_transition_to(target) {
            return Err(PipelineError::IllegalTransition {
                step,
                from: current,
                to: target,
                reason: "not in transition table".to_string(),
            });
        }

        if matches!(target, StepStatus::InProgress | StepStatus::Completed) {
            if let Some(prereq) = step.prerequisite() {
                let prereq_status = self.get(prereq);
                if prereq_status != StepStatus::Completed {
                    return Err(PipelineError::IllegalTransition {
                        step,
                        from: current,
                        to: target,
                        reason: format!("prerequisite {} is {}", prereq, prereq_status),
                    });
                }
            }
        }

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_status_as_str() {
        assert_eq!(StepStatus::Pending.as_str(), "pending");
        assert_eq!(StepStatus::InProgress.as_str(), "in_progress");
        assert_eq!(StepStatus::Completed.as_str(), "completed");
        assert_eq!(StepStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_step_status_serialization() {
        let json = serde_json::to_string(&StepStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");

        let parsed: StepStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, StepStatus::Failed);
    }

    #[test]
    fn test_transition_table() {
        use StepStatus::*;
        let all = [Pending, InProgress, Completed, Failed];
        let legal = [
            (Pending, InProgress),
            (InProgress, Completed),
            (InProgress, Failed),
            (Failed, InProgress),
        ];

        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_step_parse_rejects_legacy_names() {
        assert_eq!(Step::parse("facebook_post").unwrap(), Step::FacebookPost);
        for name in ["transcription_complete", "blog_generation_complete", "processing_error", ""] {
            assert!(matches!(Step::parse(name), Err(PipelineError::UnknownStep(_))));
        }
    }

    #[test]
    fn test_prerequisites_and_successors() {
        assert_eq!(Step::Transcription.prerequisite(), None);
        assert_eq!(Step::Blog.prerequisite(), Some(Step::Transcription));
        assert_eq!(Step::Poster.prerequisite(), Some(Step::Blog));
        assert_eq!(Step::FacebookPost.prerequisite(), Some(Step::Blog));
        assert_eq!(Step::Blog.successors(), &[Step::Poster, Step::FacebookPost]);
        assert!(Step::Poster.successors().is_empty());
    }

    #[test]
    fn test_check_enforces_prerequisite() {
        let mut statuses = StepStatuses::default();
        statuses.blog = StepStatus::InProgress;

        let err = statuses.check(Step::Blog, StepStatus::Completed).unwrap_err();
        assert!(matches!(err, PipelineError::IllegalTransition { .. }));

        statuses.transcription = StepStatus::Completed;
        assert_eq!(
            statuses.check(Step::Blog, StepStatus::Completed).unwrap(),
            StepStatus::InProgress
        );
    }

    #[test]
    fn test_check_allows_failure_without_prerequisite() {
        let mut statuses = StepStatuses::default();
        statuses.transcription = StepStatus::InProgress;
        assert!(statuses.check(Step::Transcription, StepStatus::Failed).is_ok());
    }
}
