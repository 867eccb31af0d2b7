//! Meeting processing state machine.
//!
//! Each meeting carries four step slots (transcription, blog, poster,
//! facebook_post). Events move slots through the transition table in
//! [`status`]; the [`ProcessingCoordinator`] applies them atomically and
//! returns the follow-up requests that should be dispatched next.

pub mod actions;
pub mod coordinator;
pub mod error;
pub mod status;

pub use actions::{ActionContext, ActionKind, FollowUpAction};
pub use coordinator::{
    Applied, CanonicalEvent, MeetingDetail, ProcessingCoordinator, StaleStep, FACEBOOK,
};
pub use error::PipelineError;
pub use status::{Step, StepStatus, StepStatuses};
