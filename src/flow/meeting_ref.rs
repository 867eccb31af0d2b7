use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::db::{MeetingRecord, MeetingRepository, NewMeeting};
use crate::pipeline::{
    CanonicalEvent, FollowUpAction, PipelineError, ProcessingCoordinator, Step, StepStatus,
};
use crate::transcripts::MeetingTranscript;

#[derive(Debug, Clone, Serialize)]
pub struct MeetingRefStarted {
    pub meeting: MeetingRecord,
    /// `false` when the upstream meeting had already been imported.
    pub created: bool,
    pub actions: Vec<FollowUpAction>,
}

/// Upstream meeting ids are UUIDs.
pub fn parse_external_id(raw: &str) -> Result<Uuid, PipelineError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| PipelineError::InvalidPayload(format!("meeting_id {:?} is not a UUID", raw)))
}

/// Meeting already imported for this upstream id, if any.
pub fn existing_import(
    coordinator: &ProcessingCoordinator,
    external_id: Uuid,
) -> Result<Option<MeetingRecord>, PipelineError> {
    let external = external_id.to_string();
    coordinator
        .store()
        .with_conn(|conn| MeetingRepository::find_by_external_ref(conn, &external))
        .map_err(PipelineError::from)
}

/// Import an upstream meeting whose transcript is already available.
///
/// Transcription is recorded as started and completed in one go, which
/// auto-starts the blog step and yields the content generation request.
pub fn start_from_meeting_ref(
    coordinator: &ProcessingCoordinator,
    external_id: Uuid,
    organization_id: &str,
    fetched: Option<MeetingTranscript>,
) -> Result<MeetingRefStarted, PipelineError> {
    if let Some(meeting) = existing_import(coordinator, external_id)? {
        info!(
            "Upstream meeting {} already imported as {}",
            external_id, meeting.id
        );
        return Ok(MeetingRefStarted {
            meeting,
            created: false,
            actions: Vec::new(),
        });
    }

    let fetched = fetched.ok_or(PipelineError::NotFound(external_id))?;
    if fetched.transcript.trim().is_empty() {
        return Err(PipelineError::InvalidPayload(
            "meeting does not have a transcript".to_string(),
        ));
    }
    if organization_id.trim().is_empty() {
        return Err(PipelineError::InvalidPayload(
            "organization_id is required".to_string(),
        ));
    }

    let meeting = coordinator.store().with_conn(|conn| {
        MeetingRepository::insert(
            conn,
            &NewMeeting {
                title: fetched
                    .title
                    .clone()
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| format!("Meeting {}", external_id)),
                organization_id: organization_id.to_string(),
                description: fetched.description.clone(),
                external_meeting_ref: Some(external_id.to_string()),
            },
        )
    })?;

    let source = json!({
        "source": "supabase",
        "supabase_meeting_id": external_id.to_string(),
    });
    coordinator.apply_event(
        &CanonicalEvent::new(meeting.id, Step::Transcription, StepStatus::InProgress)
            .with_detail(source),
    )?;

    let applied = coordinator.apply_event(
        &CanonicalEvent::new(meeting.id, Step::Transcription, StepStatus::Completed).with_detail(
            json!({
                "source": "supabase",
                "supabase_meeting_id": external_id.to_string(),
                "transcript": fetched.transcript,
                "summary": fetched.summary,
            }),
        ),
    )?;

    info!(
        "Meeting {} imported from upstream meeting {}",
        meeting.id, external_id
    );

    Ok(MeetingRefStarted {
        meeting: coordinator.meeting(meeting.id)?,
        created: true,
        actions: applied.actions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::pipeline::ActionKind;
    use std::sync::Arc;

    fn coordinator() -> ProcessingCoordinator {
        ProcessingCoordinator::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    fn transcript(text: &str) -> MeetingTranscript {
        MeetingTranscript {
            title: Some("Town hall".to_string()),
            description: None,
            transcript: text.to_string(),
            summary: Some("Quarterly numbers".to_string()),
        }
    }

    #[test]
    fn test_import_requests_content_generation() {
        let coordinator = coordinator();
        let external = Uuid::new_v4();

        let started =
            start_from_meeting_ref(&coordinator, external, "org-1", Some(transcript("Revenue up")))
                .unwrap();

        assert!(started.created);
        assert_eq!(started.meeting.title, "Town hall");
        assert_eq!(started.meeting.transcript.as_deref(), Some("Revenue up"));
        assert_eq!(started.meeting.statuses.transcription, StepStatus::Completed);
        assert_eq!(started.meeting.statuses.blog, StepStatus::InProgress);
        assert_eq!(started.actions.len(), 1);
        assert_eq!(started.actions[0].action, ActionKind::RequestContentGeneration);
        assert_eq!(started.actions[0].payload["source"], "supabase");
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let coordinator = coordinator();
        let external = Uuid::new_v4();

        let first =
            start_from_meeting_ref(&coordinator, external, "org-1", Some(transcript("text")))
                .unwrap();
        let second = start_from_meeting_ref(&coordinator, external, "org-1", None).unwrap();

        assert!(!second.created);
        assert!(second.actions.is_empty());
        assert_eq!(second.meeting.id, first.meeting.id);
    }

    #[test]
    fn test_empty_transcript_is_rejected() {
        let coordinator = coordinator();
        let err = start_from_meeting_ref(
            &coordinator,
            Uuid::new_v4(),
            "org-1",
            Some(transcript("   ")),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPayload(_)));
    }

    #[test]
    fn test_parse_external_id() {
        assert!(parse_external_id("not-a-uuid").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_external_id(&format!(" {} ", id)).unwrap(), id);
    }
}
