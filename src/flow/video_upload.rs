use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::db::{
    MeetingRecord, MeetingRepository, NewMeeting, NewVideoFile, VideoFileRecord,
    VideoFileRepository,
};
use crate::pipeline::{
    CanonicalEvent, FollowUpAction, PipelineError, ProcessingCoordinator, Step, StepStatus,
};

/// A stored upload waiting to be attached to a new meeting.
#[derive(Debug, Clone)]
pub struct UploadedVideo {
    pub storage_path: String,
    pub original_filename: String,
    pub file_size: i64,
    pub duration_seconds: Option<f64>,
}

const FFPROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Read a stored video's duration with `ffprobe`.
///
/// Any ffprobe failure is logged and yields `None`; the upload proceeds
/// without a duration.
pub async fn read_duration(path: &Path) -> Option<f64> {
    let ffprobe = Command::new("ffprobe")
        .args(["-v", "quiet", "-show_entries", "format=duration", "-of", "csv=p=0"])
        .arg(path)
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(FFPROBE_TIMEOUT, ffprobe).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!("ffprobe unavailable, skipping duration for {:?}: {}", path, e);
            return None;
        }
        Err(_) => {
            warn!("ffprobe timed out on {:?}", path);
            return None;
        }
    };

    if !output.status.success() {
        warn!(
            "ffprobe failed on {:?}: {}",
            path,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }

    let duration = parse_duration_output(&String::from_utf8_lossy(&output.stdout));
    debug!("Duration of {:?}: {:?}", path, duration);
    duration
}

fn parse_duration_output(stdout: &str) -> Option<f64> {
    stdout
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoUploadStarted {
    pub meeting: MeetingRecord,
    pub video: VideoFileRecord,
    pub action: FollowUpAction,
}

/// Create the meeting and its video, mark transcription as started, and
/// return the transcription request.
pub fn start_video_upload(
    coordinator: &ProcessingCoordinator,
    meeting: &NewMeeting,
    upload: &UploadedVideo,
) -> Result<VideoUploadStarted, PipelineError> {
    if meeting.title.trim().is_empty() || meeting.organization_id.trim().is_empty() {
        return Err(PipelineError::InvalidPayload(
            "meeting_title and organization_id are required".to_string(),
        ));
    }

    let (record, video) = coordinator.store().transaction(|conn| {
        let record = MeetingRepository::insert(conn, meeting)?;
        let video = VideoFileRepository::insert(
            conn,
            &NewVideoFile {
                meeting_id: record.id,
                storage_path: upload.storage_path.clone(),
                original_filename: upload.original_filename.clone(),
                file_size: upload.file_size,
                duration_seconds: upload.duration_seconds,
            },
        )?;
        Ok::<_, PipelineError>((record, video))
    })?;

    coordinator.apply_event(
        &CanonicalEvent::new(record.id, Step::Transcription, StepStatus::InProgress)
            .with_detail(json!({ "source": "video_upload", "video_id": video.id })),
    )?;

    let action = coordinator
        .store()
        .with_conn(|conn| coordinator.request_for(conn, record.id, Step::Transcription))?;
    let meeting = coordinator.meeting(record.id)?;

    info!(
        "Meeting {} ({}) created from upload {}",
        meeting.id, meeting.meeting_code, video.original_filename
    );

    Ok(VideoUploadStarted {
        meeting,
        video,
        action,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::pipeline::ActionKind;
    use std::sync::Arc;

    fn upload() -> UploadedVideo {
        UploadedVideo {
            storage_path: "/data/uploads/standup.mp4".to_string(),
            original_filename: "standup.mp4".to_string(),
            file_size: 4096,
            duration_seconds: Some(312.5),
        }
    }

    #[test]
    fn test_upload_starts_transcription() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let coordinator =
            ProcessingCoordinator::new(store).with_public_base_url("https://meet.example.com");

        let started = start_video_upload(
            &coordinator,
            &NewMeeting {
                title: "Standup".to_string(),
                organization_id: "org-1".to_string(),
                ..Default::default()
            },
            &upload(),
        )
        .unwrap();

        assert_eq!(
            started.meeting.statuses.transcription,
            StepStatus::InProgress
        );
        assert_eq!(started.meeting.statuses.blog, StepStatus::Pending);
        assert_eq!(started.action.action, ActionKind::RequestTranscription);
        assert_eq!(
            started.action.payload["video_url"],
            format!("https://meet.example.com/api/videos/{}/file", started.video.id)
        );

        let detail = coordinator.meeting_detail(started.meeting.id).unwrap();
        assert_eq!(detail.videos.len(), 1);
        assert_eq!(detail.videos[0].duration_seconds, Some(312.5));
        assert_eq!(detail.logs.len(), 1);
    }

    #[test]
    fn test_upload_requires_title() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let coordinator = ProcessingCoordinator::new(store);

        let err = start_video_upload(
            &coordinator,
            &NewMeeting {
                title: "  ".to_string(),
                organization_id: "org-1".to_string(),
                ..Default::default()
            },
            &upload(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPayload(_)));
    }

    #[test]
    fn test_parse_duration_output() {
        assert_eq!(parse_duration_output("1834.560000\n"), Some(1834.56));
        assert_eq!(parse_duration_output("N/A"), None);
        assert_eq!(parse_duration_output(""), None);
        assert_eq!(parse_duration_output("-3"), None);
    }

    #[tokio::test]
    async fn test_missing_file_has_no_duration() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_duration(&dir.path().join("missing.mp4")).await, None);
    }
}
