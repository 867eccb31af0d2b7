//! Intake endpoints: video upload, meeting-id import and status polling.

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::db::NewMeeting;
use crate::flow::{self, UploadedVideo};
use crate::pipeline::{PipelineError, Step};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path as FsPath, PathBuf};
use std::sync::OnceLock;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// Video container formats accepted for upload.
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm"];

pub fn router(state: AppState) -> Router {
    // Multipart framing on top of the file itself.
    let body_limit = state.max_upload_bytes.saturating_add(1024 * 1024);

    Router::new()
        .route("/upload", post(upload_video))
        .layer(DefaultBodyLimit::max(body_limit))
        .route("/process-meeting", post(process_meeting))
        .route("/upload/status/:meeting_id", get(upload_status))
        .with_state(state)
}

#[derive(Debug, Default)]
struct UploadForm {
    title: Option<String>,
    organization_id: Option<String>,
    description: Option<String>,
    video: Option<UploadedVideo>,
}

/// POST /api/upload - multipart video upload.
async fn upload_video(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Json<Value>> {
    let form = read_form(&state, multipart).await?;

    let Some(mut video) = form.video else {
        return Err(ApiError::bad_request("No video file provided"));
    };
    video.duration_seconds = flow::read_duration(FsPath::new(&video.storage_path)).await;
    let meeting = NewMeeting {
        title: form.title.unwrap_or_default(),
        organization_id: form.organization_id.unwrap_or_default(),
        description: form.description,
        external_meeting_ref: None,
    };

    let storage_path = video.storage_path.clone();
    let started = state
        .blocking(move |coordinator| flow::start_video_upload(coordinator, &meeting, &video))
        .await;

    let started = match started {
        Ok(started) => started,
        Err(e) => {
            if let Err(remove) = tokio::fs::remove_file(&storage_path).await {
                warn!("Failed to remove rejected upload {}: {}", storage_path, remove);
            }
            return Err(e);
        }
    };

    let dispatched = state.dispatch(std::slice::from_ref(&started.action)).await;

    Ok(Json(json!({
        "success": true,
        "message": "Video uploaded successfully",
        "data": {
            "meeting_id": started.meeting.id,
            "meeting_code": started.meeting.meeting_code,
            "video_id": started.video.id,
            "filename": started.video.original_filename,
            "file_size": started.video.file_size,
            "transcription_requested": dispatched == 1,
        },
    })))
}

/// Parse the upload form. A stored video is removed again if any later part
/// of the form is rejected.
async fn read_form(state: &AppState, multipart: Multipart) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();
    match read_fields(state, multipart, &mut form).await {
        Ok(()) => Ok(form),
        Err(e) => {
            if let Some(video) = form.video.take() {
                discard(FsPath::new(&video.storage_path)).await;
            }
            Err(e)
        }
    }
}

async fn read_fields(
    state: &AppState,
    mut multipart: Multipart,
    form: &mut UploadForm,
) -> ApiResult<()> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed upload: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video" => {
                if form.video.is_some() {
                    return Err(ApiError::bad_request("Only one video file may be uploaded"));
                }
                let original = field.file_name().unwrap_or_default().to_string();
                if original.is_empty() {
                    return Err(ApiError::bad_request("No video file selected"));
                }
                if !allowed_file(&original) {
                    return Err(ApiError::bad_request(format!(
                        "File type not allowed. Allowed types: {}",
                        ALLOWED_EXTENSIONS.join(", ")
                    )));
                }

                tokio::fs::create_dir_all(&state.uploads_dir)
                    .await
                    .map_err(|e| ApiError::internal(format!("Failed to create upload dir: {}", e)))?;
                let path = storage_path(&state.uploads_dir, &original);
                let mut file = tokio::fs::File::create(&path)
                    .await
                    .map_err(|e| ApiError::internal(format!("Failed to store upload: {}", e)))?;

                let mut size: usize = 0;
                loop {
                    let chunk = match field.chunk().await {
                        Ok(Some(chunk)) => chunk,
                        Ok(None) => break,
                        Err(e) => {
                            discard(&path).await;
                            return Err(ApiError::bad_request(format!("Upload interrupted: {}", e)));
                        }
                    };
                    size += chunk.len();
                    if size > state.max_upload_bytes {
                        discard(&path).await;
                        return Err(ApiError::payload_too_large(format!(
                            "File exceeds the {} MB limit",
                            state.max_upload_bytes / (1024 * 1024)
                        )));
                    }
                    if let Err(e) = file.write_all(&chunk).await {
                        discard(&path).await;
                        return Err(ApiError::internal(format!("Failed to store upload: {}", e)));
                    }
                }
                file.flush()
                    .await
                    .map_err(|e| ApiError::internal(format!("Failed to store upload: {}", e)))?;

                info!("Stored upload {} ({} bytes) at {:?}", original, size, path);
                form.video = Some(UploadedVideo {
                    storage_path: path.to_string_lossy().to_string(),
                    original_filename: original,
                    file_size: size as i64,
                    duration_seconds: None,
                });
            }
            "meeting_title" | "organization_id" | "meeting_description" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed field {}: {}", name, e)))?;
                let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
                match name.as_str() {
                    "meeting_title" => form.title = value,
                    "organization_id" => form.organization_id = value,
                    _ => form.description = value,
                }
            }
            _ => {}
        }
    }

    Ok(())
}

async fn discard(path: &FsPath) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to remove partial upload {:?}: {}", path, e);
    }
}

/// Whether the file name carries an accepted video extension.
pub fn allowed_file(filename: &str) -> bool {
    FsPath::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// Reduce a client file name to a safe storage name.
pub fn sanitize_filename(filename: &str) -> String {
    let base = FsPath::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let cleaned = match unsafe_chars() {
        Some(unsafe_chars) => unsafe_chars.replace_all(base, "_").into_owned(),
        None => base.to_string(),
    };
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned.to_string()
    }
}

fn unsafe_chars() -> Option<&'static Regex> {
    static UNSAFE_CHARS: OnceLock<Option<Regex>> = OnceLock::new();
    UNSAFE_CHARS
        .get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").ok())
        .as_ref()
}

fn storage_path(dir: &FsPath, original: &str) -> PathBuf {
    dir.join(format!("{}_{}", Uuid::new_v4().simple(), sanitize_filename(original)))
}

#[derive(Debug, Deserialize)]
struct ProcessMeetingRequest {
    meeting_id: Option<String>,
    organization_id: Option<String>,
}

/// POST /api/process-meeting - import an upstream meeting by id.
async fn process_meeting(
    State(state): State<AppState>,
    Json(req): Json<ProcessMeetingRequest>,
) -> ApiResult<Json<Value>> {
    let raw_id = req.meeting_id.unwrap_or_default();
    let organization_id = req.organization_id.unwrap_or_default();
    if raw_id.trim().is_empty() || organization_id.trim().is_empty() {
        return Err(ApiError::bad_request(
            "meeting_id and organization_id are required",
        ));
    }
    let external_id = flow::parse_external_id(&raw_id)?;

    let existing = state
        .blocking(move |coordinator| flow::existing_import(coordinator, external_id))
        .await?;

    let fetched = match (existing, &state.transcripts) {
        (Some(_), _) => None,
        (None, Some(source)) => source.fetch(&external_id.to_string()).await?,
        (None, None) => {
            return Err(ApiError::internal("Transcript source is not configured"));
        }
    };

    let started = state
        .blocking(move |coordinator| {
            flow::start_from_meeting_ref(coordinator, external_id, &organization_id, fetched)
        })
        .await?;

    let dispatched = state.dispatch(&started.actions).await;

    let message = if started.created {
        "Meeting processing started successfully"
    } else {
        "Meeting already imported"
    };

    Ok(Json(json!({
        "success": true,
        "message": message,
        "data": {
            "meeting_id": started.meeting.id,
            "supabase_meeting_id": external_id,
            "title": started.meeting.title,
            "transcript_available": started.meeting.transcript.is_some(),
            "created": started.created,
            "dispatched": dispatched,
        },
    })))
}

/// GET /api/upload/status/:meeting_id - per-step processing status.
async fn upload_status(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let meeting_id = Uuid::parse_str(&meeting_id)
        .map_err(|_| ApiError::from(PipelineError::InvalidPayload("meeting_id is not a UUID".into())))?;

    let meeting = state
        .blocking(move |coordinator| coordinator.meeting(meeting_id))
        .await?;

    let steps: serde_json::Map<String, Value> = Step::ALL
        .iter()
        .map(|step| (step.as_str().to_string(), json!(meeting.statuses.get(*step))))
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": {
            "meeting_id": meeting.id,
            "meeting_code": meeting.meeting_code,
            "title": meeting.title,
            "statuses": steps,
            "completed": meeting.statuses.all_completed(),
            "updated_at": meeting.updated_at,
        },
    })))
}
