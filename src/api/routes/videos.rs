//! Uploaded video metadata and download.
//!
//! The transcription service fetches uploads from `/videos/:id/file`.

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::db::{VideoFileRecord, VideoFileRepository};
use crate::pipeline::PipelineError;
use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::path::Path as FsPath;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/videos/:id/info", get(video_info))
        .route("/videos/:id/file", get(video_file))
        .with_state(state)
}

async fn load(state: &AppState, raw: &str) -> ApiResult<VideoFileRecord> {
    let id = Uuid::parse_str(raw)
        .map_err(|_| ApiError::bad_request(format!("{:?} is not a video id", raw)))?;

    state
        .blocking(move |coordinator| {
            coordinator
                .store()
                .with_conn(|conn| VideoFileRepository::get(conn, id))
                .map_err(PipelineError::from)
        })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Video {} not found", id)))
}

/// GET /api/videos/:id/info
async fn video_info(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let video = load(&state, &id).await?;
    let on_disk = tokio::fs::try_exists(&video.storage_path).await.unwrap_or(false);

    Ok(Json(json!({
        "success": true,
        "data": {
            "video": video,
            "available": on_disk,
        },
    })))
}

/// GET /api/videos/:id/file
async fn video_file(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    let video = load(&state, &id).await?;

    let file = tokio::fs::File::open(&video.storage_path)
        .await
        .map_err(|_| ApiError::not_found("Video file not found on disk"))?;

    let headers = [
        (header::CONTENT_TYPE, content_type(&video.original_filename).to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", video.original_filename.replace('"', "")),
        ),
        (header::CONTENT_LENGTH, video.file_size.to_string()),
    ];

    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

fn content_type(filename: &str) -> &'static str {
    match FsPath::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("wmv") => "video/x-ms-wmv",
        Some("flv") => "video/x-flv",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("a.MP4"), "video/mp4");
        assert_eq!(content_type("a.mov"), "video/quicktime");
        assert_eq!(content_type("a"), "application/octet-stream");
    }
}
