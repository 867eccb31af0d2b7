use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use super::{now, uuid_column, StoreResult};

/// Processing status of an uploaded video file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Uploaded,
    Transcribed,
    Error,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Transcribed => "transcribed",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoFileRecord {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub storage_path: String,
    pub original_filename: String,
    pub file_size: i64,
    pub duration_seconds: Option<f64>,
    pub processing_status: String,
    pub uploaded_at: String,
}

#[derive(Debug, Clone)]
pub struct NewVideoFile {
    pub meeting_id: Uuid,
    pub storage_path: String,
    pub original_filename: String,
    pub file_size: i64,
    pub duration_seconds: Option<f64>,
}

pub struct VideoFileRepository;

impl VideoFileRepository {
    pub fn insert(conn: &Connection, video: &NewVideoFile) -> StoreResult<VideoFileRecord> {
        let id = Uuid::new_v4();
        let uploaded_at = now();

        conn.execute(
            "INSERT INTO video_files (id, meeting_id, storage_path, original_filename, file_size, \
             duration_seconds, processing_status, uploaded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id.to_string(),
                video.meeting_id.to_string(),
                video.storage_path,
                video.original_filename,
                video.file_size,
                video.duration_seconds,
                VideoStatus::Uploaded.as_str(),
                uploaded_at,
            ],
        )?;

        Ok(VideoFileRecord {
            id,
            meeting_id: video.meeting_id,
            storage_path: video.storage_path.clone(),
            original_filename: video.original_filename.clone(),
            file_size: video.file_size,
            duration_seconds: video.duration_seconds,
            processing_status: VideoStatus::Uploaded.as_str().to_string(),
            uploaded_at,
        })
    }

    pub fn get(conn: &Connection, id: Uuid) -> StoreResult<Option<VideoFileRecord>> {
        let record = conn
            .query_row(
                "SELECT id, meeting_id, storage_path, original_filename, file_size, \
                 duration_seconds, processing_status, uploaded_at FROM video_files WHERE id = ?1",
                params![id.to_string()],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn list_for_meeting(conn: &Connection, meeting_id: Uuid) -> StoreResult<Vec<VideoFileRecord>> {
        let mut stmt = conn.prepare(
            "SELECT id, meeting_id, storage_path, original_filename, file_size, \
             duration_seconds, processing_status, uploaded_at FROM video_files \
             WHERE meeting_id = ?1 ORDER BY uploaded_at ASC",
        )?;

        let videos = stmt
            .query_map(params![meeting_id.to_string()], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(videos)
    }

    /// Only `processing_status` is mutable on a video. The update is scoped to
    /// the owning meeting so a callback cannot touch another meeting's video.
    pub fn update_processing_status(
        conn: &Connection,
        id: Uuid,
        meeting_id: Uuid,
        status: VideoStatus,
    ) -> StoreResult<bool> {
        let changed = conn.execute(
            "UPDATE video_files SET processing_status = ?1 WHERE id = ?2 AND meeting_id = ?3",
            params![status.as_str(), id.to_string(), meeting_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<VideoFileRecord> {
        Ok(VideoFileRecord {
            id: uuid_column(row, 0)?,
            meeting_id: uuid_column(row, 1)?,
            storage_path: row.get(2)?,
            original_filename: row.get(3)?,
            file_size: row.get(4)?,
            duration_seconds: row.get(5)?,
            processing_status: row.get(6)?,
            uploaded_at: row.get(7)?,
        })
    }
}
