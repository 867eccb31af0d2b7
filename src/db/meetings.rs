//! Meeting record persistence.
//!
//! CRUD operations for the `meetings` table. Step status columns are only
//! ever written through [`MeetingRepository::update_status`], which is
//! conditional on the expected prior value.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use super::{corrupt, now, uuid_column, StoreResult};
use crate::pipeline::status::{Step, StepStatus, StepStatuses};

const MEETING_COLUMNS: &str = "id, title, organization_id, description, meeting_code, transcript, \
     summary, transcription_status, blog_status, poster_status, facebook_post_status, \
     external_meeting_ref, created_at, updated_at";

/// A meeting record from the database.
#[derive(Debug, Clone, Serialize)]
pub struct MeetingRecord {
    pub id: Uuid,
    pub title: String,
    pub organization_id: String,
    pub description: Option<String>,
    pub meeting_code: String,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub statuses: StepStatuses,
    pub external_meeting_ref: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields supplied by a flow initiator.
#[derive(Debug, Clone, Default)]
pub struct NewMeeting {
    pub title: String,
    pub organization_id: String,
    pub description: Option<String>,
    pub external_meeting_ref: Option<String>,
}

/// Repository for meeting records.
pub struct MeetingRepository;

impl MeetingRepository {
    /// Insert a new meeting with every slot `pending`.
    pub fn insert(conn: &Connection, meeting: &NewMeeting) -> StoreResult<MeetingRecord> {
        let id = Uuid::new_v4();
        let code = format!("MEET_{}", &Uuid::new_v4().simple().to_string()[..8]);
        let created_at = now();

        conn.execute(
            "INSERT INTO meetings (id, title, organization_id, description, meeting_code, \
             external_meeting_ref, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id.to_string(),
                meeting.title,
                meeting.organization_id,
                meeting.description,
                code,
                meeting.external_meeting_ref,
                created_at,
            ],
        )?;

        Ok(MeetingRecord {
            id,
            title: meeting.title.clone(),
            organization_id: meeting.organization_id.clone(),
            description: meeting.description.clone(),
            meeting_code: code,
            transcript: None,
            summary: None,
            statuses: StepStatuses::default(),
            external_meeting_ref: meeting.external_meeting_ref.clone(),
            created_at: created_at.clone(),
            updated_at: created_at,
        })
    }

    /// Get a meeting by ID.
    pub fn get(conn: &Connection, id: Uuid) -> StoreResult<Option<MeetingRecord>> {
        let record = conn
            .query_row(
                &format!("SELECT {MEETING_COLUMNS} FROM meetings WHERE id = ?1"),
                params![id.to_string()],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn find_by_external_ref(
        conn: &Connection,
        external_ref: &str,
    ) -> StoreResult<Option<MeetingRecord>> {
        let record = conn
            .query_row(
                &format!("SELECT {MEETING_COLUMNS} FROM meetings WHERE external_meeting_ref = ?1"),
                params![external_ref],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Compare-and-swap a slot status. Returns `false` when the slot no longer
    /// holds `expected` (or the meeting does not exist).
    pub fn update_status(
        conn: &Connection,
        id: Uuid,
        step: Step,
        expected: StepStatus,
        next: StepStatus,
    ) -> StoreResult<bool> {
        let column = step.status_column();
        let changed = conn.execute(
            &format!(
                "UPDATE meetings SET {column} = ?1, updated_at = ?2 WHERE id = ?3 AND {column} = ?4"
            ),
            params![next.as_str(), now(), id.to_string(), expected.as_str()],
        )?;
        Ok(changed == 1)
    }

    pub fn set_transcript(
        conn: &Connection,
        id: Uuid,
        transcript: Option<&str>,
        summary: Option<&str>,
    ) -> StoreResult<()> {
        conn.execute(
            "UPDATE meetings SET transcript = COALESCE(?1, transcript), \
             summary = COALESCE(?2, summary), updated_at = ?3 WHERE id = ?4",
            params![transcript, summary, now(), id.to_string()],
        )?;
        Ok(())
    }

    /// List meetings, newest first, optionally scoped to an organization.
    pub fn list(
        conn: &Connection,
        organization_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<MeetingRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEETING_COLUMNS} FROM meetings \
             WHERE (?1 IS NULL OR organization_id = ?1) \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3"
        ))?;

        let meetings = stmt
            .query_map(
                params![organization_id, limit as i64, offset as i64],
                Self::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(meetings)
    }

    pub fn count(conn: &Connection, organization_id: Option<&str>) -> StoreResult<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM meetings WHERE (?1 IS NULL OR organization_id = ?1)",
            params![organization_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<MeetingRecord> {
        Ok(MeetingRecord {
            id: uuid_column(row, 0)?,
            title: row.get(1)?,
            organization_id: row.get(2)?,
            description: row.get(3)?,
            meeting_code: row.get(4)?,
            transcript: row.get(5)?,
            summary: row.get(6)?,
            statuses: StepStatuses {
                transcription: status_column(row, 7)?,
                blog: status_column(row, 8)?,
                poster: status_column(row, 9)?,
                facebook_post: status_column(row, 10)?,
            },
            external_meeting_ref: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

pub(crate) fn status_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<StepStatus> {
    let raw: String = row.get(idx)?;
    StepStatus::parse(&raw).ok_or_else(|| corrupt(idx, format!("unknown step status {raw:?}")))
}
