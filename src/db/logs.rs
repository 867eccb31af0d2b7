//! Append-only processing log.
//!
//! Every slot status change appends one row; rows are never updated. The
//! newest row per `(meeting_id, step)` mirrors the slot's current status and
//! is what duplicate detection and stale-step detection read.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::meetings::status_column;
use super::{corrupt, json_column, now, uuid_column, StoreResult};
use crate::pipeline::status::{Step, StepStatus};

const LOG_COLUMNS: &str =
    "id, meeting_id, step, status, details, error_message, started_at, completed_at";

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub meeting_id: Uuid,
    pub step: Step,
    pub status: StepStatus,
    pub details: Option<Value>,
    pub error_message: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewLogEntry<'a> {
    pub meeting_id: Uuid,
    pub step: Step,
    pub status: StepStatus,
    pub details: Option<&'a Value>,
    pub error_message: Option<&'a str>,
}

pub struct ProcessingLogRepository;

impl ProcessingLogRepository {
    /// Append a row. `completed_at` is stamped in the same insert for
    /// terminal statuses.
    pub fn append(conn: &Connection, entry: &NewLogEntry<'_>) -> StoreResult<i64> {
        let started_at = now();
        let completed_at = entry.status.is_terminal().then(|| started_at.clone());
        let details = entry.details.map(serde_json::to_string).transpose()?;

        conn.execute(
            "INSERT INTO processing_logs (meeting_id, step, status, details, error_message, \
             started_at, completed_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.meeting_id.to_string(),
                entry.step.as_str(),
                entry.status.as_str(),
                details,
                entry.error_message,
                started_at,
                completed_at,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Most recent row for one slot.
    pub fn latest(conn: &Connection, meeting_id: Uuid, step: Step) -> StoreResult<Option<LogEntry>> {
        let entry = conn
            .query_row(
                &format!(
                    "SELECT {LOG_COLUMNS} FROM processing_logs \
                     WHERE meeting_id = ?1 AND step = ?2 ORDER BY id DESC LIMIT 1"
                ),
                params![meeting_id.to_string(), step.as_str()],
                Self::from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Full timeline for a meeting, oldest first.
    pub fn list_for_meeting(conn: &Connection, meeting_id: Uuid) -> StoreResult<Vec<LogEntry>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM processing_logs WHERE meeting_id = ?1 ORDER BY id ASC"
        ))?;

        let entries = stmt
            .query_map(params![meeting_id.to_string()], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Slots whose newest row is `in_progress` and older than `cutoff`.
    pub fn stale_in_progress(conn: &Connection, cutoff: &str) -> StoreResult<Vec<LogEntry>> {
        let mut stmt = conn.prepare(
            "SELECT l.id, l.meeting_id, l.step, l.status, l.details, l.error_message, \
             l.started_at, l.completed_at \
             FROM processing_logs l \
             JOIN (SELECT MAX(id) AS max_id FROM processing_logs GROUP BY meeting_id, step) latest \
               ON l.id = latest.max_id \
             WHERE l.status = 'in_progress' AND l.started_at < ?1 \
             ORDER BY l.started_at ASC",
        )?;

        let entries = stmt
            .query_map(params![cutoff], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
        let step: String = row.get(2)?;
        Ok(LogEntry {
            id: row.get(0)?,
            meeting_id: uuid_column(row, 1)?,
            step: Step::parse(&step).map_err(|e| corrupt(2, e.to_string()))?,
            status: status_column(row, 3)?,
            details: json_column(row, 4)?,
            error_message: row.get(5)?,
            started_at: row.get(6)?,
            completed_at: row.get(7)?,
        })
    }
}
