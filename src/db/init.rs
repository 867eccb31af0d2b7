use rusqlite::Connection;

use super::StoreResult;

const STEP_STATUS_CHECK: &str = "IN ('pending', 'in_progress', 'completed', 'failed')";

pub fn migrate(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS meetings (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                organization_id TEXT NOT NULL,
                description TEXT,
                meeting_code TEXT NOT NULL,
                transcript TEXT,
                summary TEXT,
                transcription_status TEXT NOT NULL DEFAULT 'pending' CHECK (transcription_status {check}),
                blog_status TEXT NOT NULL DEFAULT 'pending' CHECK (blog_status {check}),
                poster_status TEXT NOT NULL DEFAULT 'pending' CHECK (poster_status {check}),
                facebook_post_status TEXT NOT NULL DEFAULT 'pending' CHECK (facebook_post_status {check}),
                external_meeting_ref TEXT UNIQUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            check = STEP_STATUS_CHECK
        ),
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meetings_org_created ON meetings(organization_id, created_at DESC)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS video_files (
            id TEXT PRIMARY KEY,
            meeting_id TEXT NOT NULL REFERENCES meetings(id) ON DELETE CASCADE,
            storage_path TEXT NOT NULL,
            original_filename TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            duration_seconds REAL,
            processing_status TEXT NOT NULL DEFAULT 'uploaded',
            uploaded_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_video_files_meeting ON video_files(meeting_id)",
        [],
    )?;

    // One blog post per meeting.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS blog_posts (
            id TEXT PRIMARY KEY,
            meeting_id TEXT NOT NULL UNIQUE REFERENCES meetings(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            summary TEXT,
            keywords TEXT NOT NULL DEFAULT '[]',
            facebook_post_id TEXT,
            facebook_post_url TEXT,
            status TEXT NOT NULL DEFAULT 'generated',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS processing_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                meeting_id TEXT NOT NULL REFERENCES meetings(id) ON DELETE CASCADE,
                step TEXT NOT NULL,
                status TEXT NOT NULL CHECK (status {check}),
                details TEXT,
                error_message TEXT,
                started_at TEXT NOT NULL,
                completed_at TEXT
            )",
            check = STEP_STATUS_CHECK
        ),
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_processing_logs_slot ON processing_logs(meeting_id, step, id DESC)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS social_posts (
            id TEXT PRIMARY KEY,
            meeting_id TEXT NOT NULL REFERENCES meetings(id) ON DELETE CASCADE,
            blog_post_id TEXT REFERENCES blog_posts(id) ON DELETE CASCADE,
            platform TEXT NOT NULL,
            external_post_id TEXT,
            external_post_url TEXT,
            image_url TEXT,
            content TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'generated',
            platforms TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_social_posts_meeting ON social_posts(meeting_id, created_at DESC)",
        [],
    )?;

    Ok(())
}
