//! Transcript lookup for meetings recorded elsewhere.
//!
//! The meeting-id flow starts from a meeting that already has minutes in the
//! upstream database. [`SupabaseTranscriptSource`] reads them through the
//! PostgREST API: one request for the meeting row, one for its minutes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

/// Transcript and metadata for an upstream meeting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeetingTranscript {
    pub title: Option<String>,
    pub description: Option<String>,
    pub transcript: String,
    pub summary: Option<String>,
}

#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Fetch the transcript for `external_id`. `Ok(None)` means the meeting
    /// or its minutes do not exist upstream.
    async fn fetch(&self, external_id: &str) -> Result<Option<MeetingTranscript>>;
}

#[derive(Debug, Deserialize)]
struct MeetingRow {
    title: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MinutesRow {
    transcript: Option<String>,
    summary: Option<String>,
}

pub struct SupabaseTranscriptSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SupabaseTranscriptSource {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Supabase HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn first_row<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<Option<T>> {
        let response = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .with_context(|| format!("Failed to query {}", url))?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "Supabase request failed ({}): {}",
                status,
                body
            ));
        }

        let rows: Vec<T> =
            serde_json::from_str(&body).context("Failed to parse Supabase response")?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl TranscriptSource for SupabaseTranscriptSource {
    async fn fetch(&self, external_id: &str) -> Result<Option<MeetingTranscript>> {
        let meeting_url = format!(
            "{}/rest/v1/meetings?id=eq.{}&select=*",
            self.base_url, external_id
        );
        let Some(meeting) = self.first_row::<MeetingRow>(&meeting_url).await? else {
            warn!("Upstream meeting {} not found", external_id);
            return Ok(None);
        };

        let minutes_url = format!(
            "{}/rest/v1/meeting_minutes?meeting_id=eq.{}&select=*",
            self.base_url, external_id
        );
        let Some(minutes) = self.first_row::<MinutesRow>(&minutes_url).await? else {
            warn!("Upstream meeting {} has no minutes", external_id);
            return Ok(None);
        };

        info!("Fetched upstream meeting and minutes: {}", external_id);

        Ok(Some(MeetingTranscript {
            title: meeting.title,
            description: meeting.description,
            transcript: minutes.transcript.unwrap_or_default(),
            summary: minutes.summary.filter(|s| !s.trim().is_empty()),
        }))
    }
}
