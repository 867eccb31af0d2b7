//! Processing coordinator.
//!
//! Applies canonical events to per-meeting slot state:
//! check transition → CAS status → append log → write step artifacts →
//! advance successors. All writes for one event share a single transaction.
//!
//! The coordinator never performs network I/O. It returns follow-up actions
//! and leaves dispatching to the caller.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::actions::{ActionContext, FollowUpAction};
use super::error::PipelineError;
use super::status::{Step, StepStatus};
use crate::db::{
    self, BlogPostRecord, BlogPostRepository, LogEntry, MeetingRecord, MeetingRepository,
    NewBlogPost, NewLogEntry, NewSocialPost, ProcessingLogRepository, SocialPostRecord,
    SocialPostRepository, Store, VideoFileRecord, VideoFileRepository, VideoStatus,
};
use rusqlite::Connection;

/// Platform recorded when the `facebook_post` step completes.
pub const FACEBOOK: &str = "facebook";

/// Error recorded when a stuck step is closed by a manual retry.
pub const MANUAL_RETRY: &str = "manual retry";

/// Normalized progress notification consumed by [`ProcessingCoordinator::apply_event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub meeting_id: Uuid,
    pub step: Step,
    pub target_status: StepStatus,
    pub detail: Option<Value>,
    pub error_message: Option<String>,
}

impl CanonicalEvent {
    pub fn new(meeting_id: Uuid, step: Step, target_status: StepStatus) -> Self {
        Self {
            meeting_id,
            step,
            target_status,
            detail: None,
            error_message: None,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Result of an accepted event.
#[derive(Debug, Clone, Serialize)]
pub struct Applied {
    pub meeting_id: Uuid,
    pub step: Step,
    pub from: StepStatus,
    pub to: StepStatus,
    pub actions: Vec<FollowUpAction>,
}

/// A slot stuck in `in_progress` longer than the configured threshold.
#[derive(Debug, Clone, Serialize)]
pub struct StaleStep {
    pub meeting_id: Uuid,
    pub step: Step,
    pub in_progress_since: String,
}

/// Everything stored for one meeting.
#[derive(Debug, Clone, Serialize)]
pub struct MeetingDetail {
    pub meeting: MeetingRecord,
    pub videos: Vec<VideoFileRecord>,
    pub blog_post: Option<BlogPostRecord>,
    pub social_posts: Vec<SocialPostRecord>,
    pub logs: Vec<LogEntry>,
}

#[derive(Clone)]
pub struct ProcessingCoordinator {
    store: Arc<Store>,
    public_base_url: Option<String>,
}

impl ProcessingCoordinator {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            public_base_url: None,
        }
    }

    /// Base URL used to build public video links in transcription requests.
    pub fn with_public_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.public_base_url = Some(base_url.into());
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn public_base_url(&self) -> Option<&str> {
        self.public_base_url.as_deref()
    }

    pub fn meeting(&self, meeting_id: Uuid) -> Result<MeetingRecord, PipelineError> {
        self.store
            .with_conn(|conn| MeetingRepository::get(conn, meeting_id))?
            .ok_or(PipelineError::NotFound(meeting_id))
    }

    pub fn meeting_detail(&self, meeting_id: Uuid) -> Result<MeetingDetail, PipelineError> {
        self.store.with_conn(|conn| {
            let meeting =
                MeetingRepository::get(conn, meeting_id)?.ok_or(PipelineError::NotFound(meeting_id))?;
            Ok(MeetingDetail {
                videos: VideoFileRepository::list_for_meeting(conn, meeting_id)?,
                blog_post: BlogPostRepository::get_for_meeting(conn, meeting_id)?,
                social_posts: SocialPostRepository::list_for_meeting(conn, meeting_id)?,
                logs: ProcessingLogRepository::list_for_meeting(conn, meeting_id)?,
                meeting,
            })
        })
    }

    /// Validate and apply one event.
    ///
    /// Illegal transitions are rejected without touching stored state. A
    /// `completed` event additionally writes the step's artifacts and moves
    /// every still-pending successor to `in_progress`, returning one request
    /// action per successor started.
    pub fn apply_event(&self, event: &CanonicalEvent) -> Result<Applied, PipelineError> {
        let meeting = self.meeting(event.meeting_id)?;
        let step = event.step;
        let to = event.target_status;

        let from = match meeting.statuses.check(step, to) {
            Ok(from) => from,
            Err(e) => {
                warn!("Meeting {} rejected event: {}", meeting.id, e);
                return Err(e);
            }
        };

        let result = self.store.transaction(|conn| {
            transition(
                conn,
                meeting.id,
                step,
                from,
                to,
                event.detail.as_ref(),
                event.error_message.as_deref(),
            )?;

            match to {
                StepStatus::Completed => {
                    write_artifacts(conn, meeting.id, step, event.detail.as_ref())
                        .map_err(|e| reject_conflicting_artifact(step, e))?;
                    self.advance_successors(conn, meeting.id, step)
                }
                StepStatus::Failed => {
                    record_failure(conn, meeting.id, step, event.detail.as_ref())?;
                    Ok(Vec::new())
                }
                _ => Ok(Vec::new()),
            }
        });

        match result {
            Ok(actions) => {
                info!(
                    "Meeting {} {}: {} -> {} ({} follow-up actions)",
                    meeting.id,
                    step,
                    from,
                    to,
                    actions.len()
                );
                Ok(Applied {
                    meeting_id: meeting.id,
                    step,
                    from,
                    to,
                    actions,
                })
            }
            Err(e) => {
                warn!("Meeting {} event {} -> {} not applied: {}", meeting.id, step, to, e);
                Err(e)
            }
        }
    }

    /// Manual retry: restart a `failed` or stuck `in_progress` step and
    /// return the request that runs it again.
    ///
    /// A stuck step is closed as `failed` first, so the log keeps a legal
    /// path. Both rows are written in the same transaction.
    pub fn retry(&self, meeting_id: Uuid, step: Step) -> Result<Applied, PipelineError> {
        let meeting = self.meeting(meeting_id)?;
        let from = meeting.statuses.get(step);
        let stuck = from == StepStatus::InProgress;

        let checked = if stuck {
            meeting.statuses.check(step, StepStatus::Failed)
        } else {
            meeting.statuses.check(step, StepStatus::InProgress)
        };
        if let Err(e) = checked {
            warn!("Meeting {} rejected retry: {}", meeting_id, e);
            return Err(e);
        }

        let retry_detail = json!({ "retry": true });
        let action = self.store.transaction(|conn| {
            let mut current = from;
            if stuck {
                transition(
                    conn,
                    meeting_id,
                    step,
                    StepStatus::InProgress,
                    StepStatus::Failed,
                    None,
                    Some(MANUAL_RETRY),
                )?;
                current = StepStatus::Failed;
            }
            transition(
                conn,
                meeting_id,
                step,
                current,
                StepStatus::InProgress,
                Some(&retry_detail),
                None,
            )?;
            self.request_for(conn, meeting_id, step)
        })?;

        info!("Meeting {} {} retry requested (was {})", meeting_id, step, from);
        Ok(Applied {
            meeting_id,
            step,
            from,
            to: StepStatus::InProgress,
            actions: vec![action],
        })
    }

    /// Slots whose latest log row has been `in_progress` longer than `threshold`.
    pub fn stale_steps(&self, threshold: chrono::Duration) -> Result<Vec<StaleStep>, PipelineError> {
        let cutoff = db::timestamp(Utc::now() - threshold);
        let entries = self
            .store
            .with_conn(|conn| ProcessingLogRepository::stale_in_progress(conn, &cutoff))?;

        Ok(entries
            .into_iter()
            .map(|entry| StaleStep {
                meeting_id: entry.meeting_id,
                step: entry.step,
                in_progress_since: entry.started_at,
            })
            .collect())
    }

    /// Build the request that starts `step` for a meeting.
    pub(crate) fn request_for(
        &self,
        conn: &Connection,
        meeting_id: Uuid,
        step: Step,
    ) -> Result<FollowUpAction, PipelineError> {
        let meeting =
            MeetingRepository::get(conn, meeting_id)?.ok_or(PipelineError::NotFound(meeting_id))?;
        let blog_post = BlogPostRepository::get_for_meeting(conn, meeting_id)?;
        let video = VideoFileRepository::list_for_meeting(conn, meeting_id)?.pop();

        Ok(FollowUpAction::for_step(
            step,
            &meeting,
            &ActionContext {
                blog_post: blog_post.as_ref(),
                video: video.as_ref(),
                public_base_url: self.public_base_url.as_deref(),
            },
        ))
    }

    fn advance_successors(
        &self,
        conn: &Connection,
        meeting_id: Uuid,
        step: Step,
    ) -> Result<Vec<FollowUpAction>, PipelineError> {
        let mut actions = Vec::new();

        for &next in step.successors() {
            let started = MeetingRepository::update_status(
                conn,
                meeting_id,
                next,
                StepStatus::Pending,
                StepStatus::InProgress,
            )?;
            if !started {
                debug!("Meeting {} {} already started, no request issued", meeting_id, next);
                continue;
            }

            let details = json!({ "triggered_by": step });
            ProcessingLogRepository::append(
                conn,
                &NewLogEntry {
                    meeting_id,
                    step: next,
                    status: StepStatus::InProgress,
                    details: Some(&details),
                    error_message: None,
                },
            )?;

            actions.push(self.request_for(conn, meeting_id, next)?);
        }

        Ok(actions)
    }
}

/// Compare-and-swap one slot and append the matching log row.
fn transition(
    conn: &Connection,
    meeting_id: Uuid,
    step: Step,
    from: StepStatus,
    to: StepStatus,
    details: Option<&Value>,
    error_message: Option<&str>,
) -> Result<(), PipelineError> {
    if !MeetingRepository::update_status(conn, meeting_id, step, from, to)? {
        let current = MeetingRepository::get(conn, meeting_id)?
            .map(|m| m.statuses.get(step))
            .unwrap_or(from);
        return Err(PipelineError::IllegalTransition {
            step,
            from: current,
            to,
            reason: format!("slot changed concurrently (expected {})", from),
        });
    }

    ProcessingLogRepository::append(
        conn,
        &NewLogEntry {
            meeting_id,
            step,
            status: to,
            details,
            error_message,
        },
    )?;
    Ok(())
}

/// A constraint violation while storing artifacts comes from the payload
/// (for example a reused `blog_id`), so redelivering it cannot succeed.
fn reject_conflicting_artifact(step: Step, err: PipelineError) -> PipelineError {
    match err {
        PipelineError::StoreUnavailable(e) if e.is_constraint_violation() => {
            PipelineError::InvalidPayload(format!("{} result conflicts with stored records: {}", step, e))
        }
        other => other,
    }
}

/// Side effects of a failed step. Only transcription marks its video.
fn record_failure(
    conn: &Connection,
    meeting_id: Uuid,
    step: Step,
    detail: Option<&Value>,
) -> Result<(), PipelineError> {
    if step != Step::Transcription {
        return Ok(());
    }
    if let Some(video_id) = detail_video_id(meeting_id, detail) {
        VideoFileRepository::update_processing_status(conn, video_id, meeting_id, VideoStatus::Error)?;
    }
    Ok(())
}

/// Persist what a completed step produced.
fn write_artifacts(
    conn: &Connection,
    meeting_id: Uuid,
    step: Step,
    detail: Option<&Value>,
) -> Result<(), PipelineError> {
    match step {
        Step::Transcription => {
            MeetingRepository::set_transcript(
                conn,
                meeting_id,
                detail_str(detail, &["transcript"]),
                detail_str(detail, &["summary"]),
            )?;

            if let Some(video_id) = detail_video_id(meeting_id, detail) {
                VideoFileRepository::update_processing_status(
                    conn,
                    video_id,
                    meeting_id,
                    VideoStatus::Transcribed,
                )?;
            }
        }
        Step::Blog => {
            let content = detail_str(detail, &["content"]).ok_or_else(|| {
                PipelineError::InvalidPayload("blog completion requires data.content".to_string())
            })?;
            let meeting =
                MeetingRepository::get(conn, meeting_id)?.ok_or(PipelineError::NotFound(meeting_id))?;

            let id = detail_str(detail, &["blog_id"])
                .map(|raw| {
                    Uuid::parse_str(raw).map_err(|_| {
                        PipelineError::InvalidPayload(format!("blog_id {:?} is not a UUID", raw))
                    })
                })
                .transpose()?;

            let post = BlogPostRepository::insert(
                conn,
                &NewBlogPost {
                    id,
                    meeting_id,
                    title: detail_str(detail, &["title"])
                        .unwrap_or(&meeting.title)
                        .to_string(),
                    content: content.to_string(),
                    summary: detail_str(detail, &["summary"]).map(str::to_string),
                    keywords: detail_keywords(detail),
                },
            )?;
            debug!("Meeting {} stored blog post {}", meeting_id, post.id);
        }
        Step::Poster => {
            let blog_post = BlogPostRepository::get_for_meeting(conn, meeting_id)?;
            let image_url = detail_str(detail, &["image_url", "poster_url"]).map(str::to_string);
            let content = detail_str(detail, &["caption", "content"])
                .map(str::to_string)
                .or_else(|| blog_post.as_ref().and_then(|p| p.summary.clone()))
                .unwrap_or_default();

            match SocialPostRepository::latest_for_meeting(conn, meeting_id)? {
                Some(existing) => {
                    SocialPostRepository::attach_artwork(
                        conn,
                        existing.id,
                        image_url.as_deref(),
                        Some(content.as_str()).filter(|c| !c.is_empty()),
                    )?;
                }
                None => {
                    SocialPostRepository::insert(
                        conn,
                        &NewSocialPost {
                            meeting_id,
                            blog_post_id: blog_post.as_ref().map(|p| p.id),
                            platform: detail_str(detail, &["platform"])
                                .unwrap_or(FACEBOOK)
                                .to_string(),
                            image_url,
                            content,
                        },
                    )?;
                }
            }
        }
        Step::FacebookPost => {
            let blog_post = BlogPostRepository::get_for_meeting(conn, meeting_id)?;
            let post_id = detail_str(detail, &["facebook_post_id", "post_id"]);
            let post_url = detail_str(detail, &["facebook_post_url", "post_url"]);

            if let Some(blog_post) = &blog_post {
                BlogPostRepository::set_facebook_post(conn, blog_post.id, post_id, post_url)?;
            }

            let social = match SocialPostRepository::latest_for_meeting(conn, meeting_id)? {
                Some(existing) => existing,
                None => SocialPostRepository::insert(
                    conn,
                    &NewSocialPost {
                        meeting_id,
                        blog_post_id: blog_post.as_ref().map(|p| p.id),
                        platform: FACEBOOK.to_string(),
                        image_url: detail_str(detail, &["image_url"]).map(str::to_string),
                        content: blog_post
                            .as_ref()
                            .and_then(|p| p.summary.clone())
                            .unwrap_or_default(),
                    },
                )?,
            };

            SocialPostRepository::mark_posted(conn, social.id, post_id, post_url)?;
            SocialPostRepository::append_platform(conn, social.id, FACEBOOK)?;
        }
    }

    Ok(())
}

/// First non-empty string among `keys` in the detail object.
fn detail_str<'a>(detail: Option<&'a Value>, keys: &[&str]) -> Option<&'a str> {
    let detail = detail?;
    keys.iter()
        .filter_map(|key| detail.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
}

fn detail_video_id(meeting_id: Uuid, detail: Option<&Value>) -> Option<Uuid> {
    let raw = detail_str(detail, &["video_id"])?;
    match Uuid::parse_str(raw) {
        Ok(id) => Some(id),
        Err(_) => {
            warn!("Meeting {} ignoring malformed video_id {:?}", meeting_id, raw);
            None
        }
    }
}

/// Keywords arrive either as a JSON array or a comma-separated string.
fn detail_keywords(detail: Option<&Value>) -> Vec<String> {
    match detail.and_then(|d| d.get("keywords")) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(raw)) => raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
