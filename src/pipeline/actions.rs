//! Follow-up actions returned by the coordinator.
//!
//! An action names the external request that should be made next and carries
//! its payload. The coordinator only builds them; dispatching is the caller's
//! job (see `dispatch::AutomationClient`).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::status::Step;
use crate::db::{BlogPostRecord, MeetingRecord, VideoFileRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    RequestTranscription,
    RequestContentGeneration,
    RequestPoster,
    RequestSocialPublish,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestTranscription => "request_transcription",
            Self::RequestContentGeneration => "request_content_generation",
            Self::RequestPoster => "request_poster",
            Self::RequestSocialPublish => "request_social_publish",
        }
    }

    /// The request that starts work on `step`.
    pub fn for_step(step: Step) -> Self {
        match step {
            Step::Transcription => Self::RequestTranscription,
            Step::Blog => Self::RequestContentGeneration,
            Step::Poster => Self::RequestPoster,
            Step::FacebookPost => Self::RequestSocialPublish,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpAction {
    pub action: ActionKind,
    pub meeting_id: Uuid,
    pub payload: Value,
}

/// Context available when building the request for a step.
#[derive(Default)]
pub struct ActionContext<'a> {
    pub blog_post: Option<&'a BlogPostRecord>,
    pub video: Option<&'a VideoFileRecord>,
    pub public_base_url: Option<&'a str>,
}

impl FollowUpAction {
    pub fn for_step(step: Step, meeting: &MeetingRecord, ctx: &ActionContext<'_>) -> Self {
        let mut payload = json!({
            "meeting_id": meeting.id,
            "meeting_title": meeting.title,
            "organization_id": meeting.organization_id,
        });

        let extra = match step {
            Step::Transcription => {
                let mut extra = json!({ "source": source_of(meeting) });
                if let Some(video) = ctx.video {
                    extra["video_id"] = json!(video.id);
                    if let Some(base) = ctx.public_base_url {
                        extra["video_url"] = json!(video_url(base, video.id));
                    }
                }
                if let Some(external) = &meeting.external_meeting_ref {
                    extra["supabase_meeting_id"] = json!(external);
                }
                extra
            }
            Step::Blog => json!({
                "transcript": meeting.transcript,
                "summary": meeting.summary,
                "source": source_of(meeting),
            }),
            Step::Poster => blog_fields(ctx.blog_post),
            Step::FacebookPost => {
                let mut extra = blog_fields(ctx.blog_post);
                extra["platform"] = json!("facebook");
                if let Some(post) = ctx.blog_post {
                    extra["content"] = json!(post.content);
                }
                extra
            }
        };

        merge(&mut payload, extra);

        Self {
            action: ActionKind::for_step(step),
            meeting_id: meeting.id,
            payload,
        }
    }
}

/// Public URL the transcription service downloads the upload from.
pub fn video_url(base_url: &str, video_id: Uuid) -> String {
    format!("{}/api/videos/{}/file", base_url.trim_end_matches('/'), video_id)
}

fn source_of(meeting: &MeetingRecord) -> &'static str {
    if meeting.external_meeting_ref.is_some() {
        "supabase"
    } else {
        "video_upload"
    }
}

fn blog_fields(post: Option<&BlogPostRecord>) -> Value {
    match post {
        Some(post) => json!({
            "blog_post_id": post.id,
            "title": post.title,
            "summary": post.summary,
            "keywords": post.keywords,
        }),
        None => json!({}),
    }
}

fn merge(target: &mut Value, extra: Value) {
    if let (Value::Object(target), Value::Object(extra)) = (target, extra) {
        target.extend(extra);
    }
}
