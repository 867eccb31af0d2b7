//! Inbound callback shapes and their normalization into [`CanonicalEvent`].
//!
//! Two automation flows post progress callbacks:
//!
//! - video upload: `{meeting_id, video_id, step, data, status?, error?}`
//! - meeting id:   `{meeting_id, step, data: {source, supabase_meeting_id, ..}, status?, error?}`
//!
//! Anything else is treated as a direct callback, which is accepted for every
//! step except `transcription`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::pipeline::{CanonicalEvent, PipelineError, Step, StepStatus};

/// Which automation flow a callback belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackFlow {
    VideoUpload,
    MeetingRef,
    Direct,
}

impl CallbackFlow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VideoUpload => "video_upload",
            Self::MeetingRef => "meeting_ref",
            Self::Direct => "direct",
        }
    }
}

/// Wire form of a callback, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCallback {
    pub meeting_id: Option<String>,
    pub video_id: Option<String>,
    pub step: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    pub status: Option<String>,
    pub error: Option<Value>,
}

/// A validated callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackPayload {
    pub flow: CallbackFlow,
    pub event: CanonicalEvent,
}

impl CallbackPayload {
    /// Parse a JSON body.
    pub fn from_value(body: Value) -> Result<Self, PipelineError> {
        let raw: RawCallback = serde_json::from_value(body)
            .map_err(|e| PipelineError::InvalidPayload(format!("malformed callback: {}", e)))?;
        raw.normalize()
    }
}

impl RawCallback {
    pub fn normalize(self) -> Result<CallbackPayload, PipelineError> {
        let meeting_id = required(self.meeting_id.as_deref(), "meeting_id")?;
        let meeting_id = Uuid::parse_str(meeting_id).map_err(|_| {
            PipelineError::InvalidPayload(format!("meeting_id {:?} is not a UUID", meeting_id))
        })?;
        let step = Step::parse(required(self.step.as_deref(), "step")?)?;

        let mut data = match self.data {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(PipelineError::InvalidPayload(
                    "data must be an object".to_string(),
                ))
            }
        };

        let video_id = non_empty(self.video_id.as_deref());
        let flow = if video_id.is_some() {
            CallbackFlow::VideoUpload
        } else if has_string(&data, "source") || has_string(&data, "supabase_meeting_id") {
            CallbackFlow::MeetingRef
        } else {
            CallbackFlow::Direct
        };

        if step == Step::Transcription && flow == CallbackFlow::Direct {
            return Err(PipelineError::InvalidPayload(
                "transcription callbacks need video_id or data.source".to_string(),
            ));
        }

        if let Some(video_id) = video_id {
            Uuid::parse_str(video_id).map_err(|_| {
                PipelineError::InvalidPayload(format!("video_id {:?} is not a UUID", video_id))
            })?;
            data.insert("video_id".to_string(), Value::String(video_id.to_string()));
        }

        let error_message = error_text(self.error.as_ref());
        let target_status = target_status(self.status.as_deref(), error_message.is_some())?;

        let detail = (!data.is_empty()).then_some(Value::Object(data));

        Ok(CallbackPayload {
            flow,
            event: CanonicalEvent {
                meeting_id,
                step,
                target_status,
                detail,
                error_message,
            },
        })
    }
}

/// `error` wins, then an explicit `status`, then `completed`.
fn target_status(status: Option<&str>, has_error: bool) -> Result<StepStatus, PipelineError> {
    let explicit = match non_empty(status) {
        Some(raw) => Some(StepStatus::parse(raw).ok_or_else(|| {
            PipelineError::InvalidPayload(format!("unknown status {:?}", raw))
        })?),
        None => None,
    };

    match (has_error, explicit) {
        (true, None) | (true, Some(StepStatus::Failed)) => Ok(StepStatus::Failed),
        (true, Some(other)) => Err(PipelineError::InvalidPayload(format!(
            "error reported with status {}",
            other
        ))),
        (false, Some(status)) => Ok(status),
        (false, None) => Ok(StepStatus::Completed),
    }
}

fn error_text(error: Option<&Value>) -> Option<String> {
    match error? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(Value::Object(map.clone()).to_string())),
        other => Some(other.to_string()),
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, PipelineError> {
    non_empty(value).ok_or_else(|| PipelineError::InvalidPayload(format!("missing {}", field)))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn has_string(data: &Map<String, Value>, key: &str) -> bool {
    non_empty(data.get(key).and_then(Value::as_str)).is_some()
}
