//! Delivery of follow-up actions to the automation platform.
//!
//! Dispatch happens after state is committed. A failed delivery is logged
//! and left for a manual retry; it never rolls back a transition.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::AutomationConfig;
use crate::pipeline::{ActionKind, FollowUpAction};

/// What happened to an action that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// No webhook is configured for the action, nothing was sent.
    Skipped,
}

#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(&self, action: &FollowUpAction) -> Result<Delivery>;
}

/// Dispatch every action in order, logging failures instead of returning them.
/// Returns how many were actually delivered; skipped actions do not count.
pub async fn dispatch_all(dispatcher: &dyn ActionDispatcher, actions: &[FollowUpAction]) -> usize {
    let mut delivered = 0;
    for action in actions {
        match dispatcher.dispatch(action).await {
            Ok(Delivery::Delivered) => delivered += 1,
            Ok(Delivery::Skipped) => {}
            Err(e) => warn!(
                "Meeting {} {} dispatch failed: {:#}",
                action.meeting_id,
                action.action.as_str(),
                e
            ),
        }
    }
    delivered
}

/// Posts actions as JSON to the configured automation webhooks.
pub struct AutomationClient {
    client: reqwest::Client,
    config: AutomationConfig,
}

impl AutomationClient {
    pub fn new(config: AutomationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .context("Failed to build automation HTTP client")?;

        Ok(Self { client, config })
    }

    /// Webhook an action is delivered to, if one is configured.
    pub fn target_url(&self, action: &FollowUpAction) -> Option<&str> {
        let imported = action.payload.get("source").and_then(Value::as_str) == Some("supabase");
        let specific: &str = match action.action {
            ActionKind::RequestTranscription => "",
            ActionKind::RequestContentGeneration if imported => {
                &self.config.meeting_id_webhook_url
            }
            ActionKind::RequestContentGeneration => &self.config.content_generation_url,
            ActionKind::RequestPoster => &self.config.poster_url,
            ActionKind::RequestSocialPublish => &self.config.social_publish_url,
        };

        [specific, self.config.webhook_url.as_str()]
            .into_iter()
            .map(str::trim)
            .find(|url| !url.is_empty())
    }

    fn body(action: &FollowUpAction) -> Value {
        let mut body = match &action.payload {
            Value::Object(map) => Value::Object(map.clone()),
            other => json!({ "payload": other }),
        };
        body["action"] = json!(action.action);
        body["meeting_id"] = json!(action.meeting_id);
        body
    }
}

#[async_trait]
impl ActionDispatcher for AutomationClient {
    async fn dispatch(&self, action: &FollowUpAction) -> Result<Delivery> {
        let Some(url) = self.target_url(action) else {
            warn!(
                "No automation webhook configured for {}, skipping meeting {}",
                action.action.as_str(),
                action.meeting_id
            );
            return Ok(Delivery::Skipped);
        };

        let response = self
            .client
            .post(url)
            .json(&Self::body(action))
            .send()
            .await
            .with_context(|| format!("Failed to call automation webhook {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Automation webhook returned {}: {}",
                status,
                body
            ));
        }

        info!(
            "Dispatched {} for meeting {}",
            action.action.as_str(),
            action.meeting_id
        );
        Ok(Delivery::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn action(kind: ActionKind, payload: Value) -> FollowUpAction {
        FollowUpAction {
            action: kind,
            meeting_id: Uuid::nil(),
            payload,
        }
    }

    fn client() -> AutomationClient {
        AutomationClient::new(AutomationConfig {
            webhook_url: "https://hook.example.com/default".to_string(),
            meeting_id_webhook_url: "https://hook.example.com/meeting-id".to_string(),
            poster_url: "https://hook.example.com/poster".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_routing_with_fallback() {
        let client = client();

        assert_eq!(
            client.target_url(&action(ActionKind::RequestTranscription, json!({}))),
            Some("https://hook.example.com/default")
        );
        assert_eq!(
            client.target_url(&action(
                ActionKind::RequestContentGeneration,
                json!({"source": "supabase"})
            )),
            Some("https://hook.example.com/meeting-id")
        );
        assert_eq!(
            client.target_url(&action(
                ActionKind::RequestContentGeneration,
                json!({"source": "video_upload"})
            )),
            Some("https://hook.example.com/default")
        );
        assert_eq!(
            client.target_url(&action(ActionKind::RequestPoster, json!({}))),
            Some("https://hook.example.com/poster")
        );
    }

    #[test]
    fn test_unconfigured_has_no_target() {
        let client = AutomationClient::new(AutomationConfig::default()).unwrap();
        assert!(client
            .target_url(&action(ActionKind::RequestSocialPublish, json!({})))
            .is_none());
    }

    #[test]
    fn test_body_carries_action_name() {
        let body = AutomationClient::body(&action(
            ActionKind::RequestPoster,
            json!({"title": "Recap"}),
        ));
        assert_eq!(body["action"], "request_poster");
        assert_eq!(body["title"], "Recap");
        assert_eq!(body["meeting_id"], Uuid::nil().to_string());
    }

    struct FlakyDispatcher {
        seen: Mutex<Vec<ActionKind>>,
    }

    #[async_trait]
    impl ActionDispatcher for FlakyDispatcher {
        async fn dispatch(&self, action: &FollowUpAction) -> Result<Delivery> {
            self.seen.lock().unwrap().push(action.action);
            if action.action == ActionKind::RequestPoster {
                anyhow::bail!("poster service down");
            }
            Ok(Delivery::Delivered)
        }
    }

    #[tokio::test]
    async fn test_dispatch_all_continues_past_failures() {
        let dispatcher = FlakyDispatcher {
            seen: Mutex::new(Vec::new()),
        };
        let actions = vec![
            action(ActionKind::RequestPoster, json!({})),
            action(ActionKind::RequestSocialPublish, json!({})),
        ];

        let delivered = dispatch_all(&dispatcher, &actions).await;
        assert_eq!(delivered, 1);
        assert_eq!(dispatcher.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unconfigured_dispatch_is_skipped_not_delivered() {
        let client = AutomationClient::new(AutomationConfig::default()).unwrap();
        let transcription = action(ActionKind::RequestTranscription, json!({}));

        let outcome = client.dispatch(&transcription).await.unwrap();
        assert_eq!(outcome, Delivery::Skipped);
        assert_eq!(dispatch_all(&client, &[transcription]).await, 0);
    }
}
