//! End-to-end tests through the public API: coordinator, reconciler and the
//! HTTP service on an ephemeral port.

use anyhow::Result;
use async_trait::async_trait;
use postmeet::api::{app, AppState};
use postmeet::db::{MeetingRepository, NewMeeting, Store};
use postmeet::dispatch::{ActionDispatcher, Delivery};
use postmeet::pipeline::{ActionKind, FollowUpAction, ProcessingCoordinator, Step, StepStatus};
use postmeet::transcripts::{MeetingTranscript, TranscriptSource};
use postmeet::webhook::{CallbackReconciler, ReconcileOutcome};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
struct RecordingDispatcher {
    sent: Mutex<Vec<FollowUpAction>>,
}

impl RecordingDispatcher {
    fn kinds(&self) -> Vec<ActionKind> {
        self.sent.lock().unwrap().iter().map(|a| a.action).collect()
    }
}

#[async_trait]
impl ActionDispatcher for RecordingDispatcher {
    async fn dispatch(&self, action: &FollowUpAction) -> Result<Delivery> {
        self.sent.lock().unwrap().push(action.clone());
        Ok(Delivery::Delivered)
    }
}

struct FixedTranscripts;

#[async_trait]
impl TranscriptSource for FixedTranscripts {
    async fn fetch(&self, _external_id: &str) -> Result<Option<MeetingTranscript>> {
        Ok(Some(MeetingTranscript {
            title: Some("Planning session".to_string()),
            description: None,
            transcript: "We planned the next release.".to_string(),
            summary: Some("Release planning".to_string()),
        }))
    }
}

fn applied_actions(outcome: ReconcileOutcome) -> Vec<ActionKind> {
    match outcome {
        ReconcileOutcome::Applied(applied) => applied.actions.iter().map(|a| a.action).collect(),
        ReconcileOutcome::Duplicate => panic!("expected the callback to apply"),
    }
}

#[test]
fn test_full_pipeline_through_reconciler() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let meeting = store
        .with_conn(|conn| {
            MeetingRepository::insert(
                conn,
                &NewMeeting {
                    title: "M1".to_string(),
                    organization_id: "org-1".to_string(),
                    external_meeting_ref: Some(Uuid::new_v4().to_string()),
                    ..Default::default()
                },
            )
        })
        .unwrap();
    let id = meeting.id.to_string();
    let reconciler = CallbackReconciler::new(ProcessingCoordinator::new(store));
    let source = json!({"source": "supabase"});

    let actions = applied_actions(
        reconciler
            .reconcile(json!({"meeting_id": id, "step": "transcription", "status": "in_progress", "data": source}))
            .unwrap(),
    );
    assert!(actions.is_empty());

    let actions = applied_actions(
        reconciler
            .reconcile(json!({
                "meeting_id": id,
                "step": "transcription",
                "data": {"source": "supabase", "transcript": "Minutes", "summary": "Short"},
            }))
            .unwrap(),
    );
    assert_eq!(actions, vec![ActionKind::RequestContentGeneration]);

    let actions = applied_actions(
        reconciler
            .reconcile(json!({
                "meeting_id": id,
                "step": "blog",
                "data": {"title": "What we decided", "content": "Long form", "keywords": ["plan"]},
            }))
            .unwrap(),
    );
    assert_eq!(
        actions,
        vec![ActionKind::RequestPoster, ActionKind::RequestSocialPublish]
    );

    let actions = applied_actions(
        reconciler
            .reconcile(json!({
                "meeting_id": id,
                "step": "facebook_post",
                "data": {"facebook_post_id": "fb_1", "facebook_post_url": "https://facebook.com/fb_1"},
            }))
            .unwrap(),
    );
    assert!(actions.is_empty());

    reconciler
        .reconcile(json!({
            "meeting_id": id,
            "step": "poster",
            "data": {"image_url": "https://cdn.example.com/poster.png"},
        }))
        .unwrap();

    // Redelivery of an already-applied callback changes nothing.
    let before = reconciler.coordinator().meeting_detail(meeting.id).unwrap();
    let again = reconciler
        .reconcile(json!({"meeting_id": id, "step": "poster", "data": {"image_url": "x"}}))
        .unwrap();
    assert!(again.is_duplicate());

    let detail = reconciler.coordinator().meeting_detail(meeting.id).unwrap();
    assert_eq!(detail.logs.len(), before.logs.len());
    assert!(detail.meeting.statuses.all_completed());
    assert!(detail.blog_post.is_some());
    assert_eq!(detail.social_posts.len(), 1);
    assert_eq!(detail.social_posts[0].platforms, vec!["facebook"]);

    for step in Step::ALL {
        let path: Vec<StepStatus> = detail
            .logs
            .iter()
            .filter(|l| l.step == step)
            .map(|l| l.status)
            .collect();
        let mut previous = StepStatus::Pending;
        for status in path {
            assert!(
                previous.can_transition_to(status),
                "{} logged illegal {} -> {}",
                step,
                previous,
                status
            );
            previous = status;
        }
        assert_eq!(previous, StepStatus::Completed);
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    dispatcher: Arc<RecordingDispatcher>,
    uploads: tempfile::TempDir,
}

async fn spawn_server() -> TestServer {
    let uploads = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let dispatcher = Arc::new(RecordingDispatcher::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let coordinator = ProcessingCoordinator::new(store).with_public_base_url(base.clone());
    let state = AppState::new(coordinator, dispatcher.clone(), uploads.path().to_path_buf())
        .with_transcripts(Arc::new(FixedTranscripts))
        .with_limits(1024 * 1024, 60);

    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });

    TestServer {
        base,
        client: reqwest::Client::new(),
        dispatcher,
        uploads,
    }
}

impl TestServer {
    async fn post_json(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_upload_and_callbacks_over_http() {
    let server = spawn_server().await;

    let health: Value = server.get("/health").await.json().await.unwrap();
    assert_eq!(health["status"], "healthy");

    let video_bytes = b"not really a video".to_vec();
    let form = reqwest::multipart::Form::new()
        .text("meeting_title", "Weekly sync")
        .text("organization_id", "org-9")
        .part(
            "video",
            reqwest::multipart::Part::bytes(video_bytes.clone()).file_name("weekly sync.mp4"),
        );
    let upload: Value = server
        .client
        .post(format!("{}/api/upload", server.base))
        .multipart(form)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(upload["success"], true);
    let meeting_id = upload["data"]["meeting_id"].as_str().unwrap().to_string();
    let video_id = upload["data"]["video_id"].as_str().unwrap().to_string();

    let sent = server.dispatcher.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].action, ActionKind::RequestTranscription);
    let video_url = sent[0].payload["video_url"].as_str().unwrap().to_string();

    let served = server.client.get(&video_url).send().await.unwrap();
    assert_eq!(served.status().as_u16(), 200);
    assert_eq!(served.bytes().await.unwrap().to_vec(), video_bytes);

    let status: Value = server
        .get(&format!("/api/upload/status/{}", meeting_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(status["data"]["statuses"]["transcription"], "in_progress");

    // Out of order: blog before transcription completes.
    let (code, body) = server
        .post_json(
            "/api/webhook",
            json!({"meeting_id": meeting_id, "step": "blog", "data": {"content": "early"}}),
        )
        .await;
    assert_eq!(code, 409);
    assert_eq!(body["retryable"], true);

    // Legacy step names are not accepted.
    let (code, _) = server
        .post_json(
            "/api/webhook/video-upload",
            json!({"meeting_id": meeting_id, "video_id": video_id, "step": "transcription_complete"}),
        )
        .await;
    assert_eq!(code, 400);

    let callback = json!({
        "meeting_id": meeting_id,
        "video_id": video_id,
        "step": "transcription",
        "data": {"transcript": "Everyone gave updates.", "summary": "Updates"},
    });
    let (code, body) = server.post_json("/api/webhook/video-upload", callback.clone()).await;
    assert_eq!(code, 200);
    assert_eq!(body["outcome"], "applied");

    let (code, body) = server.post_json("/api/webhook/video-upload", callback).await;
    assert_eq!(code, 200);
    assert_eq!(body["outcome"], "duplicate");

    assert_eq!(
        server.dispatcher.kinds(),
        vec![
            ActionKind::RequestTranscription,
            ActionKind::RequestContentGeneration
        ]
    );

    let info: Value = server
        .get(&format!("/api/videos/{}/info", video_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(info["data"]["video"]["processing_status"], "transcribed");

    let missing = server.get(&format!("/api/meetings/{}", Uuid::new_v4())).await;
    assert_eq!(missing.status().as_u16(), 404);

    let listed: Value = server
        .get("/api/meetings?organization_id=org-9")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(listed["data"]["total"], 1);
}

#[tokio::test]
async fn test_upload_rejects_unknown_extension() {
    let server = spawn_server().await;

    let form = reqwest::multipart::Form::new()
        .text("meeting_title", "Notes")
        .text("organization_id", "org-1")
        .part(
            "video",
            reqwest::multipart::Part::bytes(b"text".to_vec()).file_name("notes.txt"),
        );
    let response = server
        .client
        .post(format!("{}/api/upload", server.base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    assert!(server.dispatcher.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_second_video_removes_stored_upload() {
    let server = spawn_server().await;

    let form = reqwest::multipart::Form::new()
        .text("meeting_title", "Retro")
        .text("organization_id", "org-1")
        .part(
            "video",
            reqwest::multipart::Part::bytes(b"first".to_vec()).file_name("retro.mp4"),
        )
        .part(
            "video",
            reqwest::multipart::Part::bytes(b"second".to_vec()).file_name("notes.txt"),
        );
    let response = server
        .client
        .post(format!("{}/api/upload", server.base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let leftovers = std::fs::read_dir(server.uploads.path()).unwrap().count();
    assert_eq!(leftovers, 0);
    assert!(server.dispatcher.sent.lock().unwrap().is_empty());

    let listed: Value = server
        .get("/api/meetings?organization_id=org-1")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(listed["data"]["total"], 0);
}

#[tokio::test]
async fn test_process_meeting_and_retry_over_http() {
    let server = spawn_server().await;
    let external = Uuid::new_v4().to_string();

    let (code, body) = server
        .post_json(
            "/api/process-meeting",
            json!({"meeting_id": external, "organization_id": "org-2"}),
        )
        .await;
    assert_eq!(code, 200);
    assert_eq!(body["data"]["created"], true);
    let meeting_id = body["data"]["meeting_id"].as_str().unwrap().to_string();
    assert_eq!(
        server.dispatcher.kinds(),
        vec![ActionKind::RequestContentGeneration]
    );

    let (_, again) = server
        .post_json(
            "/api/process-meeting",
            json!({"meeting_id": external, "organization_id": "org-2"}),
        )
        .await;
    assert_eq!(again["data"]["created"], false);
    assert_eq!(again["data"]["meeting_id"], meeting_id.as_str());
    assert_eq!(server.dispatcher.kinds().len(), 1);

    let (code, _) = server
        .post_json(
            "/api/webhook/meeting-id",
            json!({
                "meeting_id": meeting_id,
                "step": "blog",
                "error": "generation failed",
                "data": {"source": "supabase", "supabase_meeting_id": external},
            }),
        )
        .await;
    assert_eq!(code, 200);

    let (code, body) = server
        .post_json(&format!("/api/meetings/{}/retry/blog", meeting_id), json!({}))
        .await;
    assert_eq!(code, 200);
    assert_eq!(body["data"]["from"], "failed");
    assert_eq!(body["data"]["to"], "in_progress");
    assert_eq!(
        server.dispatcher.kinds(),
        vec![
            ActionKind::RequestContentGeneration,
            ActionKind::RequestContentGeneration
        ]
    );

    let (code, _) = server
        .post_json(&format!("/api/meetings/{}/retry/blog", meeting_id), json!({}))
        .await;
    assert_eq!(code, 409);

    let (code, _) = server
        .post_json(&format!("/api/meetings/{}/retry/publish", meeting_id), json!({}))
        .await;
    assert_eq!(code, 400);

    let (code, _) = server
        .post_json(
            "/api/process-meeting",
            json!({"meeting_id": "not-a-uuid", "organization_id": "org-2"}),
        )
        .await;
    assert_eq!(code, 400);

    let stale: Value = server
        .get("/api/meetings/stale?minutes=0")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(stale["success"], true);
}
