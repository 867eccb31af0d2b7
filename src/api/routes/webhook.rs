//! Automation callback endpoints.

use crate::api::error::ApiResult;
use crate::api::AppState;
use crate::webhook::{CallbackFlow, ReconcileOutcome};
use axum::{extract::State, response::Json, routing::post, Router};
use serde_json::{json, Value};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(any_callback))
        .route("/webhook/video-upload", post(video_upload_callback))
        .route("/webhook/meeting-id", post(meeting_id_callback))
        .with_state(state)
}

/// POST /api/webhook - callback of either flow.
async fn any_callback(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    handle(state, body, None).await
}

/// POST /api/webhook/video-upload
async fn video_upload_callback(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    handle(state, body, Some(CallbackFlow::VideoUpload)).await
}

/// POST /api/webhook/meeting-id
async fn meeting_id_callback(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    handle(state, body, Some(CallbackFlow::MeetingRef)).await
}

async fn handle(state: AppState, body: Value, expected: Option<CallbackFlow>) -> ApiResult<Json<Value>> {
    let reconciler = state.reconciler.clone();
    let outcome = state
        .blocking(move |_| reconciler.reconcile_as(body, expected))
        .await?;

    match outcome {
        ReconcileOutcome::Duplicate => Ok(Json(json!({
            "success": true,
            "outcome": "duplicate",
            "message": "Callback already processed",
        }))),
        ReconcileOutcome::Applied(applied) => {
            let dispatched = state.dispatch(&applied.actions).await;
            Ok(Json(json!({
                "success": true,
                "outcome": "applied",
                "message": format!("{} marked {}", applied.step, applied.to),
                "data": {
                    "meeting_id": applied.meeting_id,
                    "step": applied.step,
                    "from": applied.from,
                    "to": applied.to,
                    "actions": applied.actions,
                    "dispatched": dispatched,
                },
            })))
        }
    }
}
