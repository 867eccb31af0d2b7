//! REST API server for postmeet.
//!
//! Provides HTTP endpoints for:
//! - Video upload and meeting-id intake
//! - Automation callbacks (webhooks)
//! - Meeting inspection, manual retry and stale step reports
//! - Serving uploaded videos to the transcription service

pub mod error;
pub mod routes;

use crate::config::Config;
use crate::dispatch::{dispatch_all, ActionDispatcher};
use crate::pipeline::{FollowUpAction, ProcessingCoordinator};
use crate::transcripts::TranscriptSource;
use crate::webhook::CallbackReconciler;
use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;

use self::error::{ApiError, ApiResult};

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: ProcessingCoordinator,
    pub reconciler: CallbackReconciler,
    pub dispatcher: Arc<dyn ActionDispatcher>,
    pub transcripts: Option<Arc<dyn TranscriptSource>>,
    pub uploads_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub stale_after_minutes: i64,
}

impl AppState {
    pub fn new(
        coordinator: ProcessingCoordinator,
        dispatcher: Arc<dyn ActionDispatcher>,
        uploads_dir: PathBuf,
    ) -> Self {
        Self {
            reconciler: CallbackReconciler::new(coordinator.clone()),
            coordinator,
            dispatcher,
            transcripts: None,
            uploads_dir,
            max_upload_bytes: 500 * 1024 * 1024,
            stale_after_minutes: 60,
        }
    }

    pub fn with_transcripts(mut self, source: Arc<dyn TranscriptSource>) -> Self {
        self.transcripts = Some(source);
        self
    }

    pub fn with_limits(mut self, max_upload_bytes: usize, stale_after_minutes: i64) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self.stale_after_minutes = stale_after_minutes;
        self
    }

    /// Run blocking store work off the async runtime.
    pub async fn blocking<T, F>(&self, f: F) -> ApiResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ProcessingCoordinator) -> Result<T, crate::pipeline::PipelineError>
            + Send
            + 'static,
    {
        let coordinator = self.coordinator.clone();
        let result = tokio::task::spawn_blocking(move || f(&coordinator)).await?;
        result.map_err(ApiError::from)
    }

    /// Deliver follow-up actions after their transition has been committed.
    pub async fn dispatch(&self, actions: &[FollowUpAction]) -> usize {
        if actions.is_empty() {
            return 0;
        }
        dispatch_all(self.dispatcher.as_ref(), actions).await
    }
}

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state.clone())
        .nest("/api", routes::router(state))
        .layer(ServiceBuilder::new())
}

pub struct ApiServer {
    host: String,
    port: u16,
    state: AppState,
}

impl ApiServer {
    pub fn new(state: AppState, config: &Config) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            state,
        }
    }

    pub async fn start(self) -> Result<()> {
        let app = app(self.state);
        let addr = format!("{}:{}", self.host, self.port);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("API server listening on http://{}", addr);
        info!("Endpoints:");
        info!("  GET  /health                          - Service and store health");
        info!("  POST /api/upload                      - Upload a meeting video");
        info!("  POST /api/process-meeting             - Import a meeting by id");
        info!("  GET  /api/upload/status/:meeting_id   - Per-step status");
        info!("  POST /api/webhook                     - Automation callback");
        info!("  POST /api/webhook/video-upload        - Video upload flow callback");
        info!("  POST /api/webhook/meeting-id          - Meeting id flow callback");
        info!("  GET  /api/meetings                    - List meetings");
        info!("  GET  /api/meetings/stale              - Steps stuck in progress");
        info!("  GET  /api/meetings/:id                - Meeting detail");
        info!("  POST /api/meetings/:id/retry/:step    - Retry a step");
        info!("  GET  /api/videos/:id/info             - Video metadata");
        info!("  GET  /api/videos/:id/file             - Video download");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let coordinator = state.coordinator.clone();
    let store = tokio::task::spawn_blocking(move || coordinator.store().ping()).await;

    match store {
        Ok(Ok(())) => (
            StatusCode::OK,
            Json(json!({
                "service": "postmeet",
                "version": env!("CARGO_PKG_VERSION"),
                "status": "healthy",
                "database": "connected",
            })),
        ),
        Ok(Err(e)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "service": "postmeet",
                "version": env!("CARGO_PKG_VERSION"),
                "status": "unhealthy",
                "database": e.to_string(),
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "service": "postmeet",
                "status": "unhealthy",
                "database": e.to_string(),
            })),
        ),
    }
}
