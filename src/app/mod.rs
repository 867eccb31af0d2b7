use crate::api::{ApiServer, AppState};
use crate::config::Config;
use crate::db::Store;
use crate::dispatch::{ActionDispatcher, AutomationClient};
use crate::global;
use crate::pipeline::ProcessingCoordinator;
use crate::transcripts::{SupabaseTranscriptSource, TranscriptSource};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub async fn run_service() -> Result<()> {
    info!("Starting postmeet service");

    let config = Config::load()?;
    let state = build_state(&config)?;

    let api_server = ApiServer::new(state, &config);
    info!("postmeet is ready!");
    api_server.start().await
}

/// Wire the store, coordinator and outbound clients from configuration.
pub fn build_state(config: &Config) -> Result<AppState> {
    let store = Arc::new(Store::open_default()?);
    let coordinator =
        ProcessingCoordinator::new(store).with_public_base_url(config.server.base_url.clone());

    if config.automation.webhook_url.is_empty() {
        warn!("automation.webhook_url is not set, follow-up requests without a specific URL will be skipped");
    }
    let dispatcher: Arc<dyn ActionDispatcher> =
        Arc::new(AutomationClient::new(config.automation.clone())?);

    let mut state = AppState::new(coordinator, dispatcher, global::uploads_dir()?).with_limits(
        config.server.max_upload_bytes(),
        config.pipeline.stale_after_minutes,
    );

    if config.transcripts.is_configured() {
        let source: Arc<dyn TranscriptSource> = Arc::new(SupabaseTranscriptSource::new(
            &config.transcripts.supabase_url,
            &config.transcripts.supabase_key,
            Duration::from_secs(config.automation.timeout_seconds.max(1)),
        )?);
        state = state.with_transcripts(source);
    } else {
        warn!("Supabase is not configured, /api/process-meeting is disabled");
    }

    Ok(state)
}
