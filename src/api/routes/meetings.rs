//! Meeting inspection and manual recovery endpoints.
//!
//! - GET  /meetings                   - list, optionally by organization
//! - GET  /meetings/stale             - steps stuck in progress
//! - GET  /meetings/:id               - meeting with logs and content
//! - POST /meetings/:id/retry/:step   - restart a failed or stuck step

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::db::MeetingRepository;
use crate::pipeline::{PipelineError, Step};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
    pub organization_id: Option<String>,
    /// Maximum results (default 20, capped at 100)
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StaleParams {
    pub minutes: Option<i64>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/meetings", get(list_meetings))
        .route("/meetings/stale", get(stale_steps))
        .route("/meetings/:id", get(get_meeting))
        .route("/meetings/:id/retry/:step", post(retry_step))
        .with_state(state)
}

async fn list_meetings(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Value>> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let offset = params.offset.unwrap_or(0);
    let organization_id = params.organization_id.filter(|o| !o.is_empty());

    let (meetings, total) = state
        .blocking(move |coordinator| {
            coordinator.store().with_conn(|conn| {
                let org = organization_id.as_deref();
                let meetings = MeetingRepository::list(conn, org, limit, offset)?;
                let total = MeetingRepository::count(conn, org)?;
                Ok::<_, PipelineError>((meetings, total))
            })
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "meetings": meetings,
            "total": total,
            "limit": limit,
            "offset": offset,
        },
    })))
}

async fn get_meeting(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let detail = state
        .blocking(move |coordinator| coordinator.meeting_detail(id))
        .await?;

    Ok(Json(json!({ "success": true, "data": detail })))
}

async fn retry_step(
    State(state): State<AppState>,
    Path((id, step)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let step = Step::parse(&step)?;

    let applied = state
        .blocking(move |coordinator| coordinator.retry(id, step))
        .await?;
    let dispatched = state.dispatch(&applied.actions).await;

    info!("Retry of {} for meeting {} requested via API", step, id);

    Ok(Json(json!({
        "success": true,
        "message": format!("{} restarted", step),
        "data": {
            "meeting_id": id,
            "step": step,
            "from": applied.from,
            "to": applied.to,
            "actions": applied.actions,
            "dispatched": dispatched,
        },
    })))
}

async fn stale_steps(
    State(state): State<AppState>,
    Query(params): Query<StaleParams>,
) -> ApiResult<Json<Value>> {
    let minutes = params.minutes.unwrap_or(state.stale_after_minutes);
    if minutes < 0 {
        return Err(ApiError::bad_request("minutes must not be negative"));
    }

    let stale = state
        .blocking(move |coordinator| coordinator.stale_steps(chrono::Duration::minutes(minutes)))
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "threshold_minutes": minutes,
            "steps": stale,
        },
    })))
}

fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::from(PipelineError::InvalidPayload(format!("{:?} is not a meeting id", raw))))
}
