pub mod meetings;
pub mod upload;
pub mod videos;
pub mod webhook;

use super::AppState;
use axum::Router;

/// Routes mounted under `/api`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(upload::router(state.clone()))
        .merge(webhook::router(state.clone()))
        .merge(meetings::router(state.clone()))
        .merge(videos::router(state))
}
