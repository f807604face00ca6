pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::generation::handlers as generation;
use crate::report::handlers as report;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes();

    Router::new()
        .route("/", get(health::root_handler))
        .route("/health", get(health::health_handler))
        .route("/generate", post(generation::handle_generate))
        .route("/static/reports/:filename", get(report::handle_download))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
