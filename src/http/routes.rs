use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session lifecycle
        .route("/session/start", post(handlers::start_session))
        .route("/session/stop", post(handlers::stop_session))
        // Turn control
        .route("/session/record/start", post(handlers::start_recording))
        .route("/session/record/stop", post(handlers::stop_recording))
        .route("/session/say", post(handlers::say))
        // Session queries
        .route("/session/status", get(handlers::get_status))
        .route("/session/results", get(handlers::get_results))
        .route("/session/events", get(handlers::get_events))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
