use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::state::AppState;
use crate::session;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SayRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Connect the transport and activate a session. Establishment is
/// serialized in `AppState`: an existing session is fully torn down
/// first, and at most one connect is in flight at a time.
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    let result = state
        .establish_session(|cancel| session::connect(&state.config, cancel))
        .await;

    match result {
        Ok(Some(new_session)) => {
            let session_id = new_session.session_id().to_string();
            info!(%session_id, "session started");
            (
                StatusCode::OK,
                Json(SessionResponse {
                    session_id,
                    status: "active".to_string(),
                    message: "Session connected".to_string(),
                }),
            )
                .into_response()
        }
        Ok(None) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "session closed during connect".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to start session");
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: format!("Failed to start session: {e}"),
                }),
            )
                .into_response()
        }
    }
}

/// POST /session/stop
/// Tear down the active session. Also cancels an in-flight connect; a
/// stop with no session is a no-op.
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(cancel) = state.connect_cancel.lock().await.as_ref() {
        cancel.store(true, Ordering::SeqCst);
    }

    match state.session.write().await.take() {
        Some(active) => {
            let session_id = active.session_id().to_string();
            active.stop().await;
            info!(%session_id, "session stopped");
            (
                StatusCode::OK,
                Json(SessionResponse {
                    session_id,
                    status: "stopped".to_string(),
                    message: "Session stopped".to_string(),
                }),
            )
                .into_response()
        }
        None => (
            StatusCode::OK,
            Json(SessionResponse {
                session_id: String::new(),
                status: "idle".to_string(),
                message: "No active session".to_string(),
            }),
        )
            .into_response(),
    }
}

/// POST /session/record/start
pub async fn start_recording(State(state): State<AppState>) -> impl IntoResponse {
    with_session(&state, |s| async move { s.start_recording().await }).await
}

/// POST /session/record/stop
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    with_session(&state, |s| async move { s.stop_recording().await }).await
}

/// POST /session/say
/// Inject assistant speech into the conversation
pub async fn say(
    State(state): State<AppState>,
    Json(req): Json<SayRequest>,
) -> impl IntoResponse {
    with_session(&state, |s| async move { s.say(req.text).await }).await
}

/// GET /session/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.session.read().await.as_ref() {
        Some(active) => (StatusCode::OK, Json(active.status().await)).into_response(),
        None => no_session(),
    }
}

/// GET /session/results
/// Extracted assessment results, newest first
pub async fn get_results(State(state): State<AppState>) -> impl IntoResponse {
    match state.session.read().await.as_ref() {
        Some(active) => (StatusCode::OK, Json(active.results().await)).into_response(),
        None => no_session(),
    }
}

/// GET /session/events
/// Debug event log, newest first
pub async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    match state.session.read().await.as_ref() {
        Some(active) => (StatusCode::OK, Json(active.events(query.limit).await)).into_response(),
        None => no_session(),
    }
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn with_session<F, Fut>(state: &AppState, f: F) -> axum::response::Response
where
    F: FnOnce(Arc<crate::session::AssessmentSession>) -> Fut,
    Fut: std::future::Future<Output = crate::error::Result<()>>,
{
    let active = { state.session.read().await.clone() };
    match active {
        Some(active) => match f(active).await {
            Ok(()) => StatusCode::OK.into_response(),
            Err(e) => {
                error!(error = %e, "session command failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: e.to_string(),
                    }),
                )
                    .into_response()
            }
        },
        None => no_session(),
    }
}

fn no_session() -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "No active session".to_string(),
        }),
    )
        .into_response()
}
