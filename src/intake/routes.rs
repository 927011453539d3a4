//! REST + WebSocket endpoints for intake sessions.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::binder::FieldValue;
use super::manager::{IntakeEvent, IntakeManager};
use super::steps::Direction;
use crate::error::{Error, IntakeError, NavigationError};

/// Shared state for intake routes.
#[derive(Clone)]
pub struct IntakeRouteState {
    pub manager: Arc<IntakeManager>,
}

/// Build the intake REST and WebSocket routes.
pub fn intake_routes(manager: Arc<IntakeManager>) -> Router {
    let state = IntakeRouteState { manager };

    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health))
        .route("/api/intake/steps", get(list_steps))
        .route("/api/intake/sessions", post(create_session))
        .route("/api/intake/sessions/{id}", get(get_session))
        .route("/api/intake/sessions/{id}/render", get(render_step))
        .route("/api/intake/sessions/{id}/members", post(add_member))
        .route(
            "/api/intake/sessions/{id}/members/{key}",
            delete(remove_member),
        )
        .route("/api/intake/sessions/{id}/fields", post(update_field))
        .route("/api/intake/sessions/{id}/next", post(next_step))
        .route("/api/intake/sessions/{id}/previous", post(previous_step))
        .route("/api/intake/sessions/{id}/submit", post(submit))
        .route("/api/intake/submissions", get(list_submissions))
        .route("/ws/intake/{id}", get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Intake(e) => match e {
            IntakeError::SessionNotFound { .. } | IntakeError::MemberNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            IntakeError::MalformedPath { .. }
            | IntakeError::InvalidValue { .. }
            | IntakeError::MissingFirstName { .. }
            | IntakeError::DuplicateMember { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            IntakeError::AlreadySubmitted { .. } | IntakeError::Incomplete { .. } => {
                StatusCode::CONFLICT
            }
            IntakeError::Navigation(nav) => match nav {
                NavigationError::AtFirstStep { .. } | NavigationError::AtLastStep { .. } => {
                    StatusCode::CONFLICT
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        },
        Error::Config(_) | Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: Error) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!(error = %err, "Intake request failed");
    } else {
        debug!(error = %err, "Intake request rejected");
    }
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

/// Malformed request bodies get the same `{"error": ...}` shape as other failures.
fn rejection_response(rejection: JsonRejection) -> Response {
    debug!(error = %rejection.body_text(), "Rejected request body");
    (
        rejection.status(),
        Json(serde_json::json!({"error": rejection.body_text()})),
    )
        .into_response()
}

fn parse_session_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Invalid session ID"})),
        )
            .into_response()
    })
}

/// Turn a manager result into a JSON response.
fn respond<T: serde::Serialize>(status: StatusCode, result: crate::error::Result<T>) -> Response {
    match result {
        Ok(body) => (status, Json(serde_json::json!(body))).into_response(),
        Err(e) => error_response(e),
    }
}

// ── Service info ────────────────────────────────────────────────────────

async fn welcome() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": [
            "Welcome to the family intake API",
            "Start a session with POST /api/intake/sessions",
        ]
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "family-intake"
    }))
}

// ── Steps & sessions ────────────────────────────────────────────────────

async fn list_steps(State(state): State<IntakeRouteState>) -> Response {
    let registry = state.manager.steps();
    let steps: Result<Vec<serde_json::Value>, NavigationError> = registry
        .iter()
        .enumerate()
        .map(|(index, step)| {
            Ok(serde_json::json!({
                "step": step,
                "index": index,
                "progress_percent": registry.progress_percent(step)?,
            }))
        })
        .collect();
    match steps {
        Ok(steps) => Json(serde_json::json!({ "steps": steps })).into_response(),
        Err(e) => error_response(e.into()),
    }
}

async fn create_session(State(state): State<IntakeRouteState>) -> Response {
    respond(StatusCode::CREATED, state.manager.start_session().await)
}

async fn get_session(State(state): State<IntakeRouteState>, Path(id): Path<String>) -> Response {
    let id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, state.manager.get_session(id).await)
}

async fn render_step(State(state): State<IntakeRouteState>, Path(id): Path<String>) -> Response {
    let id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, state.manager.render(id).await)
}

#[derive(Deserialize)]
struct AddMemberRequest {
    key: String,
    first_name: String,
}

async fn add_member(
    State(state): State<IntakeRouteState>,
    Path(id): Path<String>,
    body: Result<Json<AddMemberRequest>, JsonRejection>,
) -> Response {
    let id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    respond(
        StatusCode::CREATED,
        state
            .manager
            .add_member(id, &body.key, &body.first_name)
            .await,
    )
}

async fn remove_member(
    State(state): State<IntakeRouteState>,
    Path((id, key)): Path<(String, String)>,
) -> Response {
    let id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, state.manager.remove_member(id, &key).await)
}

#[derive(Deserialize)]
struct FieldUpdateRequest {
    path: String,
    #[serde(default)]
    value: Option<FieldValue>,
}

async fn update_field(
    State(state): State<IntakeRouteState>,
    Path(id): Path<String>,
    body: Result<Json<FieldUpdateRequest>, JsonRejection>,
) -> Response {
    let id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    respond(
        StatusCode::OK,
        state
            .manager
            .update_field(id, &body.path, body.value.as_ref())
            .await,
    )
}

async fn navigate(state: IntakeRouteState, id: String, direction: Direction) -> Response {
    let id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, state.manager.navigate(id, direction).await)
}

async fn next_step(State(state): State<IntakeRouteState>, Path(id): Path<String>) -> Response {
    navigate(state, id, Direction::Next).await
}

async fn previous_step(State(state): State<IntakeRouteState>, Path(id): Path<String>) -> Response {
    navigate(state, id, Direction::Previous).await
}

async fn submit(State(state): State<IntakeRouteState>, Path(id): Path<String>) -> Response {
    let id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, state.manager.submit(id).await)
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

async fn list_submissions(
    State(state): State<IntakeRouteState>,
    Query(params): Query<ListParams>,
) -> Response {
    respond(
        StatusCode::OK,
        state.manager.list_submitted(params.limit).await,
    )
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<IntakeRouteState>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if let Err(e) = state.manager.get_session(id).await {
        return error_response(e);
    }
    info!(session_id = %id, "WebSocket client connecting");
    ws.on_upgrade(move |socket| handle_socket(socket, state.manager, id))
}

/// Send the current session snapshot. Returns false if the client is gone.
async fn send_sync(socket: &mut WebSocket, manager: &IntakeManager, id: Uuid) -> bool {
    let session = match manager.get_session(id).await {
        Ok(session) => session,
        Err(e) => {
            warn!(session_id = %id, error = %e, "Cannot sync session");
            return false;
        }
    };
    send_event(socket, &IntakeEvent::SessionSync { session }).await
}

async fn send_event(socket: &mut WebSocket, event: &IntakeEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize intake event");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, manager: Arc<IntakeManager>, id: Uuid) {
    // Subscribe before the initial sync so no event falls in between.
    let mut rx = manager.subscribe();

    if !send_sync(&mut socket, &manager, id).await {
        warn!(session_id = %id, "Failed to send initial sync, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) if event.session_id() == id => {
                        if !send_event(&mut socket, &event).await {
                            debug!(session_id = %id, "Client disconnected during send");
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        warn!(session_id = %id, missed = n, "WS client lagged behind broadcast");
                        if !send_sync(&mut socket, &manager, id).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(session_id = %id, "WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        }
    }
}
