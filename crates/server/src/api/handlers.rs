use super::{ApiError, ApiResult};
use crate::config::AppState;
use crate::sse;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    Json,
};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use sluice_mcp::protocol::JsonRpcRequest;
use sluice_mcp::SessionState;
use std::convert::Infallible;
use std::sync::Arc;

/// Open a session and stream its events
pub async fn open_stream(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    let settings = &state.config.session;
    let session = state.sessions.create_session(
        &settings.name,
        &settings.message_path,
        &settings.tool_source,
    );
    let stream =
        sse::open_event_stream(state.sessions.clone(), session, &settings.endpoint_event)?;
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub client_id: Option<String>,
}

/// Relay a JSON-RPC request into its session; the response arrives on the stream
pub async fn push_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessageQuery>,
    Json(request): Json<JsonRpcRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let client_id = query
        .client_id
        .filter(|id| !id.is_empty())
        .ok_or(ApiError::MissingClientId)?;
    tracing::info!("Client ID: {}", client_id);

    let session = state
        .sessions
        .get_session(&client_id)
        .ok_or_else(|| ApiError::SessionNotFound(client_id.clone()))?;

    session.dispatch(request).await?;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// List live sessions
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ListSessionsResponse>> {
    let mut sessions: Vec<SessionSummary> = state
        .sessions
        .all_sessions()
        .iter()
        .map(|session| SessionSummary {
            id: session.id().to_string(),
            name: session.name().to_string(),
            request_path: session.request_path().to_string(),
            state: session.state(),
            created_at: session.created_at(),
            pending_events: session.pending_events(),
            tools: session.registry().len(),
        })
        .collect();
    sessions.sort_by_key(|s| s.created_at);

    Ok(Json(ListSessionsResponse { sessions }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub request_path: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub pending_events: usize,
    pub tools: usize,
}

/// Delete a session and close its stream
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> StatusCode {
    if let Some(session) = state.sessions.delete_session(&session_id) {
        session.close();
    }
    StatusCode::NO_CONTENT
}
