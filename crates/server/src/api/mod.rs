use crate::config::{AppState, ServerConfig};
use anyhow::Result;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sluice_mcp::McpError;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

mod handlers;

/// Start the API server
pub async fn serve(addr: &str, config: ServerConfig) -> Result<()> {
    let state = AppState::new(config);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the API router
fn create_router(state: AppState) -> Router {
    let message_path = state.config.session.message_path.clone();

    Router::new()
        // MCP transport
        .route("/sse", get(handlers::open_stream))
        .route(&message_path, post(handlers::push_message))
        // Diagnostics
        .route("/api/health", get(health_check))
        .route("/api/sessions", get(handlers::list_sessions))
        .route("/api/sessions/{session_id}", delete(handlers::delete_session))
        // Middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "sluice",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// Custom error type for API handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing 'client_id' in params")]
    MissingClientId,

    #[error("Client with client_id '{0}' not found")]
    SessionNotFound(String),

    /// Raised by the session core while handling a request
    #[error("Failed to process request")]
    Dispatch(#[from] McpError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, response) = match &self {
            ApiError::MissingClientId => (StatusCode::BAD_REQUEST, ErrorResponse::new(self.to_string())),
            ApiError::SessionNotFound(_) => (StatusCode::NOT_FOUND, ErrorResponse::new(self.to_string())),
            ApiError::Dispatch(e) => {
                tracing::error!("Failed to process request: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details(self.to_string(), e.to_string()),
                )
            }
            ApiError::Internal(e) => {
                let details = e.chain().skip(1).map(|e| e.to_string()).collect::<Vec<_>>().join(": ");
                let response = if details.is_empty() {
                    ErrorResponse::new(e.to_string())
                } else {
                    ErrorResponse::with_details(e.to_string(), details)
                };
                (StatusCode::INTERNAL_SERVER_ERROR, response)
            }
        };

        (status, Json(response)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::Body;
    use axum::http::Request;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> (Router, Arc<sluice_mcp::SessionManager>) {
        let state = AppState::new(ServerConfig::default());
        let sessions = state.sessions.clone();
        (create_router(state), sessions)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Split one SSE frame into its event name and data
    fn parse_frame(bytes: &[u8]) -> (String, String) {
        let text = std::str::from_utf8(bytes).unwrap();
        let mut event = String::new();
        let mut data = String::new();
        for line in text.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                event = value.trim_start().to_string();
            } else if let Some(value) = line.strip_prefix("data:") {
                data = value.trim_start().to_string();
            }
        }
        (event, data)
    }

    fn rpc(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_rpc_without_client_id() {
        let (app, _) = app();
        let response = app
            .oneshot(rpc("/rpc", json!({"jsonrpc": "2.0", "method": "initialize"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Missing 'client_id' in params");
    }

    #[tokio::test]
    async fn test_rpc_with_unknown_client_id() {
        let (app, _) = app();
        let response = app
            .oneshot(rpc(
                "/rpc?client_id=nope",
                json!({"jsonrpc": "2.0", "method": "initialize"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rpc_unknown_tool_is_server_error() {
        let (app, sessions) = app();
        let session = sessions.create_session("my_mcp", "/rpc", "services");

        let response = app
            .oneshot(rpc(
                &format!("/rpc?client_id={}", session.id()),
                json!({
                    "id": 1,
                    "jsonrpc": "2.0",
                    "method": "tools/call",
                    "params": {"name": "multiply", "arguments": {}}
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Failed to process request");
        assert_eq!(body["details"], "Tool 'multiply' not found");
        assert_eq!(session.pending_events(), 0);
    }

    #[tokio::test]
    async fn test_sse_round_trip() {
        let (app, sessions) = app();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/event-stream"
        );

        let mut frames = response.into_body().into_data_stream();
        let first = frames.next().await.unwrap().unwrap();
        let (event, endpoint) = parse_frame(&first);
        assert_eq!(event, "endpoint");
        assert!(endpoint.starts_with("/rpc?client_id="));
        assert_eq!(sessions.len(), 1);

        let response = app
            .clone()
            .oneshot(rpc(
                &endpoint,
                json!({
                    "id": 7,
                    "jsonrpc": "2.0",
                    "method": "tools/call",
                    "params": {"name": "add", "arguments": {"a": 2, "b": 3}}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));

        let second = frames.next().await.unwrap().unwrap();
        let (event, data) = parse_frame(&second);
        assert_eq!(event, "message");
        assert_eq!(
            data,
            r#"{"jsonrpc":"2.0","result":{"content":[{"type":"text","text":"5"}],"isError":false},"id":7}"#
        );

        drop(frames);
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_list_and_delete_sessions() {
        let (app, sessions) = app();
        let session = sessions.create_session("my_mcp", "/rpc", "services");

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["sessions"][0]["id"], session.id());
        assert_eq!(body["sessions"][0]["state"], "created");
        assert_eq!(body["sessions"][0]["tools"], 5);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("DELETE")
                        .uri(format!("/api/sessions/{}", session.id()))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }

        assert!(sessions.is_empty());
        assert!(session.is_closed());
    }
}
