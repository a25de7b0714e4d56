// MCP session: per-client identity, tool registry, and event channel

use crate::channel::{Event, EventChannel};
use crate::error::{McpError, McpResult};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, JSONRPC_VERSION,
};
use crate::tools::ToolRegistry;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::Mutex;

/// Protocol state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    /// The bootstrap event has been queued
    Opened,
    Active,
}

pub struct McpSession {
    id: String,
    name: String,
    request_path: String,
    created_at: DateTime<Utc>,
    registry: ToolRegistry,
    channel: Arc<EventChannel>,
    info: InitializeResult,
    state: Mutex<SessionState>,
}

impl McpSession {
    pub fn new(
        name: impl Into<String>,
        request_path: impl Into<String>,
        registry: ToolRegistry,
        channel: EventChannel,
    ) -> Self {
        let name = name.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            info: InitializeResult::for_server(name.clone()),
            name,
            request_path: request_path.into(),
            created_at: Utc::now(),
            registry,
            channel: Arc::new(channel),
            state: Mutex::new(SessionState::Created),
        }
    }

    /// Client identity, used as the routing key
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request_path(&self) -> &str {
        &self.request_path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn capabilities(&self) -> &InitializeResult {
        &self.info
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of events waiting to be drained
    pub fn pending_events(&self) -> usize {
        self.channel.len()
    }

    /// Address the client must post its requests to
    pub fn endpoint(&self) -> String {
        format!("{}?client_id={}", self.request_path, self.id)
    }

    /// Queue the bootstrap event carrying the request address.
    ///
    /// Calling this twice queues a second bootstrap event.
    pub fn open(&self, kind: &str) -> McpResult<()> {
        self.channel.put(Event::new(kind, self.endpoint()))?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == SessionState::Created {
            *state = SessionState::Opened;
        }

        tracing::info!("Session {} opened, endpoint event queued", self.id);
        Ok(())
    }

    /// Handle one JSON-RPC request.
    ///
    /// Responses are queued on the event channel, never returned. Unknown
    /// methods are ignored. Tool failures are returned to the caller and
    /// queue nothing.
    pub async fn dispatch(&self, request: JsonRpcRequest) -> McpResult<()> {
        if request.jsonrpc != JSONRPC_VERSION {
            return Err(McpError::UnsupportedVersion(request.jsonrpc));
        }

        self.activate();
        tracing::debug!(
            "Session {} dispatching {} (id={:?})",
            self.id,
            request.method,
            request.id
        );

        match request.method.as_str() {
            "initialize" => self.respond(request.id, &self.info),
            "tools/list" => {
                let tools = self.registry.list();
                tracing::debug!("Listing {} available tools", tools.len());
                self.respond(request.id, &ListToolsResult { tools })
            }
            "tools/call" => {
                let params = request
                    .params
                    .ok_or_else(|| McpError::InvalidParams("Missing params".to_string()))?;
                let params: CallToolParams = serde_json::from_value(params.into())
                    .map_err(|e| McpError::InvalidParams(e.to_string()))?;

                let content = self
                    .registry
                    .invoke(&params.name, params.arguments.unwrap_or_default())
                    .await
                    .inspect_err(|e| tracing::error!("Tool call failed: {}", e))?;

                self.respond(
                    request.id,
                    &CallToolResult {
                        content,
                        is_error: false,
                    },
                )
            }
            other => {
                tracing::warn!("Session {} ignoring unsupported method {}", self.id, other);
                Ok(())
            }
        }
    }

    /// Stream of queued events; ends only once the channel is closed
    pub fn reader(&self) -> impl Stream<Item = Event> + Send + 'static {
        let channel = self.channel.clone();
        let id = self.id.clone();

        async_stream::stream! {
            while let Some(event) = channel.get().await {
                tracing::info!("Session {} pushing {} event", id, event.kind);
                yield event;
            }
            tracing::debug!("Session {} reader finished", id);
        }
    }

    /// Close the event channel, ending any reader
    pub fn close(&self) {
        self.channel.close();
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    fn activate(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == SessionState::Opened {
            *state = SessionState::Active;
        }
    }

    fn respond(&self, id: Option<i64>, result: impl Serialize) -> McpResult<()> {
        let payload = JsonRpcResponse::success(id, result).to_payload()?;
        self.channel.put(Event::message(payload))
    }
}
