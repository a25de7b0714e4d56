//! Error types for the session core.

/// Result type for session operations.
pub type McpResult<T> = Result<T, McpError>;

/// Errors raised out of `McpSession::dispatch` and the tool registry.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// `tools/call` named a tool absent from the registry.
    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    /// A tool raised instead of returning an error text block.
    #[error("Tool '{name}' failed: {source}")]
    ToolFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// Request params were missing or malformed.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// The request carried a `jsonrpc` tag other than "2.0".
    #[error("Unsupported JSON-RPC version: {0}")]
    UnsupportedVersion(String),

    /// The session's event channel has been closed.
    #[error("Event channel closed")]
    ChannelClosed,

    /// Serialization/deserialization error.
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}
