// MCP (Model Context Protocol) session core
// Sessions push JSON-RPC responses to their client over an event channel

pub mod channel;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod session;
pub mod tools;

pub use channel::{Event, EventChannel, ENDPOINT_EVENT, MESSAGE_EVENT};
pub use error::{McpError, McpResult};
pub use manager::SessionManager;
pub use session::{McpSession, SessionState};
