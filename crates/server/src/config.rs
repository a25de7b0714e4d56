use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sluice_mcp::tools::{builtin_catalog, BUILTIN_TOOL_SOURCE};
use sluice_mcp::{SessionManager, ENDPOINT_EVENT};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub session: SessionConfig,
}

/// Settings applied to every session opened on `/sse`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_message_path")]
    pub message_path: String,

    #[serde(default = "default_tool_source")]
    pub tool_source: String,

    #[serde(default = "default_endpoint_event")]
    pub endpoint_event: String,

    /// Drop-oldest bound on queued events; unbounded when absent
    #[serde(default)]
    pub channel_capacity: Option<usize>,
}

fn default_name() -> String {
    "my_mcp".to_string()
}

fn default_message_path() -> String {
    "/rpc".to_string()
}

fn default_tool_source() -> String {
    BUILTIN_TOOL_SOURCE.to_string()
}

fn default_endpoint_event() -> String {
    ENDPOINT_EVENT.to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            message_path: default_message_path(),
            tool_source: default_tool_source(),
            endpoint_event: default_endpoint_event(),
            channel_capacity: None,
        }
    }
}

impl ServerConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            Self::parse(&content)
        } else {
            tracing::info!("Configuration file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse configuration file")
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let sessions = SessionManager::new(builtin_catalog())
            .with_channel_capacity(config.session.channel_capacity);

        Self {
            sessions: Arc::new(sessions),
            config: Arc::new(config),
        }
    }
}
