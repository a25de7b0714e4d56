// MCP tool contract, provider catalog, and per-session tool registry

use crate::error::{McpError, McpResult};
use crate::protocol::{ToolResult, ToolSchema};
use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// JSON Schema type tag of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Number,
    Boolean,
    Object,
    Array,
    String,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
        }
    }
}

/// Declared parameter of a tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    /// `None` when the parameter carries no type declaration
    pub kind: Option<ParamKind>,
    pub has_default: bool,
}

impl ParamSpec {
    /// An untyped parameter without a default
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            has_default: false,
        }
    }

    /// A typed parameter without a default
    pub fn typed(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::new(name)
        }
    }

    /// Mark the parameter as having a default value
    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn schema_type(&self) -> &'static str {
        self.kind.unwrap_or(ParamKind::String).as_str()
    }
}

/// Build an object input schema from a parameter list
pub fn input_schema_for(params: &[ParamSpec]) -> Value {
    let properties: Map<String, Value> = params
        .iter()
        .map(|p| {
            (
                p.name.clone(),
                serde_json::json!({ "type": p.schema_type() }),
            )
        })
        .collect();

    let required: Vec<&str> = params
        .iter()
        .filter(|p| !p.has_default)
        .map(|p| p.name.as_str())
        .collect();

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

/// Tool executor trait
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Human-readable summary, empty when the tool has none
    fn description(&self) -> &str {
        ""
    }

    /// Declared parameters, the sole source of the input schema
    fn params(&self) -> Vec<ParamSpec>;

    /// Deprecated tools are left out of discovery
    fn deprecated(&self) -> bool {
        false
    }

    fn input_schema(&self) -> Value {
        input_schema_for(&self.params())
    }

    /// Get the tool schema for MCP
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }

    /// Invoke the tool with named arguments
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<ToolResult>;
}

/// A unit that contributes tools, constructed with no arguments
pub trait ToolProvider: Send + Sync {
    fn name(&self) -> &str;

    fn tools(&self) -> Vec<Arc<dyn Tool>>;
}

/// Constructor of a provider; failure skips the provider during discovery
pub type ProviderFactory = fn() -> Result<Arc<dyn ToolProvider>>;

struct ProviderEntry {
    name: String,
    factory: ProviderFactory,
}

/// Providers registered up front, grouped by tool source location
#[derive(Default)]
pub struct ProviderCatalog {
    locations: HashMap<String, Vec<ProviderEntry>>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under a location
    pub fn register(
        &mut self,
        location: impl Into<String>,
        name: impl Into<String>,
        factory: ProviderFactory,
    ) -> &mut Self {
        self.locations
            .entry(location.into())
            .or_default()
            .push(ProviderEntry {
                name: name.into(),
                factory,
            });
        self
    }

    /// Locations with at least one registered provider
    pub fn locations(&self) -> Vec<&str> {
        let mut locations: Vec<&str> = self.locations.keys().map(String::as_str).collect();
        locations.sort_unstable();
        locations
    }

    /// Instantiate every provider at `location` and collect its eligible tools
    pub fn discover(&self, location: &str) -> ToolRegistry {
        tracing::info!("Tool discovery started at {}", location);

        let mut registry = ToolRegistry::new();
        let Some(entries) = self.locations.get(location) else {
            tracing::warn!("No tool providers registered at {}", location);
            return registry;
        };

        let mut seen = HashSet::new();
        for entry in entries {
            if !seen.insert(entry.name.as_str()) {
                tracing::debug!("Skip provider {} registered twice at {}", entry.name, location);
                continue;
            }

            let provider = match (entry.factory)() {
                Ok(provider) => provider,
                Err(e) => {
                    tracing::warn!("Failed to instantiate provider {}: {:#}", entry.name, e);
                    continue;
                }
            };

            for tool in provider.tools() {
                if tool.name().starts_with('_') {
                    tracing::debug!("Skip private tool {} of {}", tool.name(), provider.name());
                    continue;
                }
                if tool.deprecated() {
                    tracing::info!(
                        "Skip deprecated tool {} of {}",
                        tool.name(),
                        provider.name()
                    );
                    continue;
                }
                registry.register(tool);
            }
        }

        tracing::info!(
            "Tool discovery finished at {}, found {} tools",
            location,
            registry.len()
        );
        registry
    }
}

/// Tool registry for one session
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool; a name already present keeps its first tool
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> bool {
        if self.contains(tool.name()) {
            tracing::warn!("Duplicate tool name {}, keeping the first registration", tool.name());
            return false;
        }
        self.tools.push(tool);
        true
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// List all tool schemas in registration order
    pub fn list(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    /// Check if a tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a tool by exact name
    pub async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> McpResult<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;

        tool.invoke(arguments)
            .await
            .map_err(|source| McpError::ToolFailed {
                name: name.to_string(),
                source,
            })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ToolContent;
    use serde_json::json;

    struct EchoTool {
        name: &'static str,
        deprecated: bool,
    }

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "Echo the message back"
        }

        fn params(&self) -> Vec<ParamSpec> {
            vec![
                ParamSpec::typed("message", ParamKind::String),
                ParamSpec::typed("times", ParamKind::Number).with_default(),
                ParamSpec::new("note").with_default(),
            ]
        }

        fn deprecated(&self) -> bool {
            self.deprecated
        }

        async fn invoke(&self, arguments: Map<String, Value>) -> Result<ToolResult> {
            let message = arguments
                .get("message")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("missing message"))?;
            Ok(vec![ToolContent::text(message)])
        }
    }

    struct EchoProvider;

    impl ToolProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        fn tools(&self) -> Vec<Arc<dyn Tool>> {
            vec![
                Arc::new(EchoTool { name: "echo", deprecated: false }),
                Arc::new(EchoTool { name: "_helper", deprecated: false }),
                Arc::new(EchoTool { name: "echo_legacy", deprecated: true }),
            ]
        }
    }

    fn echo_provider() -> Result<Arc<dyn ToolProvider>> {
        Ok(Arc::new(EchoProvider))
    }

    fn broken_provider() -> Result<Arc<dyn ToolProvider>> {
        anyhow::bail!("missing credentials")
    }

    #[test]
    fn test_schema_type_tags() {
        let tags: Vec<&str> = [
            ParamKind::Number,
            ParamKind::Boolean,
            ParamKind::Object,
            ParamKind::Array,
            ParamKind::String,
        ]
        .iter()
        .map(|kind| ParamSpec::typed("p", *kind).schema_type())
        .collect();
        assert_eq!(tags, vec!["number", "boolean", "object", "array", "string"]);
        assert_eq!(ParamSpec::new("untyped").schema_type(), "string");
    }

    #[test]
    fn test_schema_derivation() {
        let tool = EchoTool { name: "echo", deprecated: false };
        let schema = tool.schema();

        assert_eq!(schema.name, "echo");
        assert_eq!(schema.description, "Echo the message back");
        assert_eq!(
            schema.input_schema,
            json!({
                "type": "object",
                "properties": {
                    "message": {"type": "string"},
                    "times": {"type": "number"},
                    "note": {"type": "string"}
                },
                "required": ["message"]
            })
        );
    }

    #[test]
    fn test_discovery_filters_private_and_deprecated() {
        let mut catalog = ProviderCatalog::new();
        catalog.register("services", "echo", echo_provider);

        let registry = catalog.discover("services");
        let names: Vec<String> = registry.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["echo"]);
    }

    #[test]
    fn test_discovery_skips_failing_provider() {
        let mut catalog = ProviderCatalog::new();
        catalog
            .register("services", "broken", broken_provider)
            .register("services", "echo", echo_provider);

        let registry = catalog.discover("services");
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("echo"));
    }

    #[test]
    fn test_discovery_of_unknown_location_is_empty() {
        let catalog = ProviderCatalog::new();
        assert!(catalog.discover("nowhere").is_empty());
    }

    #[test]
    fn test_provider_registered_twice_contributes_once() {
        let mut catalog = ProviderCatalog::new();
        catalog
            .register("services", "echo", echo_provider)
            .register("services", "echo", echo_provider);

        assert_eq!(catalog.discover("services").len(), 1);
        assert_eq!(catalog.locations(), vec!["services"]);
    }

    #[test]
    fn test_duplicate_tool_name_keeps_first() {
        let mut registry = ToolRegistry::new();
        assert!(registry.register(Arc::new(EchoTool { name: "echo", deprecated: false })));
        assert!(!registry.register(Arc::new(EchoTool { name: "echo", deprecated: true })));
        assert_eq!(registry.len(), 1);
        assert!(!registry.get("echo").unwrap().deprecated());
    }

    #[tokio::test]
    async fn test_invoke_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool { name: "echo", deprecated: false }));

        let mut arguments = Map::new();
        arguments.insert("message".to_string(), json!("hello"));
        let result = registry.invoke("echo", arguments).await.unwrap();
        assert_eq!(result, vec![ToolContent::text("hello")]);
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("missing", Map::new()).await.unwrap_err();
        assert!(matches!(err, McpError::ToolNotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_invoke_failure_is_wrapped() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool { name: "echo", deprecated: false }));

        let err = registry.invoke("echo", Map::new()).await.unwrap_err();
        assert!(matches!(err, McpError::ToolFailed { ref name, .. } if name == "echo"));
    }
}
