pub mod github;
pub mod math;
mod registry;

pub use github::{GithubProvider, GithubService};
pub use math::MathService;
pub use registry::{
    input_schema_for, ParamKind, ParamSpec, ProviderCatalog, ProviderFactory, Tool, ToolProvider,
    ToolRegistry,
};

/// Location the built-in providers are registered under
pub const BUILTIN_TOOL_SOURCE: &str = "services";

/// Catalog with the built-in math and GitHub providers
pub fn builtin_catalog() -> ProviderCatalog {
    let mut catalog = ProviderCatalog::new();
    catalog
        .register(BUILTIN_TOOL_SOURCE, "math", MathService::provider)
        .register(BUILTIN_TOOL_SOURCE, "github", GithubService::provider);
    catalog
}
