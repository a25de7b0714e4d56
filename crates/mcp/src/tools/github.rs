// GitHub repository reader tools

use crate::protocol::{ToolContent, ToolResult};
use crate::tools::{ParamKind, ParamSpec, Tool, ToolProvider};
use anyhow::{Context, Result};
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use url::Url;

pub const GITHUB_API_URL: &str = "https://api.github.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);
const CACHE_TTL: Duration = Duration::from_secs(300);

const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_RAW: &str = "application/vnd.github.v3.raw";

struct CacheEntry {
    stored_at: Instant,
    value: String,
}

/// Shared client state behind the GitHub tools: HTTP client, retry policy,
/// and a TTL cache of rendered responses keyed by request URL.
pub struct GithubService {
    client: reqwest::Client,
    base_url: Url,
    attempts: u32,
    retry_delay: Duration,
    cache_ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl GithubService {
    pub fn new() -> Result<Self> {
        Self::with_base_url(GITHUB_API_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid GitHub API URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("GitHub API URL cannot carry a path: {}", base_url);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("sluice-mcp/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            attempts: RETRY_ATTEMPTS,
            retry_delay: RETRY_DELAY,
            cache_ttl: CACHE_TTL,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn provider() -> Result<Arc<dyn ToolProvider>> {
        Ok(Arc::new(GithubProvider {
            service: Arc::new(Self::new()?),
        }))
    }

    /// Request URL under the API root. Each segment is percent-encoded, so
    /// `#`, `?` and `%` in names and paths reach GitHub literally.
    fn api_url<'a>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
        query: &[(&str, &str)],
    ) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    fn cached(&self, key: &str) -> Option<String> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.cache_ttl)
            .map(|entry| entry.value.clone())
    }

    fn store(&self, key: String, value: String) {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                key,
                CacheEntry {
                    stored_at: Instant::now(),
                    value,
                },
            );
    }

    async fn fetch_once(&self, url: &str, accept: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            tracing::error!("Request failed: {} with status {}", url, status);
            anyhow::bail!("HTTP {}", status.as_u16());
        }

        let body = response
            .bytes()
            .await
            .context("Failed to read response body")?;
        Ok(body.to_vec())
    }

    /// GET with the retry policy applied
    async fn fetch(&self, url: &str, accept: &str) -> Result<Vec<u8>> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(url, accept).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    tracing::error!("[Attempt {}] Error fetching {}: {:#}", attempt, url, e);
                    if attempt >= self.attempts {
                        tracing::error!("Failed after {} attempts for {}", self.attempts, url);
                        return Err(e.context(format!("Failed after {} attempts", self.attempts)));
                    }
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let body = self.fetch(url, ACCEPT_JSON).await?;
        serde_json::from_slice(&body).context("Invalid JSON from GitHub")
    }

    /// Repository summary as JSON text
    pub async fn repo_info(&self, repo_full_name: &str) -> Result<String> {
        let url = self.api_url(repo_segments(repo_full_name), &[]);
        if let Some(hit) = self.cached(url.as_str()) {
            return Ok(hit);
        }

        tracing::info!("action=read_repo_info, url={}", url);
        let data = self.fetch_json(url.as_str()).await?;
        let summary = summarize_repo(&data).to_string();
        self.store(url.into(), summary.clone());
        Ok(summary)
    }

    /// Recursive tree entries of a branch
    pub async fn repo_tree(&self, repo_full_name: &str, branch: &str) -> Result<Vec<Value>> {
        let url = self.api_url(
            repo_segments(repo_full_name).chain(["git", "trees", branch]),
            &[("recursive", "1")],
        );
        if let Some(hit) = self.cached(url.as_str()) {
            return serde_json::from_str(&hit).context("Corrupt cached tree");
        }

        let data = self.fetch_json(url.as_str()).await?;
        let tree = filter_tree(&data);
        self.store(url.into(), Value::Array(tree.clone()).to_string());
        Ok(tree)
    }

    /// One file, decoded as text when it is UTF-8 and base64 otherwise
    pub async fn file_content(
        &self,
        repo_full_name: &str,
        path: &str,
        branch: &str,
    ) -> Result<FileContent> {
        let url = self.api_url(
            repo_segments(repo_full_name)
                .chain(["contents"])
                .chain(path.split('/')),
            &[("ref", branch)],
        );
        let key = format!("{}-raw", url);
        if let Some(hit) = self.cached(&key) {
            return serde_json::from_str(&hit).context("Corrupt cached file content");
        }

        let bytes = self.fetch(url.as_str(), ACCEPT_RAW).await?;
        let content = FileContent::decode(path, bytes);
        self.store(key, serde_json::to_string(&content)?);
        Ok(content)
    }

    /// Whole repository as nested directories mapping to file contents
    pub async fn repo_structure(&self, repo_full_name: &str, branch: &str) -> Result<Value> {
        let mut structure = Map::new();
        for item in self.repo_tree(repo_full_name, branch).await? {
            if item.get("type").and_then(Value::as_str) != Some("blob") {
                continue;
            }
            let Some(path) = item.get("path").and_then(Value::as_str) else {
                continue;
            };
            let file = self.file_content(repo_full_name, path, branch).await?;
            let parts: Vec<&str> = path.split('/').collect();
            insert_into_structure(&mut structure, &parts, file.content);
        }
        Ok(Value::Object(structure))
    }
}

/// `owner/name` as the path segments `repos/owner/name`
fn repo_segments(repo_full_name: &str) -> impl Iterator<Item = &str> {
    std::iter::once("repos").chain(repo_full_name.split('/'))
}

/// A fetched file
#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct FileContent {
    pub path: String,
    pub is_binary: bool,
    pub content: String,
}

impl FileContent {
    fn decode(path: &str, bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self {
                path: path.to_string(),
                is_binary: false,
                content: text,
            },
            Err(e) => Self {
                path: path.to_string(),
                is_binary: true,
                content: base64::engine::general_purpose::STANDARD.encode(e.into_bytes()),
            },
        }
    }
}

fn summarize_repo(data: &Value) -> Value {
    serde_json::json!({
        "name": data.get("name"),
        "full_name": data.get("full_name"),
        "description": data.get("description"),
        "stars": data.get("stargazers_count"),
        "forks": data.get("forks_count"),
        "html_url": data.get("html_url"),
    })
}

/// Tree entries whose `path` is a string
fn filter_tree(data: &Value) -> Vec<Value> {
    data.get("tree")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("path").map_or(false, Value::is_string))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn insert_into_structure(structure: &mut Map<String, Value>, parts: &[&str], content: String) {
    match parts {
        [] => {}
        [file] => {
            structure.insert(file.to_string(), Value::String(content));
        }
        [folder, rest @ ..] => {
            let entry = structure
                .entry(folder.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(children) = entry {
                insert_into_structure(children, rest, content);
            }
        }
    }
}

fn text_result(text: impl Into<String>) -> ToolResult {
    vec![ToolContent::text(text)]
}

/// Provider of the repository reader tools
pub struct GithubProvider {
    service: Arc<GithubService>,
}

impl GithubProvider {
    pub fn new(service: GithubService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

impl ToolProvider for GithubProvider {
    fn name(&self) -> &str {
        "github"
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        [
            GithubOp::RepoInfo,
            GithubOp::RepoTree,
            GithubOp::FileContent,
            GithubOp::RepoStructure,
        ]
        .into_iter()
        .map(|op| {
            Arc::new(GithubTool {
                service: self.service.clone(),
                op,
            }) as Arc<dyn Tool>
        })
        .collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum GithubOp {
    RepoInfo,
    RepoTree,
    FileContent,
    RepoStructure,
}

struct GithubTool {
    service: Arc<GithubService>,
    op: GithubOp,
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Deserialize)]
struct RepoArgs {
    repo_full_name: String,
    #[serde(default = "default_branch")]
    branch: String,
}

#[derive(Debug, Deserialize)]
struct FileArgs {
    repo_full_name: String,
    path: String,
    #[serde(default = "default_branch")]
    branch: String,
}

#[async_trait::async_trait]
impl Tool for GithubTool {
    fn name(&self) -> &str {
        match self.op {
            GithubOp::RepoInfo => "read_repo_info",
            GithubOp::RepoTree => "list_repo_tree",
            GithubOp::FileContent => "read_file_content",
            GithubOp::RepoStructure => "download_repo_structure_with_content",
        }
    }

    fn description(&self) -> &str {
        match self.op {
            GithubOp::RepoInfo => "Read basic information about a GitHub repository",
            GithubOp::RepoTree => "List the recursive file tree of a repository branch",
            GithubOp::FileContent => "Read a single file, text or binary, from a repository",
            GithubOp::RepoStructure => "Download the whole repository structure with contents",
        }
    }

    fn params(&self) -> Vec<ParamSpec> {
        let repo = ParamSpec::typed("repo_full_name", ParamKind::String);
        let branch = ParamSpec::typed("branch", ParamKind::String).with_default();
        match self.op {
            GithubOp::RepoInfo => vec![repo],
            GithubOp::RepoTree | GithubOp::RepoStructure => vec![repo, branch],
            GithubOp::FileContent => vec![
                repo,
                ParamSpec::typed("path", ParamKind::String),
                branch,
            ],
        }
    }

    fn deprecated(&self) -> bool {
        matches!(self.op, GithubOp::RepoStructure)
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<ToolResult> {
        let arguments = Value::Object(arguments);
        match self.op {
            GithubOp::RepoInfo => {
                let args: RepoArgs = serde_json::from_value(arguments)
                    .context("Invalid arguments for read_repo_info")?;
                match self.service.repo_info(&args.repo_full_name).await {
                    Ok(info) => Ok(text_result(info)),
                    Err(e) => {
                        tracing::error!(
                            "Failed to read repo info for {}: {:#}",
                            args.repo_full_name,
                            e
                        );
                        Ok(text_result(format!("{:#}", e)))
                    }
                }
            }
            GithubOp::RepoTree => {
                let args: RepoArgs = serde_json::from_value(arguments)
                    .context("Invalid arguments for list_repo_tree")?;
                match self.service.repo_tree(&args.repo_full_name, &args.branch).await {
                    Ok(tree) => Ok(text_result(Value::Array(tree).to_string())),
                    Err(e) => {
                        tracing::error!(
                            "Failed to read repo tree for {}: {:#}",
                            args.repo_full_name,
                            e
                        );
                        Ok(text_result(format!("{:#}", e)))
                    }
                }
            }
            GithubOp::FileContent => {
                let args: FileArgs = serde_json::from_value(arguments)
                    .context("Invalid arguments for read_file_content")?;
                match self
                    .service
                    .file_content(&args.repo_full_name, &args.path, &args.branch)
                    .await
                {
                    Ok(file) => Ok(text_result(serde_json::to_string(&file)?)),
                    Err(e) => {
                        tracing::error!(
                            "Error reading file {} in {}@{}: {:#}",
                            args.path,
                            args.repo_full_name,
                            args.branch,
                            e
                        );
                        let body = serde_json::json!({
                            "path": args.path,
                            "error": format!("{:#}", e),
                        });
                        Ok(text_result(body.to_string()))
                    }
                }
            }
            GithubOp::RepoStructure => {
                let args: RepoArgs = serde_json::from_value(arguments)
                    .context("Invalid arguments for download_repo_structure_with_content")?;
                match self
                    .service
                    .repo_structure(&args.repo_full_name, &args.branch)
                    .await
                {
                    Ok(structure) => Ok(text_result(structure.to_string())),
                    Err(e) => {
                        tracing::error!(
                            "Failed to download repo {} structure: {:#}",
                            args.repo_full_name,
                            e
                        );
                        Ok(text_result(
                            serde_json::json!({ "error": format!("{:#}", e) }).to_string(),
                        ))
                    }
                }
            }
        }
    }
}
