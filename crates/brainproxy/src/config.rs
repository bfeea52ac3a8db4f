use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

use crate::chunking::Chunking;
use crate::cost::PriceEntry;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

impl Config {
    /// Load the config file, expanding `${VAR}` references first.
    ///
    /// A missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        if expanded.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_saphyr::from_str(&expanded)?)
    }
}

// ============================================================================
// Defaults
// ============================================================================

/// Default config file name.
pub const DEFAULT_CONFIG_FILE: &str = "brainproxy.yaml";
/// Model used when neither the request nor the cache names one.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
/// Public Gemini REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
/// Environment variable consulted when `upstream.api_key` is unset.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    300
}

fn default_keep_alive_interval() -> u64 {
    15
}

fn default_max_connections() -> usize {
    256
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tool_rounds() -> u32 {
    10
}

fn default_temperature() -> f32 {
    0.2
}

fn default_blocked_markers() -> Vec<String> {
    ["-exp", "experimental", "preview"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_ttl_minutes() -> u64 {
    120
}

fn default_display_name() -> String {
    "Unified_Project_Brain".to_string()
}

fn default_system_prompt() -> String {
    "You are a project assistant. The cached context holds the project's files and its \
     history log. Answer using that context and say so when it does not cover the question."
        .to_string()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand shell-style variable references in `input`.
///
/// - `${VAR}` must be set, otherwise [`ConfigError::MissingEnvVar`]
/// - `${VAR:-default}` falls back to `default`
/// - `$$` is a literal `$`
/// - a `$` not followed by `{` or `$` is kept as-is
///
/// ```yaml
/// upstream:
///   api_key: ${GEMINI_API_KEY:-}
/// server:
///   port: ${PORT:-8080}
/// ```
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('{') => {
                chars.next();
                out.push_str(&resolve_reference(&mut chars)?);
            }
            _ => out.push('$'),
        }
    }

    Ok(out)
}

/// Consume `NAME}` or `NAME:-fallback}` and look the variable up.
fn resolve_reference(
    chars: &mut std::iter::Peekable<std::str::Chars>,
) -> Result<String, ConfigError> {
    let mut body = String::new();
    let mut closed = false;
    for c in chars.by_ref() {
        if c == '}' {
            closed = true;
            break;
        }
        body.push(c);
    }
    if !closed {
        return Err(ConfigError::UnclosedVarReference);
    }

    let (name, fallback) = match body.split_once(":-") {
        Some((name, fallback)) => (name, Some(fallback)),
        None => (body.as_str(), None),
    };

    match (std::env::var(name), fallback) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(fallback)) => Ok(fallback.to_string()),
        (Err(_), None) => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_seconds: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Bearer token required on every proxy route. Unset leaves them open.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Bearer token for admin routes. Unset restricts them to loopback.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            keep_alive_interval_seconds: default_keep_alive_interval(),
            max_connections: default_max_connections(),
            api_token: None,
            admin_token: None,
        }
    }
}

// ============================================================================
// UpstreamConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl UpstreamConfig {
    /// Configured key, else `GEMINI_API_KEY`. Empty strings count as unset.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
        }
    }
}

// ============================================================================
// ProxyConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Existing upstream cache to attach (`cachedContents/...`).
    #[serde(default)]
    pub cache_id: Option<String>,
    /// Directory to build a cache from at startup.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    /// Root that file tools are confined to.
    #[serde(default)]
    pub project_root: Option<PathBuf>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Hold a per-session lock for the whole turn.
    #[serde(default = "default_true")]
    pub serialize_sessions: bool,
    #[serde(default = "default_blocked_markers")]
    pub blocked_model_markers: Vec<String>,
    #[serde(default)]
    pub stream_chunking: Chunking,
    /// Extra or overriding price table entries.
    #[serde(default)]
    pub pricing: Vec<PriceEntry>,
}

impl ProxyConfig {
    /// `project_root`, else `cache_path`, else the working directory.
    pub fn resolved_project_root(&self) -> PathBuf {
        self.project_root
            .clone()
            .or_else(|| self.cache_path.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            cache_id: None,
            cache_path: None,
            project_root: None,
            debug: false,
            max_tool_rounds: default_max_tool_rounds(),
            temperature: default_temperature(),
            serialize_sessions: true,
            blocked_model_markers: default_blocked_markers(),
            stream_chunking: Chunking::default(),
            pricing: Vec::new(),
        }
    }
}

// ============================================================================
// CacheConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,
    #[serde(default = "default_display_name")]
    pub display_name: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
            display_name: default_display_name(),
            system_prompt: default_system_prompt(),
        }
    }
}
