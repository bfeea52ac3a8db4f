//! HTTP server command implementation.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{info, warn};

use brainproxy::cache::{self, ActiveCache, CacheState};
use brainproxy::config::Config;
use brainproxy::cost::PriceTable;
use brainproxy::llm::{ModelFilter, ModelProvider};
use brainproxy::orchestrator::{DEBUG_RESPONSE_FILE, Orchestrator, OrchestratorSettings};
use brainproxy::server;
use brainproxy::session::SessionStore;
use brainproxy::sync::KeyedLocks;
use brainproxy::tools::{ProjectRoot, ToolExecutor};

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub model: Option<String>,
    pub cache_id: Option<String>,
    pub cache_path: Option<PathBuf>,
    pub debug: bool,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.server.host = host.to_string();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(model) = self.model {
            config.proxy.model = model;
        }
        if let Some(cache_id) = self.cache_id {
            config.proxy.cache_id = Some(cache_id);
            config.proxy.cache_path = None;
        }
        if let Some(cache_path) = self.cache_path {
            config.proxy.cache_path = Some(cache_path);
            config.proxy.cache_id = None;
        }
        config.proxy.debug |= self.debug;
    }
}

pub async fn run(config_path: &str, overrides: Overrides) -> Result<()> {
    let mut config = Config::load(config_path).await?;
    overrides.apply(&mut config);

    let provider = super::provider(&config)?;
    let initial_cache = initial_cache(provider.as_ref(), &config).await;
    info!(
        model = %initial_cache.model,
        cache = %initial_cache.reference,
        mode = ?initial_cache.mode,
        "Cache state initialized"
    );

    let project_root = config.proxy.resolved_project_root();
    let root = ProjectRoot::new(&project_root)
        .with_context(|| format!("Invalid project root: {}", project_root.display()))?;
    info!(root = %root.path().display(), "Tools confined to project root");

    let locks = config
        .proxy
        .serialize_sessions
        .then(|| KeyedLocks::with_cleanup("session_locks"));
    let settings = OrchestratorSettings {
        default_model: config.proxy.model.clone(),
        max_tool_rounds: config.proxy.max_tool_rounds,
        debug_dump: config
            .proxy
            .debug
            .then(|| PathBuf::from(DEBUG_RESPONSE_FILE)),
    };
    let orchestrator = Orchestrator::new(
        provider,
        SessionStore::new(locks),
        CacheState::new(initial_cache),
        PriceTable::with_overrides(&config.proxy.pricing),
        ToolExecutor::new(root),
        ModelFilter::new(config.proxy.blocked_model_markers.clone()),
        settings,
    );

    // Create shutdown channel for HTTP-triggered shutdown
    let (shutdown_tx, shutdown_rx) = server::shutdown_channel();

    let ip: IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(ip, config.server.port);

    let state = server::AppState {
        orchestrator: Arc::new(orchestrator),
        chunking: config.proxy.stream_chunking.clone(),
        temperature: config.proxy.temperature,
        listen_addr: addr.to_string(),
        debug: config.proxy.debug,
        admin_token: config.server.admin_token.clone(),
        api_token: config.server.api_token.clone(),
        keep_alive_interval_seconds: config.server.keep_alive_interval_seconds,
        max_connections: config.server.max_connections,
        shutdown_tx: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    let app = server::build_app(state, config.server.request_timeout_seconds);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(addr = %addr, "Starting server");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_rx))
    .await?;

    info!("Server stopped");
    Ok(())
}

/// Explicit reference, else a freshly built cache, else none.
///
/// A failed build is logged and the server runs uncached.
async fn initial_cache(provider: &dyn ModelProvider, config: &Config) -> ActiveCache {
    let model = &config.proxy.model;
    if let Some(reference) = config.proxy.cache_id.as_deref().filter(|r| !r.is_empty()) {
        return ActiveCache::explicit(reference, model.as_str());
    }
    let Some(path) = &config.proxy.cache_path else {
        return ActiveCache::uncached(model.as_str());
    };

    match cache::build_cache(provider, path, model, &config.cache).await {
        Ok(active) => active,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Cache creation failed, continuing without cache"
            );
            ActiveCache::uncached(model.as_str())
        }
    }
}

/// Stop a running server by calling the shutdown endpoint.
pub async fn stop(config_path: &str, port_override: Option<u16>) -> Result<()> {
    let config = Config::load(config_path).await?;
    let port = port_override.unwrap_or(config.server.port);
    let base = format!("http://127.0.0.1:{port}");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    // Check if server is running
    if client.get(format!("{base}/livez")).send().await.is_err() {
        anyhow::bail!("No server running on port {}", port);
    }

    let mut request = client.post(format!("{base}/api/admin/v1/shutdown"));
    if let Some(token) = &config.server.admin_token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await.context("Failed to stop server")?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Shutdown rejected ({status}): {body}");
    }

    println!("Shutdown initiated for server on port {}", port);
    Ok(())
}

async fn shutdown_signal(http_shutdown: tokio::sync::oneshot::Receiver<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
        _ = http_shutdown => info!("Received shutdown request via HTTP, shutting down..."),
    }
}
