//! CLI command implementations.

use std::sync::Arc;

use anyhow::{Context, Result};

use brainproxy::build_info;
use brainproxy::config::{API_KEY_ENV, Config};
use brainproxy::llm::GeminiProvider;

pub mod models;
pub mod serve;

/// Upstream client built from the config; fails without an API key.
pub fn provider(config: &Config) -> Result<Arc<GeminiProvider>> {
    let api_key = config
        .upstream
        .resolved_api_key()
        .with_context(|| format!("No upstream API key: set upstream.api_key or {API_KEY_ENV}"))?;
    let client = reqwest::Client::builder()
        .user_agent(build_info::user_agent())
        .build()
        .context("Failed to build HTTP client")?;
    Ok(Arc::new(GeminiProvider::new(
        client,
        config.upstream.base_url.clone(),
        api_key,
    )))
}
