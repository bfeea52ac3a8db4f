//! Process-wide cache reference.

use serde::Serialize;
use tokio::sync::RwLock;

/// How the active cache came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Reference supplied by configuration.
    Explicit,
    /// Built from the project directory at startup.
    Built,
    Uncached,
}

/// Snapshot of the cache singleton.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveCache {
    /// Upstream reference; empty when no cache is active.
    pub reference: String,
    /// Model the reference is bound to (or the default model when uncached).
    pub model: String,
    pub mode: CacheMode,
}

impl ActiveCache {
    pub fn uncached(model: impl Into<String>) -> Self {
        Self {
            reference: String::new(),
            model: model.into(),
            mode: CacheMode::Uncached,
        }
    }

    pub fn explicit(reference: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            model: model.into(),
            mode: CacheMode::Explicit,
        }
    }

    pub fn reference(&self) -> Option<&str> {
        Some(self.reference.as_str()).filter(|r| !r.is_empty())
    }

    pub fn is_active(&self) -> bool {
        self.reference().is_some()
    }
}

/// Shared cache state. Written at startup, read per request.
#[derive(Debug)]
pub struct CacheState {
    inner: RwLock<ActiveCache>,
}

impl CacheState {
    pub fn new(initial: ActiveCache) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    pub async fn snapshot(&self) -> ActiveCache {
        self.inner.read().await.clone()
    }

    pub async fn replace(&self, cache: ActiveCache) {
        *self.inner.write().await = cache;
    }
}
