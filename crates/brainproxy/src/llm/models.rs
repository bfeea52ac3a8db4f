//! Model listing and the experimental-model blocklist.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use super::error::LLMError;
use super::provider::ModelProvider;
use super::types::ModelInfo;

// ============================================================================
// ModelCatalog
// ============================================================================

enum Cursor {
    Start,
    Next(String),
    Exhausted,
}

/// Lazy view over the upstream model list.
///
/// Every call to [`ModelCatalog::models`] starts a fresh walk from the first
/// page; pages are fetched only as the stream is polled. The stream ends after
/// the last page or after the first error.
#[derive(Clone)]
pub struct ModelCatalog {
    provider: Arc<dyn ModelProvider>,
}

impl ModelCatalog {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self { provider }
    }

    pub fn models(&self) -> BoxStream<'static, Result<ModelInfo, LLMError>> {
        let provider = Arc::clone(&self.provider);
        stream::try_unfold(Cursor::Start, move |cursor| {
            let provider = Arc::clone(&provider);
            async move {
                let token = match cursor {
                    Cursor::Start => None,
                    Cursor::Next(token) => Some(token),
                    Cursor::Exhausted => return Ok(None),
                };
                let page = provider.list_models_page(token).await?;
                let next = match page.next_page_token {
                    Some(token) if !token.is_empty() => Cursor::Next(token),
                    _ => Cursor::Exhausted,
                };
                Ok::<_, LLMError>(Some((page.models, next)))
            }
        })
        .map_ok(|models| stream::iter(models.into_iter().map(Ok::<_, LLMError>)))
        .try_flatten()
        .boxed()
    }
}

// ============================================================================
// ModelFilter
// ============================================================================

/// Marker-based blocklist for experimental and preview models.
#[derive(Debug, Clone)]
pub struct ModelFilter {
    markers: Vec<String>,
}

impl ModelFilter {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }

    pub fn is_blocked(&self, model: &str) -> bool {
        self.markers.iter().any(|m| model.contains(m.as_str()))
    }

    /// Whether a listed model should be offered to clients.
    pub fn is_listable(&self, info: &ModelInfo) -> bool {
        let id = info.id();
        info.supports_generate() && !id.contains("image-generation") && !self.is_blocked(id)
    }
}
