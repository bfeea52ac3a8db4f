//! Model provider trait.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, stream};

use super::error::LLMError;
use super::types::{CacheRequest, CachedContent, GenerateRequest, GenerateResponse, ModelPage};

/// Incremental provider-native response chunks.
pub type GenerateStream = Pin<Box<dyn Stream<Item = Result<GenerateResponse, LLMError>> + Send>>;

// ============================================================================
// ModelProvider Trait
// ============================================================================

/// The upstream model capability.
///
/// Everything the proxy needs from the remote side: one-shot generation,
/// incremental generation, cache creation and paginated model listing.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Generate the next turn for `request.contents`.
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LLMError>;

    /// Generate incrementally.
    ///
    /// The default implementation performs a buffered call and yields it as a
    /// single chunk.
    async fn generate_stream(&self, request: GenerateRequest) -> Result<GenerateStream, LLMError> {
        let response = self.generate(request).await?;
        Ok(Box::pin(stream::iter(vec![Ok(response)])))
    }

    /// Upload a context payload and return the cache handle.
    async fn create_cached_content(
        &self,
        request: CacheRequest,
    ) -> Result<CachedContent, LLMError>;

    /// Fetch one page of the model list. `None` starts from the beginning.
    async fn list_models_page(&self, page_token: Option<String>) -> Result<ModelPage, LLMError>;
}
