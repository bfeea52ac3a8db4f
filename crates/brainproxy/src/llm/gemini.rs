//! Gemini REST provider.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use tracing::debug;

use super::error::LLMError;
use super::provider::{GenerateStream, ModelProvider};
use super::types::{CacheRequest, CachedContent, GenerateRequest, GenerateResponse, ModelPage};
use crate::sse_parser::SseDataStream;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Talks to `generativelanguage.googleapis.com` (or a compatible endpoint).
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiProvider {
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn model_url(&self, model: &str, action: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/v1beta/models/{}:{}", self.base_url, model, action)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(API_KEY_HEADER, &self.api_key)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, LLMError> {
        let response = self.authed(builder).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LLMError::Api { status, message });
        }
        Ok(response)
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LLMError> {
        let url = self.model_url(&request.model, "generateContent");
        debug!(model = %request.model, turns = request.contents.len(), "generateContent");
        let response = self.send(self.client.post(&url).json(&request)).await?;
        Ok(response.json().await?)
    }

    async fn generate_stream(&self, request: GenerateRequest) -> Result<GenerateStream, LLMError> {
        let url = format!(
            "{}?alt=sse",
            self.model_url(&request.model, "streamGenerateContent")
        );
        debug!(model = %request.model, "streamGenerateContent");
        let response = self.send(self.client.post(&url).json(&request)).await?;

        let chunks = SseDataStream::new(response.bytes_stream()).map(|event| match event {
            Ok(data) => serde_json::from_str::<GenerateResponse>(&data).map_err(LLMError::from),
            Err(e) => Err(LLMError::Request(e)),
        });
        Ok(Box::pin(chunks))
    }

    async fn create_cached_content(
        &self,
        request: CacheRequest,
    ) -> Result<CachedContent, LLMError> {
        let url = format!("{}/v1beta/cachedContents", self.base_url);
        let response = self.send(self.client.post(&url).json(&request)).await?;
        Ok(response.json().await?)
    }

    async fn list_models_page(&self, page_token: Option<String>) -> Result<ModelPage, LLMError> {
        let url = format!("{}/v1beta/models", self.base_url);
        let mut builder = self.client.get(&url);
        if let Some(token) = page_token {
            builder = builder.query(&[("pageToken", token)]);
        }
        let response = self.send(builder).await?;
        Ok(response.json().await?)
    }
}
