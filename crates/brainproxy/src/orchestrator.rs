//! Request orchestration shared by every protocol adapter.
//!
//! Adapters normalize their wire request into a [`CanonicalRequest`]; the
//! orchestrator decides the cache attachment, runs the turn loop under the
//! session guard, commits history and keeps the running cost.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cache::{self, ActiveCache, CacheState};
use crate::cost::{CostTracker, PriceTable};
use crate::llm::{
    Content, GenerateRequest, GenerateResponse, GenerateStream, LLMError, ModelFilter,
    ModelProvider, SafetySetting,
};
use crate::session::{SessionStore, TurnError, TurnEvent, TurnLoop, TurnOutcome, TurnPlan};
use crate::tools::ToolExecutor;

/// File the last final answer is written to in debug mode.
pub const DEBUG_RESPONSE_FILE: &str = "debug_last_response.txt";

/// Error detail for a blocked model id.
pub const BLOCKED_MODEL_MESSAGE: &str = "Experimental models are not allowed";

const PREVIEW_CHARS: usize = 50;

/// First `PREVIEW_CHARS` characters of `text`, for log lines.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

// ============================================================================
// Types
// ============================================================================

/// Adapter-independent form of one user turn.
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    pub session_id: String,
    pub model: String,
    pub message: String,
    pub use_search: bool,
    pub use_agentic: bool,
    pub cache_override: Option<String>,
    /// Sampling temperature, when the adapter sets one.
    pub temperature: Option<f32>,
}

/// Completed turn plus the values adapters report.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    pub model: String,
    pub cached_content: Option<String>,
    /// Running cost across all requests, after this one.
    pub total_cost: f64,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub default_model: String,
    pub max_tool_rounds: u32,
    /// Write each final answer to this file, if set.
    pub debug_dump: Option<PathBuf>,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    provider: Arc<dyn ModelProvider>,
    sessions: SessionStore,
    cache: CacheState,
    costs: CostTracker,
    prices: PriceTable,
    executor: ToolExecutor,
    filter: ModelFilter,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        sessions: SessionStore,
        cache: CacheState,
        prices: PriceTable,
        executor: ToolExecutor,
        filter: ModelFilter,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            provider,
            sessions,
            cache,
            costs: CostTracker::new(),
            prices,
            executor,
            filter,
            settings,
        }
    }

    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn cache(&self) -> &CacheState {
        &self.cache
    }

    pub fn costs(&self) -> &CostTracker {
        &self.costs
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub fn filter(&self) -> &ModelFilter {
        &self.filter
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Cache reference eligible for this request, evaluated against the
    /// current cache state.
    pub async fn eligible_cache(
        &self,
        model: &str,
        explicit_override: Option<&str>,
        use_search: bool,
        use_agentic: bool,
    ) -> Option<String> {
        let active = self.cache.snapshot().await;
        cache::decide(
            model,
            explicit_override,
            active.reference(),
            &active.model,
            use_search,
            use_agentic,
        )
    }

    pub async fn plan(&self, request: &CanonicalRequest) -> TurnPlan {
        TurnPlan {
            model: request.model.clone(),
            cached_content: self
                .eligible_cache(
                    &request.model,
                    request.cache_override.as_deref(),
                    request.use_search,
                    request.use_agentic,
                )
                .await,
            use_search: request.use_search,
            use_agentic: request.use_agentic,
            temperature: request.temperature,
            max_tool_rounds: self.settings.max_tool_rounds,
        }
    }

    /// Reject model ids on the experimental blocklist. Applies to every adapter.
    pub fn ensure_allowed(&self, model: &str) -> Result<(), String> {
        if self.filter.is_blocked(model) {
            return Err(BLOCKED_MODEL_MESSAGE.to_string());
        }
        Ok(())
    }

    /// Model for the OpenAI adapters: native ids pass through unless
    /// blocked, anything else maps to the cache model or the default.
    pub async fn resolve_openai_model(&self, requested: &str) -> Result<String, String> {
        if requested.starts_with("gemini-") {
            self.ensure_allowed(requested)?;
            return Ok(requested.to_string());
        }
        let active = self.cache.snapshot().await;
        if active.is_active() {
            Ok(active.model)
        } else {
            Ok(self.settings.default_model.clone())
        }
    }

    /// Run one user turn and commit it to the session.
    ///
    /// Nothing is stored when the turn fails.
    pub async fn run_turn(
        &self,
        request: CanonicalRequest,
        events: Option<mpsc::UnboundedSender<TurnEvent>>,
    ) -> Result<TurnReport, TurnError> {
        let _guard = self.sessions.turn_guard(&request.session_id).await;
        let history = self.sessions.history(&request.session_id);
        let plan = self.plan(&request).await;

        let mut turn_loop = TurnLoop::new(
            self.provider.as_ref(),
            &self.executor,
            &self.prices,
            &self.costs,
        );
        if let Some(events) = events {
            turn_loop = turn_loop.with_events(events);
        }

        let outcome = turn_loop.run(&plan, &history, &request.message).await?;
        self.sessions
            .commit(&request.session_id, history, outcome.new_turns.clone());

        let total_cost = self.costs.total().await;
        info!(
            session_id = %request.session_id,
            model = %plan.model,
            cached = plan.cached_content.is_some(),
            rounds = outcome.rounds,
            tools = outcome.tools_executed.len(),
            images = outcome.images.len(),
            prompt_tokens = outcome.usage.prompt_token_count,
            response_tokens = outcome.usage.candidates_token_count,
            cost = outcome.cost,
            total_cost,
            "<<< turn complete: {}",
            preview(&outcome.text)
        );
        self.dump_debug(&outcome.text).await;

        Ok(TurnReport {
            outcome,
            model: plan.model,
            cached_content: plan.cached_content,
            total_cost,
        })
    }

    /// Plain upstream request built from a provider-native body.
    ///
    /// Only the first user text is forwarded; no tools, no session.
    pub async fn passthrough_request(&self, model: &str, body: &GenerateRequest) -> GenerateRequest {
        let message = body.first_user_text().unwrap_or_default();
        GenerateRequest {
            model: model.to_string(),
            contents: vec![Content::user_text(message)],
            safety_settings: SafetySetting::permissive(),
            cached_content: self
                .eligible_cache(model, body.cached_content.as_deref(), false, false)
                .await,
            ..GenerateRequest::default()
        }
    }

    /// One buffered passthrough call; cost is added to the running total.
    pub async fn generate_once(&self, request: GenerateRequest) -> Result<GenerateResponse, LLMError> {
        let model = request.model.clone();
        let response = self.provider.generate(request).await?;
        self.record_usage(&model, &response).await;
        self.dump_debug(&response.text()).await;
        Ok(response)
    }

    pub async fn stream_once(&self, request: GenerateRequest) -> Result<GenerateStream, LLMError> {
        self.provider.generate_stream(request).await
    }

    /// Add the cost of `response` to the running total; returns the new total.
    pub async fn record_usage(&self, model: &str, response: &GenerateResponse) -> f64 {
        let cost = self.prices.cost(model, &response.usage());
        self.costs.add(cost).await
    }

    pub async fn active_cache(&self) -> ActiveCache {
        self.cache.snapshot().await
    }

    /// Best-effort write of the last answer in debug mode.
    pub async fn dump_debug(&self, text: &str) {
        let Some(path) = &self.settings.debug_dump else {
            return;
        };
        if let Err(e) = tokio::fs::write(path, text).await {
            warn!(path = %path.display(), error = %e, "Failed to write debug response");
        }
    }
}
