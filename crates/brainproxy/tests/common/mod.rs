//! Common test utilities.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use serde_json::{Value, json};
use tempfile::TempDir;

use brainproxy::cache::{ActiveCache, CacheState};
use brainproxy::chunking::Chunking;
use brainproxy::config::DEFAULT_MODEL;
use brainproxy::cost::PriceTable;
use brainproxy::llm::{
    CacheRequest, CachedContent, Candidate, Content, FunctionCall, GenerateRequest,
    GenerateResponse, LLMError, ModelInfo, ModelPage, ModelProvider, Part, Role, UsageMetadata,
};
use brainproxy::orchestrator::{Orchestrator, OrchestratorSettings};
use brainproxy::server::{self, AppState};
use brainproxy::session::SessionStore;
use brainproxy::sync::KeyedLocks;
use brainproxy::tools::{ProjectRoot, ToolExecutor};
use tokio::sync::Mutex as AsyncMutex;

/// Upstream stub that replays canned responses and records every request.
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<Vec<Result<GenerateResponse, LLMError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
    models: Vec<ModelInfo>,
}

impl ScriptedProvider {
    pub fn new(mut responses: Vec<Result<GenerateResponse, LLMError>>) -> Self {
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            ..Self::default()
        }
    }

    pub fn with_models(mut self, ids: &[&str]) -> Self {
        self.models = ids
            .iter()
            .map(|id| ModelInfo {
                name: format!("models/{id}"),
                display_name: Some(id.to_uppercase()),
                supported_generation_methods: vec!["generateContent".to_string()],
            })
            .collect();
        self
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LLMError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Ok(text_response("fallback")))
    }

    async fn create_cached_content(
        &self,
        request: CacheRequest,
    ) -> Result<CachedContent, LLMError> {
        Ok(CachedContent {
            name: "cachedContents/test".to_string(),
            model: Some(request.model),
            expire_time: None,
        })
    }

    async fn list_models_page(&self, _: Option<String>) -> Result<ModelPage, LLMError> {
        Ok(ModelPage {
            models: self.models.clone(),
            next_page_token: None,
        })
    }
}

/// Plain text answer with fixed usage.
pub fn text_response(text: &str) -> GenerateResponse {
    GenerateResponse {
        usage_metadata: Some(UsageMetadata {
            prompt_token_count: 10,
            candidates_token_count: 5,
            total_token_count: 15,
        }),
        ..GenerateResponse::from_text(text)
    }
}

/// Response asking for one tool call.
pub fn call_response(name: &str, args: Value) -> GenerateResponse {
    GenerateResponse {
        candidates: vec![Candidate {
            content: Some(Content {
                role: Role::Model,
                parts: vec![Part::FunctionCall(FunctionCall {
                    id: None,
                    name: name.to_string(),
                    args,
                })],
            }),
            finish_reason: None,
        }],
        ..GenerateResponse::default()
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Arc<ScriptedProvider>,
    pub root: TempDir,
}

pub struct TestOptions {
    pub cache: ActiveCache,
    pub api_token: Option<String>,
    pub chunking: Chunking,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            cache: ActiveCache::uncached(DEFAULT_MODEL),
            api_token: None,
            chunking: Chunking::default(),
        }
    }
}

/// Create a test app around `provider` with a fresh project root.
pub fn test_app_with(provider: ScriptedProvider, options: TestOptions) -> TestApp {
    let root = TempDir::new().unwrap();
    let provider = Arc::new(provider);
    let orchestrator = Orchestrator::new(
        provider.clone(),
        SessionStore::new(Some(KeyedLocks::new())),
        CacheState::new(options.cache),
        PriceTable::builtin(),
        ToolExecutor::new(ProjectRoot::new(root.path()).unwrap()),
        brainproxy::llm::ModelFilter::new(
            ["-exp", "experimental", "preview"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        ),
        OrchestratorSettings {
            default_model: DEFAULT_MODEL.to_string(),
            max_tool_rounds: 5,
            debug_dump: None,
        },
    );

    let (shutdown_tx, _shutdown_rx) = server::shutdown_channel();
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        chunking: options.chunking,
        temperature: 0.2,
        listen_addr: "127.0.0.1:8080".to_string(),
        debug: false,
        admin_token: None,
        api_token: options.api_token,
        keep_alive_interval_seconds: 15,
        max_connections: 16,
        shutdown_tx: Arc::new(AsyncMutex::new(Some(shutdown_tx))),
    };

    TestApp {
        router: server::build_app(state.clone(), 300),
        state,
        provider,
        root,
    }
}

/// Create a test app whose upstream answers every call with "fallback".
pub fn test_app() -> TestApp {
    test_app_with(ScriptedProvider::default(), TestOptions::default())
}

/// `data:` payloads of an SSE body, in order.
pub fn sse_data(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim_start().to_string())
        .collect()
}

pub fn json_body(value: Value) -> axum::body::Body {
    axum::body::Body::from(value.to_string())
}

pub fn chat_body(message: &str) -> Value {
    json!({ "message": message, "model": DEFAULT_MODEL })
}
