//! Native JSON API: chat, reset, status, files and model listing.

use axum::Json;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tracing::{info, warn};

use super::problem_details;
use crate::api::{
    ChatRequest, ChatResponse, EMPTY_MESSAGE_FALLBACK, FilesQuery, FilesResponse, ModelEntry,
    ModelsResponse, ResetQuery, StatusResponse,
};
use crate::cache::CacheMode;
use crate::llm::ModelCatalog;
use crate::orchestrator::{CanonicalRequest, preview};
use crate::server::AppState;
use crate::tools::{ToolError, list_dir};

/// Directories hidden from `/files` listings.
const HIDDEN_DIRS: &[&str] = &[
    "node_modules",
    "vendor",
    ".git",
    "dist",
    "build",
    ".next",
    "target",
    "__pycache__",
    "venv",
    ".venv",
];

pub(crate) fn mode_label(cached: bool) -> &'static str {
    if cached { "CACHED" } else { "CLEAN" }
}

/// POST /chat
pub async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    let orchestrator = &state.orchestrator;
    let model = if req.model.is_empty() {
        orchestrator.settings().default_model.clone()
    } else {
        req.model
    };
    if let Err(message) = orchestrator.ensure_allowed(&model) {
        warn!(model = %model, "Rejected blocked model");
        return problem_details::bad_request(message).into_response();
    }
    let message = if req.message.is_empty() {
        EMPTY_MESSAGE_FALLBACK.to_string()
    } else {
        req.message
    };

    info!(
        model = %model,
        session_id = %req.session_id,
        search = req.use_search,
        agentic = req.use_agentic,
        ">>> /chat: {}",
        preview(&message)
    );

    let request = CanonicalRequest {
        session_id: req.session_id,
        model,
        message,
        use_search: req.use_search,
        use_agentic: req.use_agentic,
        cache_override: req.cache_id.filter(|c| !c.is_empty()),
        temperature: Some(state.temperature),
    };

    match orchestrator.run_turn(request, None).await {
        Ok(report) => {
            let outcome = report.outcome;
            Json(ChatResponse {
                text: outcome.text,
                images: outcome.images.into_iter().map(Into::into).collect(),
                tool_calls: outcome.tools_executed,
                prompt_tokens: outcome.usage.prompt_token_count,
                response_tokens: outcome.usage.candidates_token_count,
                total_tokens: outcome.usage.total_token_count,
                request_cost: outcome.cost,
                total_cost: report.total_cost,
            })
            .into_response()
        }
        Err(e) => {
            warn!(error = %e, "/chat failed");
            problem_details::from_turn_error(&e).into_response()
        }
    }
}

/// GET|POST /reset
pub async fn reset(State(state): State<AppState>, Query(query): Query<ResetQuery>) -> String {
    let sessions = state.orchestrator.sessions();
    match query.session_id.filter(|s| !s.is_empty()) {
        Some(id) => {
            let existed = sessions.reset(&id);
            info!(session_id = %id, existed, "Session reset");
            format!("Session {id} cleared.")
        }
        None => {
            let count = sessions.reset_all();
            info!(count, "All sessions reset");
            "All sessions cleared.".to_string()
        }
    }
}

/// GET /status
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let orchestrator = &state.orchestrator;
    let cache = orchestrator.active_cache().await;
    let cache_mode = match cache.mode {
        CacheMode::Explicit => "explicit",
        CacheMode::Built => "built",
        CacheMode::Uncached => "none",
    };

    Json(StatusResponse {
        mode: mode_label(cache.is_active()).to_string(),
        cache_id: cache.reference.clone(),
        cache_model: cache.model.clone(),
        cache_mode: cache_mode.to_string(),
        project_root: orchestrator.executor().root().path().display().to_string(),
        listen_addr: state.listen_addr.clone(),
        debug_mode: state.debug,
        total_cost: orchestrator.costs().total().await,
        sessions: orchestrator.sessions().len(),
    })
}

/// GET /files
pub async fn files(State(state): State<AppState>, Query(query): Query<FilesQuery>) -> Response {
    let requested = query.path.unwrap_or_else(|| ".".to_string());
    let root = state.orchestrator.executor().root();

    let dir = match root.resolve(&requested) {
        Ok(dir) => dir,
        Err(e) => return problem_details::forbidden(e.to_string()).into_response(),
    };

    match list_dir(&dir, &requested).await {
        Ok(entries) => {
            let files = entries
                .into_iter()
                .filter(|name| !name.starts_with('.'))
                .filter(|name| match name.strip_suffix('/') {
                    Some(dir) => !HIDDEN_DIRS.contains(&dir),
                    None => true,
                })
                .collect();
            Json(FilesResponse { files }).into_response()
        }
        Err(e @ ToolError::NotFound(_)) => problem_details::not_found(e.to_string()).into_response(),
        Err(e) => problem_details::internal_error(e.to_string()).into_response(),
    }
}

/// GET /models
pub async fn models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let orchestrator = &state.orchestrator;
    let catalog = ModelCatalog::new(orchestrator.provider().clone());
    let mut stream = catalog.models();

    let mut models = Vec::new();
    while let Some(item) = stream.next().await {
        let info = match item {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Model listing stopped early");
                break;
            }
        };
        if !orchestrator.filter().is_listable(&info) {
            continue;
        }
        let id = info.id().to_string();
        models.push(ModelEntry {
            name: info.display_name.clone().unwrap_or_else(|| id.clone()),
            cost: orchestrator.prices().label(&id),
            id,
        });
    }

    Json(ModelsResponse { models })
}
