//! OpenAI-compatible chat completions and model listing.
//!
//! Each adapter keeps one shared conversation (`openai-compat` for buffered
//! calls, `openai-stream` for streaming ones) unless the caller sends a
//! `user` id, which selects a session of its own. Agentic tools are always
//! enabled since the wire shape has no flag for them.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use super::problem_details;
use crate::api::{
    AssistantMessage, Choice, DONE_SENTINEL, Delta, FunctionCallDelta, MODEL_OWNER,
    OPENAI_SESSION_ID, OPENAI_STREAM_SESSION_ID, OpenAIChatRequest, OpenAIChatResponse,
    OpenAIChunk, OpenAIModel, OpenAIModelList, OpenAIUsage, ToolCallDelta,
};
use crate::llm::ModelCatalog;
use crate::orchestrator::{CanonicalRequest, preview};
use crate::server::AppState;
use crate::session::TurnEvent;

/// Buffered SSE events between the turn task and the response body.
const STREAM_BUFFER: usize = 64;

fn completion_id() -> String {
    format!("chatcmpl-{}", ulid::Ulid::new())
}

/// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(req): Json<OpenAIChatRequest>,
) -> Response {
    let model = match state.orchestrator.resolve_openai_model(&req.model).await {
        Ok(model) => model,
        Err(message) => {
            warn!(requested = %req.model, "Rejected OpenAI model");
            return problem_details::bad_request(message).into_response();
        }
    };

    let shared = if req.stream {
        OPENAI_STREAM_SESSION_ID
    } else {
        OPENAI_SESSION_ID
    };
    let request = CanonicalRequest {
        session_id: req.session_id(shared),
        model,
        message: req.last_user_message(),
        use_search: false,
        use_agentic: true,
        cache_override: None,
        temperature: None,
    };

    info!(
        requested = %req.model,
        model = %request.model,
        session_id = %request.session_id,
        stream = req.stream,
        ">>> /v1/chat/completions: {}",
        preview(&request.message)
    );

    if req.stream {
        stream_completion(state, request)
    } else {
        buffered_completion(state, request).await
    }
}

async fn buffered_completion(state: AppState, request: CanonicalRequest) -> Response {
    let report = match state.orchestrator.run_turn(request, None).await {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, "OpenAI completion failed");
            return problem_details::from_turn_error(&e).into_response();
        }
    };

    let usage = &report.outcome.usage;
    Json(OpenAIChatResponse {
        id: completion_id(),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: report.model.clone(),
        choices: vec![Choice {
            index: 0,
            message: AssistantMessage {
                role: "assistant".to_string(),
                content: report.outcome.text.clone(),
            },
            finish_reason: "stop".to_string(),
        }],
        usage: OpenAIUsage {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        },
    })
    .into_response()
}

// ============================================================================
// Streaming
// ============================================================================

/// Resolve the whole turn, then replay it as `chat.completion.chunk` events.
///
/// Tool calls are announced as they are dispatched; the final text follows
/// in pieces cut by the configured chunking, then `[DONE]`. The turn runs in
/// its own task and commits to the session even if the client goes away.
fn stream_completion(state: AppState, request: CanonicalRequest) -> Response {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(STREAM_BUFFER);
    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.keep_alive_interval_seconds))
        .text("keep-alive");

    tokio::spawn(async move {
        let id = completion_id();
        let created = chrono::Utc::now().timestamp();
        let model = request.model.clone();
        let emitter = ChunkEmitter {
            tx: &tx,
            id: &id,
            created,
            model: &model,
        };

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let turn = state.orchestrator.run_turn(request, Some(events_tx));
        tokio::pin!(turn);

        let result = loop {
            tokio::select! {
                biased;
                Some(event) = events_rx.recv() => emitter.tool_call(event).await,
                result = &mut turn => break result,
            }
        };
        while let Ok(event) = events_rx.try_recv() {
            emitter.tool_call(event).await;
        }

        match result {
            Ok(report) => {
                for piece in state.chunking.split(&report.outcome.text) {
                    let delta = Delta {
                        content: Some(piece.to_string()),
                        ..Delta::default()
                    };
                    if !emitter.chunk(delta, None).await {
                        debug!("Client went away during stream");
                        return;
                    }
                }
                emitter.chunk(Delta::default(), Some("stop")).await;
            }
            Err(e) => {
                warn!(error = %e, "OpenAI stream failed");
                let body = serde_json::json!({ "error": e.to_string() });
                let _ = tx.send(Ok(Event::default().data(body.to_string()))).await;
            }
        }
        let _ = tx.send(Ok(Event::default().data(DONE_SENTINEL))).await;
    });

    Sse::new(ReceiverStream::new(rx))
        .keep_alive(keep_alive)
        .into_response()
}

struct ChunkEmitter<'a> {
    tx: &'a mpsc::Sender<Result<Event, Infallible>>,
    id: &'a str,
    created: i64,
    model: &'a str,
}

impl ChunkEmitter<'_> {
    /// Send one chunk; false once the receiver is gone.
    async fn chunk(&self, delta: Delta, finish: Option<&str>) -> bool {
        let chunk = OpenAIChunk::new(self.id, self.created, self.model, delta, finish);
        let data = match serde_json::to_string(&chunk) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Failed to encode chunk");
                return true;
            }
        };
        self.tx.send(Ok(Event::default().data(data))).await.is_ok()
    }

    async fn tool_call(&self, event: TurnEvent) {
        let TurnEvent::ToolCall { name, args } = event;
        let delta = Delta {
            role: Some("assistant".to_string()),
            tool_calls: vec![ToolCallDelta {
                id: format!("{name}-{}", ulid::Ulid::new()),
                kind: "function".to_string(),
                function: FunctionCallDelta {
                    name,
                    arguments: args.to_string(),
                },
            }],
            ..Delta::default()
        };
        self.chunk(delta, Some("tool_calls")).await;
    }
}

// ============================================================================
// Models
// ============================================================================

/// GET /v1/models
pub async fn list_models(State(state): State<AppState>) -> Json<OpenAIModelList> {
    let orchestrator = &state.orchestrator;
    let created = chrono::Utc::now().timestamp();
    let entry = |id: &str| OpenAIModel {
        id: id.to_string(),
        object: "model".to_string(),
        created,
        owned_by: MODEL_OWNER.to_string(),
    };

    let mut data = Vec::new();
    let mut stream = ModelCatalog::new(orchestrator.provider().clone()).models();
    while let Some(item) = stream.next().await {
        match item {
            Ok(info) if orchestrator.filter().is_listable(&info) => data.push(entry(info.id())),
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Model listing stopped early");
                break;
            }
        }
    }

    if data.is_empty() {
        let active = orchestrator.active_cache().await;
        let fallback = if active.is_active() {
            active.model
        } else {
            orchestrator.settings().default_model.clone()
        };
        data.push(entry(&fallback));
    }

    Json(OpenAIModelList {
        object: "list".to_string(),
        data,
    })
}
