//! Provider-native passthrough: `/v1beta/models/{model}:{action}`.
//!
//! Plain completions only. The first user text is forwarded with the
//! eligible cache attached; no tools, no session.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use super::problem_details;
use crate::llm::{GenerateRequest, UsageMetadata};
use crate::orchestrator::preview;
use crate::server::AppState;

const GENERATE: &str = "generateContent";
const STREAM_GENERATE: &str = "streamGenerateContent";
const STREAM_BUFFER: usize = 64;

/// POST /v1beta/models/{model}:{action}
pub async fn dispatch(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    Json(body): Json<GenerateRequest>,
) -> Response {
    let Some((model, action)) = rest.rsplit_once(':') else {
        return problem_details::not_found(format!("unknown resource: {rest}")).into_response();
    };
    let model = model.strip_prefix("models/").unwrap_or(model);
    if let Err(message) = state.orchestrator.ensure_allowed(model) {
        warn!(model = %model, "Rejected blocked model");
        return problem_details::bad_request(message).into_response();
    }

    let request = state.orchestrator.passthrough_request(model, &body).await;
    let message = request.first_user_text().unwrap_or_default();
    info!(
        model = %model,
        action = %action,
        cached = request.cached_content.is_some(),
        ">>> /v1beta: {}",
        preview(message)
    );

    match action {
        GENERATE => generate(state, request).await,
        STREAM_GENERATE => stream(state, request).await,
        other => problem_details::not_found(format!("unknown action: {other}")).into_response(),
    }
}

async fn generate(state: AppState, request: GenerateRequest) -> Response {
    match state.orchestrator.generate_once(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            warn!(error = %e, "Passthrough call failed");
            problem_details::bad_gateway(e.to_string()).into_response()
        }
    }
}

/// Relay upstream chunks as they arrive, one `data:` event each.
async fn stream(state: AppState, request: GenerateRequest) -> Response {
    let model = request.model.clone();
    let upstream = match state.orchestrator.stream_once(request).await {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!(error = %e, "Passthrough stream failed to start");
            return problem_details::bad_gateway(e.to_string()).into_response();
        }
    };

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(STREAM_BUFFER);
    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.keep_alive_interval_seconds))
        .text("keep-alive");

    tokio::spawn(async move {
        let mut upstream = upstream;
        let mut text = String::new();
        let mut usage: Option<UsageMetadata> = None;

        while let Some(item) = upstream.next().await {
            let data = match item {
                Ok(chunk) => {
                    text.push_str(&chunk.text());
                    if chunk.usage_metadata.is_some() {
                        usage = chunk.usage_metadata.clone();
                    }
                    serde_json::to_string(&chunk)
                        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
                }
                Err(e) => {
                    warn!(error = %e, "Passthrough stream broke");
                    serde_json::json!({ "error": e.to_string() }).to_string()
                }
            };
            if tx.send(Ok(Event::default().data(data))).await.is_err() {
                break;
            }
        }

        let orchestrator = &state.orchestrator;
        if let Some(usage) = usage {
            let cost = orchestrator.prices().cost(&model, &usage);
            let total = orchestrator.costs().add(cost).await;
            info!(
                model = %model,
                prompt_tokens = usage.prompt_token_count,
                response_tokens = usage.candidates_token_count,
                cost,
                total_cost = total,
                "<<< passthrough stream complete"
            );
        }
        orchestrator.dump_debug(&text).await;
    });

    Sse::new(ReceiverStream::new(rx))
        .keep_alive(keep_alive)
        .into_response()
}
