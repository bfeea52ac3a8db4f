//! Turn loop for model/tool round trips.
//!
//! One user turn runs through this state machine:
//! 1. `Sending`: submit history plus the pending turns, accumulate usage and cost
//! 2. If the response has function calls, go to `AwaitingToolResolution`
//! 3. `AwaitingToolResolution`: run every call, bundle the results, back to `Sending`
//! 4. Otherwise take text and images as the final payload and stop in `Done`
//!
//! The number of tool rounds is capped; exceeding the cap fails the turn.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cost::{CostTracker, PriceTable};
use crate::llm::{
    Blob, Content, FunctionCall, GenerateRequest, GenerateResponse, GenerationConfig, LLMError,
    ModelProvider, Role, SafetySetting, Tool, UsageMetadata,
};
use crate::tools::{ToolExecutor, declarations};

/// Returned instead of empty text when the model said nothing at all.
pub const EMPTY_RESPONSE_WARNING: &str =
    "[System Warning: Model returned empty content. This may be a safety block or API glitch.]";

/// Prefix of the text returned when a call fails after tools already ran.
pub const DEGRADED_PREFIX: &str = "Error after tool execution: ";

// ============================================================================
// Types
// ============================================================================

/// Per-turn upstream configuration, decided before the loop starts.
#[derive(Debug, Clone)]
pub struct TurnPlan {
    pub model: String,
    pub cached_content: Option<String>,
    pub use_search: bool,
    pub use_agentic: bool,
    pub temperature: Option<f32>,
    pub max_tool_rounds: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Sending,
    AwaitingToolResolution,
    Done,
}

/// Progress notifications for streaming adapters.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    ToolCall { name: String, args: serde_json::Value },
}

/// Result of a completed turn.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// Turns to append to the session: user, then model/tool pairs, then the answer.
    pub new_turns: Vec<Content>,
    pub text: String,
    pub images: Vec<Blob>,
    /// `Executed: <name>` per dispatched call, in order.
    pub tools_executed: Vec<String>,
    pub usage: UsageMetadata,
    pub cost: f64,
    pub rounds: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("{0}")]
    Provider(#[from] LLMError),

    #[error("exceeded {0} tool rounds without a final answer")]
    MaxToolRoundsExceeded(u32),
}

// ============================================================================
// TurnLoop
// ============================================================================

/// Dependencies of one turn.
pub struct TurnLoop<'a> {
    provider: &'a dyn ModelProvider,
    executor: &'a ToolExecutor,
    prices: &'a PriceTable,
    costs: &'a CostTracker,
    events: Option<mpsc::UnboundedSender<TurnEvent>>,
}

impl<'a> TurnLoop<'a> {
    pub fn new(
        provider: &'a dyn ModelProvider,
        executor: &'a ToolExecutor,
        prices: &'a PriceTable,
        costs: &'a CostTracker,
    ) -> Self {
        Self {
            provider,
            executor,
            prices,
            costs,
            events: None,
        }
    }

    /// Send a [`TurnEvent`] for each dispatched tool call.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<TurnEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn build_request(
        &self,
        plan: &TurnPlan,
        history: &[Content],
        pending: &[Content],
    ) -> GenerateRequest {
        let mut tools = Vec::new();
        if plan.use_search {
            tools.push(Tool::google_search());
        }
        if plan.use_agentic {
            tools.push(Tool::functions(declarations(plan.cached_content.is_none())));
        }

        GenerateRequest {
            model: plan.model.clone(),
            contents: history.iter().chain(pending).cloned().collect(),
            system_instruction: None,
            tools,
            safety_settings: SafetySetting::permissive(),
            generation_config: plan.temperature.map(|t| GenerationConfig {
                temperature: Some(t),
                max_output_tokens: None,
            }),
            cached_content: plan.cached_content.clone(),
        }
    }

    /// Run one user turn to completion.
    ///
    /// A provider failure on the first call fails the turn. A failure after
    /// tools ran is folded into degraded text so the progress is kept.
    pub async fn run(
        &self,
        plan: &TurnPlan,
        history: &[Content],
        message: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let mut outcome = TurnOutcome {
            new_turns: vec![Content::user_text(message)],
            ..TurnOutcome::default()
        };
        let mut state = TurnState::Sending;
        let mut pending_calls: Vec<FunctionCall> = Vec::new();
        let mut last_response = GenerateResponse::default();

        loop {
            match state {
                TurnState::Sending => {
                    let request = self.build_request(plan, history, &outcome.new_turns);
                    debug!(
                        model = %plan.model,
                        round = outcome.rounds,
                        contents = request.contents.len(),
                        cached = request.cached_content.is_some(),
                        "Sending turn"
                    );

                    let response = match self.provider.generate(request).await {
                        Ok(response) => response,
                        Err(e) if outcome.rounds == 0 => return Err(TurnError::Provider(e)),
                        Err(e) => {
                            warn!(error = %e, rounds = outcome.rounds, "Provider failed after tool execution");
                            outcome.text = format!("{DEGRADED_PREFIX}{e}");
                            outcome.new_turns.push(Content::model_text(outcome.text.clone()));
                            return Ok(outcome);
                        }
                    };

                    let usage = response.usage();
                    let cost = self.prices.cost(&plan.model, &usage);
                    outcome.usage.add(&usage);
                    outcome.cost += cost;
                    self.costs.add(cost).await;

                    pending_calls = response.function_calls();
                    state = if pending_calls.is_empty() {
                        TurnState::Done
                    } else {
                        if let Some(content) = response.content() {
                            let mut turn = content.clone();
                            turn.role = Role::Model;
                            outcome.new_turns.push(turn);
                        }
                        TurnState::AwaitingToolResolution
                    };
                    last_response = response;
                }
                TurnState::AwaitingToolResolution => {
                    if outcome.rounds >= plan.max_tool_rounds {
                        return Err(TurnError::MaxToolRoundsExceeded(plan.max_tool_rounds));
                    }
                    outcome.rounds += 1;

                    for call in &pending_calls {
                        info!(tool = %call.name, args = %call.args, round = outcome.rounds, "Tool call");
                        outcome.tools_executed.push(format!("Executed: {}", call.name));
                        if let Some(events) = &self.events {
                            let _ = events.send(TurnEvent::ToolCall {
                                name: call.name.clone(),
                                args: call.args.clone(),
                            });
                        }
                    }
                    let results = self.executor.execute_all(&pending_calls).await;
                    outcome.new_turns.push(Content::tool_results(results));
                    state = TurnState::Sending;
                }
                TurnState::Done => break,
            }
        }

        self.finish(&mut outcome, last_response);
        Ok(outcome)
    }

    fn finish(&self, outcome: &mut TurnOutcome, response: GenerateResponse) {
        outcome.images = response.inline_data();
        let text = response.text().trim().to_string();

        outcome.text = if !text.is_empty() {
            text
        } else if !outcome.images.is_empty() {
            format!("[Generated {} image(s)]", outcome.images.len())
        } else if !outcome.tools_executed.is_empty() {
            format!(
                "[Executed {} tool(s) but model provided no summary.]",
                outcome.tools_executed.len()
            )
        } else {
            EMPTY_RESPONSE_WARNING.to_string()
        };

        let answer = match response.content() {
            Some(content) if !content.parts.is_empty() => {
                let mut turn = content.clone();
                turn.role = Role::Model;
                turn
            }
            _ => Content::model_text(outcome.text.clone()),
        };
        outcome.new_turns.push(answer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{
        CacheRequest, CachedContent, Candidate, FunctionResponse, ModelPage, Part,
    };
    use crate::tools::ProjectRoot;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays canned responses and records requests.
    struct Script {
        responses: Mutex<Vec<Result<GenerateResponse, LLMError>>>,
        requests: Mutex<Vec<GenerateRequest>>,
    }

    impl Script {
        fn new(mut responses: Vec<Result<GenerateResponse, LLMError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelProvider for Script {
        async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LLMError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(GenerateResponse::from_text("fallback")))
        }

        async fn create_cached_content(&self, _: CacheRequest) -> Result<CachedContent, LLMError> {
            unreachable!()
        }

        async fn list_models_page(&self, _: Option<String>) -> Result<ModelPage, LLMError> {
            unreachable!()
        }
    }

    fn calls(names: &[&str]) -> GenerateResponse {
        GenerateResponse {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Role::Model,
                    parts: names
                        .iter()
                        .map(|n| {
                            Part::FunctionCall(FunctionCall {
                                id: None,
                                name: n.to_string(),
                                args: json!({}),
                            })
                        })
                        .collect(),
                }),
                finish_reason: None,
            }],
            usage_metadata: Some(UsageMetadata {
                prompt_token_count: 10,
                candidates_token_count: 5,
                total_token_count: 15,
            }),
            model_version: None,
        }
    }

    fn plan(max_tool_rounds: u32) -> TurnPlan {
        TurnPlan {
            model: "gemini-1.5-pro".to_string(),
            cached_content: None,
            use_search: false,
            use_agentic: true,
            temperature: Some(0.2),
            max_tool_rounds,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        executor: ToolExecutor,
        prices: PriceTable,
        costs: CostTracker,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let executor = ToolExecutor::new(ProjectRoot::new(dir.path()).unwrap());
        Fixture {
            _dir: dir,
            executor,
            prices: PriceTable::builtin(),
            costs: CostTracker::new(),
        }
    }

    #[tokio::test]
    async fn k_tool_rounds_then_answer() {
        let f = fixture();
        let k = 3;
        let mut script: Vec<_> = (0..k).map(|_| Ok(calls(&["list_files"]))).collect();
        script.push(Ok(GenerateResponse::from_text("  all done \n")));
        let provider = Script::new(script);

        let outcome = TurnLoop::new(&provider, &f.executor, &f.prices, &f.costs)
            .run(&plan(10), &[], "look around")
            .await
            .unwrap();

        assert_eq!(outcome.rounds, k);
        assert_eq!(outcome.text, "all done");
        assert_eq!(outcome.tools_executed, vec!["Executed: list_files"; 3]);
        assert_eq!(provider.requests.lock().unwrap().len(), 4);
        // user, (model fc, tool result) x3, model answer
        assert_eq!(outcome.new_turns.len(), 1 + 2 * 3 + 1);
        assert_eq!(outcome.usage.prompt_token_count, 30);
        assert!(outcome.cost > 0.0);
        assert_eq!(f.costs.total().await, outcome.cost);
    }

    #[tokio::test]
    async fn tool_results_follow_their_calls() {
        let f = fixture();
        let provider = Script::new(vec![
            Ok(calls(&["list_files", "read_file"])),
            Ok(GenerateResponse::from_text("ok")),
        ]);

        let outcome = TurnLoop::new(&provider, &f.executor, &f.prices, &f.costs)
            .run(&plan(10), &[], "go")
            .await
            .unwrap();

        let model_turn = &outcome.new_turns[1];
        let tool_turn = &outcome.new_turns[2];
        assert_eq!(model_turn.function_calls().count(), 2);
        assert_eq!(tool_turn.role, Role::Tool);
        let names: Vec<&str> = tool_turn
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::FunctionResponse(FunctionResponse { name, .. }) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["list_files", "read_file"]);

        // Second request carries the bundled results.
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[1].contents.len(), 3);
    }

    #[tokio::test]
    async fn exceeding_round_cap_is_fatal() {
        let f = fixture();
        let provider = Script::new((0..5).map(|_| Ok(calls(&["list_files"]))).collect());

        let err = TurnLoop::new(&provider, &f.executor, &f.prices, &f.costs)
            .run(&plan(2), &[], "loop")
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::MaxToolRoundsExceeded(2)));
        assert_eq!(provider.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn first_call_failure_is_fatal() {
        let f = fixture();
        let provider = Script::new(vec![Err(LLMError::Api {
            status: 503,
            message: "overloaded".to_string(),
        })]);

        let err = TurnLoop::new(&provider, &f.executor, &f.prices, &f.costs)
            .run(&plan(10), &[], "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Provider(_)));
    }

    #[tokio::test]
    async fn failure_after_tools_degrades() {
        let f = fixture();
        let provider = Script::new(vec![
            Ok(calls(&["list_files"])),
            Err(LLMError::Api {
                status: 500,
                message: "boom".to_string(),
            }),
        ]);

        let outcome = TurnLoop::new(&provider, &f.executor, &f.prices, &f.costs)
            .run(&plan(10), &[], "hi")
            .await
            .unwrap();
        assert!(outcome.text.starts_with(DEGRADED_PREFIX));
        assert_eq!(outcome.tools_executed.len(), 1);
        assert_eq!(outcome.new_turns.len(), 4);
        assert_eq!(outcome.new_turns[3].role, Role::Model);
    }

    #[tokio::test]
    async fn empty_answers_get_sentinels() {
        let f = fixture();

        let provider = Script::new(vec![Ok(GenerateResponse::default())]);
        let outcome = TurnLoop::new(&provider, &f.executor, &f.prices, &f.costs)
            .run(&plan(10), &[], "hi")
            .await
            .unwrap();
        assert_eq!(outcome.text, EMPTY_RESPONSE_WARNING);
        assert_eq!(outcome.new_turns.len(), 2);

        let provider = Script::new(vec![
            Ok(calls(&["list_files", "list_files"])),
            Ok(GenerateResponse::from_text("   ")),
        ]);
        let outcome = TurnLoop::new(&provider, &f.executor, &f.prices, &f.costs)
            .run(&plan(10), &[], "hi")
            .await
            .unwrap();
        assert_eq!(outcome.text, "[Executed 2 tool(s) but model provided no summary.]");

        let mut image = GenerateResponse::from_text("");
        if let Some(content) = image.candidates[0].content.as_mut() {
            content.parts = vec![Part::InlineData(Blob {
                mime_type: "image/png".to_string(),
                data: "AAAA".to_string(),
            })];
        }
        let provider = Script::new(vec![Ok(image)]);
        let outcome = TurnLoop::new(&provider, &f.executor, &f.prices, &f.costs)
            .run(&plan(10), &[], "draw")
            .await
            .unwrap();
        assert_eq!(outcome.text, "[Generated 1 image(s)]");
        assert_eq!(outcome.images.len(), 1);
    }

    #[tokio::test]
    async fn request_shape_follows_plan() {
        let f = fixture();
        let provider = Script::new(vec![Ok(GenerateResponse::from_text("x"))]);
        let mut p = plan(10);
        p.use_search = true;
        p.cached_content = Some("cachedContents/c".to_string());

        TurnLoop::new(&provider, &f.executor, &f.prices, &f.costs)
            .run(&p, &[Content::user_text("earlier")], "now")
            .await
            .unwrap();

        let requests = provider.requests.lock().unwrap();
        let req = &requests[0];
        assert_eq!(req.contents.len(), 2);
        assert_eq!(req.safety_settings.len(), 4);
        assert!(req.tools[0].google_search.is_some());
        let names: Vec<&str> = req.tools[1]
            .function_declarations
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["write_file"]);
    }

    #[tokio::test]
    async fn emits_tool_events() {
        let f = fixture();
        let provider = Script::new(vec![
            Ok(calls(&["read_file"])),
            Ok(GenerateResponse::from_text("done")),
        ]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        TurnLoop::new(&provider, &f.executor, &f.prices, &f.costs)
            .with_events(tx)
            .run(&plan(10), &[], "hi")
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, TurnEvent::ToolCall { ref name, .. } if name == "read_file"));
    }
}
