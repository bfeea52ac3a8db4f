//! Tool executor for the agentic turn loop.

use serde_json::json;
use tracing::{debug, warn};

use super::confine::ProjectRoot;
use super::files::FileTool;
use crate::llm::{FunctionCall, FunctionResponse};

/// Runs model-requested tools inside a confined project root.
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    root: ProjectRoot,
}

impl ToolExecutor {
    pub fn new(root: ProjectRoot) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &ProjectRoot {
        &self.root
    }

    /// Execute one call. Every outcome, including failures, becomes exactly
    /// one function response; errors are reported as `{"error": "..."}`.
    pub async fn execute(&self, call: &FunctionCall) -> FunctionResponse {
        debug!(tool = %call.name, args = %call.args, "Executing tool");

        let outcome = match FileTool::from_call(call) {
            Ok(tool) => tool.run(&self.root).await,
            Err(e) => Err(e),
        };
        let response = match outcome {
            Ok(value) => value,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool failed");
                json!({ "error": e.to_string() })
            }
        };

        FunctionResponse {
            id: call.id.clone(),
            name: call.name.clone(),
            response,
        }
    }

    /// Execute calls in order, returning results in the same order.
    pub async fn execute_all(&self, calls: &[FunctionCall]) -> Vec<FunctionResponse> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(call).await);
        }
        results
    }
}
