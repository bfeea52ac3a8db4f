//! Wire types for the native and OpenAI-compatible HTTP APIs.
//!
//! Provider-native passthrough bodies reuse [`crate::llm::GenerateRequest`]
//! and [`crate::llm::GenerateResponse`] directly.

use serde::{Deserialize, Serialize};

use crate::llm::Blob;

// ============================================================================
// Session Ids
// ============================================================================

/// Native session used when the client sends none.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Shared session of the buffered OpenAI adapter.
pub const OPENAI_SESSION_ID: &str = "openai-compat";

/// Shared session of the streaming OpenAI adapter.
pub const OPENAI_STREAM_SESSION_ID: &str = "openai-stream";

/// Prefix of per-caller OpenAI sessions keyed by the `user` field.
pub const OPENAI_USER_SESSION_PREFIX: &str = "openai:";

/// Native message used when the client sends an empty one.
pub const EMPTY_MESSAGE_FALLBACK: &str = "Hello";

/// SSE stream terminator.
pub const DONE_SENTINEL: &str = "[DONE]";

/// `owned_by` value in model listings.
pub const MODEL_OWNER: &str = "brainproxy";

// ============================================================================
// Native API
// ============================================================================

fn default_session_id() -> String {
    DEFAULT_SESSION_ID.to_string()
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default = "default_session_id")]
    pub session_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub message: String,
    /// Explicit cache reference, overriding the server's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_id: Option<String>,
    #[serde(default)]
    pub use_search: bool,
    #[serde(default)]
    pub use_agentic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub mime_type: String,
    /// Base64 payload as returned upstream.
    pub data: String,
}

impl From<Blob> for ImageData {
    fn from(blob: Blob) -> Self {
        Self {
            mime_type: blob.mime_type,
            data: blob.data,
        }
    }
}

/// Response of `POST /chat`.
///
/// Cost field names are kept for existing clients; values are in the price
/// table's currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<String>,
    pub prompt_tokens: u64,
    pub response_tokens: u64,
    pub total_tokens: u64,
    #[serde(rename = "request_cost_brl")]
    pub request_cost: f64,
    #[serde(rename = "session_total_brl")]
    pub total_cost: f64,
}

/// Query of `/reset`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Query of `GET /files`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilesQuery {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<String>,
}

/// Response of `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// `CACHED` or `CLEAN`.
    pub mode: String,
    pub cache_id: String,
    pub cache_model: String,
    pub cache_mode: String,
    pub project_root: String,
    pub listen_addr: String,
    pub debug_mode: bool,
    pub total_cost: f64,
    pub sessions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub name: String,
    pub cost: String,
}

/// Response of `GET /models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelEntry>,
}

// ============================================================================
// OpenAI-compatible API
// ============================================================================

/// One piece of an array-form message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Message content: a plain string or an array of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl MessageContent {
    /// Text with array parts joined by newlines.
    pub fn to_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    #[serde(default)]
    pub content: MessageContent,
}

/// Body of `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIChatRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<OpenAIMessage>,
    #[serde(default)]
    pub stream: bool,
    /// Optional caller id; selects a per-caller session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl OpenAIChatRequest {
    /// Text of the last `user` message.
    pub fn last_user_message(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.to_text())
            .unwrap_or_default()
    }

    pub fn session_id(&self, shared: &str) -> String {
        match self.user.as_deref().filter(|u| !u.is_empty()) {
            Some(user) => format!("{OPENAI_USER_SESSION_PREFIX}{user}"),
            None => shared.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAIUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Buffered response of `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIChatResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: OpenAIUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCallDelta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

/// One `chat.completion.chunk` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

impl OpenAIChunk {
    pub fn new(id: &str, created: i64, model: &str, delta: Delta, finish: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            object: "chat.completion.chunk".to_string(),
            created,
            model: model.to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: finish.map(str::to_string),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIModel {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

/// Response of `GET /v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIModelList {
    pub object: String,
    pub data: Vec<OpenAIModel>,
}
