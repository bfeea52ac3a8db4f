//! Upstream model client (Gemini REST).

mod error;
mod gemini;
mod models;
mod provider;
mod types;

pub use error::LLMError;
pub use gemini::GeminiProvider;
pub use models::{ModelCatalog, ModelFilter};
pub use provider::{GenerateStream, ModelProvider};
pub use types::{
    Blob, CacheRequest, CachedContent, Candidate, Content, FunctionCall, FunctionDeclaration,
    FunctionResponse, GenerateRequest, GenerateResponse, GenerationConfig, GoogleSearch,
    ModelInfo, ModelPage, Part, Role, SafetySetting, SystemInstruction, Tool, UsageMetadata,
};
