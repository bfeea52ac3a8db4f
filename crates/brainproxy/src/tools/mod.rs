//! Project file tools exposed to the model in agentic mode.

mod confine;
mod error;
mod executor;
mod files;

pub use confine::ProjectRoot;
pub use error::ToolError;
pub use executor::ToolExecutor;
pub use files::{FileTool, MAX_READ_BYTES, declarations, list_dir};
