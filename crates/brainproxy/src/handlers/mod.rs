//! HTTP request handlers.

mod admin;
pub(crate) mod api_auth;
mod gemini;
mod health;
mod native;
pub mod openai;
pub(crate) mod problem_details;
mod version;

pub use admin::shutdown;
pub use gemini::dispatch as gemini_dispatch;
pub use health::{livez, readyz};
pub use native::{chat, files, models, reset, status};
pub use version::version;
