//! Brainproxy - a stateful proxy in front of the Gemini API.
//!
//! Speaks three wire dialects (a native JSON API, OpenAI chat completions and
//! Gemini passthrough), keeps per-session history, runs a bounded tool loop
//! over a confined project directory and attaches a server-side context cache
//! when the request allows it.

// ============================================================================
// Core Infrastructure
// ============================================================================

pub mod build_info;
pub mod config;
pub mod sync;

// ============================================================================
// Server & HTTP
// ============================================================================

pub mod api;
pub mod chunking;
pub mod handlers;
pub mod server;
pub mod sse_parser;

// ============================================================================
// Domain
// ============================================================================

pub mod cache;
pub mod cost;
pub mod llm;
pub mod orchestrator;
pub mod session;
pub mod tools;
