use serde::Serialize;

// ============================================================================
// Constants
// ============================================================================

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = match option_env!("BUILD_COMMIT") {
    Some(c) => c,
    None => "unknown",
};
pub const BUILD_DATE: &str = match option_env!("BUILD_DATE") {
    Some(d) => d,
    None => "unknown",
};

/// Full version line, e.g. `0.3.0 (commit: abc123, built: 2026-01-01)`.
pub fn version_string() -> String {
    format!("{} (commit: {}, built: {})", VERSION, COMMIT, BUILD_DATE)
}

/// User-Agent sent on upstream requests.
pub fn user_agent() -> String {
    format!("brainproxy/{}", VERSION)
}

// ============================================================================
// BuildInfo
// ============================================================================

/// Body of `GET /version`.
#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub commit: &'static str,
    pub build_date: &'static str,
}

impl BuildInfo {
    #[must_use]
    pub fn current() -> Self {
        Self {
            version: VERSION,
            commit: COMMIT,
            build_date: BUILD_DATE,
        }
    }
}
