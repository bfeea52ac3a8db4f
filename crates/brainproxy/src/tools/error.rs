use thiserror::Error;

/// Failure of one tool invocation. Always reported back to the model.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Access denied: outside project root")]
    AccessDenied,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("file too large: {path} ({size} bytes, limit {limit})")]
    TooLarge { path: String, size: u64, limit: u64 },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

impl ToolError {
    /// Map an I/O failure, keeping "not found" distinct.
    pub(crate) fn from_io(path: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            ToolError::NotFound(path.to_string())
        } else {
            ToolError::Io {
                path: path.to_string(),
                source,
            }
        }
    }
}
