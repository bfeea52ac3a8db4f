//! The closed set of file tools and their filesystem operations.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::confine::ProjectRoot;
use super::error::ToolError;
use crate::llm::{FunctionCall, FunctionDeclaration};

/// `read_file` refuses anything larger.
pub const MAX_READ_BYTES: u64 = 1_048_576;

pub const LIST_FILES: &str = "list_files";
pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";

fn current_dir() -> String {
    ".".to_string()
}

/// A parsed tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "name", content = "args", rename_all = "snake_case")]
pub enum FileTool {
    ListFiles {
        #[serde(default = "current_dir")]
        path: String,
    },
    ReadFile {
        path: String,
    },
    WriteFile {
        path: String,
        content: String,
    },
}

impl FileTool {
    pub fn name(&self) -> &'static str {
        match self {
            FileTool::ListFiles { .. } => LIST_FILES,
            FileTool::ReadFile { .. } => READ_FILE,
            FileTool::WriteFile { .. } => WRITE_FILE,
        }
    }

    /// Parse a model function call into a tool.
    pub fn from_call(call: &FunctionCall) -> Result<Self, ToolError> {
        if ![LIST_FILES, READ_FILE, WRITE_FILE].contains(&call.name.as_str()) {
            return Err(ToolError::UnknownTool(call.name.clone()));
        }
        let args = match &call.args {
            Value::Null => json!({}),
            other => other.clone(),
        };
        serde_json::from_value(json!({ "name": call.name, "args": args })).map_err(|e| {
            ToolError::InvalidArguments {
                tool: call.name.clone(),
                message: e.to_string(),
            }
        })
    }

    /// Run against the filesystem under `root`.
    pub async fn run(&self, root: &ProjectRoot) -> Result<Value, ToolError> {
        match self {
            FileTool::ListFiles { path } => {
                let dir = root.resolve(path)?;
                let files = list_dir(&dir, path).await?;
                Ok(json!({ "files": files }))
            }
            FileTool::ReadFile { path } => {
                let file = root.resolve(path)?;
                let content = read_text(&file, path).await?;
                Ok(json!({ "content": content }))
            }
            FileTool::WriteFile { path, content } => {
                let file = root.resolve(path)?;
                let written = write_text(&file, path, content).await?;
                info!(path = %path, bytes = written, "write_file executed");
                Ok(json!({ "status": "OK", "path": path, "bytes_written": written }))
            }
        }
    }
}

/// Directory entry names, directories suffixed with `/`, sorted.
pub async fn list_dir(dir: &Path, display: &str) -> Result<Vec<String>, ToolError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ToolError::from_io(display, e))?;
    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ToolError::from_io(display, e))?
    {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        if is_dir {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

async fn read_text(file: &Path, display: &str) -> Result<String, ToolError> {
    let meta = tokio::fs::metadata(file)
        .await
        .map_err(|e| ToolError::from_io(display, e))?;
    if meta.len() > MAX_READ_BYTES {
        return Err(ToolError::TooLarge {
            path: display.to_string(),
            size: meta.len(),
            limit: MAX_READ_BYTES,
        });
    }
    let bytes = tokio::fs::read(file)
        .await
        .map_err(|e| ToolError::from_io(display, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

async fn write_text(file: &Path, display: &str, content: &str) -> Result<usize, ToolError> {
    let io_err = |source| ToolError::Io {
        path: display.to_string(),
        source,
    };
    if let Some(parent) = file.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    tokio::fs::write(file, content).await.map_err(io_err)?;
    Ok(content.len())
}

/// Function declarations for agentic calls.
///
/// `read_file` and `list_files` are left out when a cache is attached, since
/// the cache already carries the project's files.
pub fn declarations(include_readers: bool) -> Vec<FunctionDeclaration> {
    let mut out = Vec::with_capacity(3);
    if include_readers {
        out.push(FunctionDeclaration {
            name: LIST_FILES.to_string(),
            description: "List files and directories at a path relative to the project root. \
                          Directories end with '/'."
                .to_string(),
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "path": { "type": "STRING", "description": "Directory path, default '.'" }
                }
            }),
        });
        out.push(FunctionDeclaration {
            name: READ_FILE.to_string(),
            description: "Read a text file relative to the project root.".to_string(),
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "path": { "type": "STRING", "description": "File path" }
                },
                "required": ["path"]
            }),
        });
    }
    out.push(FunctionDeclaration {
        name: WRITE_FILE.to_string(),
        description: "Create or overwrite a file relative to the project root. \
                      Parent directories are created as needed."
            .to_string(),
        parameters: json!({
            "type": "OBJECT",
            "properties": {
                "path": { "type": "STRING", "description": "File path" },
                "content": { "type": "STRING", "description": "Full file content" }
            },
            "required": ["path", "content"]
        }),
    });
    out
}
