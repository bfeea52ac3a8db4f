//! Builds a server-side cache from a project directory.
//!
//! The walk collects the project's `.history` log first, then every text
//! source file under the root, each preceded by a `--- FILE: <path> ---`
//! header. Build output, dependency folders, media folders and backups are
//! skipped. Upstream refuses caches below a minimum size, so short projects
//! are padded before upload.

use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use super::state::{ActiveCache, CacheMode};
use crate::config::CacheConfig;
use crate::llm::{CacheRequest, Content, LLMError, ModelProvider, SystemInstruction};

const HISTORY_FILE: &str = ".history";
const HISTORY_HEADER: &str = "\n=== PROJECT HISTORY LOG ===\n";

const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "venv",
    ".venv",
    "dist",
    "build",
    ".next",
    ".DS_Store",
    "target",
    "out",
    "images",
    "img",
    "media",
    "photos",
    "videos",
];

const TEXT_EXTENSIONS: &[&str] = &[
    "md", "txt", "go", "js", "ts", "json", "lua", "css", "html", "rs", "toml", "yaml", "yml",
];

/// Files larger than this are left out.
pub const MAX_FILE_BYTES: u64 = 256 * 1024;

/// Collection stops once the context grows past this.
pub const MAX_TOTAL_CHARS: usize = 4_000_000;

/// Contexts smaller than this get padded.
pub const MIN_CACHE_BYTES: usize = 32_768;

const PAD_TARGET: usize = 33_000;
const PADDING_LINE: &str = "\n// CACHE_PADDING_TOKEN_REDUNDANCY_FOR_COST_SAVINGS_PROTOCOL\n";

const BINARY_SNIFF_BYTES: usize = 1024;

#[derive(Debug, Error)]
pub enum CacheBuildError {
    #[error("project root {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("failed to walk project: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("collection task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("cache upload failed: {0}")]
    Upload(#[from] LLMError),
}

/// Concatenated project text ready for upload.
#[derive(Debug, Clone, Default)]
pub struct CollectedContext {
    pub text: String,
    pub files: usize,
    pub padded: bool,
}

fn is_backup(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("backup") || lower.contains("bkup")
}

fn keep_entry(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    if is_backup(&name) {
        return false;
    }
    !(entry.file_type().is_dir() && SKIP_DIRS.contains(&name.as_ref()))
}

fn has_text_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext))
}

fn read_file(path: &Path) -> Result<Vec<u8>, CacheBuildError> {
    let mut buf = Vec::new();
    std::fs::File::open(path)
        .and_then(|mut f| f.read_to_end(&mut buf))
        .map_err(|source| CacheBuildError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(buf)
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_BYTES).any(|b| *b == 0)
}

/// Walk `root` and build the cache text. Blocking; run off the runtime.
pub fn collect_project(root: &Path) -> Result<CollectedContext, CacheBuildError> {
    if !root.is_dir() {
        return Err(CacheBuildError::NotADirectory(root.to_path_buf()));
    }

    let mut ctx = CollectedContext::default();

    let history = root.join(HISTORY_FILE);
    if history.is_file() {
        let bytes = read_file(&history)?;
        ctx.text.push_str(HISTORY_HEADER);
        ctx.text.push_str(&String::from_utf8_lossy(&bytes));
        ctx.text.push('\n');
    }

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(keep_entry)
    {
        let entry = entry?;
        if !entry.file_type().is_file() || !has_text_extension(entry.path()) {
            continue;
        }
        if entry.metadata()?.len() > MAX_FILE_BYTES {
            debug!(path = %entry.path().display(), "Skipping large file");
            continue;
        }
        if ctx.text.len() > MAX_TOTAL_CHARS {
            info!(files = ctx.files, "Context size limit reached, stopping walk");
            break;
        }

        let bytes = read_file(entry.path())?;
        if looks_binary(&bytes) {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        ctx.text
            .push_str(&format!("\n\n--- FILE: {} ---\n", relative.display()));
        ctx.text.push_str(&String::from_utf8_lossy(&bytes));
        ctx.files += 1;
    }

    if ctx.text.len() < MIN_CACHE_BYTES {
        let lines = (PAD_TARGET - ctx.text.len()).div_ceil(PADDING_LINE.len());
        ctx.text.push_str(&PADDING_LINE.repeat(lines));
        ctx.padded = true;
    }

    Ok(ctx)
}

/// Collect `root` and upload it as a cache bound to `model`.
pub async fn build_cache(
    provider: &dyn ModelProvider,
    root: &Path,
    model: &str,
    settings: &CacheConfig,
) -> Result<ActiveCache, CacheBuildError> {
    let walk_root = root.to_path_buf();
    let ctx = tokio::task::spawn_blocking(move || collect_project(&walk_root)).await??;
    info!(
        root = %root.display(),
        files = ctx.files,
        bytes = ctx.text.len(),
        padded = ctx.padded,
        "Collected project context"
    );

    let model = model.strip_prefix("models/").unwrap_or(model);
    let request = CacheRequest {
        model: format!("models/{model}"),
        display_name: settings.display_name.clone(),
        system_instruction: SystemInstruction::text(settings.system_prompt.clone()),
        contents: vec![Content::user_text(ctx.text)],
        ttl: format!("{}s", settings.ttl_minutes * 60),
    };
    let cached = provider.create_cached_content(request).await?;
    info!(cache = %cached.name, model, "Context cache created");

    Ok(ActiveCache {
        reference: cached.name,
        model: model.to_string(),
        mode: CacheMode::Built,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn collects_text_files_with_headers() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main.rs", b"fn main() {}");
        write(dir.path(), "README.md", b"# hello");

        let ctx = collect_project(dir.path()).unwrap();
        assert_eq!(ctx.files, 2);
        assert!(ctx.text.contains("--- FILE: README.md ---\n# hello"));
        assert!(ctx.text.contains(&format!(
            "--- FILE: {} ---\nfn main() {{}}",
            Path::new("src").join("main.rs").display()
        )));
    }

    #[test]
    fn skips_ignored_dirs_backups_binaries_and_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "node_modules/lib/index.js", b"ignored");
        write(dir.path(), "target/debug/out.rs", b"ignored");
        write(dir.path(), "images/readme.md", b"ignored");
        write(dir.path(), "old_backup/notes.md", b"ignored");
        write(dir.path(), "notes.bkup.md", b"ignored");
        write(dir.path(), "blob.txt", b"abc\0def");
        write(dir.path(), "photo.png", b"ignored");
        write(dir.path(), "kept.txt", b"kept");

        let ctx = collect_project(dir.path()).unwrap();
        assert_eq!(ctx.files, 1);
        assert!(ctx.text.contains("kept"));
        assert!(!ctx.text.contains("ignored"));
        assert!(!ctx.text.contains("abc"));
    }

    #[test]
    fn skips_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "big.txt", &vec![b'x'; MAX_FILE_BYTES as usize + 1]);
        let ctx = collect_project(dir.path()).unwrap();
        assert_eq!(ctx.files, 0);
    }

    #[test]
    fn history_comes_first() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".history", b"yesterday we shipped");
        write(dir.path(), "a.md", b"doc");

        let ctx = collect_project(dir.path()).unwrap();
        assert!(ctx.text.starts_with(HISTORY_HEADER));
        let history_at = ctx.text.find("yesterday").unwrap();
        let file_at = ctx.text.find("--- FILE: a.md").unwrap();
        assert!(history_at < file_at);
    }

    #[test]
    fn pads_small_contexts_past_minimum() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", b"tiny");

        let ctx = collect_project(dir.path()).unwrap();
        assert!(ctx.padded);
        assert!(ctx.text.len() >= PAD_TARGET);
        assert!(ctx.text.contains("CACHE_PADDING_TOKEN"));
    }

    #[test]
    fn large_contexts_are_not_padded() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", &vec![b'a'; MIN_CACHE_BYTES + 10]);

        let ctx = collect_project(dir.path()).unwrap();
        assert!(!ctx.padded);
    }

    #[test]
    fn missing_root_is_an_error() {
        let err = collect_project(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, CacheBuildError::NotADirectory(_)));
    }
}
