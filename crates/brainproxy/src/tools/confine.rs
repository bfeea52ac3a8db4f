//! Lexical confinement of client-supplied paths.

use std::path::{Component, Path, PathBuf};

use super::error::ToolError;

/// Normalize `.` and `..` without touching the filesystem.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                out.push(comp.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
        }
    }
    out
}

/// Absolute directory every tool path is resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRoot {
    root: PathBuf,
}

impl ProjectRoot {
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let absolute = std::path::absolute(root.as_ref())?;
        Ok(Self {
            root: clean(&absolute),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Join `requested` onto the root and reject anything that leaves it.
    ///
    /// Leading separators and drive prefixes in `requested` are ignored, so
    /// `/etc/passwd` means `<root>/etc/passwd`.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, ToolError> {
        let mut joined = self.root.clone();
        for comp in Path::new(requested).components() {
            match comp {
                Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
                Component::ParentDir => {
                    joined.pop();
                }
                Component::Normal(part) => joined.push(part),
            }
        }
        if joined.starts_with(&self.root) {
            Ok(joined)
        } else {
            Err(ToolError::AccessDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> ProjectRoot {
        ProjectRoot::new("/srv/project").unwrap()
    }

    #[test]
    fn resolves_inside_root() {
        let r = root();
        assert_eq!(r.resolve("src/main.rs").unwrap(), Path::new("/srv/project/src/main.rs"));
        assert_eq!(r.resolve(".").unwrap(), Path::new("/srv/project"));
        assert_eq!(r.resolve("a/./b/../c").unwrap(), Path::new("/srv/project/a/c"));
    }

    #[test]
    fn rejects_traversal() {
        let r = root();
        for path in ["..", "../../etc/passwd", "a/../../x", "../project-evil/x"] {
            assert!(matches!(r.resolve(path), Err(ToolError::AccessDenied)), "{path}");
        }
    }

    #[test]
    fn absolute_input_stays_under_root() {
        assert_eq!(
            root().resolve("/etc/passwd").unwrap(),
            Path::new("/srv/project/etc/passwd")
        );
    }

    #[test]
    fn root_is_cleaned() {
        let r = ProjectRoot::new("/srv/./project/sub/..").unwrap();
        assert_eq!(r.path(), Path::new("/srv/project"));
    }
}
