use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Read-only view of the files a compilation may include.
pub trait SourceFS: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, FsError>;

    /// Identity used for include-once checks.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf, FsError>;
}

#[derive(Debug, Error)]
pub enum FsError {
    #[error("file not found: '{path}'")]
    NotFound { path: String },
    #[error("failed to read '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    pub fn path(&self) -> &str {
        match self {
            Self::NotFound { path } | Self::Io { path, .. } => path,
        }
    }
}

#[derive(Debug, Default)]
pub struct StdSourceFS;

impl SourceFS for StdSourceFS {
    fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        std::fs::read_to_string(path).map_err(|source| io_error(path, source))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, FsError> {
        std::fs::canonicalize(path).map_err(|source| io_error(path, source))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> FsError {
    let path = path.display().to_string();
    if source.kind() == std::io::ErrorKind::NotFound {
        FsError::NotFound { path }
    } else {
        FsError::Io { path, source }
    }
}

/// In-memory file tree keyed by lexically normalized paths.
#[derive(Debug, Default, Clone)]
pub struct MemorySourceFS {
    files: BTreeMap<PathBuf, String>,
}

impl MemorySourceFS {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, text: impl Into<String>) {
        self.files.insert(normalize(path.as_ref()), text.into());
    }
}

impl SourceFS for MemorySourceFS {
    fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        self.files
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| FsError::NotFound {
                path: path.display().to_string(),
            })
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, FsError> {
        let normalized = normalize(path);
        if self.files.contains_key(&normalized) {
            Ok(normalized)
        } else {
            Err(FsError::NotFound {
                path: path.display().to_string(),
            })
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_fs_normalizes_relative_components() {
        let fs = MemorySourceFS::new().with_file("lib/a.huff", "A");
        assert_eq!(
            fs.read_to_string(Path::new("./lib/../lib/a.huff"))
                .expect("read"),
            "A"
        );
        assert_eq!(
            fs.canonicalize(Path::new("lib/./a.huff")).expect("canonical"),
            PathBuf::from("lib/a.huff")
        );
    }

    #[test]
    fn memory_fs_reports_missing_files() {
        let fs = MemorySourceFS::new();
        let err = fs
            .read_to_string(Path::new("missing.huff"))
            .expect_err("must fail");
        assert!(matches!(err, FsError::NotFound { .. }));
        assert_eq!(err.path(), "missing.huff");
    }

    #[test]
    fn std_fs_maps_missing_file_to_not_found() {
        let err = StdSourceFS
            .read_to_string(Path::new("/definitely/not/here.huff"))
            .expect_err("must fail");
        assert!(matches!(err, FsError::NotFound { .. }));
    }
}
