//! Backing stores the cache loads misses from.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// Raw bytes loaded for a key, with the time they were last modified.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub data: Vec<u8>,
    pub modified: SystemTime,
}

/// Source of truth behind a [`ReadCache`](crate::ReadCache).
///
/// Implementations must be safe to call from several threads at once; the
/// cache calls `load` without holding its lock.
pub trait Backing: Send + Sync {
    /// Load the bytes for `key`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error. `NotFound` is reserved for keys that
    /// do not exist so callers can tell a missing file from a failed read.
    fn load(&self, key: &str) -> io::Result<Loaded>;
}

/// Files under a root directory, keyed by slash-separated relative path.
#[derive(Debug, Clone)]
pub struct FsBacking {
    root: PathBuf,
}

impl FsBacking {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map `key` to a path under the root.
    ///
    /// Keys that would leave the root (`..`, absolute components) resolve to
    /// nothing and are reported as `NotFound`.
    fn resolve(&self, key: &str) -> io::Result<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such key: {key}"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl Backing for FsBacking {
    fn load(&self, key: &str) -> io::Result<Loaded> {
        let path = self.resolve(key)?;
        let modified = std::fs::metadata(&path)?.modified()?;
        let data = std::fs::read(&path)?;
        Ok(Loaded { data, modified })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_backing_reads_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("guide")).unwrap();
        std::fs::write(dir.path().join("guide/intro.html"), "<p>hi</p>").unwrap();

        let backing = FsBacking::new(dir.path());
        let loaded = backing.load("/guide/intro.html").unwrap();

        assert_eq!(loaded.data, b"<p>hi</p>");
    }

    #[test]
    fn test_fs_backing_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backing = FsBacking::new(dir.path());

        let err = backing.load("missing.html").unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_fs_backing_rejects_parent_traversal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("root")).unwrap();
        std::fs::write(dir.path().join("secret.txt"), "nope").unwrap();

        let backing = FsBacking::new(dir.path().join("root"));
        let err = backing.load("../secret.txt").unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_fs_backing_rejects_empty_key() {
        let dir = tempfile::tempdir().unwrap();
        let backing = FsBacking::new(dir.path());

        assert_eq!(
            backing.load("/").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
