use std::path::PathBuf;

/// Navigation error.
#[derive(Debug, thiserror::Error)]
pub enum NavError {
    /// A content path cannot be used in a URL as-is.
    #[error("path is not URL safe, please rename: {0}")]
    UnsafePath(String),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid layout JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to render footer {}: {source}", path.display())]
    Footer {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl NavError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
