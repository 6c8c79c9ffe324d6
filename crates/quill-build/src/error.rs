use std::fmt;
use std::path::PathBuf;

use quill_assets::{AssetError, RegistrationError};
use quill_nav::NavError;
use quill_render::RenderError;
use quill_tools::ToolError;

use crate::search::SearchError;

/// Update stage that runs an external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Reset,
    LfsPull,
    Head,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetch => "fetch",
            Self::Reset => "reset",
            Self::LfsPull => "lfs pull",
            Self::Head => "resolve HEAD",
        })
    }
}

/// Why a single page could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),
}

/// A page that failed during output generation.
#[derive(Debug, thiserror::Error)]
#[error("{path}: {error}")]
pub struct PageFailure {
    /// Source path relative to the content directory.
    pub path: String,
    #[source]
    pub error: PageError,
}

/// Build error.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Another build holds the update flag.
    #[error("update already in progress")]
    InProgress,
    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: ToolError,
    },
    #[error("asset registration failed: {0}")]
    Assets(#[from] RegistrationError),
    #[error("layout failed: {0}")]
    Nav(#[from] NavError),
    #[error("index page failed: {0}")]
    IndexPage(#[source] RenderError),
    /// One or more pages failed; nothing was published.
    #[error("{} errors generating output", failures.len())]
    Render { failures: Vec<PageFailure> },
    #[error("search index failed: {0}")]
    Search(#[from] SearchError),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("build task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl BuildError {
    pub(crate) fn stage(stage: Stage) -> impl FnOnce(ToolError) -> Self {
        move |source| Self::Stage { stage, source }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the build failed because an external tool or an asset change
    /// check ran past its deadline.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Stage { source, .. } => source.is_timeout(),
            Self::Search(SearchError::Tool(source)) => source.is_timeout(),
            Self::Assets(RegistrationError::Files(failures)) => {
                failures.iter().any(asset_timed_out)
            }
            _ => false,
        }
    }
}

fn asset_timed_out(error: &AssetError) -> bool {
    match error {
        AssetError::ChangeCheckTimeout { .. } => true,
        AssetError::ChangeCheck { source, .. } => source
            .downcast_ref::<ToolError>()
            .is_some_and(ToolError::is_timeout),
        _ => false,
    }
}

/// Rejected or failed update trigger.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    /// No shared secret is configured, so triggers are disabled.
    #[error("update secret not configured")]
    NotConfigured,
    #[error("unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Build(#[from] BuildError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn timeout() -> ToolError {
        ToolError::Timeout {
            command: "git fetch origin main".to_owned(),
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_is_timeout() {
        assert!(BuildError::stage(Stage::Fetch)(timeout()).is_timeout());
        assert!(BuildError::Search(SearchError::Tool(timeout())).is_timeout());
        assert!(!BuildError::InProgress.is_timeout());
        let failed = ToolError::Failed {
            command: "git lfs pull".to_owned(),
            code: Some(2),
            output: String::new(),
        };
        assert!(!BuildError::stage(Stage::LfsPull)(failed).is_timeout());
    }

    #[test]
    fn test_asset_check_timeouts_are_timeouts() {
        let deadline = AssetError::ChangeCheckTimeout {
            path: PathBuf::from("assets/logo.png"),
            timeout: Duration::from_secs(5),
        };
        let tool = AssetError::ChangeCheck {
            path: PathBuf::from("assets/app.css"),
            source: Box::new(timeout()),
        };
        let unreadable = AssetError::Read {
            path: PathBuf::from("assets/a.js"),
            source: std::io::Error::other("denied"),
        };

        assert!(BuildError::Assets(RegistrationError::Files(vec![deadline])).is_timeout());
        assert!(
            BuildError::Assets(RegistrationError::Files(vec![
                AssetError::NonUtf8Path(PathBuf::from("x")),
                tool,
            ]))
            .is_timeout()
        );
        assert!(!BuildError::Assets(RegistrationError::Files(vec![unreadable])).is_timeout());
    }

    #[test]
    fn test_render_error_message() {
        let err = BuildError::Render {
            failures: vec![PageFailure {
                path: "a.md".to_owned(),
                error: PageError::Write(std::io::Error::other("disk full")),
            }],
        };
        assert_eq!(err.to_string(), "1 errors generating output");
    }

    #[test]
    fn test_stage_message() {
        let err = BuildError::stage(Stage::Head)(timeout());
        assert!(err.to_string().starts_with("resolve HEAD failed: "));
    }
}
