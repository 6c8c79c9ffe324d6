use std::path::PathBuf;

/// Rendering error.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("path {} must end with .md or .html", .0.display())]
    UnsupportedSource(PathBuf),
    #[error("unmatched raw tag in {}", .0.display())]
    UnmatchedRaw(PathBuf),
    /// Every suffixed variant of a heading ID is taken.
    #[error("too many headings with ID {0}")]
    HeadingIdExhausted(String),
    #[error("template {name} failed: {source}")]
    Template {
        name: String,
        #[source]
        source: minijinja::Error,
    },
}

impl RenderError {
    pub(crate) fn template(name: impl Into<String>, source: minijinja::Error) -> Self {
        Self::Template {
            name: name.into(),
            source,
        }
    }
}
