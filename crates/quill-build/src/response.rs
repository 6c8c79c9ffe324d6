//! Transport-neutral responses produced by the serving facades.

use std::path::{Component, Path};
use std::sync::Arc;

use quill_cache::detect_mime;

/// Body of the page shown while an update is running.
pub const MAINTENANCE_HTML: &str = "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n\
<meta charset=\"utf-8\">\n<meta http-equiv=\"refresh\" content=\"5\">\n\
<title>Updating</title>\n</head>\n<body>\n\
<p>The site is being updated. This page will reload in a few seconds.</p>\n\
</body>\n</html>\n";

const HTML_MIME: &str = "text/html; charset=utf-8";
const IMMUTABLE: &str = "public, max-age=31536000, immutable";
const NO_STORE: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// Browser caching directive for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Content-addressed; may be cached forever.
    Immutable,
    /// Served by its original path; must not be cached.
    NoStore,
}

/// What to send back for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// An update is running.
    Maintenance,
    Html {
        body: Arc<[u8]>,
        gzipped: bool,
    },
    Asset {
        body: Arc<[u8]>,
        mime: Arc<str>,
        gzipped: bool,
        cache: CachePolicy,
    },
    /// Gzip-encoded search index.
    Search {
        body: Arc<[u8]>,
        etag: String,
    },
    NotModified {
        etag: String,
    },
    NotFound,
    /// Plain-text failure message.
    Error {
        status: u16,
        message: String,
    },
}

impl Response {
    pub(crate) fn html(body: impl Into<Arc<[u8]>>) -> Self {
        Self::Html {
            body: body.into(),
            gzipped: false,
        }
    }

    pub(crate) fn internal(message: &str) -> Self {
        Self::Error {
            status: 500,
            message: message.to_owned(),
        }
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        match self {
            Self::Maintenance => 503,
            Self::Html { .. } | Self::Asset { .. } | Self::Search { .. } => 200,
            Self::NotModified { .. } => 304,
            Self::NotFound => 404,
            Self::Error { status, .. } => *status,
        }
    }

    /// Response headers.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        match self {
            Self::Maintenance => headers.push(("Content-Type", HTML_MIME.to_owned())),
            Self::Html { gzipped, .. } => {
                headers.push(("Content-Type", HTML_MIME.to_owned()));
                if *gzipped {
                    headers.push(("Content-Encoding", "gzip".to_owned()));
                }
            }
            Self::Asset {
                mime,
                gzipped,
                cache,
                ..
            } => {
                headers.push(("Content-Type", (**mime).to_owned()));
                if *gzipped {
                    headers.push(("Content-Encoding", "gzip".to_owned()));
                }
                let directive = match cache {
                    CachePolicy::Immutable => IMMUTABLE,
                    CachePolicy::NoStore => NO_STORE,
                };
                headers.push(("Cache-Control", directive.to_owned()));
            }
            Self::Search { etag, .. } => {
                headers.push(("Content-Type", "application/json".to_owned()));
                headers.push(("Content-Encoding", "gzip".to_owned()));
                headers.push(("ETag", etag.clone()));
            }
            Self::NotModified { etag } => headers.push(("ETag", etag.clone())),
            Self::NotFound => {}
            Self::Error { .. } => {
                headers.push(("Content-Type", "text/plain; charset=utf-8".to_owned()));
            }
        }
        headers
    }

    /// Response body.
    pub fn body(&self) -> &[u8] {
        match self {
            Self::Maintenance => MAINTENANCE_HTML.as_bytes(),
            Self::Html { body, .. } | Self::Asset { body, .. } | Self::Search { body, .. } => &body[..],
            Self::NotModified { .. } | Self::NotFound => &[],
            Self::Error { message, .. } => message.as_bytes(),
        }
    }
}

/// Serve `/assets/<path>` straight from disk, bypassing the content-addressed
/// names and the read cache.
pub(crate) fn serve_static(assets_dir: &Path, path: &str) -> Response {
    let relative = Path::new(path.trim_start_matches('/'));
    let relative = relative.strip_prefix("assets").unwrap_or(relative);
    if relative.as_os_str().is_empty()
        || !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
    {
        return Response::NotFound;
    }

    let file = assets_dir.join(relative);
    match std::fs::read(&file) {
        Ok(data) => Response::Asset {
            mime: detect_mime(path, &data).into(),
            body: data.into(),
            gzipped: false,
            cache: CachePolicy::NoStore,
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::error!(path = %file.display(), error = %e, "Failed to read asset");
            }
            Response::NotFound
        }
    }
}
