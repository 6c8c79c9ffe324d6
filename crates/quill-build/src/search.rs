//! Search index generation.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use quill_cache::gzip;
use quill_config::Config;
use quill_render::SearchDoc;
use quill_tools::{ToolCommand, ToolError};
use sha2::{Digest, Sha256};

/// Search index error.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode search documents: {0}")]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A built search index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchIndex {
    /// Gzip-encoded index JSON.
    pub blob: Arc<[u8]>,
    /// Hex SHA-256 of the raw index, used as its ETag.
    pub hash: String,
}

impl SearchIndex {
    /// Compress `raw` and fingerprint it.
    pub fn from_raw(raw: &[u8]) -> std::io::Result<Self> {
        Ok(Self {
            blob: gzip(raw)?.into(),
            hash: hex::encode(Sha256::digest(raw)),
        })
    }
}

/// Builds a search index from the documents of one generation.
pub trait SearchIndexer: Send + Sync + 'static {
    fn build(
        &self,
        docs: &[SearchDoc],
    ) -> impl Future<Output = Result<SearchIndex, SearchError>> + Send;
}

/// Runs a Node.js script that turns the documents into a lunr.js index.
///
/// The script is invoked as `node <script> <docs file> <index file>` and
/// must write the serialized index to the index file.
#[derive(Debug, Clone)]
pub struct LunrIndexer {
    node: String,
    script: PathBuf,
    docs_file: PathBuf,
    index_file: PathBuf,
    timeout: Duration,
}

impl LunrIndexer {
    pub fn new(config: &Config) -> Self {
        Self {
            node: config.search.node.clone(),
            script: config.search_script(),
            docs_file: config.paths_resolved.search_docs_file(),
            index_file: config.paths_resolved.search_index_file(),
            timeout: config.timeouts.index_timeout(),
        }
    }
}

impl SearchIndexer for LunrIndexer {
    async fn build(&self, docs: &[SearchDoc]) -> Result<SearchIndex, SearchError> {
        if let Some(dir) = self.docs_file.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| SearchError::io(dir, e))?;
        }
        let json = serde_json::to_vec(docs)?;
        tokio::fs::write(&self.docs_file, json)
            .await
            .map_err(|e| SearchError::io(&self.docs_file, e))?;

        ToolCommand::new(&self.node)
            .arg(&self.script)
            .arg(&self.docs_file)
            .arg(&self.index_file)
            .run(self.timeout)
            .await?;

        let raw = tokio::fs::read(&self.index_file)
            .await
            .map_err(|e| SearchError::io(&self.index_file, e))?;
        let index = SearchIndex::from_raw(&raw).map_err(|e| SearchError::io(&self.index_file, e))?;
        tracing::debug!(docs = docs.len(), raw = raw.len(), gzipped = index.blob.len(), "Built search index");
        Ok(index)
    }
}
