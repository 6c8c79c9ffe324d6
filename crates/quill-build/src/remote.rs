//! Source of content updates.

use std::future::Future;
use std::time::Duration;

use quill_tools::{Git, ToolError};

/// A content checkout that can be brought up to date with its upstream.
///
/// Every operation runs under the given deadline.
pub trait Remote: Send + Sync + 'static {
    /// Download upstream changes for `branch`.
    fn fetch(
        &self,
        branch: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ToolError>> + Send;

    /// Discard local state and move to the fetched `branch`.
    fn reset(
        &self,
        branch: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ToolError>> + Send;

    /// Download large-file objects for the current checkout.
    fn lfs_pull(&self, timeout: Duration) -> impl Future<Output = Result<(), ToolError>> + Send;

    /// Identifier of the checked-out commit.
    fn head(&self, timeout: Duration) -> impl Future<Output = Result<String, ToolError>> + Send;
}

impl Remote for Git {
    async fn fetch(&self, branch: &str, timeout: Duration) -> Result<(), ToolError> {
        Git::fetch(self, branch, timeout).await
    }

    async fn reset(&self, branch: &str, timeout: Duration) -> Result<(), ToolError> {
        self.reset_hard(branch, timeout).await
    }

    async fn lfs_pull(&self, timeout: Duration) -> Result<(), ToolError> {
        Git::lfs_pull(self, timeout).await
    }

    async fn head(&self, timeout: Duration) -> Result<String, ToolError> {
        Git::head(self, timeout).await
    }
}
