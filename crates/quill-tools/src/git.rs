//! Git and git-lfs operations on the content checkout.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use quill_assets::ChangeOracle;
use regex::Regex;

use crate::command::{ToolCommand, ToolError};

static LFS_OID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"oid sha256:([a-f0-9]{64})").unwrap());

/// Exit code `git diff --exit-code` uses for "differences found".
const DIFF_CHANGED: i32 = 1;

/// A git checkout driven through the `git` executable.
#[derive(Debug, Clone)]
pub struct Git {
    repo: PathBuf,
    remote: String,
    ssh_key: Option<PathBuf>,
    check_timeout: Duration,
}

impl Git {
    /// Open the checkout at `repo`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotARepository`] if `repo/.git` is not a
    /// directory.
    pub fn open(repo: impl Into<PathBuf>, remote: impl Into<String>) -> Result<Self, ToolError> {
        let repo = repo.into();
        if !repo.join(".git").is_dir() {
            return Err(ToolError::NotARepository(repo));
        }
        Ok(Self {
            repo,
            remote: remote.into(),
            ssh_key: None,
            check_timeout: Duration::from_secs(5),
        })
    }

    /// Authenticate network operations with this private key.
    #[must_use]
    pub fn with_ssh_key(mut self, key: impl Into<PathBuf>) -> Self {
        self.ssh_key = Some(key.into());
        self
    }

    /// Deadline for each command issued by change checks.
    #[must_use]
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    fn git(&self) -> ToolCommand {
        ToolCommand::new("git").current_dir(&self.repo)
    }

    fn network_git(&self) -> ToolCommand {
        let cmd = self.git();
        match &self.ssh_key {
            Some(key) => cmd.env(
                "GIT_SSH_COMMAND",
                format!("ssh -i {} -o IdentitiesOnly=yes", key.display()),
            ),
            None => cmd,
        }
    }

    /// `git fetch <remote> <branch>`
    pub async fn fetch(&self, branch: &str, timeout: Duration) -> Result<(), ToolError> {
        self.network_git()
            .args(["fetch", self.remote.as_str(), branch])
            .run(timeout)
            .await?;
        Ok(())
    }

    /// `git reset <remote>/<branch> --hard`
    pub async fn reset_hard(&self, branch: &str, timeout: Duration) -> Result<(), ToolError> {
        self.git()
            .arg("reset")
            .arg(format!("{}/{branch}", self.remote))
            .arg("--hard")
            .run(timeout)
            .await?;
        Ok(())
    }

    /// `git lfs pull`
    pub async fn lfs_pull(&self, timeout: Duration) -> Result<(), ToolError> {
        self.network_git()
            .args(["lfs", "pull"])
            .run(timeout)
            .await?;
        Ok(())
    }

    /// Commit id of `HEAD`.
    pub async fn head(&self, timeout: Duration) -> Result<String, ToolError> {
        self.git().args(["rev-parse", "HEAD"]).run(timeout).await
    }

    /// Whether `path` differs from its state at `commit`.
    ///
    /// An empty `commit` counts as changed.
    pub async fn file_changed(
        &self,
        path: &Path,
        commit: &str,
        timeout: Duration,
    ) -> Result<bool, ToolError> {
        if commit.is_empty() {
            return Ok(true);
        }
        let result = self
            .git()
            .args(["diff", "--exit-code", commit, "--"])
            .arg(self.repo_relative(path))
            .run(timeout)
            .await;
        match result {
            Ok(_) => Ok(false),
            Err(err) if err.exit_code() == Some(DIFF_CHANGED) => Ok(true),
            Err(err) => Err(err),
        }
    }

    /// LFS object id of `path` at `commit`, if it is an LFS pointer there.
    ///
    /// Returns `None` when the file is absent at that commit or is stored
    /// directly in git.
    pub async fn lfs_oid(
        &self,
        path: &Path,
        commit: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ToolError> {
        let object = format!("{commit}:{}", to_git_path(&self.repo_relative(path)));
        match self.git().arg("show").arg(object).run(timeout).await {
            Ok(out) => Ok(parse_lfs_oid(&out)),
            Err(err) if err.output().is_some_and(|o| o.contains("fatal:")) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Whether the content of `path` changed since `commit`.
    ///
    /// LFS pointers are compared by object id at `HEAD` and `commit`. When
    /// neither side is an LFS pointer this falls back to `git diff`.
    pub async fn lfs_file_changed(&self, path: &Path, commit: &str) -> Result<bool, ToolError> {
        if commit.is_empty() {
            return Ok(true);
        }
        let head = self.lfs_oid(path, "HEAD", self.check_timeout).await?;
        let base = self.lfs_oid(path, commit, self.check_timeout).await?;
        match (head, base) {
            (None, None) => self.file_changed(path, commit, self.check_timeout).await,
            (head, base) => Ok(head != base),
        }
    }

    fn repo_relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.repo)
            .map_or_else(|_| path.to_path_buf(), Path::to_path_buf)
    }
}

impl ChangeOracle for Git {
    type Error = ToolError;

    async fn changed_since(&self, path: &Path, commit: &str) -> Result<bool, Self::Error> {
        self.lfs_file_changed(path, commit).await
    }
}

fn parse_lfs_oid(pointer: &str) -> Option<String> {
    LFS_OID_RE
        .captures(pointer)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
}

/// Forward-slash form used in `<rev>:<path>` specs.
fn to_git_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
