//! Process runner with deadlines.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").unwrap());

/// Remove ANSI color and cursor sequences.
pub fn strip_ansi(text: &str) -> String {
    ANSI_RE.replace_all(text, "").into_owned()
}

/// Error running an external tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The program could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    /// The deadline passed; the process was killed.
    #[error("command timed out after {timeout:?}: {command}")]
    Timeout { command: String, timeout: Duration },
    /// The process exited unsuccessfully.
    #[error("command failed ({}): {command}\n{output}", describe_exit(.code.as_ref()))]
    Failed {
        command: String,
        code: Option<i32>,
        output: String,
    },
    /// The working directory is not a git checkout.
    #[error("{} does not contain a .git directory", .0.display())]
    NotARepository(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn describe_exit(code: Option<&i32>) -> String {
    code.map_or_else(|| "killed by signal".to_owned(), |c| format!("exit code {c}"))
}

impl ToolError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Exit code of a failed process.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { code, .. } => *code,
            _ => None,
        }
    }

    /// Captured output of a failed process.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// A command line to run under a deadline.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
    dir: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
}

impl ToolCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            envs: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Run to completion and return the combined, cleaned output.
    ///
    /// # Errors
    ///
    /// [`ToolError::Spawn`] if the program cannot start,
    /// [`ToolError::Timeout`] if `timeout` elapses first, and
    /// [`ToolError::Failed`] on a non-zero exit.
    pub async fn run(&self, timeout: Duration) -> Result<String, ToolError> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| ToolError::Spawn {
            program: self.program.to_string_lossy().into_owned(),
            source,
        })?;

        let Ok(result) = tokio::time::timeout(timeout, child.wait_with_output()).await else {
            tracing::warn!(command = %self, ?timeout, "Command timed out");
            return Err(ToolError::Timeout {
                command: self.to_string(),
                timeout,
            });
        };
        let output = result?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !combined.trim().is_empty() {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        let text = strip_ansi(combined.trim());

        if !output.status.success() {
            return Err(ToolError::Failed {
                command: self.to_string(),
                code: output.status.code(),
                output: text,
            });
        }

        tracing::debug!(command = %self, output = %text, "Command finished");
        Ok(text)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[31merror\x1b[0m: bad"), "error: bad");
        assert_eq!(strip_ansi("\x1b[1;32mok"), "ok");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn test_display_joins_args() {
        let cmd = ToolCommand::new("git").args(["diff", "--exit-code", "abc"]);
        assert_eq!(cmd.to_string(), "git diff --exit-code abc");
    }

    #[test]
    fn test_error_accessors() {
        let failed = ToolError::Failed {
            command: "git diff".to_owned(),
            code: Some(1),
            output: "diff".to_owned(),
        };
        assert_eq!(failed.exit_code(), Some(1));
        assert_eq!(failed.output(), Some("diff"));
        assert!(!failed.is_timeout());

        let timeout = ToolError::Timeout {
            command: "git fetch".to_owned(),
            timeout: Duration::from_secs(1),
        };
        assert!(timeout.is_timeout());
        assert_eq!(timeout.exit_code(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_trimmed_output() {
        let out = ToolCommand::new("sh")
            .args(["-c", "printf '  \\033[32mhello\\033[0m  \\n'"])
            .run(Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_exit_code() {
        let err = ToolCommand::new("sh")
            .args(["-c", "echo oops >&2; exit 3"])
            .run(Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
        assert_eq!(err.output(), Some("oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_times_out() {
        let err = ToolCommand::new("sleep")
            .arg("5")
            .run(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = ToolCommand::new("quill-definitely-not-a-program")
            .run(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_and_dir_applied() {
        let dir = tempfile::tempdir().unwrap();
        let out = ToolCommand::new("sh")
            .args(["-c", "echo \"$QUILL_TOOL_TEST\" && pwd"])
            .env("QUILL_TOOL_TEST", "set")
            .current_dir(dir.path())
            .run(Duration::from_secs(10))
            .await
            .unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("set"));
        let pwd = std::path::PathBuf::from(lines.next().unwrap());
        assert_eq!(
            pwd.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }
}
