//! Builder for executing external tool commands with timeout and cancellation.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use reelpipe_common::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// The child process is killed when the timeout elapses or the cancellation
/// token fires, and also when the returned future is dropped.
///
/// # Example
///
/// ```no_run
/// use reelpipe_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> reelpipe_common::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .arg("-v").arg("quiet")
///     .arg("-print_format").arg("json")
///     .arg("-show_format")
///     .arg("/tmp/clip.mp4")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    cancel: Option<CancellationToken>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            cancel: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Kill the process and fail with [`Error::Cancelled`] when `token` fires.
    pub fn cancel_token(&mut self, token: CancellationToken) -> &mut Self {
        self.cancel = Some(token);
        self
    }

    /// Program name used in error messages and logs.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Run the command to completion and capture its output, whatever the
    /// exit status.
    ///
    /// # Errors
    ///
    /// - [`Error::Tool`] if spawning or waiting on the process fails.
    /// - [`Error::ToolTimeout`] if the process outlives the timeout; it is
    ///   killed first.
    /// - [`Error::Cancelled`] if the cancellation token fires; the process is
    ///   killed first.
    pub async fn output(&self) -> Result<ToolOutput> {
        let tool = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| Error::Tool {
            tool: tool.clone(),
            message: format!("failed to spawn: {e}"),
        })?;

        // Drain both pipes concurrently so a chatty child cannot block on a
        // full pipe while we wait on it.
        let stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

        let cancel = self.cancel.clone();
        let cancelled = async move {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        let status = tokio::select! {
            res = child.wait() => res.map_err(|e| Error::Tool {
                tool: tool.clone(),
                message: format!("I/O error waiting for process: {e}"),
            })?,
            _ = tokio::time::sleep(self.timeout) => {
                tracing::warn!(tool = %tool, timeout = ?self.timeout, "Killing process after timeout");
                let _ = child.kill().await;
                return Err(Error::ToolTimeout { tool, timeout: self.timeout });
            }
            _ = cancelled => {
                tracing::debug!(tool = %tool, "Killing process on cancellation");
                let _ = child.kill().await;
                return Err(Error::Cancelled);
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(ToolOutput {
            status,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        })
    }

    /// Run the command and require a successful exit.
    ///
    /// # Errors
    ///
    /// Everything [`output`](Self::output) returns, plus [`Error::Tool`] for a
    /// non-zero exit (message includes stderr).
    pub async fn execute(&self) -> Result<ToolOutput> {
        let output = self.output().await?;
        if !output.status.success() {
            return Err(Error::Tool {
                tool: self.program_name(),
                message: format!(
                    "exited with status {}: {}",
                    output.status,
                    output.stderr.trim()
                ),
            });
        }
        Ok(output)
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn execute_echo() {
        let output = ToolCommand::new(PathBuf::from("echo"))
            .arg("hello")
            .execute()
            .await;

        match output {
            Ok(out) => {
                assert!(out.status.success());
                assert!(out.stdout.trim().contains("hello"));
            }
            Err(_) => {
                // On some minimal environments echo may not exist; skip.
            }
        }
    }

    #[tokio::test]
    async fn execute_nonexistent_tool() {
        let result = ToolCommand::new(PathBuf::from("nonexistent_tool_xyz_12345"))
            .execute()
            .await;
        assert_matches!(result, Err(Error::Tool { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_keeps_failed_status() {
        let out = ToolCommand::new(PathBuf::from("sh"))
            .args(["-c", "echo oops >&2; exit 3"])
            .output()
            .await
            .unwrap();
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(out.stderr.trim(), "oops");

        let err = ToolCommand::new(PathBuf::from("sh"))
            .args(["-c", "exit 3"])
            .execute()
            .await
            .unwrap_err();
        assert_matches!(err, Error::Tool { ref tool, .. } if tool == "sh");
    }

    #[tokio::test]
    async fn timeout_fires() {
        let started = std::time::Instant::now();
        let result = ToolCommand::new(PathBuf::from("sleep"))
            .arg("10")
            .timeout(Duration::from_millis(100))
            .execute()
            .await;
        assert_matches!(result, Err(Error::ToolTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancellation_kills_process() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = ToolCommand::new(PathBuf::from("sleep"))
            .arg("10")
            .cancel_token(token)
            .execute()
            .await;
        assert_matches!(result, Err(Error::Cancelled));
    }
}
