use std::ffi::OsString;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::locator::ToolPath;

/// How a tool invocation may be cut short.
#[derive(Debug, Clone, Copy)]
pub enum Limit<'a> {
    Timeout(Duration),
    Cancel(&'a CancellationToken),
}

#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// The error stream, or standard output for tools that report there.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Run `tool` to completion, killing it when `limit` is hit.
pub async fn run(tool: &ToolPath, args: &[OsString], limit: Limit<'_>) -> Result<ToolOutput> {
    debug!(tool = %tool, args = %redacted(args), "running archive tool");

    let mut child = Command::new(tool.as_path())
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::ToolExecution {
            code: None,
            diagnostic: format!("failed to start {tool}: {e}"),
        })?;

    let stdout = child.stdout.take().map(|pipe| tokio::spawn(drain(pipe)));
    let stderr = child.stderr.take().map(|pipe| tokio::spawn(drain(pipe)));

    let status = match limit {
        Limit::Timeout(after) => match tokio::time::timeout(after, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(tool = %tool, seconds = after.as_secs(), "archive tool timed out");
                let _ = child.kill().await;
                return Err(Error::TimedOut(after));
            }
        },
        Limit::Cancel(token) => tokio::select! {
            status = child.wait() => status?,
            _ = token.cancelled() => {
                debug!(tool = %tool, "cancelling archive tool");
                let _ = child.kill().await;
                return Err(Error::Cancelled);
            }
        },
    };

    let output = ToolOutput {
        status,
        stdout: collect(stdout).await?,
        stderr: collect(stderr).await?,
    };
    debug!(code = ?output.code(), "archive tool exited");
    Ok(output)
}

async fn drain<R: AsyncRead + Unpin>(mut pipe: R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf).await?;
    Ok(buf)
}

async fn collect(task: Option<JoinHandle<io::Result<Vec<u8>>>>) -> Result<String> {
    let Some(task) = task else {
        return Ok(String::new());
    };
    let bytes = task.await.map_err(io::Error::other)??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Arguments for logging, with `-p<password>` masked.
fn redacted(args: &[OsString]) -> String {
    args.iter()
        .map(|arg| {
            let arg = arg.to_string_lossy();
            if arg.starts_with("-p") {
                "-p***".to_string()
            } else {
                arg.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_argument_is_masked() {
        let args: Vec<OsString> = ["t", "-psecret", "--", "a.zip"].iter().map(OsString::from).collect();
        let line = redacted(&args);
        assert_eq!(line, "t -p*** -- a.zip");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_streams_and_status() {
        let tool = ToolPath::new("/bin/sh");
        let args: Vec<OsString> = ["-c", "echo out; echo err >&2; exit 3"]
            .iter()
            .map(OsString::from)
            .collect();
        let output = run(&tool, &args, Limit::Timeout(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(output.code(), Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.diagnostic(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_the_tool() {
        let tool = ToolPath::new("/bin/sh");
        let args: Vec<OsString> = ["-c", "sleep 5"].iter().map(OsString::from).collect();
        let err = run(&tool, &args, Limit::Timeout(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TimedOut(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_kills_the_tool() {
        let tool = ToolPath::new("/bin/sh");
        let args: Vec<OsString> = ["-c", "sleep 5"].iter().map(OsString::from).collect();
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let err = run(&tool, &args, Limit::Cancel(&token)).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn missing_tool_is_execution_error() {
        let tool = ToolPath::new("/nonexistent/archive-tool");
        let err = run(&tool, &[], Limit::Timeout(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolExecution { code: None, .. }));
    }
}
