//! Spawning and awaiting shell subprocesses (`git`, `helm`, `kubectl`).

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, ServerError};

/// Result of a subprocess invocation.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub exit_code: i32,
    pub output: String,
}

/// Run `command` through `sh -c`, capturing stdout and stderr concurrently
/// (so a chatty process can't deadlock on a full pipe) and streaming both to
/// the log as they arrive.
///
/// On success, `output` is the collected stdout. On a non-zero exit: if
/// `suppress_errors` is set, returns `Ok` with `output` set to stderr;
/// otherwise returns `Err` with a message carrying the command, exit code,
/// and stderr.
pub async fn run(command: &str, suppress_errors: bool) -> Result<RunOutput> {
    debug!(command, "running subprocess");

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");

    let stdout_task = tokio::spawn(collect_lines(stdout, false));
    let stderr_task = tokio::spawn(collect_lines(stderr, true));

    let status = child.wait().await?;
    let stdout_text = stdout_task.await.unwrap_or_default();
    let stderr_text = stderr_task.await.unwrap_or_default();

    let exit_code = status.code().unwrap_or(-1);
    let exit_code = if exit_code < 0 { 1 } else { exit_code };

    if exit_code == 0 {
        return Ok(RunOutput {
            exit_code: 0,
            output: stdout_text,
        });
    }

    if suppress_errors {
        warn!(command, exit_code, "subprocess failed, errors suppressed");
        return Ok(RunOutput {
            exit_code,
            output: stderr_text,
        });
    }

    Err(ServerError::ProcessFailed {
        command: command.to_string(),
        exit_code,
        output: stderr_text,
    })
}

async fn collect_lines(stream: impl tokio::io::AsyncRead + Unpin, is_stderr: bool) -> String {
    let mut lines = BufReader::new(stream).lines();
    let mut collected = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            info!(target: "gitops::process", "{line}");
        } else {
            debug!(target: "gitops::process", "{line}");
        }
        collected.push_str(&line);
        collected.push('\n');
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_returns_stdout() {
        let result = run("echo hello", false).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output.trim(), "hello");
    }

    #[tokio::test]
    async fn failing_command_without_suppression_errors() {
        let err = run("exit 3", false).await.unwrap_err();
        assert!(matches!(err, ServerError::ProcessFailed { exit_code: 3, .. }));
    }

    #[tokio::test]
    async fn failing_command_with_suppression_returns_ok() {
        let result = run("echo oops 1>&2; exit 7", true).await.unwrap();
        assert_eq!(result.exit_code, 7);
        assert_eq!(result.output.trim(), "oops");
    }

    #[tokio::test]
    async fn missing_exit_code_normalizes_to_one() {
        let result = run("kill -9 $$", true).await.unwrap();
        assert_eq!(result.exit_code, 1);
    }
}
