//! Child-process execution for out-of-process engines.

use crate::transcription::engine::EngineError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A command to run for one transcription.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Written to the child's stdin, which is then closed.
    pub stdin: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty stderr line, for error messages.
    pub fn stderr_tail(&self) -> &str {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
    }
}

/// Run `spec` to completion, killing the child if `cancel` fires.
///
/// The child is also killed when the returned future is dropped, so callers
/// may wrap this in `tokio::time::timeout`.
pub async fn run_process(
    spec: &ProcessSpec,
    cancel: &CancellationToken,
) -> Result<ProcessOutput, EngineError> {
    let start = Instant::now();

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(if spec.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program = %spec.program.display(), args = ?spec.args, "spawning engine process");

    let mut child = cmd.spawn().map_err(|e| {
        EngineError::Transcription(format!(
            "failed to spawn {}: {}",
            spec.program.display(),
            e
        ))
    })?;

    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let stdout_handle = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = stdout_pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });
    let stderr_handle = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = stderr_pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });

    // Readers are already draining, so a child that answers before reading
    // all of its input cannot deadlock against this write.
    let stdin_handle = match (spec.stdin.clone(), child.stdin.take()) {
        (Some(input), Some(mut stdin)) => Some(tokio::spawn(async move {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await
        })),
        _ => None,
    };

    tokio::select! {
        status = child.wait() => {
            let status = status.map_err(|e| {
                EngineError::Transcription(format!("failed to wait for process: {}", e))
            })?;
            if let Some(handle) = stdin_handle {
                // The exit status and stderr say more than a broken pipe does.
                match handle.await {
                    Ok(Err(e)) => debug!(error = %e, "engine process did not read all of its input"),
                    Err(e) => warn!(error = %e, "stdin writer task failed"),
                    Ok(Ok(())) => {}
                }
            }
            let stdout_bytes = stdout_handle.await.unwrap_or_default();
            let stderr_bytes = stderr_handle.await.unwrap_or_default();

            let output = ProcessOutput {
                stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
                exit_code: status.code().unwrap_or(-1),
                duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            };
            debug!(
                program = %spec.program.display(),
                exit_code = output.exit_code,
                duration_ms = output.duration_ms,
                "engine process exited"
            );
            Ok(output)
        }
        () = cancel.cancelled() => {
            let _ = child.kill().await;
            if let Some(handle) = stdin_handle {
                handle.abort();
            }
            stdout_handle.abort();
            stderr_handle.abort();
            warn!(program = %spec.program.display(), "engine process cancelled");
            Err(EngineError::Cancelled)
        }
    }
}

/// Resolve a program name the way a shell would.
///
/// Names containing a path separator are checked directly; bare names are
/// searched on `PATH`.
pub fn find_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|full| full.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn spec(program: &str, args: &[&str], stdin: Option<&str>) -> ProcessSpec {
        ProcessSpec {
            program: find_executable(program).expect("program on PATH"),
            args: args.iter().map(|s| s.to_string()).collect(),
            stdin: stdin.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_find_executable() {
        assert!(find_executable("sh").is_some());
        assert!(find_executable("definitely-not-a-real-binary-xyz").is_none());
        assert!(find_executable("/definitely/not/here").is_none());
    }

    #[tokio::test]
    async fn test_run_process_captures_stdout() {
        let output = run_process(&spec("echo", &["hello"], None), &CancellationToken::new())
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_process_feeds_stdin() {
        let output = run_process(&spec("cat", &[], Some("from stdin")), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output.stdout, "from stdin");
    }

    #[tokio::test]
    async fn test_run_process_nonzero_exit() {
        let output = run_process(
            &spec("sh", &["-c", "echo boom >&2; exit 3"], None),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stderr_tail(), "boom");
    }

    #[tokio::test]
    async fn test_run_process_cancellation_kills_child() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = run_process(&spec("sleep", &["10"], None), &cancel).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_child_ignoring_stdin_reports_its_own_failure() {
        let input = "x".repeat(1 << 20);
        let output = run_process(
            &spec("sh", &["-c", "echo 'model weights missing' >&2; exit 2"], Some(&input)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(output.exit_code, 2);
        assert_eq!(output.stderr_tail(), "model weights missing");
    }

    #[tokio::test]
    async fn test_cancellation_while_stdin_is_blocked() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        // sleep never reads stdin, so a large write stays blocked on the pipe
        let input = "x".repeat(1 << 20);
        let start = Instant::now();
        let result = run_process(&spec("sleep", &["10"], Some(&input)), &cancel).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
