//! Timed subprocess invocation.
//!
//! [`ProcessRunner`] is the execution seam: the orchestrator only ever sees
//! an [`InvocationOutcome`], so tests substitute a scripted runner instead
//! of spawning processes.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::outcome::{CapturedOutput, InvocationOutcome};

/// How long to keep reading pipes after the child was killed.
const KILL_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Everything needed to run one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// Written to stdin, which is then closed. `None` gives the child a null stdin.
    pub stdin: Option<String>,
    pub timeout: Duration,
}

impl ProcessInvocation {
    pub fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs()
    }
}

/// Runs a process under a deadline.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &ProcessInvocation) -> InvocationOutcome;
}

/// [`ProcessRunner`] backed by `tokio::process`.
///
/// The child never runs through a shell. On unix it leads its own process
/// group, and the whole group is SIGKILLed on every exit path, so workers a
/// backend forks do not outlive the call. `kill_on_drop` covers
/// cancellation of the calling future (direct child only).
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

type SharedBuf = Arc<Mutex<Vec<u8>>>;

fn spawn_reader<R>(reader: Option<R>, buf: SharedBuf) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => buf.lock().await.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    debug!(error = %e, "pipe read failed");
                    break;
                }
            }
        }
    })
}

/// Wait for both readers until `deadline`, abandon them after it, and
/// return whatever was captured.
async fn collect(
    mut readers: [JoinHandle<()>; 2],
    stdout: &SharedBuf,
    stderr: &SharedBuf,
    deadline: Instant,
) -> CapturedOutput {
    for reader in readers.iter_mut() {
        if tokio::time::timeout_at(deadline, &mut *reader).await.is_err() {
            reader.abort();
        }
    }
    let stdout = stdout.lock().await;
    let stderr = stderr.lock().await;
    CapturedOutput::from_bytes(&stdout, &stderr)
}

/// SIGKILL every process in the group led by `pid`.
///
/// A group with no remaining members (`ESRCH`) is not an error.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // SAFETY: kill(2) takes no pointers; a negative pid addresses the group.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pgid = pgid, error = %err, "failed to kill backend process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, invocation: &ProcessInvocation) -> InvocationOutcome {
        let deadline = Instant::now() + invocation.timeout;

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return InvocationOutcome::InfrastructureFailure {
                    cause: format!("failed to start {}: {e}", invocation.program),
                };
            }
        };
        // `id()` is gone once the child is reaped; keep it for the group kill.
        let pid = child.id();
        debug!(program = %invocation.program, pid = ?pid, "spawned backend process");

        if let (Some(payload), Some(mut stdin)) = (invocation.stdin.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    debug!(error = %e, "stdin write failed");
                }
                // Dropping the handle closes the pipe so the child sees EOF.
            });
        }

        let stdout_buf = SharedBuf::default();
        let stderr_buf = SharedBuf::default();
        let readers = [
            spawn_reader(child.stdout.take(), stdout_buf.clone()),
            spawn_reader(child.stderr.take(), stderr_buf.clone()),
        ];

        match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => {
                // Background jobs left behind would hold the pipes open until the deadline.
                kill_process_group(pid);
                let output = collect(readers, &stdout_buf, &stderr_buf, deadline).await;
                InvocationOutcome::Completed {
                    exit_code: status.code().unwrap_or(-1),
                    output,
                }
            }
            Ok(Err(e)) => {
                kill_process_group(pid);
                if let Err(kill_err) = child.kill().await {
                    warn!(error = %kill_err, "failed to kill backend process");
                }
                for reader in &readers {
                    reader.abort();
                }
                InvocationOutcome::InfrastructureFailure {
                    cause: format!("failed to wait for {}: {e}", invocation.program),
                }
            }
            Err(_elapsed) => {
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed-out backend process");
                }
                let output = collect(
                    readers,
                    &stdout_buf,
                    &stderr_buf,
                    Instant::now() + KILL_DRAIN_GRACE,
                )
                .await;
                InvocationOutcome::TimedOut {
                    timeout_secs: invocation.timeout_secs(),
                    output,
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// Zombies waiting for a reaper count as dead.
    fn process_alive(pid: i32) -> bool {
        if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            return stat
                .rsplit_once(')')
                .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                .unwrap_or(true);
        }
        // No procfs: fall back to a signal-0 existence check.
        unsafe { libc::kill(pid, 0) == 0 }
    }

    fn sh(script: &str, timeout_ms: u64) -> ProcessInvocation {
        ProcessInvocation {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            stdin: None,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn test_captures_both_streams() {
        let outcome = TokioProcessRunner::new()
            .run(&sh("echo '  out  '; echo err >&2", 5_000))
            .await;
        match outcome {
            InvocationOutcome::Completed { exit_code, output } => {
                assert_eq!(exit_code, 0);
                assert_eq!(output.stdout, "out");
                assert_eq!(output.stderr, "err");
            }
            other => panic!("expected Completed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_completes() {
        let outcome = TokioProcessRunner::new()
            .run(&sh("echo partial; exit 3", 5_000))
            .await;
        assert!(matches!(
            outcome,
            InvocationOutcome::Completed { exit_code: 3, ref output } if output.stdout == "partial"
        ));
    }

    #[tokio::test]
    async fn test_stdin_payload_delivered() {
        let mut inv = sh("cat", 5_000);
        inv.stdin = Some("line one\nline two".to_string());
        let outcome = TokioProcessRunner::new().run(&inv).await;
        match outcome {
            InvocationOutcome::Completed { exit_code, output } => {
                assert_eq!(exit_code, 0);
                assert_eq!(output.stdout, "line one\nline two");
            }
            other => panic!("expected Completed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_null_stdin_without_payload() {
        // `cat` on a null stdin sees EOF immediately instead of blocking.
        let outcome = TokioProcessRunner::new().run(&sh("cat", 5_000)).await;
        assert!(matches!(outcome, InvocationOutcome::Completed { exit_code: 0, .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let start = std::time::Instant::now();
        let outcome = TokioProcessRunner::new()
            .run(&sh("echo started; exec sleep 10", 300))
            .await;
        let elapsed = start.elapsed();

        match outcome {
            InvocationOutcome::TimedOut { output, .. } => {
                assert_eq!(output.stdout, "started");
            }
            other => panic!("expected TimedOut, got {:?}", other),
        }
        assert!(elapsed < Duration::from_secs(3), "overshoot: {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_timeout_kills_forked_workers() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("worker.pid");
        let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());

        let start = std::time::Instant::now();
        let outcome = TokioProcessRunner::new().run(&sh(&script, 500)).await;
        let elapsed = start.elapsed();

        assert!(matches!(outcome, InvocationOutcome::TimedOut { .. }), "{outcome:?}");
        assert!(elapsed < Duration::from_secs(3), "overshoot: {:?}", elapsed);

        let worker: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(!process_alive(worker), "worker {worker} survived the timeout");
    }

    #[tokio::test]
    async fn test_background_job_does_not_stall_completion() {
        let start = std::time::Instant::now();
        let outcome = TokioProcessRunner::new()
            .run(&sh("sleep 30 & echo done", 10_000))
            .await;

        match outcome {
            InvocationOutcome::Completed { exit_code, output } => {
                assert_eq!(exit_code, 0);
                assert_eq!(output.stdout, "done");
            }
            other => panic!("expected Completed, got {:?}", other),
        }
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_missing_binary_is_infrastructure_failure() {
        let inv = ProcessInvocation {
            program: "/nonexistent/llm-binary".to_string(),
            args: vec![],
            stdin: None,
            timeout: Duration::from_secs(5),
        };
        let outcome = TokioProcessRunner::new().run(&inv).await;
        match outcome {
            InvocationOutcome::InfrastructureFailure { cause } => {
                assert!(cause.contains("/nonexistent/llm-binary"));
            }
            other => panic!("expected InfrastructureFailure, got {:?}", other),
        }
    }
}
