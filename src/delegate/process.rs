// src/delegate/process.rs
//! Spawning and reaping delegate processes
//!
//! One process per call. The payload is written from its own task while
//! this task drains stdout and stderr, so a delegate that writes a lot
//! before reading its input cannot deadlock against us. Dropping stdin
//! after the write is the delegate's end-of-input.

use crate::delegate::protocol::{DelegateOutput, Verb};
use crate::utils::errors::{ForwarderError, Result};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Everything needed to run the delegate once
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Delegate program
    pub program: PathBuf,

    pub verb: Verb,

    /// Bytes written to stdin; stdin is `/dev/null` when absent
    pub payload: Option<Vec<u8>>,

    /// Upper bound for the whole call
    pub timeout: Duration,

    /// Time between SIGTERM and SIGKILL when the call is abandoned
    pub kill_grace: Duration,
}

enum Outcome {
    Exited(std::io::Result<(ExitStatus, Vec<u8>, Vec<u8>)>),
    TimedOut,
    Cancelled,
}

/// Run one invocation to completion, timeout, or cancellation
pub async fn run(invocation: Invocation, cancel: &CancellationToken) -> Result<DelegateOutput> {
    let Invocation {
        program,
        verb,
        payload,
        timeout,
        kill_grace,
    } = invocation;

    if cancel.is_cancelled() {
        debug!(verb = %verb, "Request already cancelled, delegate not started");
        return Err(ForwarderError::Cancelled { verb });
    }

    let mut child = spawn(&program, verb, payload.is_some())?;
    debug!(verb = %verb, pid = ?child.id(), "Delegate spawned");

    let writer = match (payload, child.stdin.take()) {
        (Some(payload), Some(stdin)) => Some(tokio::spawn(write_payload(stdin, payload))),
        _ => None,
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let collect = async { tokio::try_join!(child.wait(), drain(stdout), drain(stderr)) };

    let outcome = tokio::select! {
        result = collect => Outcome::Exited(result),
        () = tokio::time::sleep(timeout) => Outcome::TimedOut,
        () = cancel.cancelled() => Outcome::Cancelled,
    };

    match outcome {
        Outcome::Exited(Ok((status, stdout, stderr))) => {
            finish_writer(verb, writer).await;
            let output = DelegateOutput::new(stdout, stderr);

            if status.success() {
                Ok(output)
            } else {
                Err(ForwarderError::DelegateExitFailure {
                    verb,
                    code: status.code(),
                    output: output.combined(),
                })
            }
        }
        Outcome::Exited(Err(source)) => {
            abort_writer(writer);
            terminate(&mut child, kill_grace).await;
            Err(ForwarderError::DelegateIo { verb, source })
        }
        Outcome::TimedOut => {
            warn!(verb = %verb, ?timeout, "Delegate timed out, terminating");
            abort_writer(writer);
            terminate(&mut child, kill_grace).await;
            Err(ForwarderError::DelegateTimeout {
                verb,
                after: timeout,
            })
        }
        Outcome::Cancelled => {
            debug!(verb = %verb, "Request cancelled, terminating delegate");
            abort_writer(writer);
            terminate(&mut child, kill_grace).await;
            Err(ForwarderError::Cancelled { verb })
        }
    }
}

fn spawn(program: &Path, verb: Verb, with_stdin: bool) -> Result<Child> {
    let mut command = Command::new(program);
    command
        .arg(verb.as_str())
        .stdin(if with_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    command
        .spawn()
        .map_err(|source| ForwarderError::DelegateSpawnFailure {
            program: program.to_path_buf(),
            verb,
            source,
        })
}

async fn write_payload(mut stdin: ChildStdin, payload: Vec<u8>) -> std::io::Result<()> {
    stdin.write_all(&payload).await?;
    stdin.flush().await?;
    // stdin dropped here: EOF for the delegate
    Ok(())
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

async fn finish_writer(verb: Verb, writer: Option<JoinHandle<std::io::Result<()>>>) {
    let Some(writer) = writer else {
        return;
    };

    match writer.await {
        Ok(Ok(())) => {}
        // A delegate may exit without reading its input
        Ok(Err(e)) => debug!(verb = %verb, "Payload write incomplete: {}", e),
        Err(e) => warn!(verb = %verb, "Payload writer task failed: {}", e),
    }
}

fn abort_writer(writer: Option<JoinHandle<std::io::Result<()>>>) {
    if let Some(writer) = writer {
        writer.abort();
    }
}

/// SIGTERM, wait up to `grace`, then SIGKILL
async fn terminate(child: &mut Child, grace: Duration) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let pid = Pid::from_raw(pid as i32);

        debug!("Sending SIGTERM to delegate PID {}", pid);
        if let Err(e) = kill(pid, Signal::SIGTERM) {
            debug!("Failed to send SIGTERM to {}: {}", pid, e);
        }

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Delegate exited with status: {}", status);
                return;
            }
            Ok(Err(e)) => warn!("Error waiting for delegate: {}", e),
            Err(_) => debug!("Delegate still alive after {:?}, sending SIGKILL", grace),
        }
    }

    if let Err(e) = child.kill().await {
        warn!("Failed to kill delegate: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Instant;
    use tempfile::TempDir;

    fn script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("delegate.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn invocation(program: PathBuf, verb: Verb, payload: Option<&[u8]>) -> Invocation {
        Invocation {
            program,
            verb,
            payload: payload.map(<[u8]>::to_vec),
            timeout: Duration::from_secs(10),
            kill_grace: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_verb_is_first_argument() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, r#"echo "verb=$1""#);

        let output = run(invocation(program, Verb::Init, None), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output.stdout_text().trim(), "verb=init");
    }

    #[tokio::test]
    async fn test_payload_reaches_stdin() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "cat");

        let output = run(
            invocation(program, Verb::Request, Some(b"{\"id\":\"x\"}\n")),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(output.stdout_text(), "{\"id\":\"x\"}\n");
    }

    #[tokio::test]
    async fn test_large_payload_and_output_do_not_deadlock() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "cat");
        let payload = vec![b'a'; 1 << 20];

        let output = run(
            invocation(program, Verb::Request, Some(&payload)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(output.stdout.len(), payload.len());
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_output() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "echo 'bridge missing' >&2\nexit 4");

        let err = run(invocation(program, Verb::Close, Some(b"{}")), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ForwarderError::DelegateExitFailure { verb, code, output } => {
                assert_eq!(verb, Verb::Close);
                assert_eq!(code, Some(4));
                assert_eq!(output, "bridge missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let program = dir.path().join("does-not-exist");

        let err = run(invocation(program, Verb::Init, None), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ForwarderError::DelegateSpawnFailure { .. }));
    }

    #[tokio::test]
    async fn test_delegate_ignoring_stdin_still_succeeds() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "echo done");

        let output = run(
            invocation(program, Verb::Request, Some(&vec![b'x'; 1 << 20])),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(output.stdout_text().trim(), "done");
    }

    #[tokio::test]
    async fn test_timeout_terminates_delegate() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "exec sleep 30");
        let mut call = invocation(program, Verb::Mechanism, None);
        call.timeout = Duration::from_millis(200);

        let started = Instant::now();
        let err = run(call, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ForwarderError::DelegateTimeout { verb: Verb::Mechanism, .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancellation_terminates_delegate() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "exec sleep 30");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = run(invocation(program, Verb::Close, Some(b"{}")), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ForwarderError::Cancelled { verb: Verb::Close }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancelled_token_never_spawns() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("started");
        let program = script(&dir, &format!("touch '{}'", marker.display()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = run(invocation(program, Verb::Request, Some(b"{}")), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ForwarderError::Cancelled { verb: Verb::Request }));
        assert!(!marker.exists());
    }
}
