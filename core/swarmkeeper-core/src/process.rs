//! Child process execution with a hard time ceiling.
//!
//! Every external program the loop touches (tmux, notification tools, custom
//! handlers) goes through [`run_with_timeout`] so one hung collaborator can
//! stall an iteration but never the whole process.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL_MS: u64 = 20;

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to spawn: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("failed waiting for process: {0}")]
    Wait(#[source] std::io::Error),
}

/// Runs `command`, optionally feeding `stdin`, and kills it once `timeout` elapses.
pub fn run_with_timeout(
    command: &mut Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<CommandOutput, RunError> {
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(RunError::Spawn)?;

    let deadline = Instant::now() + timeout;

    // Writer and readers are never joined: a backgrounded grandchild can keep
    // the pipes open long after the direct child exits.
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        let input = input.to_vec();
        // A handler that exits without reading stdin closes the pipe; ignore that.
        thread::spawn(move || {
            let _ = pipe.write_all(&input);
        });
    }
    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let status = wait_with_deadline(&mut child, deadline, timeout)?;

    Ok(CommandOutput {
        status,
        stdout: collect_output(stdout_reader, deadline),
        stderr: collect_output(stderr_reader, deadline),
    })
}

fn wait_with_deadline(
    child: &mut Child,
    deadline: Instant,
    timeout: Duration,
) -> Result<ExitStatus, RunError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RunError::TimedOut(timeout));
                }
                thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
            }
            Err(err) => {
                let _ = child.kill();
                return Err(RunError::Wait(err));
            }
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
        });
        rx
    })
}

/// Output gathered before the deadline; empty if the pipe is still held open.
fn collect_output(reader: Option<Receiver<String>>, deadline: Instant) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    let remaining = deadline.saturating_duration_since(Instant::now());
    match reader.recv_timeout(remaining) {
        Ok(output) => output,
        Err(RecvTimeoutError::Timeout) => {
            debug!("Output pipe still open at deadline, leaving reader detached");
            String::new()
        }
        Err(RecvTimeoutError::Disconnected) => String::new(),
    }
}
