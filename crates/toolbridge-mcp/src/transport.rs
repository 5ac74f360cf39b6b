//! Stdio transport: spawning and supervising the MCP server process.
//!
//! Each spawned process gets a single supervisor task that owns the child,
//! its stdout and stderr, and the frame decoder. Decoded messages and the
//! final exit notification are delivered to a [`TransportEvents`] sink from
//! that one task, so every message read before the exit is delivered before
//! it.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::oneshot;

use crate::codec::{FrameDecoder, FrameWriter};
use crate::config::McpServerConfig;
use crate::error::{McpError, Result};

const READ_CHUNK: usize = 8 * 1024;

/// How long to keep reading stdout after the process has exited.
const EXIT_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Receives everything a supervised process produces.
pub trait TransportEvents: Send + Sync + 'static {
    /// A complete message was decoded from stdout.
    fn on_message(&self, message: Value);

    /// The process exited. Called exactly once, after the last message.
    fn on_exit(&self, status: Option<ExitStatus>);
}

/// Handle to a running MCP server process.
///
/// Dropping the handle kills the process.
pub struct StdioProcess {
    pid: Option<u32>,
    writer: Arc<FrameWriter>,
    exited: Arc<AtomicBool>,
    kill: Mutex<Option<oneshot::Sender<()>>>,
}

impl StdioProcess {
    /// Spawn `executable` as described by `config` and start supervising it.
    ///
    /// All three standard streams are piped. Stderr lines go to the log.
    pub fn spawn(
        config: &McpServerConfig,
        executable: &Path,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Self> {
        let mut cmd = match &config.command {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(executable);
                cmd
            }
            None => Command::new(executable),
        };
        cmd.args(&config.args)
            .envs(config.effective_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            McpError::spawn_failed(format!(
                "failed to spawn '{}': {}",
                executable.display(),
                e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stderr"))?;

        let pid = child.id();
        let exited = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = oneshot::channel();

        tracing::info!(
            server = %config.name,
            executable = %executable.display(),
            pid,
            "spawned MCP server"
        );

        tokio::spawn(supervise(Supervised {
            server: config.name.clone(),
            child,
            stdout,
            stderr,
            kill: kill_rx,
            exited: Arc::clone(&exited),
            events,
        }));

        Ok(Self {
            pid,
            writer: Arc::new(FrameWriter::new(stdin)),
            exited,
            kill: Mutex::new(Some(kill_tx)),
        })
    }

    /// OS process id, if the process was still running at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Writer for the process's stdin.
    pub fn writer(&self) -> Arc<FrameWriter> {
        Arc::clone(&self.writer)
    }

    /// Whether the process has not been observed to exit.
    pub fn is_alive(&self) -> bool {
        !self.exited.load(Ordering::SeqCst)
    }

    /// Ask the supervisor to kill the process. Idempotent.
    pub fn kill(&self) {
        if let Some(kill) = self.kill.lock().take() {
            let _ = kill.send(());
        }
    }
}

impl Drop for StdioProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

impl std::fmt::Debug for StdioProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioProcess")
            .field("pid", &self.pid)
            .field("alive", &self.is_alive())
            .finish()
    }
}

struct Supervised {
    server: String,
    child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    kill: oneshot::Receiver<()>,
    exited: Arc<AtomicBool>,
    events: Arc<dyn TransportEvents>,
}

async fn supervise(task: Supervised) {
    let Supervised {
        server,
        mut child,
        mut stdout,
        stderr,
        mut kill,
        exited,
        events,
    } = task;

    let mut decoder = FrameDecoder::new();
    let mut stderr = BufReader::new(stderr).lines();
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut kill_requested = false;

    let status = loop {
        tokio::select! {
            read = stdout.read(&mut chunk), if stdout_open => match read {
                Ok(0) => stdout_open = false,
                Ok(n) => {
                    for message in decoder.decode(&chunk[..n]) {
                        events.on_message(message);
                    }
                }
                Err(e) => {
                    tracing::warn!(server = %server, error = %e, "failed to read MCP server stdout");
                    stdout_open = false;
                }
            },
            line = stderr.next_line(), if stderr_open => match line {
                Ok(Some(line)) => log_stderr_line(&server, &line),
                Ok(None) | Err(_) => stderr_open = false,
            },
            _ = &mut kill, if !kill_requested => {
                kill_requested = true;
                if let Err(e) = child.start_kill() {
                    tracing::debug!(server = %server, error = %e, "kill failed, process likely gone");
                }
            },
            status = child.wait() => break status.ok(),
        }
    };

    if stdout_open {
        let drain = async {
            loop {
                match stdout.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        for message in decoder.decode(&chunk[..n]) {
                            events.on_message(message);
                        }
                    }
                }
            }
        };
        let _ = tokio::time::timeout(EXIT_DRAIN_TIMEOUT, drain).await;
    }
    if decoder.buffered() > 0 {
        tracing::debug!(
            server = %server,
            bytes = decoder.buffered(),
            "discarding incomplete message from exited MCP server"
        );
    }

    exited.store(true, Ordering::SeqCst);
    tracing::info!(
        server = %server,
        code = status.and_then(|s| s.code()),
        killed = kill_requested,
        "MCP server process exited"
    );
    events.on_exit(status);
}

/// Log level for a line of server stderr, or `None` to drop it.
fn stderr_level(line: &str) -> Option<tracing::Level> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let lower = line.to_ascii_lowercase();
    let alarming = ["error", "fatal", "panic", "exception"]
        .iter()
        .any(|word| lower.contains(word));
    Some(if alarming {
        tracing::Level::WARN
    } else {
        tracing::Level::DEBUG
    })
}

fn log_stderr_line(server: &str, line: &str) {
    let Some(level) = stderr_level(line) else {
        return;
    };
    if level == tracing::Level::WARN {
        tracing::warn!(server, stderr = %line.trim(), "MCP server stderr");
    } else {
        tracing::debug!(server, stderr = %line.trim(), "MCP server stderr");
    }
}
