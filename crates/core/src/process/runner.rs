//! Launching external programs.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::ProcessError;
use super::handle::ProcessHandle;
use super::types::{CommandSpec, ControlSignal, OutputLine, OutputStream, ProcessExit};

/// How long the supervisor waits for the output readers after the child exits.
/// A grandchild holding the pipes open would otherwise delay the exit forever.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Something that can start external programs.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Returns the name of this runner implementation.
    fn name(&self) -> &str;

    /// Starts `spec`, returning a handle that owns the process.
    async fn start(&self, spec: &CommandSpec) -> Result<ProcessHandle, ProcessError>;
}

/// Runs programs as real child processes via tokio.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    fn name(&self) -> &str {
        "tokio"
    }

    async fn start(&self, spec: &CommandSpec) -> Result<ProcessHandle, ProcessError> {
        debug!(command = %spec.command_line(), "Launching process");

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcessError::launch(&spec.program, e))?;

        let pid = child.id();
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, OutputStream::Stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, OutputStream::Stderr, line_tx.clone()));
        }
        drop(line_tx);

        let (exit_tx, exit_rx) = oneshot::channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        tokio::spawn(supervise(
            child,
            spec.program_name(),
            readers,
            control_rx,
            exit_tx,
        ));

        Ok(ProcessHandle::from_parts(
            spec.program.clone(),
            pid,
            line_rx,
            exit_rx,
            control_tx,
        ))
    }
}

/// Forwards lines from one pipe. Carriage returns split lines too, since
/// progress meters rewrite a single terminal line.
fn spawn_reader<T>(
    pipe: T,
    stream: OutputStream,
    tx: mpsc::UnboundedSender<OutputLine>,
) -> JoinHandle<()>
where
    T: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    for part in text.split(['\r', '\n']).filter(|p| !p.trim().is_empty()) {
                        if tx
                            .send(OutputLine {
                                stream,
                                text: part.to_string(),
                            })
                            .is_err()
                        {
                            return;
                        }
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Stopped reading process output");
                    break;
                }
            }
        }
    })
}

async fn supervise(
    mut child: Child,
    program: String,
    readers: Vec<JoinHandle<()>>,
    mut control_rx: mpsc::UnboundedReceiver<ControlSignal>,
    exit_tx: oneshot::Sender<ProcessExit>,
) {
    let mut stop_requested = false;
    let mut control_open = true;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            signal = control_rx.recv(), if control_open => match signal {
                Some(ControlSignal::Terminate) => {
                    stop_requested = true;
                    send_terminate(&mut child).await;
                }
                Some(ControlSignal::Kill) => {
                    stop_requested = true;
                    let _ = child.start_kill();
                }
                None => {
                    // Handle dropped: nobody owns this process any more.
                    control_open = false;
                    stop_requested = true;
                    let _ = child.start_kill();
                }
            },
        }
    };

    for reader in readers {
        if tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await.is_err() {
            warn!(program = %program, "Output pipe still open after exit");
        }
    }

    let exit = match status {
        Ok(status) => ProcessExit::from_status(status, stop_requested),
        Err(e) => {
            warn!(program = %program, error = %e, "Failed to wait for process");
            ProcessExit::lost()
        }
    };
    debug!(program = %program, code = ?exit.code, reason = ?exit.reason, "Process exited");
    let _ = exit_tx.send(exit);
}

#[cfg(unix)]
async fn send_terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let sent = Command::new("kill")
        .arg("-TERM")
        .arg(pid.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false);
    if !sent {
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
async fn send_terminate(child: &mut Child) {
    let _ = child.start_kill();
}
