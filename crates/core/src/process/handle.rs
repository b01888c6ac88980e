//! Owned handle to a running external process.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::types::{
    CompletedProcess, ControlSignal, OutputLine, OutputStream, ProcessEvent, ProcessExit,
};

/// A running process owned by exactly one stage.
///
/// Output lines and the exit notification arrive through channels fed by a
/// supervisor task. Every line is delivered before the exit. Dropping the
/// handle closes the control channel, which makes the supervisor kill the
/// process.
#[derive(Debug)]
pub struct ProcessHandle {
    program: PathBuf,
    pid: Option<u32>,
    lines: mpsc::UnboundedReceiver<OutputLine>,
    lines_open: bool,
    exit_rx: oneshot::Receiver<ProcessExit>,
    exit: Option<ProcessExit>,
    control: mpsc::UnboundedSender<ControlSignal>,
}

impl ProcessHandle {
    /// Assembles a handle from the channels of a supervisor.
    ///
    /// Runners other than the tokio one (test doubles, remote runners) use
    /// this to hand out handles with the same semantics.
    pub fn from_parts(
        program: impl Into<PathBuf>,
        pid: Option<u32>,
        lines: mpsc::UnboundedReceiver<OutputLine>,
        exit_rx: oneshot::Receiver<ProcessExit>,
        control: mpsc::UnboundedSender<ControlSignal>,
    ) -> Self {
        Self {
            program: program.into(),
            pid,
            lines,
            lines_open: true,
            exit_rx,
            exit: None,
            control,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// OS process id, if the process had one when it was spawned.
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// The exit, once it has been observed through this handle.
    pub fn exit_status(&self) -> Option<ProcessExit> {
        self.exit
    }

    /// Next output line, or the exit once all output has been delivered.
    ///
    /// Cancel-safe: dropping the returned future loses nothing. After the
    /// exit has been returned every further call returns it again.
    pub async fn next_event(&mut self) -> ProcessEvent {
        loop {
            if let Some(exit) = self.exit {
                return ProcessEvent::Exited(exit);
            }

            tokio::select! {
                biased;

                line = self.lines.recv(), if self.lines_open => match line {
                    Some(line) => return ProcessEvent::Output(line),
                    None => self.lines_open = false,
                },
                exit = &mut self.exit_rx => {
                    let exit = exit.unwrap_or_else(|_| ProcessExit::lost());
                    self.exit = Some(exit);
                }
            }
        }
    }

    /// Waits for the exit, discarding output.
    pub async fn wait(&mut self) -> ProcessExit {
        loop {
            if let ProcessEvent::Exited(exit) = self.next_event().await {
                return exit;
            }
        }
    }

    /// Waits for the exit, collecting stdout and stderr.
    pub async fn wait_with_output(&mut self) -> CompletedProcess {
        let mut stdout = String::new();
        let mut stderr = String::new();
        loop {
            match self.next_event().await {
                ProcessEvent::Output(line) => {
                    let buf = match line.stream {
                        OutputStream::Stdout => &mut stdout,
                        OutputStream::Stderr => &mut stderr,
                    };
                    buf.push_str(&line.text);
                    buf.push('\n');
                }
                ProcessEvent::Exited(exit) => {
                    return CompletedProcess {
                        exit,
                        stdout,
                        stderr,
                    }
                }
            }
        }
    }

    /// Asks the process to stop cooperatively.
    pub fn terminate(&self) {
        self.signal(ControlSignal::Terminate);
    }

    /// Forcibly stops the process.
    pub fn kill(&self) {
        self.signal(ControlSignal::Kill);
    }

    /// Terminate, wait up to `grace`, then kill. Returns once the process
    /// has been reaped.
    pub async fn shutdown(&mut self, grace: Duration) -> ProcessExit {
        if let Some(exit) = self.exit {
            return exit;
        }

        debug!(program = %self.program.display(), "Terminating process");
        self.terminate();

        match tokio::time::timeout(grace, self.wait()).await {
            Ok(exit) => exit,
            Err(_) => {
                warn!(
                    program = %self.program.display(),
                    grace_ms = grace.as_millis() as u64,
                    "Process ignored terminate request, killing"
                );
                self.kill();
                self.wait().await
            }
        }
    }

    fn signal(&self, signal: ControlSignal) {
        if self.exit.is_none() {
            // The supervisor is gone once the process has exited.
            let _ = self.control.send(signal);
        }
    }
}
