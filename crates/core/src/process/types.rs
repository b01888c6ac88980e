//! Types shared by process runners and their handles.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A program and the argument list it is launched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends a path argument.
    pub fn path_arg(self, path: &Path) -> Self {
        let text = path.to_string_lossy().into_owned();
        self.arg(text)
    }

    /// Whether any argument equals `arg`.
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// The argument following the first occurrence of `flag`.
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// The file name of the program, used for matching and logging.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.to_string_lossy().into_owned())
    }

    /// Full command line for diagnostics.
    pub fn command_line(&self) -> String {
        let mut line = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Which pipe a line of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One captured line of program output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stderr,
            text: text.into(),
        }
    }
}

/// How a process came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Exited on its own with an exit code.
    Normal,
    /// Exited after we asked it to terminate or killed it.
    Killed,
    /// Died from a signal we did not send.
    Crashed,
}

/// Completion notification of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub reason: TerminationReason,
}

impl ProcessExit {
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            reason: TerminationReason::Normal,
        }
    }

    pub fn killed() -> Self {
        Self {
            code: None,
            reason: TerminationReason::Killed,
        }
    }

    /// Used when the supervisor vanished without reporting.
    pub fn lost() -> Self {
        Self {
            code: None,
            reason: TerminationReason::Crashed,
        }
    }

    /// Whether the process exited on its own with code 0.
    pub fn success(&self) -> bool {
        self.reason == TerminationReason::Normal && self.code == Some(0)
    }

    pub(crate) fn from_status(status: std::process::ExitStatus, requested_stop: bool) -> Self {
        let reason = if requested_stop {
            TerminationReason::Killed
        } else if status.code().is_some() {
            TerminationReason::Normal
        } else {
            TerminationReason::Crashed
        };
        Self {
            code: status.code(),
            reason,
        }
    }
}

/// An item from a running process: a line of output or its exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output(OutputLine),
    Exited(ProcessExit),
}

/// Result of running a process to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedProcess {
    pub exit: ProcessExit,
    pub stdout: String,
    pub stderr: String,
}

impl CompletedProcess {
    /// Stdout followed by stderr, trimmed.
    pub fn combined_output(&self) -> String {
        let mut out = String::new();
        for part in [self.stdout.trim(), self.stderr.trim()] {
            if part.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(part);
        }
        out
    }
}

/// Control requests sent from a handle to its supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSignal {
    /// Cooperative stop (SIGTERM on Unix).
    Terminate,
    /// Forced stop.
    Kill,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_builder() {
        let spec = CommandSpec::new("/usr/bin/ffmpeg")
            .arg("-y")
            .args(["-i", "in file.png"])
            .arg("out.jpg");

        assert_eq!(spec.program_name(), "ffmpeg");
        assert!(spec.has_arg("-y"));
        assert!(!spec.has_arg("-vf"));
        assert_eq!(spec.arg_after("-i"), Some("in file.png"));
        assert_eq!(spec.arg_after("out.jpg"), None);
        assert_eq!(
            spec.command_line(),
            "/usr/bin/ffmpeg -y -i \"in file.png\" out.jpg"
        );
    }

    #[test]
    fn test_process_exit_success() {
        assert!(ProcessExit::exited(0).success());
        assert!(!ProcessExit::exited(1).success());
        assert!(!ProcessExit::killed().success());
        assert!(!ProcessExit::lost().success());
    }

    #[test]
    fn test_combined_output() {
        let completed = CompletedProcess {
            exit: ProcessExit::exited(1),
            stdout: "ok\n".to_string(),
            stderr: "\nbad input\n".to_string(),
        };
        assert_eq!(completed.combined_output(), "ok\nbad input");

        let quiet = CompletedProcess {
            exit: ProcessExit::exited(0),
            stdout: String::new(),
            stderr: "only err".to_string(),
        };
        assert_eq!(quiet.combined_output(), "only err");
    }
}
