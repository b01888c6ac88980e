//! External process management.
//!
//! Every tool the pipelines drive (enhancer, ffmpeg, ffprobe) is started
//! through a [`ProcessRunner`]. The returned [`ProcessHandle`] owns the child:
//! it streams output lines, reports the exit, and kills the child when dropped.

mod error;
mod handle;
mod locate;
mod runner;
mod types;

pub use error::ProcessError;
pub use handle::ProcessHandle;
pub use locate::{find_in_dirs, locate_executable, ToolPaths};
pub use runner::{ProcessRunner, TokioProcessRunner};
pub use types::{
    CommandSpec, CompletedProcess, ControlSignal, OutputLine, OutputStream, ProcessEvent,
    ProcessExit, TerminationReason,
};
