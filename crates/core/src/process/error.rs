//! Error types for the process module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while locating or launching an external program.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be spawned (missing, not executable, permission denied).
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No executable with this name could be found on the host.
    #[error("Executable not found: {name}")]
    ExecutableNotFound { name: String },
}

impl ProcessError {
    /// Creates a new launch error for the given program.
    pub fn launch(program: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Launch {
            program: program.into(),
            source,
        }
    }

    /// Creates a new executable-not-found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::ExecutableNotFound { name: name.into() }
    }
}
