//! Showing an output folder in the platform file manager.

use std::path::Path;
use std::process::Stdio;
use tracing::debug;

use crate::process::CommandSpec;

/// The file manager invocation for `dir` on this platform.
pub fn reveal_command(dir: &Path) -> CommandSpec {
    let program = if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    CommandSpec::new(program).path_arg(dir)
}

/// Opens `dir` in the file manager. Fire-and-forget: failures are logged
/// and otherwise ignored.
pub fn reveal_directory(dir: &Path) {
    let spec = reveal_command(dir);
    let spawned = std::process::Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match spawned {
        Ok(mut child) => {
            // Reap in the background so no zombie is left behind.
            std::thread::spawn(move || {
                let _ = child.wait();
            });
        }
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Could not open file manager");
        }
    }
}
