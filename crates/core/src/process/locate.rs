//! Resolving tool names to executable paths.

use std::path::{Path, PathBuf};
use tracing::debug;

use super::error::ProcessError;
use crate::config::ToolsConfig;

/// Resolved paths of the three external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub enhancer: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl ToolPaths {
    /// Uses the given paths as-is, without checking the host.
    pub fn new(
        enhancer: impl Into<PathBuf>,
        ffmpeg: impl Into<PathBuf>,
        ffprobe: impl Into<PathBuf>,
    ) -> Self {
        Self {
            enhancer: enhancer.into(),
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Locates every configured tool, failing on the first missing one.
    pub fn resolve(config: &ToolsConfig) -> Result<Self, ProcessError> {
        Ok(Self {
            enhancer: locate_executable(&config.enhancer.to_string_lossy())?,
            ffmpeg: locate_executable(&config.ffmpeg.to_string_lossy())?,
            ffprobe: locate_executable(&config.ffprobe.to_string_lossy())?,
        })
    }
}

/// Finds an executable by name on the host.
///
/// Names containing a path separator are checked directly. Otherwise every
/// `PATH` entry is searched, then the current directory, then the common
/// install prefixes.
pub fn locate_executable(name: &str) -> Result<PathBuf, ProcessError> {
    if name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(name);
        return candidate_names(&path)
            .into_iter()
            .find(|p| is_executable(p))
            .ok_or_else(|| ProcessError::not_found(name));
    }

    let dirs = search_dirs();
    match find_in_dirs(name, &dirs) {
        Some(path) => {
            debug!(name, path = %path.display(), "Located executable");
            Ok(path)
        }
        None => Err(ProcessError::not_found(name)),
    }
}

/// First executable named `name` in `dirs`, in order.
pub fn find_in_dirs(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| candidate_names(&dir.join(name)))
        .find(|p| is_executable(p))
}

fn search_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect())
        .unwrap_or_default();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }

    if cfg!(unix) {
        dirs.push(PathBuf::from("/usr/local/bin"));
        dirs.push(PathBuf::from("/usr/bin"));
        if let Some(home) = std::env::var_os("HOME") {
            dirs.push(PathBuf::from(home).join(".local/bin"));
        }
        dirs.push(PathBuf::from("/opt/homebrew/bin"));
    }

    dirs
}

fn candidate_names(path: &Path) -> Vec<PathBuf> {
    if cfg!(windows) && path.extension().is_none() {
        vec![path.with_extension("exe"), path.to_path_buf()]
    } else {
        vec![path.to_path_buf()]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
