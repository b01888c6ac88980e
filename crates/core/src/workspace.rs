//! Per-run scratch directories for the video pipeline.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::pipeline::PipelineError;

/// `tmp_<uuid>/` with `frames/` and `enhanced/` inside.
///
/// Either the whole tree is created or none of it is. The tree is removed by
/// [`TempWorkspace::cleanup`] or, failing that, when the value is dropped.
#[derive(Debug)]
pub struct TempWorkspace {
    root: PathBuf,
    frame_dir: PathBuf,
    enhanced_dir: PathBuf,
    removed: bool,
}

impl TempWorkspace {
    /// Creates a fresh workspace inside `parent`.
    pub fn create_in(parent: &Path) -> Result<Self, PipelineError> {
        let root = parent.join(format!("tmp_{}", Uuid::new_v4().simple()));
        let workspace_err = |source| PipelineError::Workspace {
            path: root.clone(),
            source,
        };

        std::fs::create_dir_all(parent).map_err(workspace_err)?;
        // Never reuse an existing directory.
        std::fs::create_dir(&root).map_err(workspace_err)?;

        let frame_dir = root.join("frames");
        let enhanced_dir = root.join("enhanced");
        for dir in [&frame_dir, &enhanced_dir] {
            if let Err(source) = std::fs::create_dir(dir) {
                let _ = std::fs::remove_dir_all(&root);
                return Err(PipelineError::Workspace {
                    path: dir.clone(),
                    source,
                });
            }
        }

        debug!(root = %root.display(), "Created workspace");
        Ok(Self {
            root,
            frame_dir,
            enhanced_dir,
            removed: false,
        })
    }

    /// Creates a workspace in `root_override`, or next to `input` when none
    /// is configured.
    pub fn for_input(input: &Path, root_override: Option<&Path>) -> Result<Self, PipelineError> {
        match root_override {
            Some(dir) => Self::create_in(dir),
            None => Self::create_in(&crate::pipeline::parent_dir(input)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frame_dir(&self) -> &Path {
        &self.frame_dir
    }

    pub fn enhanced_dir(&self) -> &Path {
        &self.enhanced_dir
    }

    /// Removes the tree. Safe to call more than once.
    pub fn cleanup(&mut self) -> io::Result<()> {
        if self.removed {
            return Ok(());
        }
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.removed = true;
        debug!(root = %self.root.display(), "Removed workspace");
        Ok(())
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!(root = %self.root.display(), error = %e, "Failed to remove workspace");
        }
    }
}
