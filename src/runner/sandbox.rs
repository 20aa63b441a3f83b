//! Single-use working directories for agent runs.
//!
//! Each sandbox nests its workspace two randomly named levels below the
//! sandbox root (`<root>/<uuid>/<uuid>/workspace`), so an agent listing its
//! ancestors cannot find the workspaces of concurrent runs. Only the
//! workspace is handed to the agent.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ExecutorError;

/// Neutral name for a locally delivered documentation file.
pub const DOC_FILE_NAME: &str = "api_docs.txt";

/// Name of the rendered prompt file.
pub const PROMPT_FILE_NAME: &str = "prompt.txt";

/// A run's isolated working directory tree.
pub struct Sandbox {
    /// Unique identifier for this sandbox.
    pub id: String,
    /// Top of the tree owned by this sandbox; removed on cleanup.
    outer: PathBuf,
    /// The only directory exposed to the agent.
    workspace: PathBuf,
    active: bool,
}

impl Sandbox {
    /// Allocates a fresh sandbox below `root`.
    pub fn create(root: &Path) -> Result<Self, ExecutorError> {
        let outer = root.join(Uuid::new_v4().to_string());
        let workspace = outer.join(Uuid::new_v4().to_string()).join("workspace");

        fs::create_dir_all(&workspace).map_err(|e| {
            ExecutorError::Sandbox(format!(
                "Failed to create workspace {}: {}",
                workspace.display(),
                e
            ))
        })?;

        let id = format!("sandbox-{}", Uuid::new_v4().simple());
        debug!("Sandbox {} ready at {}", id, workspace.display());
        Ok(Self {
            id,
            outer,
            workspace,
            active: true,
        })
    }

    /// Working directory handed to the agent.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Copies a documentation artifact into the workspace under a name that
    /// does not reveal which spec it belongs to.
    pub fn stage_document(&self, source: &Path) -> Result<PathBuf, ExecutorError> {
        let dest = self.workspace.join(DOC_FILE_NAME);
        fs::copy(source, &dest).map_err(|e| {
            ExecutorError::MissingArtifact(format!("{}: {}", source.display(), e))
        })?;
        Ok(dest)
    }

    /// Writes the rendered prompt into the workspace.
    pub fn write_prompt(&self, prompt: &str) -> Result<PathBuf, ExecutorError> {
        let path = self.workspace.join(PROMPT_FILE_NAME);
        fs::write(&path, prompt)?;
        Ok(path)
    }

    /// Removes the whole sandbox tree. Failures are logged, never returned.
    pub fn cleanup(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        if let Err(e) = fs::remove_dir_all(&self.outer) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Failed to remove sandbox {} at {}: {}",
                    self.id,
                    self.outer.display(),
                    e
                );
            }
        } else {
            debug!("Removed sandbox {}", self.id);
        }
    }

    /// Returns true until the sandbox has been cleaned up.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if self.active {
            warn!("Sandbox {} was not cleaned up explicitly", self.id);
            self.cleanup();
        }
    }
}
