//! Run-scoped temporary root directory

use crate::error::{Result, RunnerError};
use crate::logging::Logger;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Owns the directory that becomes `/` for the container process.
///
/// The directory is removed exactly once, when the workspace is dropped. Every
/// exit path of a run drops it, including early returns and unwinding panics.
#[derive(Debug)]
pub struct RootWorkspace {
    path: PathBuf,
    dir: Option<TempDir>,
    output: Logger,
}

impl RootWorkspace {
    /// Allocate a uniquely named directory under the system temp dir
    pub fn create(prefix: &str, output: Logger) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .map_err(|e| RunnerError::Config(format!("Failed to create root directory: {}", e)))?;
        Ok(Self::from_dir(dir, output))
    }

    /// Allocate under a specific parent directory
    pub fn create_in(parent: &Path, prefix: &str, output: Logger) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(parent)
            .map_err(|e| {
                RunnerError::Config(format!(
                    "Failed to create root directory in {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        Ok(Self::from_dir(dir, output))
    }

    fn from_dir(dir: TempDir, output: Logger) -> Self {
        output.detail(&format!("Allocated root at {}", dir.path().display()));
        Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
            output,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RootWorkspace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        self.output
            .detail(&format!("Removing root {}", self.path.display()));
        if let Err(e) = dir.close() {
            self.output.warning(&format!(
                "Failed to remove root {}: {}",
                self.path.display(),
                e
            ));
        }
    }
}
