//! Project handle contract and file-backed implementation.
//!
//! The migration engine borrows a project for one run and never owns it.
//! Configuration changes made on disk become visible through an explicit
//! [`Project::reload_config`] call.

use crate::config::{ConfigResult, ProjectConfig};
use std::path::{Path, PathBuf};

/// Caller-owned handle to a persisted project.
pub trait Project {
    /// Project root directory.
    fn root(&self) -> &Path;

    /// Configuration as last loaded from disk.
    fn config(&self) -> &ProjectConfig;

    /// Re-reads configuration from disk after an external mutation.
    fn reload_config(&mut self) -> ConfigResult<()>;
}

/// Project rooted at a directory holding one of the recognized config files.
#[derive(Debug, Clone)]
pub struct FileProject {
    root: PathBuf,
    config: ProjectConfig,
}

impl FileProject {
    /// Opens the project at `root`, loading its configuration.
    ///
    /// # Errors
    /// - `ConfigError::NotFound` when no recognized config file declares `project`.
    /// - I/O and parse errors from reading the config file.
    pub fn open(root: impl AsRef<Path>) -> ConfigResult<Self> {
        let root = root.as_ref().to_path_buf();
        let config = ProjectConfig::load(&root)?;
        Ok(Self { root, config })
    }

    /// Resolves `name` relative to the project root.
    pub fn path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.root.join(name)
    }
}

impl Project for FileProject {
    fn root(&self) -> &Path {
        &self.root
    }

    fn config(&self) -> &ProjectConfig {
        &self.config
    }

    fn reload_config(&mut self) -> ConfigResult<()> {
        self.config = ProjectConfig::load(&self.root)?;
        Ok(())
    }
}
