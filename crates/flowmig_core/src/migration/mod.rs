//! Schema migration registry, planner and executor.
//!
//! # Responsibility
//! - Resolve the chain of steps from a project's schema version to a target.
//! - Apply the chain exactly once under the project migration lock.
//!
//! # Invariants
//! - Steps never downgrade a project.
//! - The persisted schema version is written after every successful step and
//!   before that step is reported to the caller.
//! - A failed step ends the run; earlier steps stay applied.

use crate::config::ConfigError;
use crate::lock::LockError;
use crate::version::SchemaVersion;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod executor;
mod plan;
mod registry;
mod v0_to_v1;

pub use executor::{apply_migrations, migrate, MigrationEvent, MigrationRun};
pub use plan::{pending_migrations, plan, MigrationPlan};
pub use registry::{
    default_registry, MigrationRegistry, MigrationStep, RegistryError, StepError, StepResult,
};

/// Schema version written by this build.
pub const SCHEMA_VERSION: u64 = 1;

/// Returns [`SCHEMA_VERSION`] as a comparable version value.
pub fn schema_version() -> SchemaVersion {
    SchemaVersion::major(SCHEMA_VERSION)
}

pub type MigrationResult<T> = Result<T, MigrationError>;

#[derive(Debug)]
pub enum MigrationError {
    Config(ConfigError),
    Lock(LockError),
    /// Project schema is newer than the target this engine migrates to.
    UnsupportedSchema {
        project_version: SchemaVersion,
        supported: SchemaVersion,
    },
    /// No registered step continues the chain from `current`.
    NoMigrationPath {
        current: SchemaVersion,
        target: SchemaVersion,
    },
    /// A step's transformation failed; earlier steps remain applied.
    Apply {
        origin: SchemaVersion,
        destination: SchemaVersion,
        source: StepError,
    },
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Lock(err) => write!(f, "{err}"),
            Self::UnsupportedSchema {
                project_version,
                supported,
            } => write!(
                f,
                "the flow configuration schema version used by this project is {project_version}, \
                 but flowmig {} only supports up to schema version {supported}; try updating flowmig",
                env!("CARGO_PKG_VERSION")
            ),
            Self::NoMigrationPath { current, target } => write!(
                f,
                "the flow configuration schema version used by this project is {current}, \
                 but flowmig {} uses schema version {target} and does not know how to migrate",
                env!("CARGO_PKG_VERSION")
            ),
            Self::Apply {
                origin,
                destination,
                source,
            } => write!(
                f,
                "failed to apply migration {origin} -> {destination}: {source}"
            ),
        }
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Lock(err) => Some(err),
            Self::Apply { source, .. } => Some(source.as_ref()),
            Self::UnsupportedSchema { .. } | Self::NoMigrationPath { .. } => None,
        }
    }
}

impl From<ConfigError> for MigrationError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<LockError> for MigrationError {
    fn from(value: LockError) -> Self {
        Self::Lock(value)
    }
}

impl MigrationError {
    /// Stable short code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(ConfigError::NotFound { .. }) => "config_not_found",
            Self::Config(_) => "config_failed",
            Self::Lock(_) => "lock_failed",
            Self::UnsupportedSchema { .. } => "unsupported_schema",
            Self::NoMigrationPath { .. } => "no_migration_path",
            Self::Apply { .. } => "migration_apply_failed",
        }
    }
}
