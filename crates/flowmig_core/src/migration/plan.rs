//! Migration chain resolution.

use super::executor::MigrationEvent;
use super::registry::{MigrationRegistry, MigrationStep};
use super::{MigrationError, MigrationResult};
use crate::config::read_schema_version;
use crate::project::Project;
use crate::version::SchemaVersion;
use log::{debug, warn};
use std::iter::FusedIterator;

/// Lazily walked chain of steps from the project's version to `target`.
///
/// Yields each step in order. A gap in the registry yields one
/// `NoMigrationPath` error and ends the iteration.
#[derive(Debug)]
pub struct MigrationPlan<'r> {
    registry: &'r MigrationRegistry,
    current: SchemaVersion,
    target: SchemaVersion,
    halted: bool,
}

/// Resolves the migration chain for `project`.
///
/// # Errors
/// - Config errors while reading the project's schema version.
/// - `UnsupportedSchema` when the project is newer than `target`.
pub fn plan<'r>(
    project: &dyn Project,
    registry: &'r MigrationRegistry,
    target: &SchemaVersion,
) -> MigrationResult<MigrationPlan<'r>> {
    let current = read_schema_version(project)?;
    if current > *target {
        warn!(
            "event=migration_plan module=migration status=error error_code=unsupported_schema project_version={} supported={}",
            current, target
        );
        return Err(MigrationError::UnsupportedSchema {
            project_version: current,
            supported: target.clone(),
        });
    }

    debug!(
        "event=migration_plan module=migration status=ok current={} target={}",
        current, target
    );
    Ok(MigrationPlan {
        registry,
        current,
        target: target.clone(),
        halted: false,
    })
}

/// Describes the pending chain without applying anything.
///
/// Takes no lock, so the answer can be stale by the time a run starts.
pub fn pending_migrations(
    project: &dyn Project,
    registry: &MigrationRegistry,
    target: &SchemaVersion,
) -> MigrationResult<Vec<MigrationEvent>> {
    plan(project, registry, target)?
        .map(|step| step.map(MigrationEvent::from))
        .collect()
}

impl MigrationPlan<'_> {
    /// Version the next yielded step starts from.
    pub fn current(&self) -> &SchemaVersion {
        &self.current
    }

    pub fn target(&self) -> &SchemaVersion {
        &self.target
    }

    fn gap(&mut self) -> MigrationError {
        self.halted = true;
        MigrationError::NoMigrationPath {
            current: self.current.clone(),
            target: self.target.clone(),
        }
    }
}

impl<'r> Iterator for MigrationPlan<'r> {
    type Item = MigrationResult<&'r MigrationStep>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.halted || self.current >= self.target {
            return None;
        }

        match self.registry.step_from(&self.current) {
            Some(step) => {
                self.current = step.destination().clone();
                Some(Ok(step))
            }
            None => Some(Err(self.gap())),
        }
    }
}

impl FusedIterator for MigrationPlan<'_> {}
