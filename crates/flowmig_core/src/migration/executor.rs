//! Locked, step-by-step application of a migration plan.
//!
//! # Invariants
//! - The project lock is held from before planning until the run ends.
//! - A step is reported only after its destination version is on disk.
//! - The first error ends the run; nothing is retried.

use super::plan::{plan, MigrationPlan};
use super::registry::{default_registry, MigrationRegistry, MigrationStep};
use super::{schema_version, MigrationError, MigrationResult};
use crate::config::write_schema_version;
use crate::lock::MigrationLock;
use crate::project::Project;
use crate::version::SchemaVersion;
use log::{error, info};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::iter::FusedIterator;
use std::time::Instant;

/// Progress notification for one applied and persisted step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationEvent {
    pub origin: SchemaVersion,
    pub destination: SchemaVersion,
}

impl From<&MigrationStep> for MigrationEvent {
    fn from(step: &MigrationStep) -> Self {
        Self {
            origin: step.origin().clone(),
            destination: step.destination().clone(),
        }
    }
}

impl Display for MigrationEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.origin, self.destination)
    }
}

/// In-progress migration run.
///
/// Iterating applies one step per item. The project lock is released when the
/// run is exhausted, fails, or is dropped early.
pub struct MigrationRun<'p, 'r> {
    project: &'p mut dyn Project,
    steps: MigrationPlan<'r>,
    lock: Option<MigrationLock>,
    started_at: Instant,
    applied: usize,
}

/// Locks the project and prepares a run towards `target`.
///
/// # Errors
/// - `Lock` when the lock file cannot be created or locked.
/// - Config errors from re-reading the project config once the lock is held.
/// - Planning errors (`Config`, `UnsupportedSchema`); the lock is released
///   before returning them.
pub fn apply_migrations<'p, 'r>(
    project: &'p mut dyn Project,
    registry: &'r MigrationRegistry,
    target: &SchemaVersion,
) -> MigrationResult<MigrationRun<'p, 'r>> {
    let started_at = Instant::now();
    info!(
        "event=migration_run module=migration status=start root={} target={}",
        project.root().display(),
        target
    );

    let result = MigrationLock::acquire(project.root())
        .map_err(MigrationError::from)
        .and_then(|lock| {
            // Another holder may have migrated while we waited.
            project.reload_config()?;
            Ok((lock, plan(&*project, registry, target)?))
        });
    let (lock, steps) = match result {
        Ok(ready) => ready,
        Err(err) => {
            error!(
                "event=migration_run module=migration status=error duration_ms={} error_code={} error={}",
                started_at.elapsed().as_millis(),
                err.code(),
                err
            );
            return Err(err);
        }
    };

    Ok(MigrationRun {
        project,
        steps,
        lock: Some(lock),
        started_at,
        applied: 0,
    })
}

/// Migrates `project` to [`SCHEMA_VERSION`](super::SCHEMA_VERSION) with the
/// built-in registry and returns the applied steps.
pub fn migrate(project: &mut dyn Project) -> MigrationResult<Vec<MigrationEvent>> {
    apply_migrations(project, default_registry(), &schema_version())?.collect()
}

impl MigrationRun<'_, '_> {
    /// Whether the run has ended and released its lock.
    pub fn is_finished(&self) -> bool {
        self.lock.is_none()
    }

    /// Number of steps applied and persisted so far.
    pub fn applied(&self) -> usize {
        self.applied
    }

    fn run_step(&mut self, step: &MigrationStep) -> MigrationResult<MigrationEvent> {
        let started_at = Instant::now();
        info!(
            "event=migration_step module=migration status=start origin={} destination={}",
            step.origin(),
            step.destination()
        );

        step.apply(&mut *self.project)
            .map_err(|source| MigrationError::Apply {
                origin: step.origin().clone(),
                destination: step.destination().clone(),
                source,
            })?;
        write_schema_version(&mut *self.project, step.destination())?;

        self.applied += 1;
        info!(
            "event=migration_step module=migration status=ok origin={} destination={} duration_ms={}",
            step.origin(),
            step.destination(),
            started_at.elapsed().as_millis()
        );
        Ok(MigrationEvent::from(step))
    }

    fn finish(&mut self, failure: Option<&MigrationError>) {
        let duration_ms = self.started_at.elapsed().as_millis();
        match failure {
            None => info!(
                "event=migration_run module=migration status=ok applied={} duration_ms={}",
                self.applied, duration_ms
            ),
            Some(err) => error!(
                "event=migration_run module=migration status=error applied={} duration_ms={} error_code={} error={}",
                self.applied,
                duration_ms,
                err.code(),
                err
            ),
        }
        self.lock = None;
    }
}

impl Iterator for MigrationRun<'_, '_> {
    type Item = MigrationResult<MigrationEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lock.as_ref()?;

        let outcome = match self.steps.next() {
            None => {
                self.finish(None);
                return None;
            }
            Some(Ok(step)) => self.run_step(step),
            Some(Err(err)) => Err(err),
        };

        if let Err(err) = &outcome {
            self.finish(Some(err));
        }
        Some(outcome)
    }
}

impl FusedIterator for MigrationRun<'_, '_> {}
