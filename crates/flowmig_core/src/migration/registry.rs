//! Registered migration steps, keyed by origin version.
//!
//! Keying by origin makes the registry a simple path: one outgoing step per
//! version, always to a strictly greater version.

use super::v0_to_v1::migrate_v0_to_v1;
use crate::project::Project;
use crate::version::SchemaVersion;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Error returned by a step's transformation.
pub type StepError = Box<dyn Error + Send + Sync + 'static>;
pub type StepResult = Result<(), StepError>;

type ApplyFn = dyn Fn(&mut dyn Project) -> StepResult + Send + Sync;

/// One transformation from `origin` to `destination`.
#[derive(Clone)]
pub struct MigrationStep {
    origin: SchemaVersion,
    destination: SchemaVersion,
    apply: Arc<ApplyFn>,
}

impl MigrationStep {
    pub fn new<F>(origin: SchemaVersion, destination: SchemaVersion, apply: F) -> Self
    where
        F: Fn(&mut dyn Project) -> StepResult + Send + Sync + 'static,
    {
        Self {
            origin,
            destination,
            apply: Arc::new(apply),
        }
    }

    pub fn origin(&self) -> &SchemaVersion {
        &self.origin
    }

    pub fn destination(&self) -> &SchemaVersion {
        &self.destination
    }

    /// Runs the transformation against `project`.
    pub fn apply(&self, project: &mut dyn Project) -> StepResult {
        (self.apply)(project)
    }
}

impl Debug for MigrationStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("origin", &self.origin)
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateOrigin {
        origin: SchemaVersion,
        existing_destination: SchemaVersion,
    },
    NotAscending {
        origin: SchemaVersion,
        destination: SchemaVersion,
    },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateOrigin {
                origin,
                existing_destination,
            } => write!(
                f,
                "a migration from {origin} is already registered (to {existing_destination})"
            ),
            Self::NotAscending {
                origin,
                destination,
            } => write!(
                f,
                "migration {origin} -> {destination} must move to a newer schema version"
            ),
        }
    }
}

impl Error for RegistryError {}

/// Adjacency map of migration steps keyed by origin version.
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    steps: BTreeMap<SchemaVersion, MigrationStep>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one step.
    ///
    /// # Errors
    /// - `DuplicateOrigin` when a step from the same origin already exists.
    /// - `NotAscending` when `destination <= origin`.
    pub fn register(&mut self, step: MigrationStep) -> Result<(), RegistryError> {
        if step.destination <= step.origin {
            return Err(RegistryError::NotAscending {
                origin: step.origin,
                destination: step.destination,
            });
        }
        if let Some(existing) = self.steps.get(&step.origin) {
            return Err(RegistryError::DuplicateOrigin {
                origin: step.origin,
                existing_destination: existing.destination.clone(),
            });
        }

        self.steps.insert(step.origin.clone(), step);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_step(mut self, step: MigrationStep) -> Result<Self, RegistryError> {
        self.register(step)?;
        Ok(self)
    }

    /// The single step leaving `origin`, if any.
    pub fn step_from(&self, origin: &SchemaVersion) -> Option<&MigrationStep> {
        self.steps.get(origin)
    }

    /// Highest destination reachable through any registered step.
    pub fn latest_version(&self) -> Option<&SchemaVersion> {
        self.steps.values().map(MigrationStep::destination).max()
    }

    /// Steps ordered by origin.
    pub fn iter(&self) -> impl Iterator<Item = &MigrationStep> {
        self.steps.values()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

static DEFAULT_REGISTRY: Lazy<MigrationRegistry> = Lazy::new(|| MigrationRegistry {
    steps: builtin_steps()
        .into_iter()
        .map(|step| (step.origin.clone(), step))
        .collect(),
});

/// Process-wide registry of the migrations shipped with this crate.
pub fn default_registry() -> &'static MigrationRegistry {
    &DEFAULT_REGISTRY
}

fn builtin_steps() -> Vec<MigrationStep> {
    vec![MigrationStep::new(
        SchemaVersion::major(0),
        SchemaVersion::major(1),
        migrate_v0_to_v1,
    )]
}
