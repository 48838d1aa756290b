//! Schema migration engine for flow project configuration.
//! Upgrades a project's persisted `flow.schema_version` one registered step at a
//! time, under a project-scoped lock.

pub mod config;
pub mod lock;
pub mod logging;
pub mod migration;
pub mod project;
pub mod version;

pub use config::{
    locate_config_file, read_schema_version, write_schema_version, ConfigError, ConfigResult,
    ProjectConfig, CONFIG_FILE_NAMES,
};
pub use lock::{with_lock, LockError, MigrationLock, MIGRATION_LOCK_FILE_NAME};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use migration::{
    apply_migrations, default_registry, migrate, pending_migrations, plan, schema_version,
    MigrationError, MigrationEvent, MigrationPlan, MigrationRegistry, MigrationResult,
    MigrationRun, MigrationStep, RegistryError, StepError, StepResult, SCHEMA_VERSION,
};
pub use project::{FileProject, Project};
pub use version::{InvalidVersionError, SchemaVersion};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
