//! Schema 0 -> 1: start versioning the project config.
//!
//! Projects written before `flow.schema_version` existed read as schema `0`.
//! Version 1 only records that the config is versioned, so the step leaves
//! project data alone; the executor persists the new version after it returns.

use super::registry::StepResult;
use crate::project::Project;
use log::debug;

pub(crate) fn migrate_v0_to_v1(project: &mut dyn Project) -> StepResult {
    debug!(
        "event=migration_step module=migration status=skip step=v0_to_v1 root={} reason=version_only",
        project.root().display()
    );
    Ok(())
}
