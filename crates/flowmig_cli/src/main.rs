//! `flowmig` command-line entry point.
//!
//! # Responsibility
//! - Open one project and bring its config schema up to date.
//! - Report each applied step on stderr (or stdout as JSON lines).
//! - Exit with 0 on success and 1 on any failure.

use clap::Parser;
use flowmig_core::{
    apply_migrations, default_log_level, default_registry, init_logging, pending_migrations,
    schema_version, FileProject, MigrationEvent, SchemaVersion,
};
use log::info;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "flowmig", version, about = "Upgrade a flow project's configuration schema")]
struct Cli {
    /// Project root directory.
    project_root: PathBuf,

    /// Schema version to migrate to; defaults to the newest supported one.
    #[arg(long)]
    target: Option<SchemaVersion>,

    /// List pending migrations without taking the lock or writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Print one JSON object per step on stdout.
    #[arg(long)]
    json: bool,

    /// Log level for the file log (trace|debug|info|warn|error).
    #[arg(long)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off when unset.
    #[arg(long, env = "FLOWMIG_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging(level, log_dir) {
            eprintln!("warning: logging disabled: {err}");
        }
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", render_chain(err.as_ref()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let mut project = FileProject::open(&cli.project_root)?;
    let target = cli.target.clone().unwrap_or_else(schema_version);
    let registry = default_registry();

    if cli.dry_run {
        let pending = pending_migrations(&project, registry, &target)?;
        if pending.is_empty() {
            eprintln!("Project is at schema version {target}; nothing to migrate.");
        }
        for event in &pending {
            report(cli, event, "pending")?;
        }
        return Ok(());
    }

    let mut applied = 0_usize;
    for event in apply_migrations(&mut project, registry, &target)? {
        report(cli, &event?, "applied")?;
        applied += 1;
    }
    info!(
        "event=cli_migrate module=cli status=ok root={} applied={} target={}",
        cli.project_root.display(),
        applied,
        target
    );
    if applied == 0 && !cli.json {
        eprintln!("Project is at schema version {target}; nothing to migrate.");
    }
    Ok(())
}

fn report(cli: &Cli, event: &MigrationEvent, status: &str) -> Result<(), Box<dyn Error>> {
    if cli.json {
        let mut line = serde_json::to_value(event)?;
        line["status"] = status.into();
        println!("{line}");
    } else if status == "pending" {
        eprintln!(
            "Pending migration for version {} to {}",
            event.origin, event.destination
        );
    } else {
        eprintln!(
            "Applying migration for version {} to {}... OK",
            event.origin, event.destination
        );
    }
    Ok(())
}

fn render_chain(err: &dyn Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        // Wrapper errors often repeat their cause verbatim.
        if !rendered.ends_with(&cause_text) {
            rendered.push_str(&format!("\n  caused by: {cause_text}"));
        }
        source = cause.source();
    }
    rendered
}
