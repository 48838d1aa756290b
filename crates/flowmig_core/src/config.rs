//! Project configuration file access.
//!
//! # Responsibility
//! - Locate the project configuration file among the recognized filenames.
//! - Read and durably rewrite `flow.schema_version`.
//!
//! # Invariants
//! - Only `flow.schema_version` is ever written; the rest of the file keeps
//!   its exact text, comments and layout included.
//! - A rewrite keeps the file's permission bits.
//! - Writes go through temp file + fsync + rename, so readers never observe a
//!   partially written document.
//! - A project without `flow.schema_version` is at schema version `0`.

use crate::project::Project;
use crate::version::{InvalidVersionError, SchemaVersion};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use toml_edit::{DocumentMut, Item, TableLike};

/// Recognized configuration filenames, in lookup order.
pub const CONFIG_FILE_NAMES: &[&str] = &["signac.rc", ".signacrc"];

const PROJECT_KEY: &str = "project";
const FLOW_SECTION: &str = "flow";
const SCHEMA_VERSION_KEY: &str = "schema_version";
const LEGACY_SCHEMA_VERSION: &str = "0";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    /// No recognized config file declaring `project` exists under `root`.
    NotFound { root: PathBuf },
    Io { path: PathBuf, source: io::Error },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Edit {
        path: PathBuf,
        source: toml_edit::TomlError,
    },
    InvalidSchemaVersion(InvalidVersionError),
    InvalidShape { path: PathBuf, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { root } => write!(
                f,
                "unable to determine project configuration file under `{}` (looked for {})",
                root.display(),
                CONFIG_FILE_NAMES.join(", ")
            ),
            Self::Io { path, source } => {
                write!(f, "config I/O failed at `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "config at `{}` is not valid TOML: {source}", path.display())
            }
            Self::Edit { path, source } => {
                write!(f, "config at `{}` cannot be edited: {source}", path.display())
            }
            Self::InvalidSchemaVersion(err) => write!(f, "{err}"),
            Self::InvalidShape { path, message } => {
                write!(f, "config at `{}` is malformed: {message}", path.display())
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Edit { source, .. } => Some(source),
            Self::InvalidSchemaVersion(err) => Some(err),
            Self::NotFound { .. } | Self::InvalidShape { .. } => None,
        }
    }
}

impl From<InvalidVersionError> for ConfigError {
    fn from(value: InvalidVersionError) -> Self {
        Self::InvalidSchemaVersion(value)
    }
}

/// Parsed project configuration document and the file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConfig {
    path: PathBuf,
    document: Table,
}

impl ProjectConfig {
    /// Locates and parses the configuration file of the project at `root`.
    pub fn load(root: &Path) -> ConfigResult<Self> {
        let located = locate(root)?;
        Ok(Self {
            path: located.path,
            document: located.document,
        })
    }

    /// File this configuration was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &Table {
        &self.document
    }

    /// Value of `flow.<key>` when present.
    pub fn flow_value(&self, key: &str) -> Option<&Value> {
        self.document
            .get(FLOW_SECTION)
            .and_then(Value::as_table)
            .and_then(|flow| flow.get(key))
    }

    /// Schema version declared by this document.
    pub fn schema_version(&self) -> ConfigResult<SchemaVersion> {
        match self.flow_value(SCHEMA_VERSION_KEY) {
            None => Ok(SchemaVersion::parse(LEGACY_SCHEMA_VERSION)?),
            Some(Value::String(raw)) => Ok(SchemaVersion::parse(raw)?),
            // Older writers stored bare integers.
            Some(Value::Integer(raw)) if *raw >= 0 => {
                Ok(SchemaVersion::major(raw.unsigned_abs()))
            }
            Some(other) => Err(ConfigError::InvalidShape {
                path: self.path.clone(),
                message: format!(
                    "`{FLOW_SECTION}.{SCHEMA_VERSION_KEY}` must be a string, found {}",
                    other.type_str()
                ),
            }),
        }
    }
}

/// Returns the path of the project's configuration file.
///
/// The first recognized file that declares a `project` key wins.
pub fn locate_config_file(root: &Path) -> ConfigResult<PathBuf> {
    locate(root).map(|located| located.path)
}

/// Reads the schema version from the project's in-memory configuration.
pub fn read_schema_version(project: &dyn Project) -> ConfigResult<SchemaVersion> {
    project.config().schema_version()
}

/// Persists `flow.schema_version = destination` and reloads the project handle.
///
/// # Side effects
/// - Replaces the config file atomically and fsyncs it before returning.
/// - Calls [`Project::reload_config`] so the handle observes the new state.
pub fn write_schema_version(
    project: &mut dyn Project,
    destination: &SchemaVersion,
) -> ConfigResult<()> {
    let Located { path, raw, .. } = locate(project.root())?;
    let mut document = raw.parse::<DocumentMut>().map_err(|source| ConfigError::Edit {
        path: path.clone(),
        source,
    })?;

    let flow = document.entry(FLOW_SECTION).or_insert(toml_edit::table());
    let Some(flow) = flow.as_table_like_mut() else {
        return Err(ConfigError::InvalidShape {
            path,
            message: format!("`{FLOW_SECTION}` must be a table"),
        });
    };
    set_keeping_decor(flow, SCHEMA_VERSION_KEY, destination.to_string());
    let rendered = document.to_string();

    if let Err(err) = write_atomic(&path, rendered.as_bytes()) {
        error!(
            "event=config_write module=config status=error path={} schema_version={} error={}",
            path.display(),
            destination,
            err
        );
        return Err(err);
    }
    info!(
        "event=config_write module=config status=ok path={} schema_version={}",
        path.display(),
        destination
    );

    project.reload_config()
}

struct Located {
    path: PathBuf,
    raw: String,
    document: Table,
}

fn locate(root: &Path) -> ConfigResult<Located> {
    let mut first_parse_error = None;
    for name in CONFIG_FILE_NAMES {
        let path = root.join(name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        let document = match raw.parse::<Table>() {
            Ok(document) => document,
            Err(source) => {
                warn!(
                    "event=config_locate module=config status=skip path={} reason=invalid_toml",
                    path.display()
                );
                first_parse_error.get_or_insert(ConfigError::Parse { path, source });
                continue;
            }
        };
        if document.contains_key(PROJECT_KEY) {
            return Ok(Located {
                path,
                raw,
                document,
            });
        }
        debug!(
            "event=config_locate module=config status=skip path={} reason=no_project_key",
            path.display()
        );
    }

    // An unreadable candidate explains more than a bare miss.
    Err(first_parse_error.unwrap_or_else(|| ConfigError::NotFound {
        root: root.to_path_buf(),
    }))
}

/// Replaces `table.<key>` with a string, keeping the old value's whitespace
/// and trailing comment.
fn set_keeping_decor(table: &mut dyn TableLike, key: &str, raw: String) {
    match table.get_mut(key) {
        Some(Item::Value(existing)) => {
            let decor = existing.decor().clone();
            *existing = toml_edit::Value::from(raw);
            *existing.decor_mut() = decor;
        }
        _ => {
            table.insert(key, toml_edit::value(raw));
        }
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> ConfigResult<()> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // The staged file is created 0600; carry the original mode over.
    let permissions = match fs::metadata(path) {
        Ok(metadata) => Some(metadata.permissions()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(source) => return Err(io_err(source)),
    };

    let mut staged = tempfile::Builder::new()
        .prefix(".flowmig-config-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(io_err)?;
    staged.write_all(contents).map_err(io_err)?;
    if let Some(permissions) = permissions {
        staged.as_file().set_permissions(permissions).map_err(io_err)?;
    }
    staged.as_file().sync_all().map_err(io_err)?;
    staged.persist(path).map_err(|err| io_err(err.error))?;

    sync_dir(parent).map_err(io_err)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
