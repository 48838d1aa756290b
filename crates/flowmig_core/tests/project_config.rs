use flowmig_core::{
    locate_config_file, read_schema_version, write_schema_version, ConfigError, FileProject,
    Project, SchemaVersion,
};
use std::fs;

const FULL_CONFIG: &str = r#"project = "demo"
workspace_dir = "workspace"

[flow]
schema_version = "0"
environment = "StandardEnvironment"

[hosts.cluster]
url = "login.example.org"
"#;

#[test]
fn write_updates_only_schema_version_and_reloads_handle() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("signac.rc"), FULL_CONFIG).unwrap();
    let mut project = FileProject::open(dir.path()).unwrap();

    write_schema_version(&mut project, &SchemaVersion::major(1)).unwrap();

    assert_eq!(
        read_schema_version(&project).unwrap(),
        SchemaVersion::major(1)
    );
    let document = fs::read_to_string(dir.path().join("signac.rc"))
        .unwrap()
        .parse::<toml::Table>()
        .unwrap();
    assert_eq!(document["project"].as_str(), Some("demo"));
    assert_eq!(document["workspace_dir"].as_str(), Some("workspace"));
    assert_eq!(document["flow"]["schema_version"].as_str(), Some("1"));
    assert_eq!(
        document["flow"]["environment"].as_str(),
        Some("StandardEnvironment")
    );
    assert_eq!(
        document["hosts"]["cluster"]["url"].as_str(),
        Some("login.example.org")
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("signac.rc")).unwrap(),
        FULL_CONFIG.replace("schema_version = \"0\"", "schema_version = \"1\"")
    );
}

#[test]
fn write_keeps_comments_and_layout() {
    let dir = tempfile::tempdir().unwrap();
    let original = "# site config\nproject = \"demo\" # name\n\n[flow]\n# managed by flowmig\nschema_version = \"0\" # current\n";
    fs::write(dir.path().join("signac.rc"), original).unwrap();
    let mut project = FileProject::open(dir.path()).unwrap();

    write_schema_version(&mut project, &SchemaVersion::major(1)).unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("signac.rc")).unwrap(),
        original.replace("\"0\"", "\"1\"")
    );
}

#[test]
fn write_appends_flow_section_without_touching_existing_text() {
    let dir = tempfile::tempdir().unwrap();
    let original = "# legacy project\nproject = \"demo\" # name\n";
    fs::write(dir.path().join("signac.rc"), original).unwrap();
    let mut project = FileProject::open(dir.path()).unwrap();

    write_schema_version(&mut project, &SchemaVersion::major(1)).unwrap();

    let written = fs::read_to_string(dir.path().join("signac.rc")).unwrap();
    assert!(written.starts_with(original));
    assert_eq!(
        read_schema_version(&project).unwrap(),
        SchemaVersion::major(1)
    );
}

#[cfg(unix)]
#[test]
fn write_keeps_file_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signac.rc");
    fs::write(&path, FULL_CONFIG).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
    let mut project = FileProject::open(dir.path()).unwrap();

    write_schema_version(&mut project, &SchemaVersion::major(1)).unwrap();

    let mode = fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o644);
}

#[test]
fn write_creates_flow_section_for_legacy_config() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(".signacrc"), "project = \"legacy\"\n").unwrap();
    let mut project = FileProject::open(dir.path()).unwrap();
    assert_eq!(
        read_schema_version(&project).unwrap(),
        SchemaVersion::major(0)
    );

    write_schema_version(&mut project, &SchemaVersion::parse("1.0").unwrap()).unwrap();

    assert_eq!(project.config().path(), dir.path().join(".signacrc"));
    assert_eq!(
        project
            .config()
            .flow_value("schema_version")
            .and_then(|value| value.as_str()),
        Some("1")
    );
}

#[test]
fn write_leaves_no_staging_files_behind() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("signac.rc"), FULL_CONFIG).unwrap();
    let mut project = FileProject::open(dir.path()).unwrap();

    for version in 1..=3 {
        write_schema_version(&mut project, &SchemaVersion::major(version)).unwrap();
    }

    let mut names = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect::<Vec<_>>();
    names.sort();
    assert_eq!(names, ["signac.rc"]);
}

#[test]
fn write_rejects_non_table_flow_section() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("signac.rc"),
        "project = \"demo\"\nflow = \"oops\"\n",
    )
    .unwrap();
    let before = fs::read(dir.path().join("signac.rc")).unwrap();
    let mut project = FileProject::open(dir.path()).unwrap();

    let err = write_schema_version(&mut project, &SchemaVersion::major(1)).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidShape { .. }));
    assert_eq!(fs::read(dir.path().join("signac.rc")).unwrap(), before);
}

#[test]
fn config_without_project_key_is_not_recognized() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("signac.rc"), "[flow]\nschema_version = \"0\"\n").unwrap();

    assert!(matches!(
        locate_config_file(dir.path()),
        Err(ConfigError::NotFound { .. })
    ));
    assert!(matches!(
        FileProject::open(dir.path()),
        Err(ConfigError::NotFound { .. })
    ));
}

#[test]
fn invalid_primary_config_falls_back_to_legacy_name() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("signac.rc"), "project = \n").unwrap();
    fs::write(dir.path().join(".signacrc"), "project = \"demo\"\n").unwrap();

    let mut project = FileProject::open(dir.path()).unwrap();
    write_schema_version(&mut project, &SchemaVersion::major(1)).unwrap();

    assert_eq!(project.config().path(), dir.path().join(".signacrc"));
    assert_eq!(
        fs::read_to_string(dir.path().join("signac.rc")).unwrap(),
        "project = \n"
    );
}

#[test]
fn invalid_toml_reports_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("signac.rc"), "project = \n").unwrap();

    let err = FileProject::open(dir.path()).unwrap_err();
    match err {
        ConfigError::Parse { path, .. } => assert_eq!(path, dir.path().join("signac.rc")),
        other => panic!("unexpected error: {other}"),
    }
}
