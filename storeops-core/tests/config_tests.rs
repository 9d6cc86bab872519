//! Configuration load/validation integration tests.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use rstest::rstest;
use storeops_core::{config, ConfigError, Interval, RuntimePaths};

fn write_config(root: &assert_fs::TempDir, body: &str) -> RuntimePaths {
    let paths = RuntimePaths::under(root.path());
    let rel = paths
        .config_file
        .strip_prefix(root.path())
        .expect("config under root")
        .to_path_buf();
    root.child(rel).write_str(body).expect("write config");
    paths
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn missing_config_names_the_path() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load(&RuntimePaths::under(root.path())).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("config.json"));
}

#[test]
fn malformed_json_returns_parse_error_with_path() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let paths = write_config(&root, "{ \"sync_specs\": [ }");
    let err = config::load(&paths).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.json"));
}

#[test]
fn unknown_interval_is_rejected_at_load() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let paths = write_config(
        &root,
        r#"{"sync_specs": [{"source": "/a", "destination": "/b", "interval": "fortnightly"}]}"#,
    );
    let err = config::load(&paths).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("fortnightly"));
}

#[test]
fn unknown_spec_field_is_rejected_at_load() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let paths = write_config(
        &root,
        r#"{"sync_specs": [{"source": "/a", "destination": "/b", "interval": "daily", "dry": true}]}"#,
    );
    assert!(matches!(config::load(&paths), Err(ConfigError::Parse { .. })));
}

#[test]
fn redundancy_out_of_range_is_rejected() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let paths = write_config(
        &root,
        r#"{"scrub_specs": [{"directory": "/mnt/d", "database": ".db", "redundancy": 150, "interval": "weekly"}]}"#,
    );
    let err = config::load(&paths).unwrap_err();
    assert!(err.to_string().contains("redundancy"), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Validation
// ---------------------------------------------------------------------------

#[test]
fn duplicate_sync_specs_are_invalid() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let paths = write_config(
        &root,
        r#"{"sync_specs": [
            {"source": "/a", "destination": "/b", "interval": "daily"},
            {"source": "/a", "destination": "/b", "interval": "weekly"}
        ]}"#,
    );
    let err = config::load(&paths).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn webhook_must_be_http_url() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let paths = write_config(
        &root,
        r#"{"notify_specs": [{"type": "webhook", "target": "ftp://hooks"}]}"#,
    );
    assert!(matches!(config::load(&paths), Err(ConfigError::Invalid(_))));
}

#[rstest]
#[case(".")]
#[case("..")]
#[case("../..")]
#[case("/mnt")]
#[case("/")]
#[case("/mnt/data/")]
fn database_enclosing_the_directory_is_invalid(#[case] database: &str) {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let body = format!(
        r#"{{"scrub_specs": [{{"directory": "/mnt/data", "database": "{database}", "redundancy": "5%", "interval": "weekly"}}]}}"#
    );
    let paths = write_config(&root, &body);
    let err = config::load(&paths).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
    assert!(err.to_string().contains("one of its parents"));
}

#[test]
fn sibling_database_with_shared_prefix_is_valid() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let paths = write_config(
        &root,
        r#"{"scrub_specs": [{"directory": "/mnt/data", "database": "/mnt/dat", "redundancy": "5%", "interval": "weekly"}]}"#,
    );
    assert!(config::load(&paths).is_ok());
}

#[test]
fn relative_database_resolves_against_directory() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let paths = write_config(
        &root,
        r#"{"scrub_specs": [{"directory": "/mnt/data", "database": "./meta/../.pardb", "redundancy": "10%", "interval": "biweekly"}]}"#,
    );
    let config = config::load(&paths).expect("load");
    let spec = &config.scrub_specs[0];
    assert_eq!(spec.interval, Interval::Biweekly);
    assert_eq!(spec.resolved_database(), std::path::PathBuf::from("/mnt/data/.pardb"));
    assert_eq!(spec.scrub_id().as_str(), "scrub:/mnt/data:./meta/../.pardb");
}

#[test]
fn config_file_is_left_untouched_by_load() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let body = r#"{"friendly_name": "nas"}"#;
    let paths = write_config(&root, body);
    config::load(&paths).expect("load");
    let rel = paths.config_file.strip_prefix(root.path()).expect("rel");
    root.child(rel).assert(predicate::str::diff(body));
}
