// tests/config_errors.rs

mod common;
use crate::common::*;

use std::io::Write;

use tempfile::NamedTempFile;
use greenpool::config::load_and_validate;
use greenpool::errors::GreenpoolError;

#[test]
fn empty_manifest_returns_config_error() {
    let file = NamedTempFile::new().unwrap();

    match load_and_validate(file.path()) {
        Err(GreenpoolError::ConfigError(msg)) => assert!(msg.contains("at least one [[test]]")),
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn malformed_toml_returns_toml_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[[test]\nmodule = ").unwrap();

    assert!(matches!(
        load_and_validate(file.path()),
        Err(GreenpoolError::TomlError(_))
    ));
}

#[test]
fn missing_file_returns_io_error() {
    assert!(matches!(
        load_and_validate("/definitely/not/Greenpool.toml"),
        Err(GreenpoolError::IoError(_))
    ));
}

#[test]
fn builder_manifest_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = ConfigFileBuilder::new()
        .processes(3)
        .health_check_interval("250ms")
        .with_omit("tests/**")
        .initializer("mkdir -p build")
        .finalizer("true")
        .with_test(
            TestEntryBuilder::new("math.Arith.add", "test 2 -eq 2")
                .description("adds")
                .timeout("5s")
                .build(),
        )
        .with_test(TestEntryBuilder::new("math.Arith.skip", "true").skip("later").build())
        .write_to(dir.path());

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.config.effective_processes(), 3);
    assert_eq!(cfg.health_check_interval, std::time::Duration::from_millis(250));
    assert_eq!(cfg.coverage.omit, vec!["tests/**".to_string()]);
    assert_eq!(cfg.modules(), vec!["math".to_string()]);
    assert_eq!(cfg.select("math.Arith").len(), 2);
    assert_eq!(cfg.test[1].skip.as_deref(), Some("later"));
    assert_eq!(cfg.config.initializer.as_deref(), Some("mkdir -p build"));
    assert_eq!(cfg.config.finalizer.as_deref(), Some("true"));
}
