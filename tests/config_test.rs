//! Configuration system tests.

use lokihouse_lib::core::{BackendKind, Config, ConfigBuilder};
use std::io::Write;
use std::time::Duration;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.server.port, 3100);
    assert_eq!(config.server.max_connections, 1024);
    assert_eq!(config.clickhouse.backend, BackendKind::Clickhouse);
    assert_eq!(config.clickhouse.url, "http://localhost:8123");
    assert_eq!(config.clickhouse.database, "loki");
    assert_eq!(config.buffers.samples.max_entries, 5000);
    assert_eq!(config.buffers.samples.max_age, Duration::from_secs(2));
    assert_eq!(config.buffers.labels.max_entries, 100);
    assert_eq!(config.buffers.labels.max_age, Duration::from_secs(5));
}

#[test]
fn test_config_builder() {
    let config = ConfigBuilder::new()
        .port(9000)
        .backend(BackendKind::Memory)
        .labels_buffer(10, Duration::from_millis(250))
        .credentials("reader", Some("secret".to_string()))
        .debug(true)
        .build()
        .unwrap();

    assert_eq!(config.server.port, 9000);
    assert_eq!(config.clickhouse.backend, BackendKind::Memory);
    assert_eq!(config.buffers.labels.max_entries, 10);
    assert_eq!(config.buffers.labels.max_age, Duration::from_millis(250));
    assert_eq!(config.clickhouse.username.as_deref(), Some("reader"));
    assert!(config.debug);
}

#[test]
fn test_yaml_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
server:
  port: 3101
  max_connections: 16
clickhouse:
  backend: memory
  database: tsdb
buffers:
  samples:
    max_entries: 10
    max_age: 250ms
"#
    )
    .unwrap();

    let content = std::fs::read_to_string(file.path()).unwrap();
    let config = ConfigBuilder::new()
        .from_yaml(&content)
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(config.server.port, 3101);
    assert_eq!(config.server.max_connections, 16);
    assert_eq!(config.clickhouse.backend, BackendKind::Memory);
    assert_eq!(config.clickhouse.database, "tsdb");
    assert_eq!(config.buffers.samples.max_entries, 10);
    assert_eq!(config.buffers.samples.max_age, Duration::from_millis(250));
    // Unspecified sections keep their defaults
    assert_eq!(config.buffers.labels.max_entries, 100);
}

#[test]
fn test_config_validation() {
    assert!(ConfigBuilder::new()
        .samples_buffer(0, Duration::from_secs(1))
        .build()
        .is_err());
    assert!(ConfigBuilder::new()
        .labels_buffer(10, Duration::ZERO)
        .build()
        .is_err());
    assert!(ConfigBuilder::new().database("bad-name").build().is_err());

    let mut config = Config::default();
    config.server.max_connections = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_yaml_is_config_error() {
    let err = ConfigBuilder::new()
        .from_yaml("server: [not, a, map]")
        .err()
        .unwrap();
    assert_eq!(err.category(), "config");
}
