//! Integration tests for Configuration System

use super::test_utils::scoped_host;
use foldscope::config::{ConfigLoader, FoldscopeConfig};
use foldscope::host::{Host, MIME_HTML, MIME_PLAIN};
use foldscope::integration::{register_as_default, RegisterOptions};
use foldscope::streaming::{SchedulerKind, StreamingPipeline};
use tempfile::TempDir;

#[test]
fn test_config_file_drives_registration() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("foldscope.toml");

    std::fs::write(
        &config_file,
        r#"
[display]
streaming = false
compress_html = false

[pipeline]
scheduler = "inline"

[logging]
level = "debug"
format = "json"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.pipeline.scheduler, SchedulerKind::Inline);
    assert_eq!(config.logging.format, "json");

    let options = RegisterOptions::from_config(&config);
    assert!(!options.streaming);
    assert!(!options.compress_html);

    let (host, _scope) = scoped_host();
    register_as_default(&options).unwrap();
    assert_eq!(host.formatters().mime_order(), vec![MIME_HTML, MIME_PLAIN]);

    host.display(&serde_json::json!({"x": 1})).unwrap();
    assert!(host.document_html().contains(r#"<div class="foldscope-root""#));
}

#[test]
fn test_missing_config_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    assert!(ConfigLoader::load_from_file(&temp_dir.path().join("absent.toml")).is_err());
}

#[test]
fn test_invalid_pipeline_fails_validation_and_construction() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("foldscope.toml");
    std::fs::write(&config_file, "[pipeline]\nworkers = 0\n").unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().starts_with("Pipeline:"));
    assert!(StreamingPipeline::from_config(&config.pipeline).is_err());
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = FoldscopeConfig::default();
    let text = toml::to_string_pretty(&config).unwrap();
    let parsed: FoldscopeConfig = toml::from_str(&text).unwrap();
    assert_eq!(parsed, config);
}
