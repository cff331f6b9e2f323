use logtail::archive::MergeSettings;
use logtail::config::{load_config, resolve_config_path, ConfigError};
use logtail::poll::PollSettings;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_full_config_round_trips_into_settings() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");

    std::env::set_var("LOGTAIL_IT_TOKEN", "fo1_secret");
    std::env::set_var("LOGTAIL_IT_KEY_ID", "AKIAEXAMPLE");
    std::env::set_var("LOGTAIL_IT_SECRET", "wJalrXUtnFEMI");

    let config_yaml = r#"
api:
  base_url: https://api.example.com/
  access_token: $env{LOGTAIL_IT_TOKEN}
  timeout: 10s
polling:
  min_wait: 100ms
  max_backoff: 2s
  max_consecutive_errors: 3
archive:
  bucket: org-logs
  region: eu-west-1
  endpoint: http://localhost:9000
  access_key_id: $env{LOGTAIL_IT_KEY_ID}
  secret_access_key: $env{LOGTAIL_IT_SECRET}
  target_concurrency: 16
  object_buffer: 8
"#;
    fs::write(&config_path, config_yaml).unwrap();

    let config = load_config(&config_path).expect("config should load");

    assert_eq!(config.api.access_token.as_deref(), Some("fo1_secret"));
    assert_eq!(config.api.timeout, Duration::from_secs(10));
    assert_eq!(config.archive.access_key_id.as_deref(), Some("AKIAEXAMPLE"));
    assert_eq!(config.archive.endpoint.as_deref(), Some("http://localhost:9000"));

    let poll = PollSettings::from(&config.polling);
    assert_eq!(poll.min_wait, Duration::from_millis(100));
    assert_eq!(poll.max_backoff, Duration::from_secs(2));
    assert_eq!(poll.max_consecutive_errors, 3);

    let merge = MergeSettings::from(&config.archive);
    assert_eq!(merge.target_concurrency, 16);
    assert_eq!(merge.object_buffer, 8);

    std::env::remove_var("LOGTAIL_IT_TOKEN");
    std::env::remove_var("LOGTAIL_IT_KEY_ID");
    std::env::remove_var("LOGTAIL_IT_SECRET");
}

#[test]
fn test_missing_file_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = load_config(&temp_dir.path().join("absent.yml"));

    match result {
        Err(ConfigError::Io(e)) => assert!(e.to_string().contains("absent.yml")),
        other => panic!("expected Io error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_parse_error_names_the_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("broken.yml");
    fs::write(&config_path, "polling:\n  min_wait: [not, a, duration]\n").unwrap();

    let err = load_config(&config_path).unwrap_err();
    assert!(err.to_string().contains("broken.yml"), "{}", err);
}

#[test]
fn test_validation_errors_are_listed_together() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    fs::write(
        &config_path,
        r#"
polling:
  min_wait: 0s
archive:
  object_buffer: 0
"#,
    )
    .unwrap();

    let err = load_config(&config_path).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("polling.min_wait"), "{}", message);
    assert!(message.contains("archive.object_buffer"), "{}", message);
}

#[test]
fn test_explicit_config_path_expands_tilde() {
    let resolved = resolve_config_path(Some(Path::new("~/logtail.yml"))).unwrap();
    if let Some(home) = dirs::home_dir() {
        assert_eq!(resolved, home.join("logtail.yml"));
    }
}
