use super::types::*;
use crate::config::{env_var_pattern, expand_env_vars};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    load_config_str(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })
}

/// Parse and validate config from YAML text, expanding `$env{VAR}` first.
pub fn load_config_str(yaml: &str) -> Result<Config, ConfigError> {
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    // An empty document (or one that is only comments) means all defaults.
    let config: Config = if yaml_string.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str::<Option<Config>>(&yaml_string)?.unwrap_or_default()
    };

    validate_config(&config)?;
    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let mut unexpanded_vars: Vec<String> = env_var_pattern()
        .captures_iter(yaml_string)
        .map(|cap| cap[1].to_string())
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=...\n\
             2. Replace $env{{{0}}} in the config file with the value",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables before running\n\
             2. Replace the variables in the config file with their values",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    validate_api(&config.api, &mut errors);
    validate_polling(&config.polling, &mut errors);
    validate_archive(&config.archive, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_api(api: &ApiConfig, errors: &mut Vec<String>) {
    if !(api.base_url.starts_with("http://") || api.base_url.starts_with("https://")) {
        errors.push(format!(
            "api.base_url must be an http(s) URL, got '{}'",
            api.base_url
        ));
    }
    if api.timeout.is_zero() {
        errors.push("api.timeout must be greater than zero".to_string());
    }
}

fn validate_polling(polling: &PollingConfig, errors: &mut Vec<String>) {
    if polling.min_wait.is_zero() {
        errors.push("polling.min_wait must be greater than zero".to_string());
    }
    if polling.max_backoff < polling.min_wait {
        errors.push(format!(
            "polling.max_backoff ({:?}) must not be less than polling.min_wait ({:?})",
            polling.max_backoff, polling.min_wait
        ));
    }
    if polling.max_consecutive_errors == 0 {
        errors.push("polling.max_consecutive_errors must be at least 1".to_string());
    }
}

fn validate_archive(archive: &ArchiveConfig, errors: &mut Vec<String>) {
    if archive.bucket.trim().is_empty() {
        errors.push("archive.bucket must not be empty".to_string());
    }
    if archive.region.trim().is_empty() {
        errors.push("archive.region must not be empty".to_string());
    }
    if archive.target_concurrency == 0 {
        errors.push("archive.target_concurrency must be at least 1".to_string());
    }
    if archive.object_buffer == 0 {
        errors.push("archive.object_buffer must be at least 1".to_string());
    }
    // Static credentials come as a pair; a lone half is almost always a typo.
    if archive.access_key_id.is_some() != archive.secret_access_key.is_some() {
        errors.push(
            "archive.access_key_id and archive.secret_access_key must be set together".to_string(),
        );
    }
}
