//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Default config file path tried when none is given on the command line.
const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration.
///
/// With an explicit path, the file must exist and parse. Without one, the
/// default path is tried and a missing file falls back to built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let config = match path {
        Some(path) => parse_file(path)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                parse_file(default)?
            } else {
                ProxyConfig::default()
            }
        }
    };

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn parse_file(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_path_is_an_error() {
        let result = load_config(Some(Path::new("/nonexistent/proxy.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn validation_failure_surfaces_all_errors() {
        let dir = std::env::temp_dir().join("exchange-proxy-loader-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        fs::write(
            &path,
            r#"
            [upstream.spot]
            rest_url = "not a url"
            ws_url = "http://wrong-scheme.example.com"
            "#,
        )
        .unwrap();

        match load_config(Some(&path)) {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
