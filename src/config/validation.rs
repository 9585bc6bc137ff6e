//! Configuration validation.
//!
//! Semantic checks on top of what serde already guarantees: the four upstream
//! base addresses must be well-formed URLs with the scheme matching their
//! protocol. A malformed address fails startup; it must never surface later
//! as a per-request dial error.

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid {name} url `{url}`: {reason}")]
    InvalidUrl {
        name: &'static str,
        url: String,
        reason: String,
    },

    #[error("{name} url `{url}` must use one of the schemes {expected:?}")]
    InvalidScheme {
        name: &'static str,
        url: String,
        expected: &'static [&'static str],
    },

    #[error("server port must be non-zero")]
    ZeroPort,
}

const REST_SCHEMES: &[&str] = &["http", "https"];
const WS_SCHEMES: &[&str] = &["ws", "wss"];

/// Validate a parsed configuration, returning all errors rather than the first.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }

    let urls = [
        ("spot rest", &config.upstream.spot.rest_url, REST_SCHEMES),
        ("spot ws", &config.upstream.spot.ws_url, WS_SCHEMES),
        ("futures rest", &config.upstream.futures.rest_url, REST_SCHEMES),
        ("futures ws", &config.upstream.futures.ws_url, WS_SCHEMES),
    ];

    for (name, raw, schemes) in urls {
        match Url::parse(raw) {
            Ok(url) if !schemes.contains(&url.scheme()) => {
                errors.push(ValidationError::InvalidScheme {
                    name,
                    url: raw.clone(),
                    expected: schemes,
                });
            }
            Ok(url) if url.host_str().is_none() => {
                errors.push(ValidationError::InvalidUrl {
                    name,
                    url: raw.clone(),
                    reason: "missing host".to_string(),
                });
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidUrl {
                name,
                url: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn rejects_ws_scheme_on_rest_url() {
        let mut config = ProxyConfig::default();
        config.upstream.spot.rest_url = "wss://api.example.com".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidScheme { name: "spot rest", .. }));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.server.port = 0;
        config.upstream.spot.rest_url = "not a url".to_string();
        config.upstream.futures.ws_url = "http://stream.example.com".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
