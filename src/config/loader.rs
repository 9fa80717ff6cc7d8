//! Configuration loading and normalization.

use std::fs;
use std::path::Path;
use std::time::Duration;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::{
    RawConfig, ServerConfig, TlsConfig, DEFAULT_CLOCK_SKEW_SECS, DEFAULT_EVENT_CAPACITY,
    DEFAULT_HOST, DEFAULT_MAX_BODY_SIZE, DEFAULT_NAME, DEFAULT_PORT, DEFAULT_RESPONSE_TIME_HEADER,
    DEFAULT_SHUTDOWN_TIMEOUT_SECS, DEFAULT_VERSION,
};
use crate::config::validation::{validate_config, validate_port, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and normalize configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and normalize configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(content)?;
    normalize(raw)
}

/// Apply defaults to a raw configuration and validate it.
///
/// Empty strings count as missing values.
pub fn normalize(raw: RawConfig) -> Result<ServerConfig, ConfigError> {
    validate_config(&raw).map_err(ConfigError::Validation)?;

    let port = match raw.port {
        Some(port) => validate_port(port).map_err(|e| ConfigError::Validation(vec![e]))?,
        None => DEFAULT_PORT,
    };

    let header = non_empty(raw.response_time_header)
        .unwrap_or_else(|| DEFAULT_RESPONSE_TIME_HEADER.to_string());
    let response_time_header = HeaderName::from_bytes(header.as_bytes())
        .map_err(|_| ConfigError::Validation(vec![ValidationError::InvalidHeaderName(header.clone())]))?;

    let tls = raw
        .tls
        .map(TlsConfig::try_from)
        .transpose()
        .map_err(|e| ConfigError::Validation(vec![e]))?;

    let mut config = ServerConfig::with_port(port);
    config.name = non_empty(raw.name).unwrap_or_else(|| DEFAULT_NAME.to_string());
    config.host = non_empty(raw.host).unwrap_or_else(|| DEFAULT_HOST.to_string());
    config.default_version =
        non_empty(raw.default_version).unwrap_or_else(|| DEFAULT_VERSION.to_string());
    config.response_time_header = response_time_header;
    config.max_body_size = raw.max_body_size.unwrap_or(DEFAULT_MAX_BODY_SIZE);
    config.shutdown_timeout = Duration::from_secs(
        raw.shutdown_timeout_secs
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
    );
    config.event_capacity = raw.event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY);
    config.date_clock_skew =
        Duration::from_secs(raw.date_clock_skew_secs.unwrap_or(DEFAULT_CLOCK_SKEW_SECS));
    config.observability = raw.observability;
    config.set_tls(tls);

    Ok(config)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PemSource;
    use std::io::Write;

    #[test]
    fn test_defaults_applied() {
        let config = parse_config("port = 3000").unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.name, "api-server");
        assert_eq!(config.default_version, "1.0.0");
        assert_eq!(config.response_time_header.as_str(), "x-response-time");
        assert!(config.tls().is_none());
    }

    #[test]
    fn test_empty_strings_fall_back_to_defaults() {
        let config = parse_config(
            r#"
            name = ""
            default_version = ""
            response_time_header = ""
            "#,
        )
        .unwrap();
        assert_eq!(config.name, "api-server");
        assert_eq!(config.default_version, "1.0.0");
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_camel_case_keys() {
        let config = parse_config(
            r#"
            port = 4000
            defaultVersion = "2.1.0"
            responseTimeHeader = "X-Runtime"
            "#,
        )
        .unwrap();
        assert_eq!(config.default_version, "2.1.0");
        assert_eq!(config.response_time_header.as_str(), "x-runtime");
    }

    #[test]
    fn test_negative_port_is_config_error() {
        let err = parse_config("port = -80").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e == &[ValidationError::NegativePort(-80)]));
    }

    #[test]
    fn test_non_integer_port_is_config_error() {
        assert!(matches!(parse_config("port = 80.5"), Err(ConfigError::Parse(_))));
        assert!(matches!(parse_config("port = \"eighty\""), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_tls_alias_normalized() {
        let config = parse_config(
            r#"
            port = 8443
            [tls]
            certificate = "server.pem"
            key = "server.key"
            ca = ["ca.pem"]
            "#,
        )
        .unwrap();
        let tls = config.tls().unwrap();
        assert_eq!(tls.cert, PemSource::Path("server.pem".into()));
        assert_eq!(tls.ca, vec![PemSource::Path("ca.pem".into())]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"inventory\"\nport = 3100").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.name, "inventory");
        assert_eq!(config.port, 3100);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
