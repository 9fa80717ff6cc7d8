//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (port fits a TCP port, body limit > 0)
//! - Check header names are legal HTTP tokens
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Missing optional values are never an error; defaults fill them
//! - Runs before config is accepted into the system

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::RawConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("port must not be negative (got {0})")]
    NegativePort(i64),

    #[error("port {0} is out of range (max 65535)")]
    PortOutOfRange(i64),

    #[error("response time header {0:?} is not a valid header name")]
    InvalidHeaderName(String),

    #[error("max_body_size must be greater than zero")]
    ZeroBodyLimit,

    #[error("event_capacity must be greater than zero")]
    ZeroEventCapacity,

    #[error("tls.{0} is required when tls is configured")]
    MissingTlsField(&'static str),
}

/// Validate a raw configuration, collecting every error.
pub fn validate_config(config: &RawConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(port) = config.port {
        if let Err(e) = validate_port(port) {
            errors.push(e);
        }
    }

    if let Some(header) = config.response_time_header.as_deref() {
        if !header.is_empty() && HeaderName::from_bytes(header.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidHeaderName(header.to_string()));
        }
    }

    if config.max_body_size == Some(0) {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if config.event_capacity == Some(0) {
        errors.push(ValidationError::ZeroEventCapacity);
    }

    if let Some(tls) = &config.tls {
        if tls.cert.is_none() && tls.certificate.is_none() {
            errors.push(ValidationError::MissingTlsField("cert"));
        }
        if tls.key.is_none() {
            errors.push(ValidationError::MissingTlsField("key"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Port 0 is accepted and binds an ephemeral port.
pub fn validate_port(port: i64) -> Result<u16, ValidationError> {
    if port < 0 {
        return Err(ValidationError::NegativePort(port));
    }
    u16::try_from(port).map_err(|_| ValidationError::PortOutOfRange(port))
}
