//! Per-request error type.
//!
//! Anything a stage or route handler fails with ends up here. The dispatcher
//! recovers it into a 500 response and an `error` event; it never crashes the
//! server or touches other in-flight requests.

use std::any::Any;

use thiserror::Error;

/// Message used when an error carries no text.
pub const UNKNOWN_ERROR: &str = "Unknown Error";

/// Error raised while handling a single request.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RequestHandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RequestHandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Text sent to the client in the `message` field.
    pub fn public_message(&self) -> &str {
        if self.message.is_empty() {
            UNKNOWN_ERROR
        } else {
            &self.message
        }
    }
}

impl From<serde_json::Error> for RequestHandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::with_source(e.to_string(), e)
    }
}

impl From<std::io::Error> for RequestHandlerError {
    fn from(e: std::io::Error) -> Self {
        Self::with_source(e.to_string(), e)
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        UNKNOWN_ERROR.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_message_is_unknown_error() {
        assert_eq!(RequestHandlerError::new("").public_message(), "Unknown Error");
        assert_eq!(RequestHandlerError::new("boom").public_message(), "boom");
    }

    #[test]
    fn test_source_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = RequestHandlerError::from(io);
        assert_eq!(err.message(), "disk gone");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(payload.as_ref()), "Unknown Error");
    }
}
