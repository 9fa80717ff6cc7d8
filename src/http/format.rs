//! Response formatters.
//!
//! Bodies are serialized by content type. The built-in serializers cover
//! JSON, plain text and raw bytes; a custom formatter registered for a content
//! type replaces the built-in one for that type.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::http::error::RequestHandlerError;
use crate::http::response::ResponseBody;

pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_PLAIN: &str = "text/plain";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Content types the server can always produce, in preference order.
pub const BUILTIN_CONTENT_TYPES: [&str; 3] = [APPLICATION_JSON, TEXT_PLAIN, OCTET_STREAM];

/// A body serializer.
pub type FormatFn = dyn Fn(&ResponseBody) -> Result<Bytes, RequestHandlerError> + Send + Sync;

/// Formats the response-time header value from elapsed milliseconds.
#[derive(Clone)]
pub struct ResponseTimeFormatter(Arc<dyn Fn(f64) -> String + Send + Sync>);

impl ResponseTimeFormatter {
    pub fn new<F>(formatter: F) -> Self
    where
        F: Fn(f64) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(formatter))
    }

    pub fn format(&self, millis: f64) -> String {
        (self.0)(millis)
    }
}

impl fmt::Debug for ResponseTimeFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseTimeFormatter(..)")
    }
}

/// Custom serializers keyed by content type.
#[derive(Clone, Default)]
pub struct Formatters {
    custom: BTreeMap<String, Arc<FormatFn>>,
}

impl Formatters {
    pub fn insert<F>(&mut self, content_type: &str, formatter: F)
    where
        F: Fn(&ResponseBody) -> Result<Bytes, RequestHandlerError> + Send + Sync + 'static,
    {
        self.custom.insert(essence(content_type), Arc::new(formatter));
    }

    pub fn is_empty(&self) -> bool {
        self.custom.is_empty()
    }

    /// Every content type the server can answer with: built-ins first, then
    /// custom types in lexical order.
    pub fn acceptable(&self) -> Vec<String> {
        let mut types: Vec<String> = BUILTIN_CONTENT_TYPES.iter().map(|t| t.to_string()).collect();
        for content_type in self.custom.keys() {
            if !types.contains(content_type) {
                types.push(content_type.clone());
            }
        }
        types
    }

    /// Serialize `body` as `content_type`.
    pub fn format(&self, content_type: &str, body: &ResponseBody) -> Result<Bytes, RequestHandlerError> {
        match self.custom.get(&essence(content_type)) {
            Some(formatter) => formatter(body),
            None => default_format(content_type, body),
        }
    }
}

impl fmt::Debug for Formatters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.custom.keys()).finish()
    }
}

fn default_format(content_type: &str, body: &ResponseBody) -> Result<Bytes, RequestHandlerError> {
    let json = is_json(content_type);
    let bytes = match body {
        ResponseBody::Empty => Bytes::new(),
        ResponseBody::Bytes(bytes) => bytes.clone(),
        ResponseBody::Text(text) if json => Bytes::from(serde_json::to_vec(text)?),
        ResponseBody::Text(text) => Bytes::from(text.clone()),
        ResponseBody::Json(Value::String(text)) if !json => Bytes::from(text.clone()),
        ResponseBody::Json(value) => Bytes::from(serde_json::to_vec(value)?),
    };
    Ok(bytes)
}

/// Lowercased media type without parameters.
pub(crate) fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub(crate) fn is_json(content_type: &str) -> bool {
    let essence = essence(content_type);
    essence == APPLICATION_JSON || essence.ends_with("+json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_json_and_text() {
        let formatters = Formatters::default();
        let body = ResponseBody::Json(json!({"a": 1}));
        assert_eq!(formatters.format(APPLICATION_JSON, &body).unwrap(), Bytes::from("{\"a\":1}"));

        let text = ResponseBody::Text("hi".into());
        assert_eq!(formatters.format(TEXT_PLAIN, &text).unwrap(), Bytes::from("hi"));
        assert_eq!(formatters.format(APPLICATION_JSON, &text).unwrap(), Bytes::from("\"hi\""));
    }

    #[test]
    fn test_custom_formatter_overrides_builtin() {
        let mut formatters = Formatters::default();
        formatters.insert("application/json; charset=utf-8", |_body: &ResponseBody| {
            Ok(Bytes::from_static(b"custom"))
        });

        let body = ResponseBody::Json(json!({"a": 1}));
        assert_eq!(formatters.format("application/json", &body).unwrap(), Bytes::from("custom"));
        assert_eq!(formatters.format("APPLICATION/JSON", &body).unwrap(), Bytes::from("custom"));
    }

    #[test]
    fn test_acceptable_includes_custom_types() {
        let mut formatters = Formatters::default();
        formatters.insert("text/csv", |_body: &ResponseBody| Ok(Bytes::new()));
        assert_eq!(
            formatters.acceptable(),
            vec!["application/json", "text/plain", "application/octet-stream", "text/csv"]
        );
    }

    #[test]
    fn test_response_time_formatter() {
        let formatter = ResponseTimeFormatter::new(|ms| format!("{:.3}", ms / 1000.0));
        assert_eq!(formatter.format(1500.0), "1.500");
    }

    #[test]
    fn test_json_suffix_detection() {
        assert!(is_json("application/problem+json"));
        assert!(!is_json("text/plain; charset=utf-8"));
    }
}
