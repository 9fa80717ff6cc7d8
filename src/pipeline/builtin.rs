//! Built-in request parsing stages.
//!
//! # Responsibilities
//! - Negotiate the response content type from `Accept`
//! - Parse `Authorization`, `Date`, the query string and the body into the context
//! - Reject malformed input with a 4xx before collaborators see it
//!
//! # Design Decisions
//! - Absent headers are never an error; only malformed ones are
//! - Bodies are buffered up to a fixed limit, counted chunk by chunk

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use base64::Engine;
use bytes::BytesMut;
use futures_util::StreamExt;
use mime::Mime;
use serde_json::{Map, Value};

use crate::http::format::{self, Formatters};
use crate::http::request::{Authorization, BasicCredentials};
use crate::http::{ApiResponse, RequestContext, RequestHandlerError};
use crate::pipeline::{Flow, Middleware};

pub const ACCEPT: &str = "accept";
pub const AUTHORIZATION: &str = "authorization";
pub const DATE: &str = "date";
pub const QUERY: &str = "query";
pub const BODY: &str = "body";
pub const BODY_NORMALIZER: &str = "body-normalizer";

fn reject(status: StatusCode, message: impl Into<String>) -> Result<Flow, RequestHandlerError> {
    Ok(Flow::Respond(ApiResponse::message(status, message)))
}

/// Content negotiation against the types the server can produce.
#[derive(Debug, Clone)]
pub struct AcceptParser {
    acceptable: Vec<Mime>,
}

impl AcceptParser {
    pub fn new(formatters: &Formatters) -> Self {
        let acceptable = formatters
            .acceptable()
            .iter()
            .filter_map(|t| t.parse::<Mime>().ok())
            .collect();
        Self { acceptable }
    }

    /// Pick the best acceptable type. `Ok(None)` means anything goes.
    fn negotiate(&self, accept: &str) -> Result<Option<Mime>, ()> {
        let mut ranges: Vec<(Mime, f32)> = accept
            .split(',')
            .filter_map(|part| part.trim().parse::<Mime>().ok())
            .map(|range| {
                let q = range
                    .get_param("q")
                    .and_then(|q| q.as_str().parse::<f32>().ok())
                    .unwrap_or(1.0);
                (range, q)
            })
            .filter(|(_, q)| *q > 0.0)
            .collect();

        if ranges.is_empty() {
            return Ok(None);
        }
        // Stable, so equal weights keep header order.
        ranges.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (range, _) in &ranges {
            let any_type = range.type_().as_str() == "*";
            let any_subtype = range.subtype().as_str() == "*";
            if any_type && any_subtype {
                return Ok(None);
            }
            let found = self.acceptable.iter().find(|candidate| {
                candidate.type_().as_str() == range.type_().as_str()
                    && (any_subtype || candidate.subtype().as_str() == range.subtype().as_str())
            });
            if let Some(found) = found {
                return Ok(Some(found.clone()));
            }
        }
        Err(())
    }
}

#[async_trait]
impl Middleware for AcceptParser {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow, RequestHandlerError> {
        let Some(accept) = ctx.header(header::ACCEPT.as_str()).map(str::to_string) else {
            return Ok(Flow::Next);
        };
        match self.negotiate(&accept) {
            Ok(accepted) => {
                ctx.accepted = accepted;
                Ok(Flow::Next)
            }
            Err(()) => {
                let offered: Vec<&str> = self.acceptable.iter().map(|m| m.essence_str()).collect();
                reject(
                    StatusCode::NOT_ACCEPTABLE,
                    format!("Server accepts: {}", offered.join(", ")),
                )
            }
        }
    }
}

/// Parses the `Authorization` header; decodes `Basic` credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationParser;

impl AuthorizationParser {
    fn parse(value: &str) -> Option<Authorization> {
        let (scheme, credentials) = value.trim().split_once(' ')?;
        let credentials = credentials.trim();
        if scheme.is_empty() || credentials.is_empty() {
            return None;
        }

        let basic = if scheme.eq_ignore_ascii_case("basic") {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(credentials)
                .ok()?;
            let decoded = String::from_utf8(decoded).ok()?;
            let (username, password) = decoded.split_once(':')?;
            Some(BasicCredentials {
                username: username.to_string(),
                password: password.to_string(),
            })
        } else {
            None
        };

        Some(Authorization {
            scheme: scheme.to_string(),
            credentials: credentials.to_string(),
            basic,
        })
    }
}

#[async_trait]
impl Middleware for AuthorizationParser {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow, RequestHandlerError> {
        let Some(value) = ctx.headers.get(header::AUTHORIZATION) else {
            return Ok(Flow::Next);
        };
        let parsed = value.to_str().ok().and_then(Self::parse);
        match parsed {
            Some(authorization) => {
                ctx.authorization = Some(authorization);
                Ok(Flow::Next)
            }
            None => reject(StatusCode::BAD_REQUEST, "malformed authorization header"),
        }
    }
}

/// Parses the `Date` header and rejects requests outside the allowed skew.
#[derive(Debug, Clone, Copy)]
pub struct DateParser {
    max_skew: Duration,
}

impl DateParser {
    /// A zero `max_skew` disables the skew check.
    pub fn new(max_skew: Duration) -> Self {
        Self { max_skew }
    }
}

#[async_trait]
impl Middleware for DateParser {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow, RequestHandlerError> {
        let Some(value) = ctx.headers.get(header::DATE) else {
            return Ok(Flow::Next);
        };
        let date = match value.to_str().ok().map(httpdate::parse_http_date) {
            Some(Ok(date)) => date,
            _ => return reject(StatusCode::BAD_REQUEST, "malformed date header"),
        };

        if !self.max_skew.is_zero() {
            let skew = SystemTime::now()
                .duration_since(date)
                .unwrap_or_else(|e| e.duration());
            if skew > self.max_skew {
                tracing::debug!(
                    request_id = %ctx.request_id,
                    skew_secs = skew.as_secs(),
                    "Request date outside allowed skew"
                );
                return reject(StatusCode::BAD_REQUEST, "request expired");
            }
        }

        ctx.date = Some(date);
        Ok(Flow::Next)
    }
}

/// Collect urlencoded pairs; repeated keys become arrays.
pub(crate) fn pairs_to_map(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                map.insert(key, Value::String(value));
            }
        }
    }
    map
}

fn parse_urlencoded(input: &[u8]) -> Option<Map<String, Value>> {
    serde_urlencoded::from_bytes::<Vec<(String, String)>>(input)
        .ok()
        .map(pairs_to_map)
}

/// Parses the query string into `ctx.query`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParser;

#[async_trait]
impl Middleware for QueryParser {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow, RequestHandlerError> {
        let Some(query) = ctx.uri.query().filter(|q| !q.is_empty()) else {
            return Ok(Flow::Next);
        };
        match parse_urlencoded(query.as_bytes()) {
            Some(map) => {
                ctx.query = map;
                Ok(Flow::Next)
            }
            None => reject(StatusCode::BAD_REQUEST, "malformed query string"),
        }
    }
}

/// Buffers and parses the request body.
#[derive(Debug, Clone, Copy)]
pub struct BodyParser {
    max_body_size: usize,
}

impl BodyParser {
    pub fn new(max_body_size: usize) -> Self {
        Self { max_body_size }
    }

    fn too_large(&self) -> Result<Flow, RequestHandlerError> {
        reject(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("request body exceeds {} bytes", self.max_body_size),
        )
    }
}

#[async_trait]
impl Middleware for BodyParser {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow, RequestHandlerError> {
        let declared = ctx
            .header(header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_body_size) {
            return self.too_large();
        }

        let Some(body) = ctx.take_body() else {
            return Ok(Flow::Next);
        };

        let mut buf = BytesMut::new();
        let mut stream = body.into_data_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::debug!(request_id = %ctx.request_id, error = %e, "Failed to read request body");
                    return reject(StatusCode::BAD_REQUEST, "failed to read request body");
                }
            };
            if buf.len() + chunk.len() > self.max_body_size {
                return self.too_large();
            }
            buf.extend_from_slice(&chunk);
        }
        let raw = buf.freeze();
        if raw.is_empty() {
            return Ok(Flow::Next);
        }

        let content_type = ctx
            .header(header::CONTENT_TYPE.as_str())
            .map(format::essence)
            .unwrap_or_default();

        if format::is_json(&content_type) {
            match serde_json::from_slice::<Value>(&raw) {
                Ok(value) => ctx.body = Some(value),
                Err(_) => return reject(StatusCode::BAD_REQUEST, "invalid JSON body"),
            }
        } else if content_type == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
            match parse_urlencoded(&raw) {
                Some(map) => ctx.body = Some(Value::Object(map)),
                None => return reject(StatusCode::BAD_REQUEST, "malformed form body"),
            }
        } else if content_type.is_empty() || content_type.starts_with("text/") {
            ctx.body = std::str::from_utf8(&raw)
                .ok()
                .map(|text| Value::String(text.to_string()));
        }

        ctx.raw_body = raw;
        Ok(Flow::Next)
    }
}

/// Replaces a string body that holds JSON with the parsed value.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyNormalizer;

#[async_trait]
impl Middleware for BodyNormalizer {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow, RequestHandlerError> {
        if let Some(Value::String(text)) = &ctx.body {
            if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                ctx.body = Some(parsed);
            }
        }
        Ok(Flow::Next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use bytes::Bytes;
    use serde_json::json;

    fn ctx(request: Request<Body>) -> RequestContext {
        RequestContext::from_request(request)
    }

    fn with_header(name: &str, value: &str) -> RequestContext {
        ctx(Request::builder().header(name, value).body(Body::empty()).unwrap())
    }

    fn status(flow: Flow) -> Option<StatusCode> {
        match flow {
            Flow::Next => None,
            Flow::Respond(response) => Some(response.status),
        }
    }

    #[tokio::test]
    async fn test_accept_negotiation() {
        let parser = AcceptParser::new(&Formatters::default());

        let mut c = with_header("Accept", "text/html;q=0.9, text/plain");
        assert!(status(parser.handle(&mut c).await.unwrap()).is_none());
        assert_eq!(c.accepted.unwrap().essence_str(), "text/plain");

        let mut c = with_header("Accept", "*/*");
        assert!(status(parser.handle(&mut c).await.unwrap()).is_none());
        assert!(c.accepted.is_none());

        let mut c = with_header("Accept", "application/*");
        parser.handle(&mut c).await.unwrap();
        assert_eq!(c.accepted.unwrap().essence_str(), "application/json");
    }

    #[tokio::test]
    async fn test_accept_not_acceptable() {
        let parser = AcceptParser::new(&Formatters::default());
        let mut c = with_header("Accept", "image/png");
        match parser.handle(&mut c).await.unwrap() {
            Flow::Respond(response) => {
                assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);
                assert_eq!(
                    response.body,
                    crate::http::ResponseBody::Json(json!({
                        "message": "Server accepts: application/json, text/plain, application/octet-stream"
                    }))
                );
            }
            Flow::Next => panic!("expected 406"),
        }
    }

    #[tokio::test]
    async fn test_accept_custom_formatter_type() {
        let mut formatters = Formatters::default();
        formatters.insert("text/csv", |_body: &crate::http::ResponseBody| Ok(Bytes::new()));
        let parser = AcceptParser::new(&formatters);

        let mut c = with_header("Accept", "text/csv");
        assert!(status(parser.handle(&mut c).await.unwrap()).is_none());
        assert_eq!(c.accepted.unwrap().essence_str(), "text/csv");
    }

    #[tokio::test]
    async fn test_basic_authorization() {
        // "alice:s3cret"
        let mut c = with_header("Authorization", "Basic YWxpY2U6czNjcmV0");
        assert!(status(AuthorizationParser.handle(&mut c).await.unwrap()).is_none());
        let auth = c.authorization.unwrap();
        assert_eq!(auth.scheme, "Basic");
        let basic = auth.basic.unwrap();
        assert_eq!(basic.username, "alice");
        assert_eq!(basic.password, "s3cret");
    }

    #[tokio::test]
    async fn test_bearer_authorization_kept_raw() {
        let mut c = with_header("Authorization", "Bearer abc.def");
        AuthorizationParser.handle(&mut c).await.unwrap();
        let auth = c.authorization.unwrap();
        assert_eq!(auth.credentials, "abc.def");
        assert!(auth.basic.is_none());
    }

    #[tokio::test]
    async fn test_malformed_authorization() {
        for value in ["Basic", "Basic !!!notbase64", "Basic bm9jb2xvbg=="] {
            let mut c = with_header("Authorization", value);
            assert_eq!(
                status(AuthorizationParser.handle(&mut c).await.unwrap()),
                Some(StatusCode::BAD_REQUEST),
                "{value}"
            );
        }
    }

    #[tokio::test]
    async fn test_date_header() {
        let parser = DateParser::new(Duration::from_secs(300));

        let now = httpdate::fmt_http_date(SystemTime::now());
        let mut c = with_header("Date", &now);
        assert!(status(parser.handle(&mut c).await.unwrap()).is_none());
        assert!(c.date.is_some());

        let mut c = with_header("Date", "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(status(parser.handle(&mut c).await.unwrap()), Some(StatusCode::BAD_REQUEST));

        let mut c = with_header("Date", "yesterday");
        assert_eq!(status(parser.handle(&mut c).await.unwrap()), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_date_skew_disabled() {
        let parser = DateParser::new(Duration::ZERO);
        let mut c = with_header("Date", "Sun, 06 Nov 1994 08:49:37 GMT");
        assert!(status(parser.handle(&mut c).await.unwrap()).is_none());
    }

    #[tokio::test]
    async fn test_query_repeated_keys() {
        let mut c = ctx(Request::builder()
            .uri("/search?q=rust&tag=a&tag=b&tag=c&empty=")
            .body(Body::empty())
            .unwrap());
        QueryParser.handle(&mut c).await.unwrap();
        assert_eq!(
            Value::Object(c.query),
            json!({"q": "rust", "tag": ["a", "b", "c"], "empty": ""})
        );
    }

    fn body_request(content_type: Option<&str>, body: &'static str) -> RequestContext {
        let mut builder = Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header("Content-Type", content_type);
        }
        ctx(builder.body(Body::from(body)).unwrap())
    }

    #[tokio::test]
    async fn test_json_body() {
        let parser = BodyParser::new(1024);
        let mut c = body_request(Some("application/json; charset=utf-8"), r#"{"a":[1,2]}"#);
        assert!(status(parser.handle(&mut c).await.unwrap()).is_none());
        assert_eq!(c.body, Some(json!({"a": [1, 2]})));
        assert_eq!(c.raw_body, Bytes::from_static(br#"{"a":[1,2]}"#));

        let mut c = body_request(Some("application/json"), "{not json");
        assert_eq!(status(parser.handle(&mut c).await.unwrap()), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_form_and_text_bodies() {
        let parser = BodyParser::new(1024);
        let mut c = body_request(Some("application/x-www-form-urlencoded"), "name=bob&x=1&x=2");
        parser.handle(&mut c).await.unwrap();
        assert_eq!(c.body, Some(json!({"name": "bob", "x": ["1", "2"]})));

        let mut c = body_request(None, "hello");
        parser.handle(&mut c).await.unwrap();
        assert_eq!(c.body, Some(json!("hello")));

        let mut c = body_request(Some("image/png"), "\u{1}\u{2}");
        parser.handle(&mut c).await.unwrap();
        assert!(c.body.is_none());
        assert_eq!(c.raw_body.len(), 2);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let parser = BodyParser::new(4);
        let mut c = body_request(Some("text/plain"), "too long");
        assert_eq!(
            status(parser.handle(&mut c).await.unwrap()),
            Some(StatusCode::PAYLOAD_TOO_LARGE)
        );

        let mut c = ctx(Request::builder()
            .method("POST")
            .header("Content-Length", "100")
            .body(Body::empty())
            .unwrap());
        assert_eq!(
            status(parser.handle(&mut c).await.unwrap()),
            Some(StatusCode::PAYLOAD_TOO_LARGE)
        );
    }

    #[tokio::test]
    async fn test_normalizer_parses_json_strings() {
        let mut c = ctx(Request::new(Body::empty()));
        c.body = Some(json!(r#"{"k":"v"}"#));
        BodyNormalizer.handle(&mut c).await.unwrap();
        assert_eq!(c.body, Some(json!({"k": "v"})));

        c.body = Some(json!("plain text"));
        BodyNormalizer.handle(&mut c).await.unwrap();
        assert_eq!(c.body, Some(json!("plain text")));
    }
}
