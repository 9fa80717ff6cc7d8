//! Per-request context.
//!
//! # Responsibilities
//! - Hold everything the pipeline learns about one request
//! - Carry the pending response between route dispatch and postrequest stages
//! - Record the timing start mark used for the response-time header
//!
//! # Design Decisions
//! - Owned exclusively by the dispatch of its request; never shared
//! - Built-in stages fill the parsed fields; collaborators use `extensions`

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime};

use axum::body::Body;
use axum::http::{Extensions, HeaderMap, HeaderName, Method, Request, Uri};
use bytes::Bytes;
use mime::Mime;
use serde_json::{Map, Value};

use crate::events::RequestSummary;
use crate::http::response::ApiResponse;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Header a client uses to ask for an API version.
pub static ACCEPT_VERSION: HeaderName = HeaderName::from_static("accept-version");

/// Alternative version header.
pub static X_API_VERSION: HeaderName = HeaderName::from_static("x-api-version");

/// Parsed `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub scheme: String,
    pub credentials: String,
    /// Present for the `Basic` scheme.
    pub basic: Option<BasicCredentials>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

/// State of one in-flight request.
#[derive(Debug)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Path parameters captured by the matched route.
    pub params: HashMap<String, String>,
    pub query: Map<String, Value>,
    /// Parsed body, when the content type is understood.
    pub body: Option<Value>,
    pub raw_body: Bytes,
    pub authorization: Option<Authorization>,
    /// Value of the `Date` request header.
    pub date: Option<SystemTime>,
    /// Negotiated response content type; `None` when anything is accepted.
    pub accepted: Option<Mime>,
    /// Version the client asked for, if any.
    pub requested_version: Option<String>,
    /// Version of the route that served the request.
    pub version: Option<String>,
    /// Name of the matched route.
    pub route: Option<String>,
    /// Response produced so far. Postrequest stages may replace it.
    pub response: Option<ApiResponse>,
    pub extensions: Extensions,
    pending_body: Option<Body>,
    started: Instant,
}

impl RequestContext {
    pub fn from_request(request: Request<Body>) -> Self {
        let started = Instant::now();
        let (parts, body) = request.into_parts();

        let request_id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let requested_version = [&ACCEPT_VERSION, &X_API_VERSION]
            .into_iter()
            .find_map(|name| parts.headers.get(name))
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Self {
            request_id,
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            params: HashMap::new(),
            query: Map::new(),
            body: None,
            raw_body: Bytes::new(),
            authorization: None,
            date: None,
            accepted: None,
            requested_version,
            version: None,
            route: None,
            response: None,
            extensions: parts.extensions,
            pending_body: Some(body),
            started,
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Time since the request entered the pipeline.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Take the unread transport body. Returns `None` once consumed.
    pub fn take_body(&mut self) -> Option<Body> {
        self.pending_body.take()
    }

    pub fn summary(&self) -> RequestSummary {
        RequestSummary {
            request_id: self.request_id.clone(),
            method: self.method.clone(),
            path: self.path().to_string(),
            requested_version: self.requested_version.clone(),
            version: self.version.clone(),
        }
    }
}
