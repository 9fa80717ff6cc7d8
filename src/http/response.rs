//! Response representation and rendering.
//!
//! # Responsibilities
//! - Carry status, headers and an unserialized body through the pipeline
//! - Pick the content type (explicit header, negotiated type, or body kind)
//! - Serialize through the configured formatters

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use mime::Mime;
use serde::Serialize;
use serde_json::{json, Value};

use crate::http::error::RequestHandlerError;
use crate::http::format::{self, Formatters, APPLICATION_JSON, OCTET_STREAM, TEXT_PLAIN};

/// Response body before serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

impl ResponseBody {
    /// Content type used when the client accepts anything.
    pub fn natural_content_type(&self) -> Option<&'static str> {
        match self {
            ResponseBody::Empty => None,
            ResponseBody::Json(_) => Some(APPLICATION_JSON),
            ResponseBody::Text(_) => Some(TEXT_PLAIN),
            ResponseBody::Bytes(_) => Some(OCTET_STREAM),
        }
    }
}

/// A response produced by a stage or route handler.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl ApiResponse {
    /// Empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }

    pub fn json(value: Value) -> Self {
        Self {
            body: ResponseBody::Json(value),
            ..Self::new(StatusCode::OK)
        }
    }

    pub fn to_json<T: Serialize>(value: &T) -> Result<Self, RequestHandlerError> {
        Ok(Self::json(serde_json::to_value(value)?))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            body: ResponseBody::Text(text.into()),
            ..Self::new(StatusCode::OK)
        }
    }

    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            body: ResponseBody::Bytes(bytes.into()),
            ..Self::new(StatusCode::OK)
        }
    }

    /// `{"message": ...}` with the given status.
    pub fn message(status: StatusCode, message: impl Into<String>) -> Self {
        Self::json(json!({ "message": message.into() })).with_status(status)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serialize into a transport response.
    ///
    /// `accepted` is the negotiated content type; `None` means the client
    /// accepts anything and the body kind decides.
    pub(crate) fn render(
        self,
        accepted: Option<&Mime>,
        formatters: &Formatters,
    ) -> Result<Response, RequestHandlerError> {
        let ApiResponse {
            status,
            mut headers,
            body,
        } = self;

        let payload = match body.natural_content_type() {
            None => Bytes::new(),
            Some(natural) => {
                let explicit = headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let content_type = match explicit {
                    Some(content_type) => content_type,
                    None => {
                        let content_type = accepted
                            .map(|m| m.essence_str().to_string())
                            .unwrap_or_else(|| natural.to_string());
                        let value = HeaderValue::from_str(&content_type).map_err(|e| {
                            RequestHandlerError::with_source("invalid content type", e)
                        })?;
                        headers.insert(header::CONTENT_TYPE, value);
                        content_type
                    }
                };
                formatters.format(&format::essence(&content_type), &body)?
            }
        };

        let mut response = Response::new(Body::from(payload));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Plain 500 used when rendering itself failed.
pub(crate) fn fallback_response(message: &str) -> Response {
    let body = json!({ "message": message }).to_string();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(APPLICATION_JSON),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_json_defaults_to_application_json() {
        let response = ApiResponse::json(json!({"hello": "root"}))
            .render(None, &Formatters::default())
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_string(response).await, "{\"hello\":\"root\"}");
    }

    #[tokio::test]
    async fn test_empty_body_has_no_content_type() {
        let response = ApiResponse::new(StatusCode::NOT_FOUND)
            .render(None, &Formatters::default())
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
        assert_eq!(body_string(response).await, "");
    }

    #[tokio::test]
    async fn test_negotiated_type_wins_over_body_kind() {
        let accepted: Mime = "text/plain".parse().unwrap();
        let response = ApiResponse::json(json!("plain words"))
            .render(Some(&accepted), &Formatters::default())
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(body_string(response).await, "plain words");
    }

    #[tokio::test]
    async fn test_explicit_content_type_kept() {
        let response = ApiResponse::text("<p>x</p>")
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/html"))
            .render(None, &Formatters::default())
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
        assert_eq!(body_string(response).await, "<p>x</p>");
    }

    #[test]
    fn test_message_shape() {
        let response = ApiResponse::message(StatusCode::BAD_REQUEST, "nope");
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body, ResponseBody::Json(json!({"message": "nope"})));
    }
}
