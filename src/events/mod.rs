//! Lifecycle and per-request events.
//!
//! # Data Flow
//! ```text
//! LifecycleController ──▶ start / ready / stop
//! dispatcher bridges  ──▶ notFound / methodNotAllowed / apiVersionNotAllowed
//!                         apiAfter / uncaughtException
//! error boundary      ──▶ error
//! completion hook     ──▶ requestEnd
//!                              │
//!                              ▼
//!                          EventHub ──▶ observers registered with on()
//!                                   └─▶ broadcast receivers from subscribe()
//! ```
//!
//! # Design Decisions
//! - Payloads are owned snapshots, so events outlive the request
//! - Emitting never blocks and never fails the request path

pub mod hub;

use std::fmt;
use std::time::Duration;

use axum::http::{Method, StatusCode};

pub use hub::EventHub;

/// Snapshot of a request for event payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSummary {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub requested_version: Option<String>,
    pub version: Option<String>,
}

/// Snapshot of a response for event payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSummary {
    pub status: StatusCode,
    pub elapsed: Duration,
}

/// Event names, as exposed to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    Start,
    Stop,
    ApiAfter,
    ApiVersionNotAllowed,
    NotFound,
    MethodNotAllowed,
    UncaughtException,
    Error,
    RequestEnd,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Ready => "ready",
            EventKind::Start => "start",
            EventKind::Stop => "stop",
            EventKind::ApiAfter => "apiAfter",
            EventKind::ApiVersionNotAllowed => "apiVersionNotAllowed",
            EventKind::NotFound => "notFound",
            EventKind::MethodNotAllowed => "methodNotAllowed",
            EventKind::UncaughtException => "uncaughtException",
            EventKind::Error => "error",
            EventKind::RequestEnd => "requestEnd",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event emitted by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Ready,
    Start,
    Stop,
    ApiAfter {
        request: RequestSummary,
        response: ResponseSummary,
        route: Option<String>,
    },
    ApiVersionNotAllowed {
        request: RequestSummary,
        response: ResponseSummary,
    },
    NotFound {
        request: RequestSummary,
        response: ResponseSummary,
    },
    MethodNotAllowed {
        request: RequestSummary,
        response: ResponseSummary,
    },
    UncaughtException {
        request: RequestSummary,
        response: ResponseSummary,
        route: Option<String>,
        error: String,
    },
    Error {
        error: String,
    },
    RequestEnd {
        request: RequestSummary,
        response: ResponseSummary,
    },
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Ready => EventKind::Ready,
            ServerEvent::Start => EventKind::Start,
            ServerEvent::Stop => EventKind::Stop,
            ServerEvent::ApiAfter { .. } => EventKind::ApiAfter,
            ServerEvent::ApiVersionNotAllowed { .. } => EventKind::ApiVersionNotAllowed,
            ServerEvent::NotFound { .. } => EventKind::NotFound,
            ServerEvent::MethodNotAllowed { .. } => EventKind::MethodNotAllowed,
            ServerEvent::UncaughtException { .. } => EventKind::UncaughtException,
            ServerEvent::Error { .. } => EventKind::Error,
            ServerEvent::RequestEnd { .. } => EventKind::RequestEnd,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }
}
