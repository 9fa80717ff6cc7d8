//! Embeddable HTTP API server shell.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net::listener ──▶ http::server (Dispatcher)
//!                                            │
//!                                            ▼
//!                          pipeline: accept → auth stages → parsers
//!                                            │
//!                                            ▼
//!                          routing: explicit → root fallback → catch-all
//!                                            │
//!                                            ▼
//!                          pipeline: postrequest → render → requestEnd
//!     ◀──────────────────────────────────────┘
//!
//!     Cross-cutting: config, events, lifecycle, observability
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod pipeline;
pub mod routing;

// Cross-cutting concerns
pub mod events;
pub mod lifecycle;
pub mod observability;

pub use config::{ConfigError, RawConfig, ServerConfig, TlsConfig};
pub use events::{EventHub, EventKind, ServerEvent};
pub use http::{ApiResponse, RequestContext, RequestHandlerError};
pub use lifecycle::{ApiServer, LifecycleError, RegistrationError, ServerStartError, ServerState};
pub use pipeline::{Flow, Middleware, Stage};
pub use routing::{Handler, RouteDefinition};
