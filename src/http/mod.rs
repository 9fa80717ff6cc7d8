//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, tower layers, dispatch)
//!     → request.rs (RequestContext: request ID, parsed fields)
//!     → [pipeline stages, route dispatch, postrequest stages]
//!     → response.rs + format.rs (content type, serialization)
//!     → Send to client
//! ```

pub mod error;
pub mod format;
pub mod request;
pub mod response;
pub mod server;

pub use error::RequestHandlerError;
pub use format::{Formatters, ResponseTimeFormatter};
pub use request::{Authorization, BasicCredentials, RequestContext, X_REQUEST_ID};
pub use response::{ApiResponse, ResponseBody};
