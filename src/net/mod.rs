//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ApiServer::start
//!     → listener.rs (bind host:port, report local address)
//!     → tls.rs (optional: load PEM material into rustls)
//!     → axum-server (accept loop, TLS handshake, hyper connections)
//! ```
//!
//! # Design Decisions
//! - Binding happens last in the start sequence (traffic only when ready)
//! - TLS is optional and handled transparently by the serving layer

pub mod listener;
pub mod tls;
