//! TCP listener binding.
//!
//! # Responsibilities
//! - Bind to the configured host and port
//! - Report the bound address (port 0 picks an ephemeral port)
//! - Hand a nonblocking std listener to the serving layer

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    /// Bound, but the socket could not be prepared for serving.
    #[error("failed to prepare listener: {0}")]
    Setup(#[source] std::io::Error),
}

/// A bound listener, ready to serve.
#[derive(Debug)]
pub struct BoundListener {
    pub inner: std::net::TcpListener,
    pub local_addr: SocketAddr,
}

/// Bind `host:port`.
pub async fn bind(host: &str, port: u16) -> Result<BoundListener, ListenerError> {
    let listener = TcpListener::bind((host, port))
        .await
        .map_err(|source| ListenerError::Bind {
            address: format!("{}:{}", host, port),
            source,
        })?;

    let local_addr = listener.local_addr().map_err(ListenerError::Setup)?;

    tracing::info!(address = %local_addr, "Listener bound");

    // into_std keeps the socket in nonblocking mode.
    let inner = listener.into_std().map_err(ListenerError::Setup)?;
    Ok(BoundListener { inner, local_addr })
}
