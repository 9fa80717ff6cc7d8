//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api_server::{ApiServer, EventKind, ServerConfig};

/// Config bound to an ephemeral loopback port.
pub fn local_config() -> ServerConfig {
    let mut config = ServerConfig::with_port(0);
    config.host = "127.0.0.1".to_string();
    config.shutdown_timeout = Duration::from_secs(2);
    config
}

/// HTTP client that never goes through a proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Start `server` and return its base URL.
pub async fn start(server: &ApiServer) -> String {
    server.start().await.unwrap();
    let addr = server.local_addr().expect("server should be bound");
    format!("http://{}", addr)
}

/// Count events of one kind.
pub fn count_events(server: &ApiServer, kind: EventKind) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    server.events().on(kind, move |_event| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    count
}
