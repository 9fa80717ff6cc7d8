//! Metrics collection and exposition.
//!
//! # Metrics
//! - `api_server_requests_total` (counter): requests by method, route, status
//! - `api_server_request_duration_seconds` (histogram): latency by method, route
//! - `api_server_in_flight_requests` (gauge): requests being processed
//! - `api_server_events_total` (counter): emitted events by name
//!
//! # Design Decisions
//! - Recording is always safe; without an installed exporter it is a no-op
//! - The Prometheus exporter serves its own HTTP listener

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Failures are logged; the server keeps running without metrics.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics exporter listening");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
        }
    }
}

fn describe() {
    describe_counter!("api_server_requests_total", "Total number of HTTP requests processed");
    describe_histogram!(
        "api_server_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        "api_server_in_flight_requests",
        "Number of HTTP requests currently being processed"
    );
    describe_counter!("api_server_events_total", "Server events emitted, by name");
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, route: &str, elapsed: Duration) {
    counter!(
        "api_server_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        "api_server_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_event(name: &'static str) {
    counter!("api_server_events_total", "event" => name).increment(1);
}

pub fn set_in_flight(count: usize) {
    gauge!("api_server_in_flight_requests").set(count as f64);
}
