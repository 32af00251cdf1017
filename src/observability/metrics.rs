//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pipeline_requests_total` (counter): responses written, by status
//! - `pipeline_request_duration_seconds` (histogram): dispatch to end of response
//! - `pipeline_active_connections` (gauge): connections currently tracked
//! - `pipeline_connection_errors_total` (counter): failed connections, by error class
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests pay nothing unless `init_metrics` ran.

use std::net::SocketAddr;
use std::time::Instant;

use http::StatusCode;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::error::ErrorClass;

pub const REQUESTS_TOTAL: &str = "pipeline_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "pipeline_request_duration_seconds";
pub const ACTIVE_CONNECTIONS: &str = "pipeline_active_connections";
pub const CONNECTION_ERRORS_TOTAL: &str = "pipeline_connection_errors_total";

/// Install the Prometheus recorder and serve scrapes on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    ::metrics::describe_counter!(REQUESTS_TOTAL, "Responses written, by status code");
    ::metrics::describe_histogram!(
        REQUEST_DURATION_SECONDS,
        ::metrics::Unit::Seconds,
        "Time from dispatch to the end of the response"
    );
    ::metrics::describe_gauge!(ACTIVE_CONNECTIONS, "Connections currently open");
    ::metrics::describe_counter!(
        CONNECTION_ERRORS_TOTAL,
        "Connections that ended in failure, by error class"
    );

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one completed request/response exchange.
pub fn record_request(status: StatusCode, started: Instant) {
    ::metrics::counter!(REQUESTS_TOTAL, "status" => status.as_str().to_owned()).increment(1);
    ::metrics::histogram!(REQUEST_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

pub fn record_active_connections(count: u64) {
    ::metrics::gauge!(ACTIVE_CONNECTIONS).set(count as f64);
}

pub fn record_connection_error(class: ErrorClass) {
    ::metrics::counter!(CONNECTION_ERRORS_TOTAL, "class" => class.as_str()).increment(1);
}
