//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline, server, connection tracker produce:
//!     → logging.rs (tracing subscriber for structured events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Connection ids are attached to every per-connection event
//! - Per-connection failures are logged at trace level; they are routine

pub mod logging;
pub mod metrics;
