//! Prometheus metrics and structured logging for nexus.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus counters for bus dispatch, handler faults and feed health

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
