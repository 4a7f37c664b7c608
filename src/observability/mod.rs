//! Observability - server-side counters exposed at `/metrics`

pub mod metrics;

pub use metrics::ServerMetrics;
