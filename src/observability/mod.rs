//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! middleware/request_time.rs ─┐
//! net/connection.rs ──────────┼→ metrics.rs (counters, gauges, histograms)
//! every module ───────────────┴→ logging.rs (tracing subscriber)
//! ```

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
