//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every request:
//!     → request span (x-request-id) wrapping all hook and store logs
//!     → logging.rs (fmt subscriber, env filter)
//!     → metrics.rs (counters, histograms → Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
