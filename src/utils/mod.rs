//! # Utility Modules
//!
//! Supporting utilities shared by the codec, pipeline and service.
//!
//! ## Components
//! - **Metrics**: Thread-safe counters for every pipeline outcome, plus a
//!   drop-guard timer for handler latency

pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};
