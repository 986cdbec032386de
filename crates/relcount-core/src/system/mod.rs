//! # System Module
//!
//! Cache-wide metrics.

mod metrics;

pub use metrics::CacheMetrics;
