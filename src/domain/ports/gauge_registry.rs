//! Gauge Registry Port
//!
//! Pull-style gauges read on demand by an external metrics system.

use crate::domain::value_objects::MetricPath;
use std::sync::Arc;

/// Reads the current value of a gauge.
pub type GaugeFn = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Registry that external metrics systems scrape.
pub trait GaugeRegistry: Send + Sync {
    /// Register (or replace) the gauge published under `path`.
    fn register_gauge(&self, path: MetricPath, gauge: GaugeFn);
}
