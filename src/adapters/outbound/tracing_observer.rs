//! Tracing Observer
//!
//! Logs every evicted sample bucket at debug level.

use crate::domain::ports::SampleObserver;
use crate::domain::value_objects::MetricPath;

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SampleObserver for TracingObserver {
    fn observe(&self, path: &MetricPath, value: f64, count: u64) {
        tracing::debug!(path = %path, value, count, "sample bucket evicted");
    }
}
