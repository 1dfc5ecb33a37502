//! Sample Observer Port
//!
//! Receiver for buckets that age out of a time-windowed sample.

use crate::domain::value_objects::MetricPath;

/// External metrics receiver.
///
/// Called synchronously from inside the sampling engine, exactly once for
/// every non-empty bucket that rolls out of a window. Implementations
/// should return quickly.
pub trait SampleObserver: Send + Sync {
    /// `value` is the bucket's summed observations and `count` how many
    /// observations went into it.
    fn observe(&self, path: &MetricPath, value: f64, count: u64);
}

impl<F> SampleObserver for F
where
    F: Fn(&MetricPath, f64, u64) + Send + Sync,
{
    fn observe(&self, path: &MetricPath, value: f64, count: u64) {
        self(path, value, count)
    }
}
