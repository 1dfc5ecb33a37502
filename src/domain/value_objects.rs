//! Value Objects - Immutable domain values
//!
//! Metric paths and validated sampling windows.

use crate::domain::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Ordered sequence of path segments keying one sample, e.g.
/// `["search", "latency", "db1:7070"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricPath(Vec<String>);

impl MetricPath {
    /// Build a path from any list of segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// A path under an optional name prefix.
    pub fn prefixed<I, S>(prefix: Option<&str>, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut path: Vec<String> = prefix
            .filter(|p| !p.is_empty())
            .map(|p| vec![p.to_string()])
            .unwrap_or_default();
        path.extend(segments.into_iter().map(Into::into));
        Self(path)
    }

    /// Return a new path with one more trailing segment.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MetricPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// A (window, granularity) pair that has already been checked:
/// `granularity > 0` and `window >= granularity`.
///
/// Constructing one is the only way to configure a time-windowed sample,
/// so the invariant is enforced before any sample exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSampleWindow")]
pub struct SampleWindow {
    window: Duration,
    granularity: Duration,
}

/// Unchecked wire form; deserializing goes through `SampleWindow::new`.
#[derive(Deserialize)]
struct RawSampleWindow {
    window: Duration,
    granularity: Duration,
}

impl TryFrom<RawSampleWindow> for SampleWindow {
    type Error = ConfigError;

    fn try_from(raw: RawSampleWindow) -> Result<Self, Self::Error> {
        Self::new("sample", raw.window, raw.granularity)
    }
}

impl SampleWindow {
    /// Validate a window. `name` identifies the setting in error messages.
    pub fn new(
        name: &'static str,
        window: Duration,
        granularity: Duration,
    ) -> Result<Self, ConfigError> {
        if granularity.as_millis() == 0 {
            return Err(ConfigError::ZeroGranularity { name });
        }
        if window < granularity {
            return Err(ConfigError::WindowSmallerThanGranularity {
                name,
                window,
                granularity,
            });
        }
        Ok(Self {
            window,
            granularity,
        })
    }

    /// Window used for failure accrual: granularity is a tenth of the
    /// window but never finer than one second, and never coarser than the
    /// window itself.
    pub fn for_failure_accrual(window: Duration) -> Result<Self, ConfigError> {
        let granularity = (window / 10).max(Duration::from_secs(1)).min(window);
        Self::new("failure accrual", window, granularity)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn granularity(&self) -> Duration {
        self.granularity
    }

    pub fn window_ms(&self) -> u64 {
        self.window.as_millis() as u64
    }

    pub fn granularity_ms(&self) -> u64 {
        self.granularity.as_millis() as u64
    }

    /// Number of ring buckets: `window / granularity`, rounded up so a
    /// partial trailing bucket still counts.
    pub fn bucket_count(&self) -> usize {
        let window = self.window_ms();
        let granularity = self.granularity_ms();
        (window.div_ceil(granularity)).max(1) as usize
    }
}
