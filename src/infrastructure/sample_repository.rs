//! Sample Repository
//!
//! Path-keyed store of time-windowed samples. Entries are created lazily
//! on first write from the repository's own (window, granularity) pair.
//!
//! Uses DashMap so writes to unrelated paths never serialize on a global
//! lock; each sample then guards its own ring.

use crate::domain::ports::SampleObserver;
use crate::domain::value_objects::{MetricPath, SampleWindow};
use crate::infrastructure::clock::Clock;
use crate::infrastructure::time_window::{SampleSnapshot, TimeWindowedSample};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Fan-out list of observers, shared by every sample of an observed
/// repository. Observers may be added at any time.
#[derive(Default)]
pub struct ObserverSet {
    observers: RwLock<Vec<Arc<dyn SampleObserver>>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for all future evictions.
    pub fn add(&self, observer: Arc<dyn SampleObserver>) {
        self.observers.write().push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SampleObserver for ObserverSet {
    fn observe(&self, path: &MetricPath, value: f64, count: u64) {
        for observer in self.observers.read().iter() {
            observer.observe(path, value, count);
        }
    }
}

/// Keyed store of time-windowed samples.
///
/// Two flavors:
/// - [`SampleRepository::new`]: samples are created lazily, evictions are
///   silent.
/// - [`SampleRepository::observed`]: additionally reports every evicted
///   bucket to an [`ObserverSet`].
pub struct SampleRepository {
    window: SampleWindow,
    clock: Arc<dyn Clock>,
    samples: DashMap<MetricPath, Arc<TimeWindowedSample>>,
    observers: Option<Arc<ObserverSet>>,
}

impl SampleRepository {
    /// Create a repository whose samples are silent on eviction.
    pub fn new(window: SampleWindow, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            samples: DashMap::new(),
            observers: None,
        }
    }

    /// Create a repository that reports evicted buckets to `observers`.
    pub fn observed(
        window: SampleWindow,
        clock: Arc<dyn Clock>,
        observers: Arc<ObserverSet>,
    ) -> Self {
        Self {
            window,
            clock,
            samples: DashMap::new(),
            observers: Some(observers),
        }
    }

    pub fn window(&self) -> SampleWindow {
        self.window
    }

    pub fn observers(&self) -> Option<&Arc<ObserverSet>> {
        self.observers.as_ref()
    }

    /// Get the sample under `path`, creating it on first use.
    pub fn sample(&self, path: &MetricPath) -> Arc<TimeWindowedSample> {
        if let Some(existing) = self.samples.get(path) {
            return existing.clone();
        }
        self.samples
            .entry(path.clone())
            .or_insert_with(|| {
                let observer = self
                    .observers
                    .clone()
                    .map(|o| o as Arc<dyn SampleObserver>);
                Arc::new(TimeWindowedSample::new(
                    path.clone(),
                    self.window,
                    self.clock.clone(),
                    observer,
                ))
            })
            .clone()
    }

    /// Record one observation under `path`.
    pub fn record(&self, path: &MetricPath, value: f64) {
        self.sample(path).record(value);
    }

    /// Current aggregate under `path`; empty if nothing was ever recorded.
    pub fn snapshot(&self, path: &MetricPath) -> SampleSnapshot {
        // Clone the Arc out so the shard lock is not held while sweeping
        let sample = self.samples.get(path).map(|s| s.clone());
        sample.map(|s| s.snapshot()).unwrap_or_default()
    }

    /// All known paths, sorted.
    pub fn paths(&self) -> Vec<MetricPath> {
        let mut paths: Vec<MetricPath> = self.samples.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl std::fmt::Debug for SampleRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleRepository")
            .field("window", &self.window)
            .field("paths", &self.samples.len())
            .field("observed", &self.observers.is_some())
            .finish()
    }
}
