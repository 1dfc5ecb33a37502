//! Time-Windowed Sample
//!
//! A ring of fixed-size time buckets covering a trailing window. Values
//! recorded at time T land in T's bucket; reads aggregate every bucket
//! still inside the window.
//!
//! Eviction is lazy: a bucket that has rolled out of the window is cleared
//! by the next read or write that notices it, and the optional observer is
//! told about it exactly once at that moment. There is no background timer.

use crate::domain::ports::SampleObserver;
use crate::domain::value_objects::{MetricPath, SampleWindow};
use crate::infrastructure::clock::Clock;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Aggregate of all observations currently inside a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SampleSnapshot {
    /// Sum of observed values
    pub sum: f64,
    /// Number of observations
    pub count: u64,
}

impl SampleSnapshot {
    /// Mean of the observations, `0.0` when empty.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    /// Absolute bucket number: `time_ms / granularity_ms`
    epoch: u64,
    sum: f64,
    count: u64,
}

impl Bucket {
    fn take(&mut self) -> (f64, u64) {
        let out = (self.sum, self.count);
        self.sum = 0.0;
        self.count = 0;
        out
    }
}

#[derive(Debug)]
struct Ring {
    buckets: Vec<Bucket>,
    /// Epoch of the last sweep; sweeping again within it finds nothing new
    swept_epoch: Option<u64>,
}

/// Bucketed accumulator retaining only observations within a trailing
/// window.
///
/// Each sample owns its own lock, so samples under different paths never
/// contend with each other.
pub struct TimeWindowedSample {
    path: MetricPath,
    window: SampleWindow,
    clock: Arc<dyn Clock>,
    ring: Mutex<Ring>,
    observer: Option<Arc<dyn SampleObserver>>,
}

impl TimeWindowedSample {
    /// Create an empty sample. `observer`, if any, receives every bucket
    /// that ages out.
    pub fn new(
        path: MetricPath,
        window: SampleWindow,
        clock: Arc<dyn Clock>,
        observer: Option<Arc<dyn SampleObserver>>,
    ) -> Self {
        Self {
            path,
            ring: Mutex::new(Ring {
                buckets: vec![Bucket::default(); window.bucket_count()],
                swept_epoch: None,
            }),
            window,
            clock,
            observer,
        }
    }

    pub fn path(&self) -> &MetricPath {
        &self.path
    }

    pub fn window(&self) -> SampleWindow {
        self.window
    }

    /// Accumulate one observation into the current bucket.
    pub fn record(&self, value: f64) {
        let epoch = self.current_epoch();
        let evicted = {
            let mut ring = self.ring.lock();
            let mut evicted = self.sweep(&mut ring, epoch);

            let slot = (epoch % ring.buckets.len() as u64) as usize;
            let bucket = &mut ring.buckets[slot];
            if bucket.epoch != epoch {
                // Only reachable if the clock stepped backwards past a live bucket
                if bucket.count > 0 {
                    evicted.push(bucket.take());
                }
                bucket.epoch = epoch;
            }
            bucket.sum += value;
            bucket.count += 1;
            evicted
        };
        self.notify(evicted);
    }

    /// Aggregate every bucket inside `[now - window, now]`.
    pub fn snapshot(&self) -> SampleSnapshot {
        let epoch = self.current_epoch();
        let (snapshot, evicted) = {
            let mut ring = self.ring.lock();
            let evicted = self.sweep(&mut ring, epoch);
            let snapshot = ring
                .buckets
                .iter()
                .filter(|b| b.count > 0)
                .fold(SampleSnapshot::default(), |acc, b| SampleSnapshot {
                    sum: acc.sum + b.sum,
                    count: acc.count + b.count,
                });
            (snapshot, evicted)
        };
        self.notify(evicted);
        snapshot
    }

    fn current_epoch(&self) -> u64 {
        self.clock.now_ms() / self.window.granularity_ms()
    }

    /// Clear every non-empty bucket that has rolled out of the window and
    /// return what it held.
    fn sweep(&self, ring: &mut Ring, epoch: u64) -> Vec<(f64, u64)> {
        if ring.swept_epoch == Some(epoch) {
            return Vec::new();
        }
        ring.swept_epoch = Some(epoch);

        let len = ring.buckets.len() as u64;
        ring.buckets
            .iter_mut()
            .filter(|b| b.count > 0 && b.epoch + len <= epoch)
            .map(Bucket::take)
            .collect()
    }

    fn notify(&self, evicted: Vec<(f64, u64)>) {
        if let Some(observer) = &self.observer {
            for (value, count) in evicted {
                observer.observe(&self.path, value, count);
            }
        }
    }
}

impl std::fmt::Debug for TimeWindowedSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeWindowedSample")
            .field("path", &self.path)
            .field("window", &self.window)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use std::time::Duration;

    type Seen = Arc<Mutex<Vec<(String, f64, u64)>>>;

    fn sample(window_secs: u64, granularity_secs: u64) -> (TimeWindowedSample, Arc<ManualClock>, Seen) {
        let clock = Arc::new(ManualClock::new());
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: Arc<dyn SampleObserver> = Arc::new(move |path: &MetricPath, value: f64, count: u64| {
            sink.lock().push((path.to_string(), value, count));
        });
        let window = SampleWindow::new(
            "sample",
            Duration::from_secs(window_secs),
            Duration::from_secs(granularity_secs),
        )
        .unwrap();
        let s = TimeWindowedSample::new(
            MetricPath::new(["latency"]),
            window,
            clock.clone(),
            Some(observer),
        );
        (s, clock, seen)
    }

    // ===== Windowing Tests =====

    #[test]
    fn test_empty_snapshot() {
        let (s, _, _) = sample(60, 10);
        let snap = s.snapshot();
        assert!(snap.is_empty());
        assert_eq!(snap.mean(), 0.0);
    }

    #[test]
    fn test_read_reflects_writes_within_window() {
        let (s, clock, _) = sample(60, 10);
        s.record(5.0);
        clock.set(Duration::from_secs(55));
        s.record(7.0);

        clock.set(Duration::from_secs(58));
        let snap = s.snapshot();
        assert_eq!(snap.count, 2);
        assert_eq!(snap.sum, 12.0);
        assert_eq!(snap.mean(), 6.0);
    }

    #[test]
    fn test_old_bucket_ages_out() {
        let (s, clock, seen) = sample(60, 10);
        s.record(5.0);
        clock.set(Duration::from_secs(55));
        s.record(7.0);

        clock.set(Duration::from_secs(65));
        let snap = s.snapshot();
        assert_eq!(snap.count, 1);
        assert_eq!(snap.sum, 7.0);

        let seen = seen.lock();
        assert_eq!(seen.as_slice(), &[("latency".to_string(), 5.0, 1)]);
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let (s, clock, _) = sample(60, 10);
        s.record(1.0);
        s.record(2.0);
        clock.advance(Duration::from_secs(3));
        assert_eq!(s.snapshot(), s.snapshot());
    }

    #[test]
    fn test_same_bucket_accumulates() {
        let (s, clock, _) = sample(60, 10);
        s.record(1.0);
        clock.advance(Duration::from_secs(9));
        s.record(3.0);
        let snap = s.snapshot();
        assert_eq!(snap.count, 2);
        assert_eq!(snap.sum, 4.0);
    }

    // ===== Eviction Tests =====

    #[test]
    fn test_eviction_notified_exactly_once() {
        let (s, clock, seen) = sample(20, 10);
        s.record(4.0);
        s.record(6.0);

        clock.set(Duration::from_secs(25));
        s.snapshot();
        s.snapshot();
        s.record(1.0);
        s.snapshot();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, 10.0);
        assert_eq!(seen[0].2, 2);
    }

    #[test]
    fn test_eviction_on_write_reusing_slot() {
        let (s, clock, seen) = sample(20, 10);
        s.record(4.0);

        // Epoch 2 maps onto the slot epoch 0 used
        clock.set(Duration::from_secs(20));
        s.record(9.0);

        assert_eq!(seen.lock().as_slice(), &[("latency".to_string(), 4.0, 1)]);
        let snap = s.snapshot();
        assert_eq!(snap.count, 1);
        assert_eq!(snap.sum, 9.0);
    }

    #[test]
    fn test_every_bucket_evicted_after_long_idle() {
        let (s, clock, seen) = sample(30, 10);
        s.record(1.0);
        clock.set(Duration::from_secs(10));
        s.record(2.0);
        clock.set(Duration::from_secs(20));
        s.record(3.0);

        clock.set(Duration::from_secs(600));
        assert!(s.snapshot().is_empty());

        let mut values: Vec<f64> = seen.lock().iter().map(|(_, v, _)| *v).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_empty_buckets_not_reported() {
        let (s, clock, seen) = sample(30, 10);
        clock.set(Duration::from_secs(600));
        s.snapshot();
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_no_observer() {
        let clock = Arc::new(ManualClock::new());
        let window = SampleWindow::new("sample", Duration::from_secs(10), Duration::from_secs(1)).unwrap();
        let s = TimeWindowedSample::new(MetricPath::new(["x"]), window, clock.clone(), None);
        s.record(1.0);
        clock.advance(Duration::from_secs(60));
        assert!(s.snapshot().is_empty());
    }

    // ===== Concurrency Tests =====

    #[test]
    fn test_concurrent_records_not_lost() {
        let clock = Arc::new(ManualClock::new());
        let window = SampleWindow::new("sample", Duration::from_secs(60), Duration::from_secs(10)).unwrap();
        let s = Arc::new(TimeWindowedSample::new(MetricPath::new(["x"]), window, clock, None));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = s.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        s.record(1.0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = s.snapshot();
        assert_eq!(snap.count, 8_000);
        assert_eq!(snap.sum, 8_000.0);
    }

    #[test]
    fn test_eviction_consistent_under_concurrent_reads_and_writes() {
        use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

        let clock = Arc::new(ManualClock::new());
        let evicted = Arc::new(AtomicU64::new(0));
        let sink = evicted.clone();
        let observer: Arc<dyn SampleObserver> = Arc::new(move |_: &MetricPath, value: f64, count: u64| {
            // Every recorded value is 1.0
            assert_eq!(value, count as f64);
            sink.fetch_add(count, Ordering::SeqCst);
        });
        let window = SampleWindow::new("sample", Duration::from_secs(2), Duration::from_secs(1)).unwrap();
        let s = Arc::new(TimeWindowedSample::new(
            MetricPath::new(["x"]),
            window,
            clock.clone(),
            Some(observer),
        ));

        let done = Arc::new(AtomicBool::new(false));
        let ticker = {
            let clock = clock.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    clock.advance(Duration::from_millis(100));
                    std::thread::yield_now();
                }
            })
        };
        let readers: Vec<_> = (0..2)
            .map(|_| {
                let s = s.clone();
                let done = done.clone();
                std::thread::spawn(move || {
                    while !done.load(Ordering::SeqCst) {
                        s.snapshot();
                    }
                })
            })
            .collect();
        let writers: Vec<_> = (0..8)
            .map(|_| {
                let s = s.clone();
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        s.record(1.0);
                    }
                })
            })
            .collect();

        for w in writers {
            w.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);
        ticker.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }

        let total = 80_000;
        let live = s.snapshot().count;
        assert_eq!(evicted.load(Ordering::SeqCst) + live, total);

        clock.advance(Duration::from_secs(60));
        assert!(s.snapshot().is_empty());
        assert_eq!(evicted.load(Ordering::SeqCst), total);
    }
}
