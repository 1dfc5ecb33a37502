//! Failure Accrual
//!
//! Circuit breaking by weight rather than by rejection. Every outcome is
//! recorded into a private windowed sample (1 for failure, 0 for success),
//! so its mean is the recent failure ratio. Weight falls linearly with that
//! ratio and hits zero at the threshold; as the window rolls past old
//! failures it climbs back without any reset.
//!
//! Requests are never refused here. Keeping traffic away from a zero-weight
//! host is the balancer's job.

use crate::domain::entities::Host;
use crate::domain::errors::{BrokerError, ConfigError};
use crate::domain::ports::Broker;
use crate::domain::value_objects::{MetricPath, SampleWindow};
use crate::infrastructure::clock::Clock;
use crate::infrastructure::sample_repository::SampleRepository;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default failure ratio at which weight reaches zero.
pub const DEFAULT_FAILURE_THRESHOLD: f64 = 0.5;

/// Failure accrual settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureAccrualConfig {
    /// Trailing window over which outcomes are counted
    pub window: Duration,
    /// Failure ratio in (0, 1] at which weight becomes zero
    pub threshold: f64,
}

impl Default for FailureAccrualConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(10),
            threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

impl FailureAccrualConfig {
    /// Check the threshold and derive the sample window.
    pub fn sample_window(&self) -> Result<SampleWindow, ConfigError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConfigError::InvalidFailureThreshold(self.threshold));
        }
        SampleWindow::for_failure_accrual(self.window)
    }
}

pub struct FailureAccrualBroker<B> {
    inner: B,
    host: String,
    threshold: f64,
    outcomes: SampleRepository,
    path: MetricPath,
    tripped: AtomicBool,
}

impl<B: Broker> FailureAccrualBroker<B> {
    pub fn new(
        inner: B,
        host: &Host,
        config: FailureAccrualConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let window = config.sample_window()?;
        Ok(Self {
            inner,
            host: host.to_string(),
            threshold: config.threshold,
            outcomes: SampleRepository::new(window, clock),
            path: MetricPath::new(["failures"]),
            tripped: AtomicBool::new(false),
        })
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Fraction of requests in the window that failed; `0.0` when idle.
    pub fn failure_ratio(&self) -> f64 {
        self.outcomes.snapshot(&self.path).mean()
    }

    /// Health multiplier in [0, 1] applied to the inner weight.
    fn health(&self) -> f64 {
        let ratio = self.failure_ratio();
        let health = (1.0 - ratio / self.threshold).clamp(0.0, 1.0);

        let tripped = health <= 0.0;
        if self.tripped.swap(tripped, Ordering::Relaxed) != tripped {
            if tripped {
                tracing::warn!(
                    host = %self.host,
                    failure_ratio = ratio,
                    threshold = self.threshold,
                    "failure accrual tripped, weight is zero"
                );
            } else {
                tracing::info!(host = %self.host, failure_ratio = ratio, "failure accrual recovered");
            }
        }
        health
    }
}

#[async_trait]
impl<B: Broker> Broker for FailureAccrualBroker<B> {
    async fn send(&self, request: Bytes) -> Result<Bytes, BrokerError> {
        let result = self.inner.send(request).await;
        let outcome = if result.is_err() { 1.0 } else { 0.0 };
        self.outcomes.record(&self.path, outcome);
        self.health();
        result
    }

    fn load(&self) -> f64 {
        self.inner.load()
    }

    fn weight(&self) -> f64 {
        self.inner.weight() * self.health()
    }

    fn close(&self) {
        self.inner.close();
    }
}
