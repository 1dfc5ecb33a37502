//! Stats-Loaded Broker
//!
//! Records every request's latency and outcome into a sample repository
//! and derives `load` from the recent mean latency.
//!
//! Paths written per request (each also under a host-suffixed variant,
//! e.g. `search.latency.db1:7070`):
//! - `[name] latency`: milliseconds from issue to reply or failure
//! - `[name] requests`: 1 per request
//! - `[name] failures`, `[name] failures.<kind>`: 1 per failed request

use crate::domain::entities::Host;
use crate::domain::errors::BrokerError;
use crate::domain::ports::Broker;
use crate::domain::value_objects::MetricPath;
use crate::infrastructure::sample_repository::SampleRepository;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::time::Instant;

struct StatPaths {
    latency: MetricPath,
    requests: MetricPath,
    failures: MetricPath,
}

impl StatPaths {
    fn new(name: Option<&str>) -> Self {
        Self {
            latency: MetricPath::prefixed(name, ["latency"]),
            requests: MetricPath::prefixed(name, ["requests"]),
            failures: MetricPath::prefixed(name, ["failures"]),
        }
    }

    fn for_host(&self, host: &str) -> Self {
        Self {
            latency: self.latency.child(host),
            requests: self.requests.child(host),
            failures: self.failures.child(host),
        }
    }
}

pub struct StatsBroker<B> {
    inner: B,
    repository: Arc<SampleRepository>,
    host: String,
    paths: StatPaths,
    host_paths: StatPaths,
}

impl<B: Broker> StatsBroker<B> {
    /// Wrap `inner`, recording under `name` (if any) into `repository`.
    pub fn new(inner: B, host: &Host, repository: Arc<SampleRepository>, name: Option<&str>) -> Self {
        let host = host.to_string();
        let paths = StatPaths::new(name);
        let host_paths = paths.for_host(&host);
        Self {
            inner,
            repository,
            host,
            paths,
            host_paths,
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Host-suffixed latency path that `load` is read from.
    pub fn latency_path(&self) -> &MetricPath {
        &self.host_paths.latency
    }

    fn record(&self, latency_ms: f64, error: Option<&BrokerError>) {
        for paths in [&self.paths, &self.host_paths] {
            self.repository.record(&paths.latency, latency_ms);
            self.repository.record(&paths.requests, 1.0);
            if error.is_some() {
                self.repository.record(&paths.failures, 1.0);
            }
        }

        // The host goes last: `failures.<kind>.<host>`
        if let Some(e) = error {
            let by_kind = self.paths.failures.child(e.kind());
            self.repository.record(&by_kind.child(&self.host), 1.0);
            self.repository.record(&by_kind, 1.0);
        }
    }
}

#[async_trait]
impl<B: Broker> Broker for StatsBroker<B> {
    async fn send(&self, request: Bytes) -> Result<Bytes, BrokerError> {
        let started = Instant::now();
        let result = self.inner.send(request).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;

        if let Err(e) = &result {
            tracing::debug!(host = %self.host, error = %e, "request failed");
        }
        self.record(latency_ms, result.as_ref().err());
        result
    }

    /// Mean latency in milliseconds over the sample window.
    fn load(&self) -> f64 {
        self.repository.snapshot(&self.host_paths.latency).mean()
    }

    fn weight(&self) -> f64 {
        self.inner.weight()
    }

    fn close(&self) {
        self.inner.close();
    }
}
