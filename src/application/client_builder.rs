//! Client Builder
//!
//! Collects configuration and collaborators, validates everything, then
//! composes one broker chain per host behind a load balancer.
//!
//! # Example
//! ```ignore
//! let client = ClientBuilder::new()
//!     .hosts("db1:7070,db2:7070")
//!     .codec("framed")
//!     .request_timeout(Duration::from_millis(250))
//!     .host_connection_limit(8)
//!     .build()?;
//! let reply = client.send(request).await?;
//! ```

use crate::application::load_balanced_broker::LoadBalancedBroker;
use crate::application::pipeline::Pipeline;
use crate::config::ClientConfig;
use crate::domain::entities::HostList;
use crate::domain::errors::ConfigError;
use crate::domain::ports::{Broker, Connector, GaugeRegistry, SampleObserver};
use crate::domain::value_objects::MetricPath;
use crate::infrastructure::{Clock, ObserverSet, SampleRepository, SystemClock};
use std::sync::{Arc, Weak};
use std::time::Duration;

pub struct ClientBuilder {
    config: ClientConfig,
    observers: Vec<Arc<dyn SampleObserver>>,
    gauges: Option<Arc<dyn GaugeRegistry>>,
    connector: Option<Arc<dyn Connector>>,
    clock: Arc<dyn Clock>,
    seed: Option<u64>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::from_config(ClientConfig::default())
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration, e.g. one loaded from the
    /// environment.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            observers: Vec::new(),
            gauges: None,
            connector: None,
            clock: Arc::new(SystemClock),
            seed: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn with_config(mut self, f: impl FnOnce(ClientConfig) -> ClientConfig) -> Self {
        self.config = f(self.config);
        self
    }

    pub fn hosts(self, hosts: impl Into<HostList>) -> Self {
        self.with_config(|c| c.hosts(hosts))
    }

    pub fn codec(self, codec: impl Into<String>) -> Self {
        self.with_config(|c| c.codec(codec))
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        self.with_config(|c| c.name(name))
    }

    pub fn connection_timeout(self, timeout: Duration) -> Self {
        self.with_config(|c| c.connection_timeout(timeout))
    }

    pub fn request_timeout(self, timeout: Duration) -> Self {
        self.with_config(|c| c.request_timeout(timeout))
    }

    pub fn sample_window(self, window: Duration) -> Self {
        self.with_config(|c| c.sample_window(window))
    }

    pub fn sample_granularity(self, granularity: Duration) -> Self {
        self.with_config(|c| c.sample_granularity(granularity))
    }

    pub fn failure_accrual_window(self, window: Duration) -> Self {
        self.with_config(|c| c.failure_accrual_window(window))
    }

    pub fn failure_threshold(self, threshold: f64) -> Self {
        self.with_config(|c| c.failure_threshold(threshold))
    }

    pub fn host_connection_limit(self, limit: usize) -> Self {
        self.with_config(|c| c.host_connection_limit(limit))
    }

    pub fn pool_acquire_timeout(self, timeout: Duration) -> Self {
        self.with_config(|c| c.pool_acquire_timeout(timeout))
    }

    pub fn pool_idle_timeout(self, timeout: Duration) -> Self {
        self.with_config(|c| c.pool_idle_timeout(timeout))
    }

    pub fn send_buffer_size(self, size: u32) -> Self {
        self.with_config(|c| c.send_buffer_size(size))
    }

    pub fn recv_buffer_size(self, size: u32) -> Self {
        self.with_config(|c| c.recv_buffer_size(size))
    }

    /// Report every evicted sample bucket to `observer`.
    pub fn report_to(mut self, observer: Arc<dyn SampleObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Publish a load and a weight gauge per host to `registry`.
    pub fn export_loads_to(mut self, registry: Arc<dyn GaugeRegistry>) -> Self {
        self.gauges = Some(registry);
        self.with_config(|c| c.export_loads(true))
    }

    /// Replace the codec's TCP connector, e.g. with an in-memory one.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Make host selection reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate, then compose the client. Fails before any connection
    /// is opened.
    pub fn build(self) -> Result<LoadBalancedBroker, ConfigError> {
        let config = self.config.validate()?;

        let stats = if self.observers.is_empty() {
            SampleRepository::new(config.sample_window, self.clock.clone())
        } else {
            let observers = Arc::new(ObserverSet::new());
            for observer in self.observers {
                observers.add(observer);
            }
            SampleRepository::observed(config.sample_window, self.clock.clone(), observers)
        };

        let connector = self
            .connector
            .unwrap_or_else(|| config.codec.connector(config.transport));

        let gauges = match (&self.gauges, config.export_loads) {
            (Some(registry), true) => Some(registry.clone()),
            (None, true) => {
                tracing::warn!("load export requested without a gauge registry, skipping");
                None
            }
            _ => None,
        };

        let pipeline = Pipeline::new(config.clone(), connector, Arc::new(stats), self.clock);

        let mut members = Vec::with_capacity(config.hosts.len());
        for host in &config.hosts {
            let broker: Arc<dyn Broker> = Arc::new(pipeline.broker_for(host)?);
            let label = host.to_string();
            if let Some(registry) = &gauges {
                register_gauges(registry.as_ref(), config.name.as_deref(), &label, &broker);
            }
            members.push((label, broker));
        }

        tracing::info!(
            hosts = members.len(),
            codec = %config.codec,
            name = config.name.as_deref().unwrap_or(""),
            "client built"
        );

        Ok(match self.seed {
            Some(seed) => LoadBalancedBroker::with_seed(members, seed),
            None => LoadBalancedBroker::new(members),
        })
    }
}

/// Gauges hold the chain weakly so they never keep a closed client alive.
fn register_gauges(
    registry: &dyn GaugeRegistry,
    name: Option<&str>,
    host: &str,
    broker: &Arc<dyn Broker>,
) {
    let load: Weak<dyn Broker> = Arc::downgrade(broker);
    registry.register_gauge(
        MetricPath::prefixed(name, ["load", host]),
        Arc::new(move || load.upgrade().map(|b| b.load()).unwrap_or(0.0)),
    );

    let weight: Weak<dyn Broker> = Arc::downgrade(broker);
    registry.register_gauge(
        MetricPath::prefixed(name, ["weight", host]),
        Arc::new(move || weight.upgrade().map(|b| b.weight()).unwrap_or(0.0)),
    );
}
