//! Per-Host Pipeline
//!
//! Composes the broker chain for one host, innermost first:
//! pooled sender, timeout, stats, failure accrual.
//!
//! Composition is pure: building a chain allocates its pool and samples
//! but opens no connection. Connections appear on the first send.

use crate::config::ValidatedConfig;
use crate::domain::entities::Host;
use crate::domain::errors::ConfigError;
use crate::domain::ports::Connector;
use crate::infrastructure::{
    Clock, ConnectionPool, FailureAccrualBroker, PooledBroker, SampleRepository, StatsBroker,
    TimeoutBroker,
};
use std::sync::Arc;

/// The full chain serving one host.
pub type HostBroker = FailureAccrualBroker<StatsBroker<TimeoutBroker<PooledBroker>>>;

/// Factory of per-host chains sharing one connector, one stats repository
/// and one clock.
pub struct Pipeline {
    config: ValidatedConfig,
    connector: Arc<dyn Connector>,
    stats: Arc<SampleRepository>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    pub fn new(
        config: ValidatedConfig,
        connector: Arc<dyn Connector>,
        stats: Arc<SampleRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            connector,
            stats,
            clock,
        }
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<SampleRepository> {
        &self.stats
    }

    /// Build the chain for `host`.
    pub fn broker_for(&self, host: &Host) -> Result<HostBroker, ConfigError> {
        let pool = ConnectionPool::new(host.clone(), self.connector.clone(), self.config.pool);
        let pooled = PooledBroker::new(pool);
        let timed = TimeoutBroker::new(pooled, self.config.request_timeout);
        let stats = StatsBroker::new(timed, host, self.stats.clone(), self.config.name.as_deref());
        FailureAccrualBroker::new(stats, host, self.config.failure_accrual, self.clock.clone())
    }
}
