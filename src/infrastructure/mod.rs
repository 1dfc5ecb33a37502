//! Infrastructure Layer
//!
//! Concurrency-bearing machinery behind each per-host broker chain:
//! clocks, windowed sampling, connection pooling and the broker decorators.

pub mod clock;
pub mod connection_pool;
pub mod failure_accrual;
pub mod pooled_broker;
pub mod sample_repository;
pub mod stats_broker;
pub mod time_window;
pub mod timeout;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use connection_pool::{ConnectionPool, PoolConfig, PoolStats, PooledConnection};
pub use failure_accrual::{FailureAccrualBroker, FailureAccrualConfig, DEFAULT_FAILURE_THRESHOLD};
pub use pooled_broker::PooledBroker;
pub use sample_repository::{ObserverSet, SampleRepository};
pub use stats_broker::StatsBroker;
pub use time_window::{SampleSnapshot, TimeWindowedSample};
pub use timeout::TimeoutBroker;
