//! Broker Port
//!
//! The capability every layer of the client implements: send a request,
//! get a reply later, and report derived load/weight.

use crate::domain::errors::BrokerError;
use async_trait::async_trait;
use bytes::Bytes;

/// Accepts a request and resolves to a reply or a failure.
///
/// Decorators implement this over the broker they wrap, so a chain
/// `pooled -> timeout -> stats -> failure accrual` is itself a `Broker`
/// and the balancer treats each per-host chain as an opaque one.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; a broker is shared by every
/// task issuing requests to its host.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Send one encoded request and wait for its encoded reply.
    async fn send(&self, request: Bytes) -> Result<Bytes, BrokerError>;

    /// Current demand/latency pressure. Diagnostic only.
    fn load(&self) -> f64;

    /// Current routing desirability, `>= 0`. Zero means "do not route here".
    fn weight(&self) -> f64;

    /// Release every resource held by this chain. Requests issued
    /// afterwards fail.
    fn close(&self) {}
}
