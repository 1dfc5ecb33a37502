//! Transport Port
//!
//! Boundary to the wire: establishing connections to a host and running a
//! single request/reply exchange over one.

use crate::domain::entities::Host;
use crate::domain::errors::BrokerError;
use async_trait::async_trait;
use bytes::Bytes;

/// An established channel to one host.
///
/// A connection carries one exchange at a time; the pool guarantees that
/// by leasing it to a single request.
#[async_trait]
pub trait Connection: Send {
    /// Write `request` and read exactly one reply frame.
    async fn round_trip(&mut self, request: Bytes) -> Result<Bytes, BrokerError>;
}

/// Opens new connections on demand.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a fresh connection to `host`.
    async fn connect(&self, host: &Host) -> Result<Box<dyn Connection>, BrokerError>;
}
