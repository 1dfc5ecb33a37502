//! Pooled Broker
//!
//! The innermost broker of every per-host chain: lease a connection, run
//! one exchange, give the connection back.

use crate::domain::errors::BrokerError;
use crate::domain::ports::Broker;
use crate::infrastructure::connection_pool::{ConnectionPool, PoolStats};
use async_trait::async_trait;
use bytes::Bytes;

pub struct PooledBroker {
    pool: ConnectionPool,
}

impl PooledBroker {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

#[async_trait]
impl Broker for PooledBroker {
    async fn send(&self, request: Bytes) -> Result<Bytes, BrokerError> {
        let mut conn = self.pool.acquire().await?;
        conn.round_trip(request).await
    }

    /// Connections currently leased.
    fn load(&self) -> f64 {
        self.pool.stats().leased as f64
    }

    fn weight(&self) -> f64 {
        1.0
    }

    fn close(&self) {
        self.pool.close();
    }
}
