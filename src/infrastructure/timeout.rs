//! Timeout Broker
//!
//! Bounds each send with a deadline that does not depend on the transport's
//! own timing. On expiry the inner future is dropped, which releases
//! whatever it had leased (see `PooledConnection`). Without a deadline the
//! broker is a pass-through.

use crate::domain::errors::BrokerError;
use crate::domain::ports::Broker;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

pub struct TimeoutBroker<B> {
    inner: B,
    timeout: Option<Duration>,
}

impl<B: Broker> TimeoutBroker<B> {
    pub fn new(inner: B, timeout: Option<Duration>) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: Broker> Broker for TimeoutBroker<B> {
    async fn send(&self, request: Bytes) -> Result<Bytes, BrokerError> {
        let Some(after) = self.timeout else {
            return self.inner.send(request).await;
        };
        match tokio::time::timeout(after, self.inner.send(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(after_ms = after.as_millis() as u64, "request timed out");
                Err(BrokerError::Timeout { after })
            }
        }
    }

    fn load(&self) -> f64 {
        self.inner.load()
    }

    fn weight(&self) -> f64 {
        self.inner.weight()
    }

    fn close(&self) {
        self.inner.close();
    }
}
