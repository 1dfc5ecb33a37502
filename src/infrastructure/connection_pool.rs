//! Connection Pool
//!
//! Bounds concurrent connections to one host and reuses them across
//! requests.
//!
//! Invariant: `idle + leased <= max_connections` whenever a limit is set.
//! A connection being established counts as leased. Callers beyond the
//! limit queue FIFO; a released connection (or, if it broke, its freed
//! slot) goes to the longest waiter before it is ever deemed idle.

use crate::domain::entities::Host;
use crate::domain::errors::BrokerError;
use crate::domain::ports::{Connection, Connector};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Connection pool configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum connections (idle + leased); `None` is unbounded
    pub max_connections: Option<usize>,
    /// How long a caller may queue for a connection; `None` waits forever
    pub acquire_timeout: Option<Duration>,
    /// Idle connections older than this are closed instead of reused
    pub idle_timeout: Option<Duration>,
}

/// An idle connection and when it was parked.
struct IdleConnection {
    conn: Box<dyn Connection>,
    since: Instant,
}

struct PoolState {
    idle: VecDeque<IdleConnection>,
    /// Connections handed out or being established
    leased: usize,
    waiters: VecDeque<oneshot::Sender<PooledConnection>>,
    closed: bool,
}

struct PoolShared {
    host: Host,
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    state: Mutex<PoolState>,
}

impl PoolShared {
    fn has_capacity(&self, state: &PoolState) -> bool {
        match self.config.max_connections {
            Some(limit) => state.idle.len() + state.leased < limit,
            None => true,
        }
    }

    /// Return a leased slot. A reusable connection goes to the next live
    /// waiter or back to the idle set; otherwise it is closed and its slot
    /// handed on (or freed).
    fn release(self: &Arc<Self>, conn: Option<Box<dyn Connection>>, reusable: bool) {
        let mut conn = if reusable {
            conn
        } else {
            if conn.is_some() {
                tracing::debug!(host = %self.host, "discarding connection");
            }
            None
        };

        let mut state = self.state.lock();
        if state.closed {
            state.leased = state.leased.saturating_sub(1);
            return;
        }

        while let Some(waiter) = state.waiters.pop_front() {
            let handoff = PooledConnection {
                pool: Some(self.clone()),
                conn: conn.take(),
                reusable: true,
            };
            match waiter.send(handoff) {
                // Slot ownership moves to the waiter; `leased` is unchanged
                Ok(()) => return,
                Err(mut returned) => conn = returned.disarm(),
            }
        }

        state.leased = state.leased.saturating_sub(1);
        if let Some(conn) = conn {
            state.idle.push_back(IdleConnection {
                conn,
                since: Instant::now(),
            });
        }
    }
}

/// A leased slot in a pool, usually holding a live connection.
///
/// Dropping it returns the slot. If an exchange was in flight or failed,
/// the connection is closed rather than reused, so a cancelled request
/// never leaks a lease nor recycles a half-read stream.
pub struct PooledConnection {
    pool: Option<Arc<PoolShared>>,
    conn: Option<Box<dyn Connection>>,
    reusable: bool,
}

impl PooledConnection {
    /// Run one request/reply exchange over the leased connection.
    pub async fn round_trip(&mut self, request: Bytes) -> Result<Bytes, BrokerError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(BrokerError::connection(self.host(), "no connection leased"));
        };

        self.reusable = false;
        let reply = conn.round_trip(request).await?;
        self.reusable = true;
        Ok(reply)
    }

    /// Close the connection instead of returning it to the idle set.
    pub fn discard(mut self) {
        self.reusable = false;
    }

    fn host(&self) -> String {
        self.pool
            .as_ref()
            .map(|p| p.host.to_string())
            .unwrap_or_default()
    }

    /// Take the parts out so that dropping `self` is a no-op.
    fn disarm(&mut self) -> Option<Box<dyn Connection>> {
        self.pool = None;
        self.conn.take()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            let reusable = self.reusable && self.conn.is_some();
            pool.release(self.conn.take(), reusable);
        }
    }
}

/// Per-host connection pool.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a pool. No connection is opened until the first acquire.
    pub fn new(host: Host, connector: Arc<dyn Connector>, config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                host,
                connector,
                config,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    leased: 0,
                    waiters: VecDeque::new(),
                    closed: false,
                }),
            }),
        }
    }

    pub fn host(&self) -> &Host {
        &self.shared.host
    }

    /// Lease a connection: reuse an idle one, open a new one while under
    /// the limit, or queue until one is released.
    pub async fn acquire(&self) -> Result<PooledConnection, BrokerError> {
        let started = Instant::now();

        let ticket = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(self.closed_error());
            }

            let mut reused = None;
            while let Some(idle) = state.idle.pop_front() {
                match self.shared.config.idle_timeout {
                    Some(limit) if idle.since.elapsed() > limit => {
                        tracing::debug!(host = %self.shared.host, "closing idle-expired connection");
                    }
                    _ => {
                        reused = Some(idle.conn);
                        break;
                    }
                }
            }

            state.waiters.retain(|w| !w.is_closed());

            if reused.is_some() || self.shared.has_capacity(&state) {
                state.leased += 1;
                Ticket::Ready(PooledConnection {
                    pool: Some(self.shared.clone()),
                    conn: reused,
                    reusable: true,
                })
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Ticket::Queued(rx)
            }
        };

        let mut lease = match ticket {
            Ticket::Ready(lease) => lease,
            Ticket::Queued(rx) => self.wait(rx, started).await?,
        };

        if lease.conn.is_none() {
            match self.shared.connector.connect(&self.shared.host).await {
                Ok(conn) => lease.conn = Some(conn),
                Err(e) => {
                    tracing::warn!(host = %self.shared.host, error = %e, "connect failed");
                    // `lease` drops here and frees its slot
                    return Err(e);
                }
            }
        }

        Ok(lease)
    }

    async fn wait(
        &self,
        mut rx: oneshot::Receiver<PooledConnection>,
        started: Instant,
    ) -> Result<PooledConnection, BrokerError> {
        let Some(limit) = self.shared.config.acquire_timeout else {
            return rx.await.map_err(|_| self.closed_error());
        };

        tokio::select! {
            handoff = &mut rx => handoff.map_err(|_| self.closed_error()),
            _ = tokio::time::sleep(limit) => {
                // A handoff may have raced the deadline; take it if so
                rx.close();
                match rx.try_recv() {
                    Ok(lease) => Ok(lease),
                    Err(_) => {
                        tracing::debug!(host = %self.shared.host, "gave up waiting for a connection");
                        Err(BrokerError::PoolExhausted {
                            host: self.shared.host.to_string(),
                            waited: started.elapsed(),
                        })
                    }
                }
            }
        }
    }

    /// Shut the pool down: close idle connections and fail every queued
    /// caller. Leased connections are closed as they come back.
    pub fn close(&self) {
        let (idle, waiters) = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            (
                std::mem::take(&mut state.idle),
                std::mem::take(&mut state.waiters),
            )
        };
        tracing::info!(
            host = %self.shared.host,
            idle = idle.len(),
            waiting = waiters.len(),
            "connection pool closed"
        );
        drop(idle);
        drop(waiters);
    }

    /// Point-in-time pool statistics.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            idle: state.idle.len(),
            leased: state.leased,
            waiting: state.waiters.iter().filter(|w| !w.is_closed()).count(),
        }
    }

    fn closed_error(&self) -> BrokerError {
        BrokerError::PoolClosed {
            host: self.shared.host.to_string(),
        }
    }
}

enum Ticket {
    Ready(PooledConnection),
    Queued(oneshot::Receiver<PooledConnection>),
}

/// Pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Connections parked and ready for reuse
    pub idle: usize,
    /// Connections handed out or being established
    pub leased: usize,
    /// Callers queued for a connection
    pub waiting: usize,
}
