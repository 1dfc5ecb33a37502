//! In-memory fakes for unit tests: a scripted connector and a scripted
//! broker.

use crate::domain::entities::Host;
use crate::domain::errors::BrokerError;
use crate::domain::ports::{Broker, Connection, Connector};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How fake connections answer.
#[derive(Debug, Clone, Copy)]
pub enum ReplyMode {
    Echo,
    Fail,
    Hang,
    Delay(Duration),
}

pub struct FakeConnector {
    mode: Mutex<ReplyMode>,
    fail_connects: AtomicBool,
    down_hosts: Mutex<Vec<String>>,
    connects: AtomicUsize,
    open: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new(mode: ReplyMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            fail_connects: AtomicBool::new(false),
            down_hosts: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_mode(&self, mode: ReplyMode) {
        *self.mode.lock() = mode;
    }

    pub fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Refuse connections to one host only.
    pub fn take_down(&self, host: &str) {
        self.down_hosts.lock().push(host.to_string());
    }

    pub fn bring_up(&self, host: &str) {
        self.down_hosts.lock().retain(|h| h != host);
    }

    /// Connections ever established.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Connections established and not yet dropped.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, host: &Host) -> Result<Box<dyn Connection>, BrokerError> {
        let host_down = self.down_hosts.lock().contains(&host.to_string());
        if host_down || self.fail_connects.load(Ordering::SeqCst) {
            return Err(BrokerError::connection(host, "connection refused"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            host: host.to_string(),
            mode: *self.mode.lock(),
            open: self.open.clone(),
        }))
    }
}

struct FakeConnection {
    host: String,
    mode: ReplyMode,
    open: Arc<AtomicUsize>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn round_trip(&mut self, request: Bytes) -> Result<Bytes, BrokerError> {
        match self.mode {
            ReplyMode::Echo => Ok(request),
            ReplyMode::Fail => Err(BrokerError::connection(&self.host, "connection reset")),
            ReplyMode::Hang => std::future::pending().await,
            ReplyMode::Delay(d) => {
                tokio::time::sleep(d).await;
                Ok(request)
            }
        }
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Broker answering from a script; echoes once the script runs out.
pub struct ScriptedBroker {
    script: Mutex<VecDeque<Result<Bytes, BrokerError>>>,
    delay: Mutex<Option<Duration>>,
    load: Mutex<f64>,
    weight: Mutex<f64>,
    sends: AtomicUsize,
    closed: AtomicBool,
}

impl ScriptedBroker {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            delay: Mutex::new(None),
            load: Mutex::new(0.0),
            weight: Mutex::new(1.0),
            sends: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn push(&self, outcome: Result<Bytes, BrokerError>) {
        self.script.lock().push_back(outcome);
    }

    pub fn fail_next(&self, n: usize) {
        for _ in 0..n {
            self.push(Err(BrokerError::connection("fake:1", "boom")));
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn set_load(&self, load: f64) {
        *self.load.lock() = load;
    }

    pub fn set_weight(&self, weight: f64) {
        *self.weight.lock() = weight;
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for ScriptedBroker {
    async fn send(&self, request: Bytes) -> Result<Bytes, BrokerError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or(Ok(request))
    }

    fn load(&self) -> f64 {
        *self.load.lock()
    }

    fn weight(&self) -> f64 {
        *self.weight.lock()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
