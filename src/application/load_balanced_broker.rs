//! Load-Balanced Broker
//!
//! Routes each request to one per-host chain, chosen at random with
//! probability proportional to the chain's current weight. Zero-weight
//! hosts are skipped. When every host is at zero the request still goes
//! out, to a host picked uniformly, so traffic keeps probing for recovery.

use crate::domain::errors::BrokerError;
use crate::domain::ports::Broker;
use crate::domain::services::{Selection, WeightedSelector};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-host diagnostics row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostSnapshot {
    pub host: String,
    pub load: f64,
    pub weight: f64,
}

struct Member {
    host: String,
    broker: Arc<dyn Broker>,
}

enum Entropy {
    Thread,
    Seeded(Mutex<StdRng>),
}

impl Entropy {
    fn roll(&self) -> f64 {
        match self {
            Entropy::Thread => rand::thread_rng().gen::<f64>(),
            Entropy::Seeded(rng) => rng.lock().gen::<f64>(),
        }
    }
}

pub struct LoadBalancedBroker {
    members: Vec<Member>,
    entropy: Entropy,
    all_down: AtomicBool,
}

impl LoadBalancedBroker {
    /// Balance over `(host label, broker)` pairs; their order is kept.
    pub fn new(members: Vec<(String, Arc<dyn Broker>)>) -> Self {
        Self::with_entropy(members, Entropy::Thread)
    }

    /// Same as [`LoadBalancedBroker::new`] with a reproducible random
    /// sequence.
    pub fn with_seed(members: Vec<(String, Arc<dyn Broker>)>, seed: u64) -> Self {
        Self::with_entropy(members, Entropy::Seeded(Mutex::new(StdRng::seed_from_u64(seed))))
    }

    fn with_entropy(members: Vec<(String, Arc<dyn Broker>)>, entropy: Entropy) -> Self {
        Self {
            members: members
                .into_iter()
                .map(|(host, broker)| Member { host, broker })
                .collect(),
            entropy,
            all_down: AtomicBool::new(false),
        }
    }

    pub fn hosts(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.host.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Current load and weight of every host, in configuration order.
    pub fn snapshot(&self) -> Vec<HostSnapshot> {
        self.members
            .iter()
            .map(|m| HostSnapshot {
                host: m.host.clone(),
                load: m.broker.load(),
                weight: m.broker.weight(),
            })
            .collect()
    }

    fn select(&self) -> Option<&Member> {
        let weights: Vec<f64> = self.members.iter().map(|m| m.broker.weight()).collect();
        let selection = WeightedSelector::pick(&weights, self.entropy.roll())?;

        let fallback = selection.is_fallback();
        if self.all_down.swap(fallback, Ordering::Relaxed) != fallback {
            if fallback {
                tracing::warn!(hosts = self.members.len(), "all hosts have zero weight, routing uniformly");
            } else {
                tracing::info!("weighted routing restored");
            }
        }

        let member = &self.members[selection.index()];
        if let Selection::Fallback(_) = selection {
            tracing::debug!(host = %member.host, "probing zero-weight host");
        }
        Some(member)
    }
}

#[async_trait]
impl Broker for LoadBalancedBroker {
    async fn send(&self, request: Bytes) -> Result<Bytes, BrokerError> {
        let member = self.select().ok_or(BrokerError::NoHosts)?;
        member.broker.send(request).await
    }

    /// Mean load across hosts.
    fn load(&self) -> f64 {
        if self.members.is_empty() {
            return 0.0;
        }
        self.members.iter().map(|m| m.broker.load()).sum::<f64>() / self.members.len() as f64
    }

    /// Total routable weight.
    fn weight(&self) -> f64 {
        self.members
            .iter()
            .map(|m| m.broker.weight())
            .filter(|w| WeightedSelector::is_routable(*w))
            .sum()
    }

    fn close(&self) {
        for member in &self.members {
            member.broker.close();
        }
        tracing::info!(hosts = self.members.len(), "load-balanced broker closed");
    }
}
