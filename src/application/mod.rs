//! Application Layer
//!
//! Composition of per-host broker chains into one load-balanced client.

pub mod client_builder;
pub mod load_balanced_broker;
pub mod pipeline;

pub use client_builder::ClientBuilder;
pub use load_balanced_broker::{HostSnapshot, LoadBalancedBroker};
pub use pipeline::{HostBroker, Pipeline};
