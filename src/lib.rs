//! rpc-broker
//!
//! Client-side RPC connection management: bounded per-host connection
//! pools, request timeouts, windowed latency and failure sampling, failure
//! accrual and weighted load balancing, composed into one logical client.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use adapters::outbound::{Codec, PrometheusExporter, TracingObserver};
pub use application::{ClientBuilder, HostSnapshot, LoadBalancedBroker};
pub use config::{load_config, ClientConfig};
pub use domain::entities::{Host, HostList};
pub use domain::errors::{BrokerError, ConfigError};
pub use domain::ports::{Broker, Connection, Connector, GaugeRegistry, SampleObserver};
pub use domain::value_objects::{MetricPath, SampleWindow};
