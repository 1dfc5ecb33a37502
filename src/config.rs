//! Client Configuration
//!
//! `ClientConfig` is a plain immutable value. Every setter consumes the
//! config and returns a new one, so partially built configs can be shared
//! and reused freely. Nothing is checked until [`ClientConfig::validate`].

use crate::adapters::outbound::{Codec, TransportOptions};
use crate::domain::entities::{Host, HostList};
use crate::domain::errors::ConfigError;
use crate::domain::value_objects::SampleWindow;
use crate::infrastructure::{FailureAccrualConfig, PoolConfig, DEFAULT_FAILURE_THRESHOLD};
use anyhow::Context;
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientConfig {
    pub hosts: Option<HostList>,
    pub codec: Option<String>,
    /// Prefix for every exported metric path
    pub name: Option<String>,
    pub connection_timeout: Option<Duration>,
    pub request_timeout: Option<Duration>,
    pub sample_window: Duration,
    pub sample_granularity: Duration,
    pub failure_accrual_window: Duration,
    /// Failure ratio at which a host's weight reaches zero
    pub failure_threshold: f64,
    pub host_connection_limit: Option<usize>,
    /// How long a request may queue for a connection; defaults to the
    /// connection timeout
    pub pool_acquire_timeout: Option<Duration>,
    /// Close idle connections older than this
    pub pool_idle_timeout: Option<Duration>,
    pub send_buffer_size: Option<u32>,
    pub recv_buffer_size: Option<u32>,
    /// Register load and weight gauges per host
    pub export_loads: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hosts: None,
            codec: None,
            name: None,
            connection_timeout: None,
            request_timeout: None,
            sample_window: Duration::from_secs(10 * 60),
            sample_granularity: Duration::from_secs(10),
            failure_accrual_window: Duration::from_secs(10),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            host_connection_limit: None,
            pool_acquire_timeout: None,
            pool_idle_timeout: None,
            send_buffer_size: None,
            recv_buffer_size: None,
            export_loads: false,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hosts as a space/comma separated `host:port` string or a list.
    pub fn hosts(mut self, hosts: impl Into<HostList>) -> Self {
        self.hosts = Some(hosts.into());
        self
    }

    /// Codec name: `http`, or `framed` (alias `thrift`).
    pub fn codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn sample_window(mut self, window: Duration) -> Self {
        self.sample_window = window;
        self
    }

    pub fn sample_granularity(mut self, granularity: Duration) -> Self {
        self.sample_granularity = granularity;
        self
    }

    pub fn failure_accrual_window(mut self, window: Duration) -> Self {
        self.failure_accrual_window = window;
        self
    }

    pub fn failure_threshold(mut self, threshold: f64) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn host_connection_limit(mut self, limit: usize) -> Self {
        self.host_connection_limit = Some(limit);
        self
    }

    pub fn pool_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.pool_acquire_timeout = Some(timeout);
        self
    }

    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    pub fn send_buffer_size(mut self, size: u32) -> Self {
        self.send_buffer_size = Some(size);
        self
    }

    pub fn recv_buffer_size(mut self, size: u32) -> Self {
        self.recv_buffer_size = Some(size);
        self
    }

    pub fn export_loads(mut self, export: bool) -> Self {
        self.export_loads = export;
        self
    }

    /// Check every setting and resolve it into the types the pipeline
    /// consumes. Performs no I/O.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        let hosts = self.hosts.as_ref().ok_or(ConfigError::MissingHosts)?;
        let codec = self.codec.as_deref().ok_or(ConfigError::MissingCodec)?;
        let codec: Codec = codec.parse()?;
        let hosts = hosts.resolve()?;

        let sample_window = SampleWindow::new("sample", self.sample_window, self.sample_granularity)?;

        let failure_accrual = FailureAccrualConfig {
            window: self.failure_accrual_window,
            threshold: self.failure_threshold,
        };
        failure_accrual.sample_window()?;

        if self.host_connection_limit == Some(0) {
            return Err(ConfigError::InvalidConnectionLimit);
        }

        Ok(ValidatedConfig {
            hosts,
            codec,
            name: self.name.clone().filter(|n| !n.is_empty()),
            request_timeout: self.request_timeout,
            sample_window,
            failure_accrual,
            pool: PoolConfig {
                max_connections: self.host_connection_limit,
                acquire_timeout: self.pool_acquire_timeout.or(self.connection_timeout),
                idle_timeout: self.pool_idle_timeout,
            },
            transport: TransportOptions {
                connect_timeout: self.connection_timeout,
                send_buffer_size: self.send_buffer_size,
                recv_buffer_size: self.recv_buffer_size,
            },
            export_loads: self.export_loads,
        })
    }
}

/// A configuration that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    pub hosts: Vec<Host>,
    pub codec: Codec,
    pub name: Option<String>,
    pub request_timeout: Option<Duration>,
    pub sample_window: SampleWindow,
    pub failure_accrual: FailureAccrualConfig,
    pub pool: PoolConfig,
    pub transport: TransportOptions,
    pub export_loads: bool,
}

/// Parse a human-readable duration such as `250ms`, `10s`, `10m`, `1h` or
/// `1h 30m`.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim())
        .map_err(|_| ConfigError::InvalidDuration(raw.to_string()))
}

/// Build a config from `RPC_BROKER_*` environment variables.
pub fn load_config() -> anyhow::Result<ClientConfig> {
    config_from(|key| std::env::var(key).ok())
}

/// Build a config from any key lookup; unset keys keep their defaults.
pub fn config_from<F>(lookup: F) -> anyhow::Result<ClientConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let duration = |key: &str| -> anyhow::Result<Option<Duration>> {
        lookup(key)
            .map(|v| parse_duration(&v).with_context(|| format!("invalid {key}")))
            .transpose()
    };
    let number = |key: &str| parse_env::<u64>(&lookup, key);

    let mut cfg = ClientConfig::default();

    if let Some(hosts) = lookup("RPC_BROKER_HOSTS") {
        cfg = cfg.hosts(hosts);
    }
    if let Some(codec) = lookup("RPC_BROKER_CODEC") {
        cfg = cfg.codec(codec);
    }
    if let Some(name) = lookup("RPC_BROKER_NAME") {
        cfg = cfg.name(name);
    }
    if let Some(t) = duration("RPC_BROKER_CONNECTION_TIMEOUT")? {
        cfg = cfg.connection_timeout(t);
    }
    if let Some(t) = duration("RPC_BROKER_REQUEST_TIMEOUT")? {
        cfg = cfg.request_timeout(t);
    }
    if let Some(w) = duration("RPC_BROKER_SAMPLE_WINDOW")? {
        cfg = cfg.sample_window(w);
    }
    if let Some(g) = duration("RPC_BROKER_SAMPLE_GRANULARITY")? {
        cfg = cfg.sample_granularity(g);
    }
    if let Some(w) = duration("RPC_BROKER_FAILURE_ACCRUAL_WINDOW")? {
        cfg = cfg.failure_accrual_window(w);
    }
    if let Some(threshold) = parse_env::<f64>(&lookup, "RPC_BROKER_FAILURE_THRESHOLD")? {
        cfg = cfg.failure_threshold(threshold);
    }
    if let Some(limit) = number("RPC_BROKER_HOST_CONNECTION_LIMIT")? {
        cfg = cfg.host_connection_limit(limit as usize);
    }
    if let Some(t) = duration("RPC_BROKER_POOL_ACQUIRE_TIMEOUT")? {
        cfg = cfg.pool_acquire_timeout(t);
    }
    if let Some(t) = duration("RPC_BROKER_POOL_IDLE_TIMEOUT")? {
        cfg = cfg.pool_idle_timeout(t);
    }
    if let Some(size) = parse_env::<u32>(&lookup, "RPC_BROKER_SEND_BUFFER_SIZE")? {
        cfg = cfg.send_buffer_size(size);
    }
    if let Some(size) = parse_env::<u32>(&lookup, "RPC_BROKER_RECV_BUFFER_SIZE")? {
        cfg = cfg.recv_buffer_size(size);
    }

    let export_loads = lookup("RPC_BROKER_EXPORT_LOADS")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false);

    Ok(cfg.export_loads(export_loads))
}

/// Read and parse one environment variable; unset is `Ok(None)`, a
/// malformed value is an error naming the key.
pub fn read_env<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_env(&|k: &str| std::env::var(k).ok(), key)
}

fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|v| v.trim().parse::<T>().with_context(|| format!("invalid {key}: {v}")))
        .transpose()
}
