//! Error Types
//!
//! `ConfigError` is raised synchronously at build time. Every failure after
//! that travels through `Broker::send` as a `BrokerError`.

use std::time::Duration;

/// Failure of a single request somewhere in the broker chain.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BrokerError {
    /// Transport-level connect/write/read failure.
    #[error("connection error to {host}: {reason}")]
    Connection { host: String, reason: String },

    /// The request did not complete before its deadline.
    #[error("request timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// No connection became available within the pool's wait bound.
    #[error("connection pool for {host} exhausted after waiting {}ms", .waited.as_millis())]
    PoolExhausted { host: String, waited: Duration },

    /// The pool was shut down while the request was waiting or arriving.
    #[error("connection pool for {host} is closed")]
    PoolClosed { host: String },

    /// The peer sent bytes the codec could not frame.
    #[error("protocol error from {host}: {reason}")]
    Protocol { host: String, reason: String },

    /// The balancer has no hosts to route to.
    #[error("no hosts available")]
    NoHosts,
}

impl BrokerError {
    /// Build a connection error from any displayable cause.
    pub fn connection(host: impl ToString, reason: impl ToString) -> Self {
        Self::Connection {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Build a protocol error from any displayable cause.
    pub fn protocol(host: impl ToString, reason: impl ToString) -> Self {
        Self::Protocol {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the request exceeded its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if the failure came from the transport itself.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Protocol { .. })
    }

    /// Short, stable label used as a metric path segment.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Timeout { .. } => "timeout",
            Self::PoolExhausted { .. } => "pool_exhausted",
            Self::PoolClosed { .. } => "pool_closed",
            Self::Protocol { .. } => "protocol",
            Self::NoHosts => "no_hosts",
        }
    }
}

/// Build-time configuration failure. Raised by `ClientBuilder::build` before
/// any connection is opened.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("hosts are required")]
    MissingHosts,

    #[error("codec is required")]
    MissingCodec,

    #[error("unknown codec: {0}")]
    UnknownCodec(String),

    #[error("invalid host '{entry}': {reason}")]
    InvalidHost { entry: String, reason: String },

    #[error(
        "{name} window ({}ms) is smaller than its granularity ({}ms)",
        .window.as_millis(),
        .granularity.as_millis()
    )]
    WindowSmallerThanGranularity {
        name: &'static str,
        window: Duration,
        granularity: Duration,
    },

    #[error("{name} granularity must be greater than zero")]
    ZeroGranularity { name: &'static str },

    #[error("host connection limit must be greater than zero")]
    InvalidConnectionLimit,

    #[error("failure threshold must be in (0, 1], got {0}")]
    InvalidFailureThreshold(f64),

    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            BrokerError::connection("a:1", "refused").to_string(),
            "connection error to a:1: refused"
        );
        assert_eq!(
            BrokerError::Timeout {
                after: Duration::from_millis(250)
            }
            .to_string(),
            "request timed out after 250ms"
        );
        assert_eq!(BrokerError::NoHosts.to_string(), "no hosts available");
    }

    #[test]
    fn test_timeout_is_distinct_from_connection() {
        let timeout = BrokerError::Timeout {
            after: Duration::from_secs(1),
        };
        assert!(timeout.is_timeout());
        assert!(!timeout.is_connection());

        let conn = BrokerError::connection("a:1", "reset");
        assert!(conn.is_connection());
        assert!(!conn.is_timeout());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::WindowSmallerThanGranularity {
            name: "sample",
            window: Duration::from_secs(1),
            granularity: Duration::from_secs(10),
        };
        assert_eq!(
            err.to_string(),
            "sample window (1000ms) is smaller than its granularity (10000ms)"
        );
        assert_eq!(ConfigError::MissingCodec.to_string(), "codec is required");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(BrokerError::protocol("a:1", "bad frame").kind(), "protocol");
        assert_eq!(
            BrokerError::PoolClosed {
                host: "a:1".to_string()
            }
            .kind(),
            "pool_closed"
        );
    }
}
