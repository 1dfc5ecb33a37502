//! Domain Entities - Core business objects
//!
//! Hosts are the unit the whole client is organised around: one pool and
//! one broker chain per host.

use crate::domain::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A remote `host:port` endpoint speaking the configured codec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    /// Hostname or IP literal (IPv6 literals keep their brackets)
    pub name: String,
    /// TCP port
    pub port: u16,
}

impl Host {
    /// Create a host from its parts.
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }

    /// Address string suitable for `TcpStream::connect` / DNS lookup.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.name, self.port)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}

impl FromStr for Host {
    type Err = ConfigError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidHost {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let (name, port) = entry.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
        if name.is_empty() {
            return Err(invalid("missing hostname"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("bad port"))?;
        if port == 0 {
            return Err(invalid("bad port"));
        }

        Ok(Host::new(name, port))
    }
}

/// Hosts as supplied to the builder: either a delimiter-separated string
/// that is parsed at build time, or an already structured list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostList {
    Raw(String),
    Resolved(Vec<Host>),
}

impl HostList {
    /// Parse into concrete hosts. Entries are separated by spaces and/or
    /// commas; empty entries are skipped. Duplicates keep their first
    /// position.
    pub fn resolve(&self) -> Result<Vec<Host>, ConfigError> {
        let hosts = match self {
            HostList::Raw(raw) => raw
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|entry| !entry.is_empty())
                .map(str::parse)
                .collect::<Result<Vec<Host>, _>>()?,
            HostList::Resolved(hosts) => hosts.clone(),
        };

        let mut unique: Vec<Host> = Vec::with_capacity(hosts.len());
        for host in hosts {
            if !unique.contains(&host) {
                unique.push(host);
            }
        }

        if unique.is_empty() {
            return Err(ConfigError::MissingHosts);
        }
        Ok(unique)
    }
}

impl From<&str> for HostList {
    fn from(raw: &str) -> Self {
        HostList::Raw(raw.to_string())
    }
}

impl From<String> for HostList {
    fn from(raw: String) -> Self {
        HostList::Raw(raw)
    }
}

impl From<Vec<Host>> for HostList {
    fn from(hosts: Vec<Host>) -> Self {
        HostList::Resolved(hosts)
    }
}
