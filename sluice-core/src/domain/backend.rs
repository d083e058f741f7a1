//! Backend replica models.

use std::fmt;
use std::str::FromStr;

use crate::error::BackendParseError;

/// The port MySQL replicas listen on unless told otherwise.
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// The identifier of a traffic class in the routing store (e.g. the readers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostgroupId(pub u32);

impl fmt::Display for HostgroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single read replica, identified by its network address.
///
/// Backends are plain values: the set a controller manages is fixed at
/// construction, so there is no shared mutable state attached to them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Backend {
    /// The hostname or IP address of the replica
    pub host: String,
    /// The MySQL port of the replica
    pub port: u16,
}

impl Backend {
    /// Create a new backend from a host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The `host:port` form used to open TCP connections.
    pub fn connect_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.connect_addr())
    }
}

impl FromStr for Backend {
    type Err = BackendParseError;

    /// Parses `host`, `host:port`, `[v6]` or `[v6]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| BackendParseError::EmptyHost(s.to_string()))?;
            match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                None => return Err(BackendParseError::InvalidPort(s.to_string())),
            }
        } else {
            match s.split_once(':') {
                // A bare IPv6 address has several colons and no port
                Some((_, tail)) if tail.contains(':') => (s, None),
                Some((host, port)) => (host, Some(port)),
                None => (s, None),
            }
        };

        if host.is_empty() {
            return Err(BackendParseError::EmptyHost(s.to_string()));
        }

        let port = match port {
            Some(p) => p.parse().map_err(|_| BackendParseError::InvalidPort(s.to_string()))?,
            None => DEFAULT_MYSQL_PORT,
        };

        Ok(Self::new(host, port))
    }
}
