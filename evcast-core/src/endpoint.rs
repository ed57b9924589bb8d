//! Endpoint abstraction for transport-agnostic event addressing.
//!
//! Provides unified addressing for UDP multicast groups and in-process
//! groups with parsing support.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

/// Default multicast group.
pub const DEFAULT_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 1, 1, 11);

/// Default multicast port.
pub const DEFAULT_PORT: u16 = 9191;

/// Transport endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// UDP multicast group: `udp://224.1.1.11:9191`
    Udp(SocketAddrV4),
    /// In-process group: `inproc://name`
    Inproc(String),
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Udp(SocketAddrV4::new(DEFAULT_MULTICAST_ADDR, DEFAULT_PORT))
    }
}

impl Endpoint {
    /// Parse an endpoint from a string.
    ///
    /// Supported formats:
    /// - `udp://224.1.1.11:9191` (IPv4 multicast group and port)
    /// - `inproc://name`
    ///
    /// # Examples
    ///
    /// ```
    /// use evcast_core::endpoint::Endpoint;
    ///
    /// let endpoint = Endpoint::parse("udp://224.1.1.11:9191").unwrap();
    /// assert!(matches!(endpoint, Endpoint::Udp(_)));
    ///
    /// let endpoint = Endpoint::parse("inproc://audit").unwrap();
    /// assert!(matches!(endpoint, Endpoint::Inproc(_)));
    /// ```
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        s.parse()
    }

    /// Multicast group endpoint from address and port.
    pub fn multicast(group: Ipv4Addr, port: u16) -> Result<Self, EndpointError> {
        if !group.is_multicast() {
            return Err(EndpointError::NotMulticast(group.to_string()));
        }
        Ok(Endpoint::Udp(SocketAddrV4::new(group, port)))
    }

    /// In-process endpoint by name.
    pub fn inproc(name: impl Into<String>) -> Result<Self, EndpointError> {
        let name = name.into();
        if name.is_empty() {
            return Err(EndpointError::InvalidInprocName(
                "inproc name cannot be empty".to_string(),
            ));
        }
        Ok(Endpoint::Inproc(name))
    }

    /// Returns true if this is a UDP endpoint.
    pub fn is_udp(&self) -> bool {
        matches!(self, Endpoint::Udp(_))
    }

    /// Returns true if this is an inproc endpoint.
    pub fn is_inproc(&self) -> bool {
        matches!(self, Endpoint::Inproc(_))
    }

    /// Group address for UDP endpoints.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Endpoint::Udp(addr) => Some(SocketAddr::V4(*addr)),
            Endpoint::Inproc(_) => None,
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("udp://") {
            let socket_addr = addr
                .parse::<SocketAddrV4>()
                .map_err(|_| EndpointError::InvalidAddress(addr.to_string()))?;
            Endpoint::multicast(*socket_addr.ip(), socket_addr.port())
        } else if let Some(name) = s.strip_prefix("inproc://") {
            Endpoint::inproc(name)
        } else {
            Err(EndpointError::InvalidScheme(s.to_string()))
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Udp(addr) => write!(f, "udp://{}", addr),
            Endpoint::Inproc(name) => write!(f, "inproc://{}", name),
        }
    }
}

/// Errors that can occur when parsing or using endpoints.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Invalid scheme in endpoint: {0} (expected udp:// or inproc://)")]
    InvalidScheme(String),

    #[error("Invalid UDP address: {0}")]
    InvalidAddress(String),

    #[error("Not an IPv4 multicast address: {0}")]
    NotMulticast(String),

    #[error("Invalid inproc name: {0}")]
    InvalidInprocName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_udp() {
        let endpoint = Endpoint::parse("udp://224.1.1.11:9191").unwrap();
        assert!(endpoint.is_udp());
        assert_eq!(endpoint.to_string(), "udp://224.1.1.11:9191");
        assert_eq!(endpoint, Endpoint::default());
    }

    #[test]
    fn test_unicast_rejected() {
        let result = Endpoint::parse("udp://127.0.0.1:9191");
        assert!(matches!(result, Err(EndpointError::NotMulticast(_))));
    }

    #[test]
    fn test_invalid_scheme() {
        let result = Endpoint::parse("tcp://224.1.1.11:9191");
        assert!(matches!(result, Err(EndpointError::InvalidScheme(_))));
    }

    #[test]
    fn test_invalid_udp_address() {
        let result = Endpoint::parse("udp://group:port");
        assert!(matches!(result, Err(EndpointError::InvalidAddress(_))));
    }

    #[test]
    fn test_parse_inproc() {
        let endpoint = Endpoint::parse("inproc://audit").unwrap();
        assert!(endpoint.is_inproc());
        assert_eq!(endpoint.socket_addr(), None);
        assert_eq!(endpoint.to_string(), "inproc://audit");
    }

    #[test]
    fn test_invalid_inproc_empty() {
        let result = Endpoint::parse("inproc://");
        assert!(matches!(result, Err(EndpointError::InvalidInprocName(_))));
    }
}
