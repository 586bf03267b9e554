//! Controller endpoint addresses.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};
use std::str::FromStr;

use thiserror::Error;

/// Scheme accepted (and ignored) in front of an endpoint address.
const TCP_SCHEME: &str = "tcp://";

/// Error parsing an endpoint string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    /// Only `tcp://` endpoints are supported.
    #[error("unsupported endpoint scheme in '{0}'")]
    UnsupportedScheme(String),
    /// Address did not resolve to any socket address.
    #[error("cannot resolve endpoint '{0}'")]
    Unresolvable(String),
}

/// Address of the controller a driver connects to.
///
/// Parses `tcp://host:port` or bare `host:port`. Host names are resolved once,
/// at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    #[must_use]
    pub const fn new(addr: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(addr, port))
    }

    #[must_use]
    pub const fn new_v4(a: u8, b: u8, c: u8, d: u8, port: u16) -> Self {
        Self(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::new(a, b, c, d),
            port,
        )))
    }

    /// Creates a localhost endpoint on the given port.
    #[must_use]
    pub const fn localhost(port: u16) -> Self {
        Self::new_v4(127, 0, 0, 1, port)
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.0.port()
    }

    #[must_use]
    pub const fn as_socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr = match s.split_once("://") {
            None => s,
            Some(_) => s
                .strip_prefix(TCP_SCHEME)
                .ok_or_else(|| EndpointError::UnsupportedScheme(s.to_owned()))?,
        };
        if let Ok(sock) = addr.parse::<SocketAddr>() {
            return Ok(Self(sock));
        }
        addr.to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .map(Self)
            .ok_or_else(|| EndpointError::Unresolvable(s.to_owned()))
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(ep: Endpoint) -> Self {
        ep.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TCP_SCHEME}{}", self.0)
    }
}
