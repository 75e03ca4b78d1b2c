//! Context descriptors and endpoint address validation.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport used to reach a container-engine endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Local stream socket (`unix:///path/to/socket`).
    Socket,
    /// TCP endpoint (`tcp://host:port`).
    Tcp,
}

/// A named, addressable container-engine endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDescriptor {
    /// Unique context name.
    pub name: String,
    /// Transport kind for `host`.
    #[serde(rename = "type")]
    pub transport: TransportKind,
    /// Endpoint address, e.g. `tcp://10.0.0.5:2375` or `unix:///var/run/docker.sock`.
    pub host: String,
    /// Whether this is the current context.
    #[serde(default)]
    pub current: bool,
}

impl ContextDescriptor {
    /// Create a descriptor with `current` unset.
    #[must_use]
    pub fn new(name: impl Into<String>, transport: TransportKind, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport,
            host: host.into(),
            current: false,
        }
    }

    /// Parse and validate the endpoint address for this descriptor.
    ///
    /// # Errors
    /// Returns an error if `host` is empty or not syntactically valid
    /// for the descriptor's transport kind.
    pub fn address(&self) -> Result<EndpointAddr, AddressError> {
        EndpointAddr::parse(self.transport, &self.host)
    }
}

/// Address validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("empty endpoint address")]
    Empty,
    #[error("address {address:?} must start with {scheme:?}")]
    WrongScheme { address: String, scheme: &'static str },
    #[error("invalid port in {0:?}")]
    InvalidPort(String),
    #[error("missing host in {0:?}")]
    MissingHost(String),
    #[error("socket path in {0:?} must be absolute")]
    RelativeSocketPath(String),
}

/// Default engine port when a TCP address omits one.
const DEFAULT_TCP_PORT: u16 = 2375;

/// A syntactically validated endpoint address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointAddr {
    /// TCP endpoint.
    Tcp { host: String, port: u16 },
    /// Unix stream socket.
    Unix { path: PathBuf },
}

impl EndpointAddr {
    /// Parse an address string according to its transport kind.
    ///
    /// TCP addresses look like `tcp://host:port`; the port defaults to
    /// 2375 when omitted. Socket addresses look like `unix:///abs/path`.
    ///
    /// # Errors
    /// Returns an error when the scheme does not match the transport
    /// kind or the remainder is malformed.
    pub fn parse(transport: TransportKind, address: &str) -> Result<Self, AddressError> {
        if address.is_empty() {
            return Err(AddressError::Empty);
        }
        match transport {
            TransportKind::Tcp => {
                let rest = address
                    .strip_prefix("tcp://")
                    .ok_or_else(|| AddressError::WrongScheme {
                        address: address.to_string(),
                        scheme: "tcp://",
                    })?;
                let (host, port) = match rest.rsplit_once(':') {
                    Some((host, port)) => {
                        let port = port
                            .parse::<u16>()
                            .map_err(|_| AddressError::InvalidPort(address.to_string()))?;
                        (host, port)
                    }
                    None => (rest, DEFAULT_TCP_PORT),
                };
                if host.is_empty() {
                    return Err(AddressError::MissingHost(address.to_string()));
                }
                Ok(Self::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            TransportKind::Socket => {
                let path = address
                    .strip_prefix("unix://")
                    .ok_or_else(|| AddressError::WrongScheme {
                        address: address.to_string(),
                        scheme: "unix://",
                    })?;
                if !path.starts_with('/') {
                    return Err(AddressError::RelativeSocketPath(address.to_string()));
                }
                Ok(Self::Unix {
                    path: PathBuf::from(path),
                })
            }
        }
    }
}

impl fmt::Display for EndpointAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Self::Unix { path } => write!(f, "unix://{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_address() {
        let addr = EndpointAddr::parse(TransportKind::Tcp, "tcp://10.0.0.5:2375").unwrap();
        assert_eq!(
            addr,
            EndpointAddr::Tcp {
                host: "10.0.0.5".to_string(),
                port: 2375
            }
        );
    }

    #[test]
    fn tcp_port_defaults_when_omitted() {
        let addr = EndpointAddr::parse(TransportKind::Tcp, "tcp://example.com").unwrap();
        assert_eq!(
            addr,
            EndpointAddr::Tcp {
                host: "example.com".to_string(),
                port: 2375
            }
        );
    }

    #[test]
    fn rejects_bad_tcp_port() {
        let err = EndpointAddr::parse(TransportKind::Tcp, "tcp://host:notaport").unwrap_err();
        assert!(matches!(err, AddressError::InvalidPort(_)));
    }

    #[test]
    fn rejects_scheme_mismatch() {
        let err = EndpointAddr::parse(TransportKind::Tcp, "unix:///var/run/x.sock").unwrap_err();
        assert!(matches!(err, AddressError::WrongScheme { .. }));
        let err = EndpointAddr::parse(TransportKind::Socket, "tcp://host:1").unwrap_err();
        assert!(matches!(err, AddressError::WrongScheme { .. }));
    }

    #[test]
    fn parses_socket_address() {
        let addr =
            EndpointAddr::parse(TransportKind::Socket, "unix:///var/run/docker.sock").unwrap();
        assert_eq!(
            addr,
            EndpointAddr::Unix {
                path: PathBuf::from("/var/run/docker.sock")
            }
        );
    }

    #[test]
    fn rejects_relative_socket_path() {
        let err = EndpointAddr::parse(TransportKind::Socket, "unix://tmp/x.sock").unwrap_err();
        assert!(matches!(err, AddressError::RelativeSocketPath(_)));
    }

    #[test]
    fn rejects_empty_address() {
        let err = EndpointAddr::parse(TransportKind::Tcp, "").unwrap_err();
        assert_eq!(err, AddressError::Empty);
    }

    #[test]
    fn transport_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&TransportKind::Socket).unwrap(),
            "\"socket\""
        );
        assert_eq!(serde_json::to_string(&TransportKind::Tcp).unwrap(), "\"tcp\"");
    }

    #[test]
    fn descriptor_validates_through_address() {
        let desc = ContextDescriptor::new("prod", TransportKind::Tcp, "tcp://10.0.0.5:2375");
        assert!(desc.address().is_ok());
        let bad = ContextDescriptor::new("prod", TransportKind::Tcp, "");
        assert!(bad.address().is_err());
    }
}
