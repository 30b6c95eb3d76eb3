use std::fmt;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::consts::*;
use crate::error::{Error, ProtocolError, Result, Stage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    IpV4(Ipv4Addr),
    Domain(String),
    IpV6(Ipv6Addr),
}

/// A decoded CONNECT request.
///
/// A domain destination is kept here for diagnostics only; the session dials
/// the endpoint returned by [`ProxyRequest::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    pub version: u8,
    pub cmd: u8,
    pub reserved: u8,
    pub atyp: u8,
    pub address: Address,
    pub port: u16,
}

impl fmt::Display for ProxyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Address::IpV4(ip) => write!(f, "{}:{}", ip, self.port),
            Address::Domain(domain) => write!(f, "{}:{}", domain, self.port),
            Address::IpV6(ip) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}

pub fn command_name(cmd: u8) -> &'static str {
    match cmd {
        CMD_CONNECT => "CONNECT",
        CMD_BIND => "BIND",
        CMD_UDP_ASSOCIATE => "UDP ASSOCIATE",
        _ => "unknown",
    }
}

/// Checks the fixed part of a request header: VER and CMD.
fn check_header(buf: &[u8]) -> Result<()> {
    let version = buf[0];
    if version != SOCKS_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version).into());
    }

    let cmd = buf[1];
    if cmd != CMD_CONNECT {
        debug!("rejecting {} command (0x{:02x})", command_name(cmd), cmd);
        return Err(Error::UnsupportedCommand(cmd));
    }
    Ok(())
}

fn expect_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ProtocolError::AddressLengthMismatch { expected, actual }.into());
    }
    Ok(())
}

impl ProxyRequest {
    /// Decodes one complete request frame.
    ///
    /// For a domain destination the byte at offset 4 is not trusted as a
    /// length: the name is everything between offset 5 and the trailing port.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let n = buf.len();
        if n < REQUEST_MIN_LEN {
            return Err(ProtocolError::ShortRequest.into());
        }
        check_header(buf)?;

        let reserved = buf[2];
        let atyp = buf[3];

        let address = match atyp {
            ATYP_IPV4 => {
                expect_len(IPV4_REQUEST_LEN, n)?;
                Address::IpV4(Ipv4Addr::new(buf[4], buf[5], buf[6], buf[7]))
            }
            ATYP_DOMAIN => {
                let raw = &buf[5..n - 2];
                if raw.is_empty() {
                    return Err(ProtocolError::InvalidDomain.into());
                }
                let domain = std::str::from_utf8(raw).map_err(|_| ProtocolError::InvalidDomain)?;
                Address::Domain(domain.to_owned())
            }
            ATYP_IPV6 => {
                expect_len(IPV6_REQUEST_LEN, n)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[4..20]);
                Address::IpV6(Ipv6Addr::from(octets))
            }
            _ => return Err(ProtocolError::BadAddressType(atyp).into()),
        };

        let port = u16::from_be_bytes([buf[n - 2], buf[n - 1]]);

        Ok(ProxyRequest {
            version: buf[0],
            cmd: buf[1],
            reserved,
            atyp,
            address,
            port,
        })
    }

    /// Turns the destination into the one concrete endpoint the session may use.
    pub async fn resolve<R: Resolver>(&self, resolver: &R, deadline: Duration) -> Result<SocketAddr> {
        let ip = match &self.address {
            Address::IpV4(ip) => IpAddr::V4(*ip),
            Address::IpV6(ip) => IpAddr::V6(*ip),
            Address::Domain(domain) => match timeout(deadline, resolver.resolve(domain, self.port)).await {
                Err(_) => {
                    return Err(Error::Timeout {
                        stage: Stage::Resolve,
                        after: deadline,
                    });
                }
                Ok(Err(source)) => {
                    return Err(Error::Resolution {
                        host: domain.clone(),
                        source,
                    });
                }
                Ok(Ok(ip)) => {
                    trace!("resolved {} -> {}", domain, ip);
                    ip
                }
            },
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Parses a request frame, resolves its destination and prepares the success
/// reply. The reply must only be written once the outbound dial succeeded.
pub async fn decode<R: Resolver>(
    buf: &[u8],
    resolver: &R,
    deadline: Duration,
) -> Result<(ProxyRequest, SocketAddr, [u8; REPLY_LEN])> {
    let request = ProxyRequest::parse(buf)?;
    let endpoint = request.resolve(resolver, deadline).await?;
    Ok((request, endpoint, Reply::Succeeded.encode()))
}

/// Reads exactly one request frame off the stream.
///
/// The domain length byte is used for framing only; an unknown ATYP cannot be
/// framed and is reported once VER and CMD have been checked.
pub async fn read_request<S>(stream: &mut S) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut frame = vec![0u8; REQUEST_HEADER_LEN];
    stream.read_exact(&mut frame).await?;
    if frame[0] != SOCKS_VERSION {
        return Err(ProtocolError::UnsupportedVersion(frame[0]).into());
    }

    let remaining = match frame[3] {
        ATYP_IPV4 => 4 + 2,
        ATYP_IPV6 => 16 + 2,
        ATYP_DOMAIN => {
            let len = stream.read_u8().await?;
            frame.push(len);
            len as usize + 2
        }
        atyp => {
            check_header(&frame)?;
            return Err(ProtocolError::BadAddressType(atyp).into());
        }
    };

    let start = frame.len();
    frame.resize(start + remaining, 0);
    stream.read_exact(&mut frame[start..]).await?;
    Ok(frame)
}

/// Builds a CONNECT request for an IP endpoint.
pub fn encode_connect_request(endpoint: SocketAddr) -> Vec<u8> {
    let mut buf = vec![SOCKS_VERSION, CMD_CONNECT, RSV];
    match endpoint.ip() {
        IpAddr::V4(ip) => {
            buf.push(ATYP_IPV4);
            buf.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            buf.push(ATYP_IPV6);
            buf.extend_from_slice(&ip.octets());
        }
    }
    buf.extend_from_slice(&endpoint.port().to_be_bytes());
    buf
}

/// Name resolution used for domain destinations.
pub trait Resolver: Send + Sync {
    fn resolve(&self, host: &str, port: u16) -> impl Future<Output = io::Result<IpAddr>> + Send;
}

/// Resolves through the operating system via tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<IpAddr> {
        let mut addrs = tokio::net::lookup_host((host, port)).await?;
        addrs.next().map(|addr| addr.ip()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no address found for {}", host))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reply {
    Succeeded = REP_SUCCESS,
    GeneralFailure = REP_GENERAL_FAILURE,
    ConnectionNotAllowed = REP_CONNECTION_NOT_ALLOWED,
    NetworkUnreachable = REP_NETWORK_UNREACHABLE,
    HostUnreachable = REP_HOST_UNREACHABLE,
    ConnectionRefused = REP_CONNECTION_REFUSED,
    TtlExpired = REP_TTL_EXPIRED,
    CommandNotSupported = REP_COMMAND_NOT_SUPPORTED,
    AddressTypeNotSupported = REP_ADDRESS_TYPE_NOT_SUPPORTED,
}

impl Reply {
    /// Bound address is always reported as 0.0.0.0:0.
    pub fn encode(self) -> [u8; REPLY_LEN] {
        [SOCKS_VERSION, self as u8, RSV, ATYP_IPV4, 0, 0, 0, 0, 0, 0]
    }

    pub fn from_io_error(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Reply::ConnectionRefused,
            io::ErrorKind::TimedOut => Reply::NetworkUnreachable,
            io::ErrorKind::NetworkUnreachable => Reply::NetworkUnreachable,
            io::ErrorKind::PermissionDenied => Reply::ConnectionNotAllowed,
            _ => Reply::HostUnreachable,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Succeeded => write!(f, "succeeded"),
            Reply::GeneralFailure => write!(f, "general failure"),
            Reply::ConnectionNotAllowed => write!(f, "connection not allowed"),
            Reply::NetworkUnreachable => write!(f, "network unreachable"),
            Reply::HostUnreachable => write!(f, "host unreachable"),
            Reply::ConnectionRefused => write!(f, "connection refused"),
            Reply::TtlExpired => write!(f, "ttl expired"),
            Reply::CommandNotSupported => write!(f, "command not supported"),
            Reply::AddressTypeNotSupported => write!(f, "address type not supported"),
        }
    }
}
