//! Error types for a proxy session.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::Reply;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed or unsupported handshake/request bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("short handshake")]
    ShortHandshake,

    #[error("unsupported version: 0x{0:02x}")]
    UnsupportedVersion(u8),

    #[error("method count mismatch: declared {declared}, got {actual}")]
    MethodCountMismatch { declared: usize, actual: usize },

    #[error("no acceptable method")]
    NoAcceptableMethod,

    #[error("short request")]
    ShortRequest,

    #[error("bad address type: 0x{0:02x}")]
    BadAddressType(u8),

    #[error("address length mismatch: expected {expected} bytes, got {actual}")]
    AddressLengthMismatch { expected: usize, actual: usize },

    #[error("invalid domain name")]
    InvalidDomain,
}

/// Blocking step of a session that can run into its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Handshake,
    Request,
    Resolve,
    Connect,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Handshake => write!(f, "handshake"),
            Stage::Request => write!(f, "request"),
            Stage::Resolve => write!(f, "resolve"),
            Stage::Connect => write!(f, "connect"),
        }
    }
}

/// Every way a session can terminate early.
#[derive(Error, Debug)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("unsupported command: 0x{0:02x}")]
    UnsupportedCommand(u8),

    #[error("failed to resolve {host}: {source}")]
    Resolution {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Dial {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },
}

impl Error {
    /// Failure reply owed to the client, if the protocol defines one.
    ///
    /// Handshake failures and transport errors have no request reply: the
    /// client never got that far, or the socket is already unusable.
    pub fn reply(&self) -> Option<Reply> {
        match self {
            Error::UnsupportedCommand(_) => Some(Reply::CommandNotSupported),
            Error::Protocol(ProtocolError::BadAddressType(_)) => {
                Some(Reply::AddressTypeNotSupported)
            }
            Error::Protocol(
                ProtocolError::ShortRequest
                | ProtocolError::AddressLengthMismatch { .. }
                | ProtocolError::InvalidDomain,
            ) => Some(Reply::GeneralFailure),
            Error::Resolution { .. } => Some(Reply::HostUnreachable),
            Error::Dial { source, .. } => Some(Reply::from_io_error(source)),
            Error::Timeout {
                stage: Stage::Resolve,
                ..
            } => Some(Reply::HostUnreachable),
            Error::Timeout {
                stage: Stage::Connect,
                ..
            } => Some(Reply::TtlExpired),
            _ => None,
        }
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::UnsupportedCommand(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::from(ProtocolError::ShortHandshake);
        assert_eq!(err.to_string(), "protocol error: short handshake");

        let err = Error::UnsupportedCommand(0x02);
        assert_eq!(err.to_string(), "unsupported command: 0x02");

        let err = Error::Timeout {
            stage: Stage::Connect,
            after: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "connect timed out after 5s");
    }

    #[test]
    fn test_error_reply() {
        assert_eq!(
            Error::UnsupportedCommand(0x03).reply(),
            Some(Reply::CommandNotSupported)
        );
        assert_eq!(
            Error::from(ProtocolError::BadAddressType(9)).reply(),
            Some(Reply::AddressTypeNotSupported)
        );
        assert_eq!(Error::from(ProtocolError::NoAcceptableMethod).reply(), None);

        let refused = Error::Dial {
            addr: "127.0.0.1:1".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(refused.reply(), Some(Reply::ConnectionRefused));
        assert!(!refused.is_protocol());

        let eof = Error::from(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert_eq!(eof.reply(), None);
    }

    #[test]
    fn test_timeout_reply_per_stage() {
        let timeout = |stage| Error::Timeout {
            stage,
            after: Duration::from_secs(5),
        };
        assert_eq!(timeout(Stage::Connect).reply(), Some(Reply::TtlExpired));
        assert_eq!(timeout(Stage::Resolve).reply(), Some(Reply::HostUnreachable));
        assert_eq!(timeout(Stage::Request).reply(), None);
        assert_eq!(timeout(Stage::Handshake).reply(), None);

        let unresolved = Error::Resolution {
            host: "example".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(unresolved.reply(), Some(Reply::HostUnreachable));
    }
}
