use tokio::io::{AsyncRead, AsyncReadExt};

use crate::consts::*;
use crate::error::{self, ProtocolError};

/// Client version identifier / method selection message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSelection {
    pub version: u8,
    pub methods: Vec<u8>,
}

impl MethodSelection {
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < HANDSHAKE_MIN_LEN {
            return Err(ProtocolError::ShortHandshake);
        }

        let version = buf[0];
        if version != SOCKS_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        let declared = buf[1] as usize;
        if buf.len() != 2 + declared {
            return Err(ProtocolError::MethodCountMismatch {
                declared,
                actual: buf.len() - 2,
            });
        }

        Ok(MethodSelection {
            version,
            methods: buf[2..].to_vec(),
        })
    }

    /// Only "no authentication" is offered by this server.
    pub fn select(&self) -> Option<u8> {
        self.methods
            .iter()
            .copied()
            .find(|&method| method == METHOD_NO_AUTH)
    }
}

/// Parses a method selection message and returns the server's reply.
pub fn negotiate(buf: &[u8]) -> Result<[u8; 2], ProtocolError> {
    let selection = MethodSelection::parse(buf)?;
    match selection.select() {
        Some(method) => Ok([SOCKS_VERSION, method]),
        None => Err(ProtocolError::NoAcceptableMethod),
    }
}

/// Reply sent before closing when no offered method is acceptable.
pub const fn no_acceptable_reply() -> [u8; 2] {
    [SOCKS_VERSION, METHOD_NO_ACCEPTABLE]
}

/// Reads exactly one method selection frame: VER, NMETHODS and NMETHODS bytes.
///
/// A foreign VER is rejected before the method list is read. Everything
/// else is left to [`negotiate`], so a zero method count is returned as-is.
pub async fn read_method_selection<S>(stream: &mut S) -> error::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await?;
    if head[0] != SOCKS_VERSION {
        return Err(ProtocolError::UnsupportedVersion(head[0]).into());
    }

    let nmethods = head[1] as usize;
    let mut frame = Vec::with_capacity(2 + nmethods);
    frame.extend_from_slice(&head);
    frame.resize(2 + nmethods, 0);
    stream.read_exact(&mut frame[2..]).await?;

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_negotiate_no_auth() {
        assert_eq!(negotiate(&[5, 1, 0]).unwrap(), [5, 0]);
        assert_eq!(negotiate(&[5, 3, 2, 1, 0]).unwrap(), [5, 0]);
        assert_eq!(negotiate(&[5, 2, 0x80, 0]).unwrap(), [5, 0]);
    }

    #[test]
    fn test_negotiate_without_no_auth() {
        assert_eq!(negotiate(&[5, 1, 2]), Err(ProtocolError::NoAcceptableMethod));
        assert_eq!(
            negotiate(&[5, 3, 1, 2, 0xFF]),
            Err(ProtocolError::NoAcceptableMethod)
        );
    }

    #[test]
    fn test_negotiate_bad_input() {
        assert_eq!(negotiate(&[]), Err(ProtocolError::ShortHandshake));
        assert_eq!(negotiate(&[5]), Err(ProtocolError::ShortHandshake));
        // NMETHODS = 0 never reaches the method scan.
        assert_eq!(negotiate(&[5, 0]), Err(ProtocolError::ShortHandshake));
        assert_eq!(negotiate(&[4, 1, 0]), Err(ProtocolError::UnsupportedVersion(4)));
        assert_eq!(
            negotiate(&[5, 2, 0]),
            Err(ProtocolError::MethodCountMismatch {
                declared: 2,
                actual: 1
            })
        );
        assert_eq!(
            negotiate(&[5, 1, 0, 2]),
            Err(ProtocolError::MethodCountMismatch {
                declared: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn test_parse_keeps_method_order() {
        let selection = MethodSelection::parse(&[5, 3, 2, 0, 1]).unwrap();
        assert_eq!(selection.version, 5);
        assert_eq!(selection.methods, vec![2, 0, 1]);
        assert_eq!(selection.select(), Some(METHOD_NO_AUTH));
    }

    #[tokio::test]
    async fn test_read_method_selection_frames() {
        let (mut client, mut server) = tokio::io::duplex(64);
        // handshake and request pipelined in one write
        client.write_all(&[5, 2, 0, 2, 5, 1, 0]).await.unwrap();

        let frame = read_method_selection(&mut server).await.unwrap();
        assert_eq!(frame, vec![5, 2, 0, 2]);

        let mut rest = [0u8; 3];
        server.read_exact(&mut rest).await.unwrap();
        assert_eq!(rest, [5, 1, 0]);
    }

    #[tokio::test]
    async fn test_read_method_selection_zero_methods() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[5, 0]).await.unwrap();

        let frame = read_method_selection(&mut server).await.unwrap();
        assert_eq!(frame, vec![5, 0]);
        assert_eq!(negotiate(&frame), Err(ProtocolError::ShortHandshake));
    }

    #[tokio::test]
    async fn test_read_method_selection_eof() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[5, 3, 0]).await.unwrap();
        drop(client);

        let err = read_method_selection(&mut server).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof
        ));
    }

    #[tokio::test]
    async fn test_read_method_selection_rejects_version_early() {
        let (mut client, mut server) = tokio::io::duplex(64);
        // declares 9 methods but only sends one; the version alone decides
        client.write_all(&[4, 9, 0]).await.unwrap();

        let err = read_method_selection(&mut server).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::UnsupportedVersion(4))
        ));
        drop(client);
    }
}
