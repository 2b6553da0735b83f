//! Length-prefixed framing for the reliable stream
//!
//! Format: [4 bytes little-endian length][payload]. Datagrams carry a bare
//! payload and are limited to one network packet.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::game::constants::net::{MAX_DATAGRAM_SIZE, MAX_MESSAGE_SIZE};

/// Errors that can occur during message framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {0} bytes (max {1})")]
    MessageTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn map_eof(e: io::Error) -> FramingError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        FramingError::ConnectionClosed
    } else {
        FramingError::Io(e)
    }
}

/// Read one framed message
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>, FramingError> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.map_err(map_eof)?;

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(len, MAX_MESSAGE_SIZE));
    }
    if len == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.map_err(map_eof)?;
    Ok(buf)
}

/// Prefix `payload` with its length in a single buffer
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FramingError> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(payload.len(), MAX_MESSAGE_SIZE));
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Write one framed message and flush
pub async fn write_message<W: AsyncWrite + Unpin>(stream: &mut W, payload: &[u8]) -> Result<(), FramingError> {
    let frame = encode_frame(payload)?;
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Largest datagram payload usable on a connection. `path_limit` is what
/// the transport reports; `None` means datagrams are unsupported.
pub fn datagram_limit(path_limit: Option<usize>) -> usize {
    path_limit.map_or(0, |limit| limit.min(MAX_DATAGRAM_SIZE))
}

/// Validate an incoming datagram
pub fn validate_datagram_size(data: &[u8]) -> Result<(), FramingError> {
    if data.len() > MAX_DATAGRAM_SIZE {
        Err(FramingError::MessageTooLarge(data.len(), MAX_DATAGRAM_SIZE))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_write_then_read() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_message(&mut client, b"hello").await.unwrap();
        write_message(&mut client, b"").await.unwrap();
        assert_eq!(read_message(&mut server).await.unwrap(), b"hello");
        assert!(read_message(&mut server).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let mut mock = tokio_test::io::Builder::new()
            .read(&[5, 0])
            .read(&[0, 0, b'h', b'e'])
            .read(b"llo")
            .build();
        assert_eq!(read_message(&mut mock).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_write_is_single_frame() {
        let mut mock = tokio_test::io::Builder::new()
            .write(&[2, 0, 0, 0, 0xAB, 0xCD])
            .build();
        write_message(&mut mock, &[0xAB, 0xCD]).await.unwrap();
    }

    #[test]
    fn test_encode_frame_prefix() {
        let frame = encode_frame(&[9, 8, 7]).unwrap();
        assert_eq!(frame, vec![3, 0, 0, 0, 9, 8, 7]);
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let mut data = ((MAX_MESSAGE_SIZE + 1) as u32).to_le_bytes().to_vec();
        data.extend_from_slice(&[0; 8]);
        let mut cursor = Cursor::new(data);
        let result = read_message(&mut cursor).await;
        assert!(matches!(result, Err(FramingError::MessageTooLarge(_, _))));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_closed() {
        let mut data = 10u32.to_le_bytes().to_vec();
        data.extend_from_slice(&[1, 2, 3]);
        let mut cursor = Cursor::new(data);
        let result = read_message(&mut cursor).await;
        assert!(matches!(result, Err(FramingError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_empty_stream_is_closed() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(matches!(
            read_message(&mut cursor).await,
            Err(FramingError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_encode_rejects_oversized() {
        let big = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert!(encode_frame(&big).is_err());
    }

    #[test]
    fn test_datagram_limits() {
        assert_eq!(datagram_limit(None), 0);
        assert_eq!(datagram_limit(Some(500)), 500);
        assert_eq!(datagram_limit(Some(64_000)), MAX_DATAGRAM_SIZE);
        assert!(validate_datagram_size(&[0; 100]).is_ok());
        assert!(validate_datagram_size(&vec![0; MAX_DATAGRAM_SIZE + 1]).is_err());
    }
}
