//! Wire framing for the reliable channel (spec.md §4.1).
//!
//! One byte of header, then either a 2-byte length-prefixed payload
//! (data, written by the writer side) or an 8-byte big-endian offset
//! (ack, written by the reader side). The header byte doubles as the
//! ack-request marker on the writer->reader direction.

use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, ErrorKind, Result};

const HEADER_DATA: u8 = 0;
const HEADER_ACK: u8 = 1;

/// Sentinel ack-response offset meaning "FIN acknowledged, reader closed".
pub const FIN_ACKED: u64 = u64::MAX;

/// A packet read off the wire, on the writer->reader direction.
pub enum Inbound {
    /// A data packet; zero length means FIN.
    Data(Vec<u8>),
    /// The peer is requesting our current absorbed offset.
    AckRequest,
}

/// Read one packet sent by a writer (data or ack-request).
pub async fn read_inbound<R: AsyncRead + Unpin>(reader: &mut R, max_len: u16) -> Result<Inbound> {
    let mut header = [0u8; 1];
    reader.read_exact(&mut header).await?;
    match header[0] {
        HEADER_ACK => Ok(Inbound::AckRequest),
        HEADER_DATA => {
            let mut len_buf = [0u8; 2];
            reader.read_exact(&mut len_buf).await?;
            let len = u16::from_be_bytes(len_buf);
            if len > max_len {
                return Err(Error::wrapped(
                    ErrorKind::Protocol,
                    format!("payload length {} exceeds configured size {}", len, max_len),
                ));
            }
            let mut payload = vec![0u8; len as usize];
            reader.read_exact(&mut payload).await?;
            Ok(Inbound::Data(payload))
        }
        other => Err(Error::wrapped(
            ErrorKind::Protocol,
            format!("unrecognized packet header byte: {}", other),
        )),
    }
}

/// Write a data packet (writer->reader). `payload.len() == 0` means FIN.
pub async fn write_data<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    debug_assert!(payload.len() <= u16::MAX as usize);
    let mut buf = Vec::with_capacity(3 + payload.len());
    buf.push(HEADER_DATA);
    buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    buf.extend_from_slice(payload);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Write an ack-request (writer->reader).
pub async fn write_ack_request<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<()> {
    writer.write_all(&[HEADER_ACK]).await?;
    writer.flush().await?;
    Ok(())
}

/// Write an ack-response (reader->writer): the reader's absorbed offset.
pub async fn write_ack_response<W: AsyncWrite + Unpin>(writer: &mut W, offset: u64) -> Result<()> {
    writer.write_all(&offset.to_be_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read an ack-response (reader->writer).
pub async fn read_ack_response<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf).await?;
    Ok(u64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;

    #[tokio::test]
    async fn round_trips_data_packet() {
        let mut buf = Vec::new();
        write_data(&mut buf, b"hello").await.unwrap();
        let mut cursor = Cursor::new(buf);
        match read_inbound(&mut cursor, 8192).await.unwrap() {
            Inbound::Data(p) => assert_eq!(p, b"hello"),
            _ => panic!("expected data packet"),
        }
    }

    #[tokio::test]
    async fn round_trips_fin() {
        let mut buf = Vec::new();
        write_data(&mut buf, b"").await.unwrap();
        let mut cursor = Cursor::new(buf);
        match read_inbound(&mut cursor, 8192).await.unwrap() {
            Inbound::Data(p) => assert!(p.is_empty()),
            _ => panic!("expected data packet"),
        }
    }

    #[tokio::test]
    async fn round_trips_ack_request() {
        let mut buf = Vec::new();
        write_ack_request(&mut buf).await.unwrap();
        let mut cursor = Cursor::new(buf);
        match read_inbound(&mut cursor, 8192).await.unwrap() {
            Inbound::AckRequest => {}
            _ => panic!("expected ack request"),
        }
    }

    #[tokio::test]
    async fn round_trips_ack_response() {
        let mut buf = Vec::new();
        write_ack_response(&mut buf, 424242).await.unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_ack_response(&mut cursor).await.unwrap(), 424242);
    }

    #[tokio::test]
    async fn fin_acked_sentinel_round_trips() {
        let mut buf = Vec::new();
        write_ack_response(&mut buf, FIN_ACKED).await.unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_ack_response(&mut cursor).await.unwrap(), u64::MAX);
    }

    #[tokio::test]
    async fn rejects_oversized_payload_length() {
        // handcraft a data header declaring a length above max_len
        let mut buf = Vec::new();
        buf.push(0u8);
        buf.extend_from_slice(&100u16.to_be_bytes());
        buf.extend_from_slice(&[0u8; 100]);
        let mut cursor = Cursor::new(buf);
        let err = read_inbound(&mut cursor, 50).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }
}
