//! The authentication handshake (spec.md §4.3): a single-shot,
//! constant-time secret-hash exchange with a timeout.

use std::time::Duration;

use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use subtle::ConstantTimeEq;

use crate::error::{Error, ErrorKind, Result};

/// `auth/1.0.0` protocol identifier.
pub const PROTOCOL_ID: &str = "/p2pxfer/auth/1.0.0";

/// Deadline for the sender-side read of the secret hash (spec.md §5).
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

pub fn protocol() -> libp2p::StreamProtocol {
    libp2p::StreamProtocol::new(PROTOCOL_ID)
}

/// Sender side (spec.md §4.3): reads exactly 32 bytes (the fixed length
/// of a BLAKE2b-256 digest), compares in constant time against
/// `secret_hash`, and writes a single result byte. Returns whether the
/// peer authenticated successfully; a read timeout is reported as an
/// `Authentication` error rather than a boolean failure, since no
/// result byte can be written back in that case.
pub async fn handle_authenticate<S>(stream: &mut S, secret_hash: &[u8; 32]) -> Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut received = [0u8; 32];
    match tokio::time::timeout(AUTH_TIMEOUT, stream.read_exact(&mut received)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(Error::from(e)),
        Err(_) => {
            return Err(Error::wrapped(
                ErrorKind::Authentication,
                "timed out waiting for secret hash",
            ))
        }
    }
    let success: bool = received.ct_eq(secret_hash).into();
    stream.write_all(&[success as u8]).await?;
    stream.flush().await?;
    Ok(success)
}

/// Receiver side (spec.md §4.3): writes the secret hash, reads a single
/// response byte (`0x01` success, anything else failure).
pub async fn authenticate<S>(stream: &mut S, secret_hash: &[u8; 32]) -> Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(secret_hash).await?;
    stream.flush().await?;
    let mut response = [0u8; 1];
    stream.read_exact(&mut response).await?;
    Ok(response[0] == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::compat::TokioAsyncReadCompatExt;

    #[tokio::test]
    async fn matching_secret_authenticates() {
        let (client, server) = tokio::io::duplex(64);
        let mut client = client.compat();
        let mut server = server.compat();
        let hash = [7u8; 32];

        let server_task = tokio::spawn(async move { handle_authenticate(&mut server, &hash).await });
        let ok = authenticate(&mut client, &hash).await.unwrap();
        assert!(ok);
        assert!(server_task.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn mismatched_secret_fails_both_sides() {
        let (client, server) = tokio::io::duplex(64);
        let mut client = client.compat();
        let mut server = server.compat();
        let hash = [7u8; 32];
        let wrong = [8u8; 32];

        let server_task = tokio::spawn(async move { handle_authenticate(&mut server, &hash).await });
        let ok = authenticate(&mut client, &wrong).await.unwrap();
        assert!(!ok);
        assert!(!server_task.await.unwrap().unwrap());
    }
}
