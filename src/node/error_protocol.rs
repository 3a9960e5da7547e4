//! Out-of-band error notification protocol (grounded in the Go
//! original's `node/error.go`): a length-prefixed UTF-8 message
//! followed by a single acknowledgement byte, used to tell the remote
//! peer why a transfer aborted before closing the connection.

use std::time::Duration;

use futures::{AsyncReadExt, AsyncWriteExt};
use libp2p::{PeerId, StreamProtocol};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ErrorKind, Result};
use super::Node;

pub const PROTOCOL_ID: &str = "/p2pxfer/error/0.1.0";
const SEND_TIMEOUT: Duration = Duration::from_secs(6);
const RETRY_DELAY: Duration = Duration::from_millis(100);
const MAX_MESSAGE_LEN: usize = u16::MAX as usize;

pub fn protocol() -> StreamProtocol {
    StreamProtocol::new(PROTOCOL_ID)
}

/// Opens an `error/0.1.0` stream to `peer` and delivers `message`,
/// retrying until the peer acknowledges or the overall timeout
/// elapses.
pub async fn send_error(node: &Node, peer: PeerId, message: &str, cancel: &CancellationToken) -> Result<()> {
    tokio::time::timeout(SEND_TIMEOUT, send_loop(node, peer, message, cancel))
        .await
        .unwrap_or_else(|_| Err(Error::simple(ErrorKind::Cancellation)))
}

async fn send_loop(node: &Node, peer: PeerId, message: &str, cancel: &CancellationToken) -> Result<()> {
    let bytes = message.as_bytes();
    let len = bytes.len().min(MAX_MESSAGE_LEN) as u16;
    let mut payload = Vec::with_capacity(2 + len as usize);
    payload.extend_from_slice(&len.to_be_bytes());
    payload.extend_from_slice(&bytes[..len as usize]);

    loop {
        if cancel.is_cancelled() {
            return Err(Error::simple(ErrorKind::Cancellation));
        }
        match node.open_stream(peer, protocol(), cancel).await {
            Ok(mut stream) => {
                if stream.write_all(&payload).await.is_ok() && stream.flush().await.is_ok() {
                    let mut ack = [0u8; 1];
                    if stream.read_exact(&mut ack).await.is_ok() && ack[0] == 1 {
                        return Ok(());
                    }
                }
            }
            Err(_) => {}
        }
        tokio::select! {
            _ = tokio::time::sleep(RETRY_DELAY) => {}
            _ = cancel.cancelled() => return Err(Error::simple(ErrorKind::Cancellation)),
        }
    }
}

/// Accepts `error/0.1.0` streams and invokes `on_error` for each
/// message received from `expected_peer`, ignoring anyone else.
pub async fn serve(node: &Node, expected_peer: PeerId, on_error: impl Fn(String) + Send + 'static) -> Result<()> {
    let mut incoming = node.accept_incoming(protocol()).await?;
    tokio::spawn(async move {
        use futures::StreamExt;
        while let Some((peer, mut stream)) = incoming.next().await {
            if peer != expected_peer {
                continue;
            }
            let mut len_buf = [0u8; 2];
            if stream.read_exact(&mut len_buf).await.is_err() {
                continue;
            }
            let len = u16::from_be_bytes(len_buf) as usize;
            let mut message_buf = vec![0u8; len];
            if stream.read_exact(&mut message_buf).await.is_err() {
                continue;
            }
            if let Ok(message) = String::from_utf8(message_buf) {
                let _ = stream.write_all(&[1u8]).await;
                let _ = stream.flush().await;
                on_error(message);
            }
        }
    });
    Ok(())
}
