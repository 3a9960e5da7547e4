//! Sender-side session orchestration (spec.md §4.4 "Sender").

use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use libp2p::PeerId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::archive::{self, Progress};
use crate::auth;
use crate::channel::{BoxedStream, ChannelWriter, QueueStreamSource};
use crate::config::Config;
use crate::error::{Error, ErrorKind, Result};
use crate::identity::{randomart, NodeId};
use crate::node::{self, error_protocol, Node, NodeConfig};
use crate::secret;

use super::transfer_protocol;

pub struct SenderOptions {
    pub path: PathBuf,
    pub strict: bool,
    pub private: bool,
}

/// Everything the CLI needs to display to the user once the node is up
/// (spec.md §4.4 step 1, §6).
pub struct SenderIdentity {
    pub node_id: NodeId,
    pub identifier: String,
    pub secret: String,
    pub randomart: String,
}

pub async fn run_sender(
    config: &Config,
    opts: SenderOptions,
    progress: &mut dyn Progress,
    on_ready: impl FnOnce(&SenderIdentity),
    cancel: CancellationToken,
) -> Result<()> {
    let node = Node::new(
        NodeConfig {
            private: opts.private,
            bootstrap_peers: config.bootstrap_peers.clone(),
        },
        cancel.clone(),
    )?;

    let node_id = node.local_node_id();
    let identifier = node_id.topic(opts.strict);
    let secret_value = if opts.strict {
        secret::generate_strong_secret()
    } else {
        secret::generate_pin()
    };
    let secret_hash = secret::compute_hash(&secret_value);
    let identity = SenderIdentity {
        node_id,
        identifier: identifier.clone(),
        secret: secret_value,
        randomart: randomart::render(node_id.as_bytes()),
    };
    on_ready(&identity);

    node.start_providing_lan(&identifier).await?;
    tokio::spawn(lan_advertise_loop(node.clone(), identifier.clone(), cancel.clone()));

    if !opts.private {
        bootstrap_wan_with_budget(&node, &cancel).await;
        node.start_providing_wan(&identifier).await?;
        node.enable_auto_relay(cancel.clone());
        tokio::spawn(wan_advertise_loop(node.clone(), identifier.clone(), cancel.clone()));
    }

    let peer = authenticate_peer(&node, secret_hash, opts.strict, &cancel).await;
    let result = match peer {
        Ok(peer) => {
            let result = run_session(&node, peer, &opts.path, config.payload_size, progress, &cancel).await;
            if let Err(ref e) = result {
                let _ = error_protocol::send_error(&node, peer, &e.to_string(), &cancel).await;
            }
            result
        }
        Err(e) => Err(e),
    };
    node.close().await;
    result
}

async fn run_session(
    node: &Node,
    peer: PeerId,
    path: &std::path::Path,
    payload_size: u16,
    progress: &mut dyn Progress,
    cancel: &CancellationToken,
) -> Result<()> {
    error_protocol::serve(node, peer, {
        let cancel = cancel.clone();
        move |message| {
            tracing::warn!(%message, "received error from peer");
            cancel.cancel();
        }
    })
    .await?;

    let transfer_rx = spawn_transfer_feed(node.clone(), peer, cancel.clone());
    let mut writer = ChannelWriter::new(QueueStreamSource::new(transfer_rx), payload_size, cancel.clone());

    // `archive::emit` writes the terminator block and already drives the
    // writer's close handshake; closing again here would send a second
    // FIN the reader's close loop would reject as unexpected data.
    archive::emit(&mut writer, path, progress).await
}

/// Waits for an incoming `auth` stream, verifying the secret hash
/// (spec.md §4.3). In non-strict mode a failed attempt aborts the
/// session (the PIN is burned); in strict mode the handler keeps
/// listening, since brute-forcing a strong token is impractical.
async fn authenticate_peer(
    node: &Node,
    secret_hash: [u8; 32],
    strict: bool,
    cancel: &CancellationToken,
) -> Result<PeerId> {
    let mut incoming = node.accept_incoming(auth::protocol()).await?;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::simple(ErrorKind::Cancellation)),
            next = incoming.next() => {
                let Some((peer, mut stream)) = next else {
                    return Err(Error::simple(ErrorKind::Cancellation));
                };
                match auth::handle_authenticate(&mut stream, &secret_hash).await {
                    Ok(true) => {
                        node.tag_peer(peer, Vec::new());
                        node.protect_peer(peer);
                        return Ok(peer);
                    }
                    Ok(false) if !strict => {
                        return Err(Error::wrapped(
                            ErrorKind::Authentication,
                            "failed to authenticate receiver",
                        ));
                    }
                    Ok(false) => {
                        tracing::debug!("rejected authentication attempt in strict mode, still listening");
                    }
                    Err(e) if !strict => return Err(e),
                    Err(e) => tracing::warn!(error = %e, "authentication attempt errored"),
                }
            }
        }
    }
}

/// Feeds every incoming `transfer` stream from the authenticated peer
/// into a bounded queue the reliable channel's writer consumes as a
/// `StreamSource`; streams from anyone else are dropped (spec.md §4.4
/// step 3).
fn spawn_transfer_feed(node: Node, peer: PeerId, cancel: CancellationToken) -> mpsc::Receiver<BoxedStream> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        let Ok(mut incoming) = node.accept_incoming(transfer_protocol()).await else {
            return;
        };
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                next = incoming.next() => {
                    match next {
                        Some((candidate, stream)) if candidate == peer => {
                            if tx.send(Box::new(stream) as BoxedStream).await.is_err() {
                                return;
                            }
                        }
                        Some(_) => {}
                        None => return,
                    }
                }
            }
        }
    });
    rx
}

async fn lan_advertise_loop(node: Node, identifier: String, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(node::LAN_ADVERTISE_INTERVAL) => {
                let _ = node.start_providing_lan(&identifier).await;
            }
        }
    }
}

async fn wan_advertise_loop(node: Node, identifier: String, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(node::WAN_ADVERTISE_INTERVAL) => {
                let _ = node.start_providing_wan(&identifier).await;
            }
        }
    }
}

/// Bootstrap phase (spec.md §4.2 "Advertising"): retries the WAN DHT
/// bootstrap query until one succeeds or the 1-minute budget elapses.
/// Simplified from the original's three-concurrent-candidate-node
/// design to repeated attempts against the single WAN DHT instance
/// this node already owns (see DESIGN.md).
async fn bootstrap_wan_with_budget(node: &Node, cancel: &CancellationToken) {
    let budget = tokio::time::sleep(node::WAN_BOOTSTRAP_TIMEOUT);
    tokio::pin!(budget);
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        tokio::select! {
            result = node.bootstrap_wan() => {
                if result.is_ok() {
                    return;
                }
            }
            _ = &mut budget => {
                tracing::warn!(attempts, "WAN bootstrap budget exhausted, continuing without confirmed WAN connectivity");
                return;
            }
            _ = cancel.cancelled() => return,
        }
        if attempts >= node::WAN_BOOTSTRAP_CANDIDATES as u32 {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(6)) => {}
                _ = &mut budget => return,
                _ = cancel.cancelled() => return,
            }
        }
    }
}
