//! Receiver-side session orchestration (spec.md §4.4 "Receiver").

use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use libp2p::PeerId;
use tokio_util::sync::CancellationToken;

use crate::archive::{self, Progress};
use crate::auth;
use crate::channel::{BoxedStream, ChannelReader, DialStreamSource};
use crate::config::Config;
use crate::error::{Error, ErrorKind, Result};
use crate::identity::{self, NodeId};
use crate::node::{self, error_protocol, router, Node, NodeConfig};
use crate::secret;

use super::{transfer_protocol, CANCEL_MESSAGE};

pub struct ReceiverOptions {
    pub identifier: String,
    pub destination: PathBuf,
    pub private: bool,
}

pub async fn run_receiver(
    config: &Config,
    opts: ReceiverOptions,
    progress: &mut dyn Progress,
    confirm_randomart: impl FnOnce(&NodeId, &str) -> bool,
    read_secret: impl FnOnce() -> String,
    cancel: CancellationToken,
) -> Result<()> {
    identity::validate_identifier(&opts.identifier)?;

    let node = Node::new(
        NodeConfig {
            private: opts.private,
            bootstrap_peers: config.bootstrap_peers.clone(),
        },
        cancel.clone(),
    )?;

    let (peer, peer_node_id) = find_peer(&node, &opts.identifier, &cancel).await?;

    if opts.identifier.len() == identity::SHORT_TOPIC_LEN {
        let art = identity::randomart::render(peer_node_id.as_bytes());
        if !confirm_randomart(&peer_node_id, &art) {
            node.close().await;
            return Ok(());
        }
    }

    node.connect_to(peer, &cancel).await?;

    let secret_value = read_secret();
    secret::validate_secret(&secret_value)?;
    let secret_hash = secret::compute_hash(&secret_value);

    let result = run_session(&node, peer, secret_hash, &opts.destination, config.payload_size, progress, &cancel).await;

    if let Err(ref e) = result {
        let _ = error_protocol::send_error(&node, peer, &e.to_string(), &cancel).await;
    }
    node.close().await;
    result
}

async fn run_session(
    node: &Node,
    peer: PeerId,
    secret_hash: [u8; 32],
    destination: &std::path::Path,
    payload_size: u16,
    progress: &mut dyn Progress,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut stream = node.open_stream(peer, auth::protocol(), cancel).await?;
    let authenticated = auth::authenticate(&mut stream, &secret_hash).await?;
    if !authenticated {
        return Err(Error::wrapped(ErrorKind::Authentication, "authentication failed"));
    }

    error_protocol::serve(node, peer, {
        let cancel = cancel.clone();
        move |message| {
            tracing::warn!(%message, "sender error");
            cancel.cancel();
        }
    })
    .await?;

    crate::interrupt::install(cancel.clone(), {
        let node = node.clone();
        let cancel = cancel.clone();
        move || {
            let node = node.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _ = error_protocol::send_error(&node, peer, CANCEL_MESSAGE, &cancel).await;
            });
        }
    });

    let dial_node = node.clone();
    let dial_cancel_outer = cancel.clone();
    let source = DialStreamSource::new(move |_cancel: &CancellationToken| {
        let node = dial_node.clone();
        let cancel = dial_cancel_outer.clone();
        let fut: Pin<Box<dyn std::future::Future<Output = Result<BoxedStream>> + Send>> = Box::pin(async move {
            let mut attempt = 0u32;
            loop {
                if cancel.is_cancelled() {
                    return Err(Error::simple(ErrorKind::Cancellation));
                }
                match node.open_stream(peer, transfer_protocol(), &cancel).await {
                    Ok(stream) => return Ok(Box::new(stream) as BoxedStream),
                    Err(_) => {
                        let backoff = router::open_stream_backoff(attempt);
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                }
            }
        });
        fut
    });

    let reader = ChannelReader::new(source, payload_size, cancel.clone());
    archive::consume(reader, destination, progress).await
}

async fn find_peer(node: &Node, identifier: &str, cancel: &CancellationToken) -> Result<(PeerId, NodeId)> {
    loop {
        if cancel.is_cancelled() {
            return Err(Error::simple(ErrorKind::Cancellation));
        }

        let mut candidates: Vec<PeerId> = Vec::new();
        if let Ok(peers) = node.get_providers_lan(identifier).await {
            candidates.extend(peers);
        }
        if let Ok(peers) = node.get_providers_wan(identifier).await {
            candidates.extend(peers);
        }
        candidates.sort_by_key(|p| p.to_bytes());
        candidates.dedup();

        let mut matches: Vec<(PeerId, NodeId)> = Vec::new();
        for candidate in candidates {
            if let Some(node_id) = probe_candidate(node, candidate).await {
                if router::is_valid_peer(&node_id, identifier) {
                    matches.push((candidate, node_id));
                }
            }
        }
        matches.sort_by_key(|(p, _)| p.to_bytes());
        matches.dedup_by_key(|(p, _)| *p);

        match matches.len() {
            0 => {}
            1 => {
                let (peer, node_id) = matches.into_iter().next().expect("checked len == 1");
                node.tag_peer(peer, node.peer_addrs(peer).await);
                return Ok((peer, node_id));
            }
            _ => {
                return Err(Error::wrapped(
                    ErrorKind::Protocol,
                    "multiple distinct peers advertise this identifier",
                ));
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(node::FIND_PEER_INTERVAL) => {}
            _ = cancel.cancelled() => return Err(Error::simple(ErrorKind::Cancellation)),
        }
    }
}

/// Connects to `candidate` just long enough to learn its node ID via
/// `identify`, without committing to the full `ConnectTo` retry loop
/// (spec.md §4.2 "Finding" runs this once per cycle, for every
/// candidate the DHT currently reports).
async fn probe_candidate(node: &Node, candidate: PeerId) -> Option<NodeId> {
    if let Some(node_id) = node.peer_node_id(candidate).await {
        return Some(node_id);
    }
    let addrs = node.peer_addrs(candidate).await;
    if addrs.is_empty() {
        return None;
    }
    if node.dial(candidate, addrs).await.is_err() {
        return None;
    }
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        if let Some(node_id) = node.peer_node_id(candidate).await {
            return Some(node_id);
        }
    }
    None
}
