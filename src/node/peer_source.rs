//! Auto-relay peer source (spec.md §4.2 "Peer-source contract", §9
//! design note): a long-running task holding a bounded sender end,
//! polling the WAN DHT for random closest peers to surface as relay
//! candidates. Session cancellation drops the sender, signalling EOF
//! to whatever consumes the receiver end.

use std::time::Duration;

use libp2p::{Multiaddr, PeerId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::router::peer_source_backoff;
use super::Node;

pub struct PeerCandidate {
    pub peer_id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

/// Spawns the peer-source task and returns the receiving end of its
/// bounded channel.
pub fn spawn(node: Node, capacity: usize, cancel: CancellationToken) -> mpsc::Receiver<PeerCandidate> {
    let (tx, rx) = mpsc::channel(capacity);
    tokio::spawn(run(node, tx, cancel));
    rx
}

async fn run(node: Node, tx: mpsc::Sender<PeerCandidate>, cancel: CancellationToken) {
    let mut backoff = Duration::from_secs(1);
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let random_key: [u8; 32] = rand::random();
        let mut emitted = false;
        match node.closest_peers_wan(random_key.to_vec()).await {
            Ok(peers) => {
                for peer_id in peers {
                    if tx.is_closed() {
                        return;
                    }
                    let addrs = node.peer_addrs(peer_id).await;
                    if addrs.is_empty() {
                        continue;
                    }
                    if tx
                        .send(PeerCandidate { peer_id, addrs })
                        .await
                        .is_err()
                    {
                        return;
                    }
                    emitted = true;
                }
            }
            Err(_) => {}
        }
        backoff = if emitted {
            Duration::from_secs(1)
        } else {
            peer_source_backoff(backoff)
        };
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = cancel.cancelled() => return,
        }
    }
}
