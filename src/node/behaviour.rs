//! Combined libp2p behaviour for a `p2pxfer` node (spec.md §4.2): dual
//! Kademlia (LAN + WAN), mDNS, identify, relay client + DCUtR for hole
//! punching, AutoNAT, and the raw `libp2p-stream` handler our three
//! application protocols run over.

use libp2p::kad::store::MemoryStore;
use libp2p::swarm::NetworkBehaviour;
use libp2p::{autonat, dcutr, identify, kad, mdns, relay};

#[derive(NetworkBehaviour)]
pub struct NodeBehaviour {
    pub lan_kad: kad::Behaviour<MemoryStore>,
    pub wan_kad: kad::Behaviour<MemoryStore>,
    pub mdns: mdns::tokio::Behaviour,
    pub identify: identify::Behaviour,
    pub relay_client: relay::client::Behaviour,
    pub dcutr: dcutr::Behaviour,
    pub autonat: autonat::v2::client::Behaviour,
    pub stream: libp2p_stream::Behaviour,
}
