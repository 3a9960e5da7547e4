//! Overlay node: identity, dual DHT, mDNS, auto-relay and the custom
//! peer-router (spec.md §4.2). A single background task owns the
//! `Swarm` and is driven over a command channel — the `Swarm` itself
//! is never shared across tasks.

pub mod behaviour;
pub mod error_protocol;
pub mod peer_source;
pub mod router;

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use libp2p::kad::store::MemoryStore;
use libp2p::kad::{self, QueryId};
use libp2p::swarm::SwarmEvent;
use libp2p::{identify, identity, mdns, noise, tcp, yamux, Multiaddr, PeerId, StreamProtocol, Swarm};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ErrorKind, Result};
use crate::identity::NodeId;
use behaviour::{NodeBehaviour, NodeBehaviourEvent};

/// LAN-DHT advertising cadence (spec.md §4.2 "Advertising").
pub const LAN_ADVERTISE_INTERVAL: Duration = Duration::from_secs(3);
/// WAN-DHT advertising cadence.
pub const WAN_ADVERTISE_INTERVAL: Duration = Duration::from_secs(6);
/// Per-candidate WAN bootstrap budget.
pub const WAN_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(60);
/// Number of bootstrap candidates started concurrently.
pub const WAN_BOOTSTRAP_CANDIDATES: usize = 3;
/// Receiver-side peer-finding cadence.
pub const FIND_PEER_INTERVAL: Duration = Duration::from_secs(1);
/// Connect-loop retry delay.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

type PendingProviders = HashMap<QueryId, oneshot::Sender<Result<Vec<PeerId>>>>;
type PendingClosestPeers = HashMap<QueryId, oneshot::Sender<Result<Vec<PeerId>>>>;
type PendingBootstrap = HashMap<QueryId, oneshot::Sender<Result<()>>>;

/// Messages sent to the task that owns the `Swarm`.
enum Command {
    StartProvidingLan(String, oneshot::Sender<Result<()>>),
    StartProvidingWan(String, oneshot::Sender<Result<()>>),
    GetProvidersLan(String, oneshot::Sender<Result<Vec<PeerId>>>),
    GetProvidersWan(String, oneshot::Sender<Result<Vec<PeerId>>>),
    ClosestPeersWan(Vec<u8>, oneshot::Sender<Result<Vec<PeerId>>>),
    BootstrapWan(oneshot::Sender<Result<()>>),
    PeerAddrs(PeerId, oneshot::Sender<Vec<Multiaddr>>),
    Dial(PeerId, Vec<Multiaddr>, oneshot::Sender<Result<()>>),
    ProtectPeer(PeerId),
    TagPeer(PeerId, Vec<Multiaddr>),
    IsTagged(PeerId, oneshot::Sender<bool>),
    OpenStream(
        PeerId,
        StreamProtocol,
        oneshot::Sender<Result<libp2p_stream::Stream>>,
    ),
    AcceptIncoming(
        StreamProtocol,
        oneshot::Sender<Result<libp2p_stream::IncomingStreams>>,
    ),
    ListenOn(Multiaddr, oneshot::Sender<Result<()>>),
    PeerNodeId(PeerId, oneshot::Sender<Option<NodeId>>),
    Shutdown,
}

/// A handle to a running overlay node. Cloning shares the same
/// underlying `Swarm` task.
#[derive(Clone)]
pub struct Node {
    cmd_tx: mpsc::Sender<Command>,
    local_peer_id: PeerId,
    local_node_id: NodeId,
    private: bool,
}

pub struct NodeConfig {
    pub private: bool,
    pub bootstrap_peers: Vec<Multiaddr>,
}

impl Node {
    /// Builds the transport, behaviour, and `Swarm`, and spawns the
    /// background task that drives it.
    pub fn new(config: NodeConfig, cancel: CancellationToken) -> Result<Self> {
        let keypair = identity::Keypair::generate_ed25519();
        let local_peer_id = PeerId::from(keypair.public());
        let local_node_id = NodeId::from_public_key_bytes(&keypair.public().encode_protobuf());

        let mut swarm = libp2p::SwarmBuilder::with_existing_identity(keypair.clone())
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| Error::wrapped(ErrorKind::Unexpected, e.to_string()))?
            .with_quic()
            .with_relay_client(noise::Config::new, yamux::Config::default)
            .map_err(|e| Error::wrapped(ErrorKind::Unexpected, e.to_string()))?
            .with_behaviour(|key, relay_behaviour| {
                let peer_id = PeerId::from(key.public());
                let lan_kad = kad::Behaviour::new(peer_id, MemoryStore::new(peer_id));
                let mut wan_kad = kad::Behaviour::new(peer_id, MemoryStore::new(peer_id));
                NodeBehaviour {
                    lan_kad,
                    wan_kad: {
                        wan_kad.set_mode(Some(kad::Mode::Client));
                        wan_kad
                    },
                    mdns: mdns::tokio::Behaviour::new(mdns::Config::default(), peer_id)
                        .expect("mdns behaviour construction"),
                    identify: identify::Behaviour::new(identify::Config::new(
                        "/p2pxfer/id/1.0.0".to_string(),
                        key.public(),
                    )),
                    relay_client: relay_behaviour,
                    dcutr: libp2p::dcutr::Behaviour::new(peer_id),
                    autonat: libp2p::autonat::v2::client::Behaviour::new(
                        rand::thread_rng(),
                        libp2p::autonat::v2::client::Config::default(),
                    ),
                    stream: libp2p_stream::Behaviour::new(),
                }
            })
            .map_err(|e| Error::wrapped(ErrorKind::Unexpected, e.to_string()))?
            .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(60)))
            .build();

        // Private mode (spec.md §4.2 "private-mode toggle") skips all
        // WAN/relay concerns entirely: the WAN DHT is left without
        // bootstrap peers and is simply never queried or advertised to.
        if !config.private {
            for addr in &config.bootstrap_peers {
                if let Some(peer_id) = multiaddr_peer_id(addr) {
                    swarm.behaviour_mut().wan_kad.add_address(&peer_id, addr.clone());
                }
            }
            if config.bootstrap_peers.is_empty() {
                for addr in default_bootstrap_peers() {
                    if let Some(peer_id) = multiaddr_peer_id(&addr) {
                        swarm.behaviour_mut().wan_kad.add_address(&peer_id, addr);
                    }
                }
            }
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(run_swarm_loop(swarm, cmd_rx, cancel));

        Ok(Node {
            cmd_tx,
            local_peer_id,
            local_node_id,
            private: config.private,
        })
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    pub fn local_node_id(&self) -> NodeId {
        self.local_node_id
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| Error::simple(ErrorKind::Cancellation))?;
        rx.await.map_err(|_| Error::simple(ErrorKind::Cancellation))
    }

    pub async fn start_providing_lan(&self, topic: &str) -> Result<()> {
        self.call(|tx| Command::StartProvidingLan(topic.to_string(), tx))
            .await?
    }

    pub async fn start_providing_wan(&self, topic: &str) -> Result<()> {
        self.call(|tx| Command::StartProvidingWan(topic.to_string(), tx))
            .await?
    }

    pub async fn get_providers_lan(&self, topic: &str) -> Result<Vec<PeerId>> {
        self.call(|tx| Command::GetProvidersLan(topic.to_string(), tx))
            .await?
    }

    pub async fn get_providers_wan(&self, topic: &str) -> Result<Vec<PeerId>> {
        self.call(|tx| Command::GetProvidersWan(topic.to_string(), tx))
            .await?
    }

    pub async fn closest_peers_wan(&self, key: Vec<u8>) -> Result<Vec<PeerId>> {
        self.call(|tx| Command::ClosestPeersWan(key, tx)).await?
    }

    /// Drives a WAN Kademlia bootstrap query to completion (or the
    /// caller's own timeout budget, spec.md §4.2 "Advertising").
    pub async fn bootstrap_wan(&self) -> Result<()> {
        self.call(Command::BootstrapWan).await?
    }

    pub async fn peer_addrs(&self, peer: PeerId) -> Vec<Multiaddr> {
        self.call(|tx| Command::PeerAddrs(peer, tx)).await.unwrap_or_default()
    }

    pub(crate) async fn dial(&self, peer: PeerId, addrs: Vec<Multiaddr>) -> Result<()> {
        self.call(|tx| Command::Dial(peer, addrs, tx)).await?
    }

    pub fn tag_peer(&self, peer: PeerId, addrs: Vec<Multiaddr>) {
        let _ = self.cmd_tx.try_send(Command::TagPeer(peer, addrs));
    }

    pub fn protect_peer(&self, peer: PeerId) {
        let _ = self.cmd_tx.try_send(Command::ProtectPeer(peer));
    }

    async fn is_tagged(&self, peer: PeerId) -> bool {
        self.call(|tx| Command::IsTagged(peer, tx)).await.unwrap_or(false)
    }

    /// Custom peer-router (spec.md §4.2): untagged peers never touch the
    /// DHT; tagged peers get a bounded, backed-off lookup.
    pub async fn find_addrs(&self, peer: PeerId, cancel: &CancellationToken) -> Vec<Multiaddr> {
        let existing = self.peer_addrs(peer).await;
        if !existing.is_empty() {
            return existing;
        }
        if !self.is_tagged(peer).await {
            return Vec::new();
        }
        match router::route(true) {
            router::RouteDecision::Query { timeout } => {
                let mut attempt = 0u32;
                loop {
                    if cancel.is_cancelled() {
                        return Vec::new();
                    }
                    let addrs = self.peer_addrs(peer).await;
                    if !addrs.is_empty() {
                        return addrs;
                    }
                    let backoff = router::open_stream_backoff(attempt).min(timeout);
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => return Vec::new(),
                    }
                    attempt += 1;
                    if attempt > 8 {
                        return Vec::new();
                    }
                }
            }
            router::RouteDecision::NoQuery => Vec::new(),
        }
    }

    /// `ConnectTo` (spec.md §4.2): retries with the peer-store's current
    /// addresses until the session is cancelled.
    pub async fn connect_to(&self, peer: PeerId, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::simple(ErrorKind::Cancellation));
            }
            let addrs = self.find_addrs(peer, cancel).await;
            match self.dial(peer, addrs).await {
                Ok(()) => {
                    self.protect_peer(peer);
                    return Ok(());
                }
                Err(_) => {
                    tokio::select! {
                        _ = tokio::time::sleep(CONNECT_RETRY_DELAY) => {}
                        _ = cancel.cancelled() => return Err(Error::simple(ErrorKind::Cancellation)),
                    }
                }
            }
        }
    }

    /// `OpenStream` (spec.md §4.2): backed-off retries until a stream is
    /// obtained or the session is cancelled.
    pub async fn open_stream(
        &self,
        peer: PeerId,
        protocol: StreamProtocol,
        cancel: &CancellationToken,
    ) -> Result<libp2p_stream::Stream> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::simple(ErrorKind::Cancellation));
            }
            match self
                .call(|tx| Command::OpenStream(peer, protocol.clone(), tx))
                .await?
            {
                Ok(stream) => return Ok(stream),
                Err(_) => {
                    let backoff = router::open_stream_backoff(attempt);
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => return Err(Error::simple(ErrorKind::Cancellation)),
                    }
                    attempt += 1;
                }
            }
        }
    }

    pub async fn accept_incoming(
        &self,
        protocol: StreamProtocol,
    ) -> Result<libp2p_stream::IncomingStreams> {
        self.call(|tx| Command::AcceptIncoming(protocol, tx)).await?
    }

    pub async fn close(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown).await;
    }

    async fn listen_on(&self, addr: Multiaddr) -> Result<()> {
        self.call(|tx| Command::ListenOn(addr, tx)).await?
    }

    /// The remote's node ID (spec.md §4.2 "Finding"), derived from the
    /// public key learned via the `identify` protocol once connected.
    /// `None` if no identify info has been received for this peer yet.
    pub async fn peer_node_id(&self, peer: PeerId) -> Option<NodeId> {
        self.call(|tx| Command::PeerNodeId(peer, tx)).await.ok().flatten()
    }

    /// Drives auto-relay (spec.md §4.2): consumes the peer-source task
    /// and asks the swarm to listen through each candidate's relayed
    /// circuit address. Private nodes never call this.
    pub fn enable_auto_relay(&self, cancel: CancellationToken) {
        let node = self.clone();
        tokio::spawn(async move {
            let mut candidates = peer_source::spawn(node.clone(), 8, cancel.clone());
            while let Some(candidate) = candidates.recv().await {
                let Some(addr) = candidate.addrs.into_iter().next() else {
                    continue;
                };
                let relay_addr = addr
                    .with(libp2p::multiaddr::Protocol::P2p(candidate.peer_id))
                    .with(libp2p::multiaddr::Protocol::P2pCircuit);
                let _ = node.listen_on(relay_addr).await;
            }
        });
    }
}

fn multiaddr_peer_id(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|p| match p {
        libp2p::multiaddr::Protocol::P2p(peer_id) => Some(peer_id),
        _ => None,
    })
}

fn default_bootstrap_peers() -> Vec<Multiaddr> {
    // The standard IPFS bootstrap set, mirroring the Go original's
    // `dht.GetDefaultBootstrapPeerAddrInfos()`.
    [
        "/dnsaddr/bootstrap.libp2p.io/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN",
        "/dnsaddr/bootstrap.libp2p.io/p2p/QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa",
        "/dnsaddr/bootstrap.libp2p.io/p2p/QmbLHAnMoJPWSCR5Zhtx6BHJX9KiKNN6tpvbUcqanj75Nb",
        "/dnsaddr/bootstrap.libp2p.io/p2p/QmcZf59bWwK5XFi76CZX8cbJ4BhTzzA3gU1ZjYZcYW3dwt",
    ]
    .iter()
    .filter_map(|s| s.parse().ok())
    .collect()
}

async fn run_swarm_loop(
    mut swarm: Swarm<NodeBehaviour>,
    mut cmd_rx: mpsc::Receiver<Command>,
    cancel: CancellationToken,
) {
    let mut providers_lan: PendingProviders = HashMap::new();
    let mut providers_wan: PendingProviders = HashMap::new();
    let mut closest_peers: PendingClosestPeers = HashMap::new();
    let mut pending_bootstrap: PendingBootstrap = HashMap::new();
    let mut tagged_peers: HashMap<PeerId, Vec<Multiaddr>> = HashMap::new();
    let mut identified_peers: HashMap<PeerId, NodeId> = HashMap::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => handle_command(
                        &mut swarm,
                        cmd,
                        &mut providers_lan,
                        &mut providers_wan,
                        &mut closest_peers,
                        &mut pending_bootstrap,
                        &mut tagged_peers,
                        &identified_peers,
                    ),
                }
            }
            event = swarm.select_next_some() => {
                handle_swarm_event(
                    &mut swarm,
                    event,
                    &mut providers_lan,
                    &mut providers_wan,
                    &mut closest_peers,
                    &mut pending_bootstrap,
                    &tagged_peers,
                    &mut identified_peers,
                );
            }
        }
    }
}

fn handle_command(
    swarm: &mut Swarm<NodeBehaviour>,
    cmd: Command,
    providers_lan: &mut PendingProviders,
    providers_wan: &mut PendingProviders,
    closest_peers: &mut PendingClosestPeers,
    pending_bootstrap: &mut PendingBootstrap,
    tagged_peers: &mut HashMap<PeerId, Vec<Multiaddr>>,
    identified_peers: &HashMap<PeerId, NodeId>,
) {
    match cmd {
        Command::Shutdown => {}
        Command::StartProvidingLan(topic, reply) => {
            let key = kad::RecordKey::new(&topic);
            let result = swarm
                .behaviour_mut()
                .lan_kad
                .start_providing(key)
                .map(|_| ())
                .map_err(|e| Error::wrapped(ErrorKind::Io, e.to_string()));
            let _ = reply.send(result);
        }
        Command::StartProvidingWan(topic, reply) => {
            let key = kad::RecordKey::new(&topic);
            let result = swarm
                .behaviour_mut()
                .wan_kad
                .start_providing(key)
                .map(|_| ())
                .map_err(|e| Error::wrapped(ErrorKind::Io, e.to_string()));
            let _ = reply.send(result);
        }
        Command::GetProvidersLan(topic, reply) => {
            let key = kad::RecordKey::new(&topic);
            let id = swarm.behaviour_mut().lan_kad.get_providers(key);
            providers_lan.insert(id, reply);
        }
        Command::GetProvidersWan(topic, reply) => {
            let key = kad::RecordKey::new(&topic);
            let id = swarm.behaviour_mut().wan_kad.get_providers(key);
            providers_wan.insert(id, reply);
        }
        Command::ClosestPeersWan(key, reply) => {
            let id = swarm.behaviour_mut().wan_kad.get_closest_peers(key);
            closest_peers.insert(id, reply);
        }
        Command::BootstrapWan(reply) => match swarm.behaviour_mut().wan_kad.bootstrap() {
            Ok(id) => {
                pending_bootstrap.insert(id, reply);
            }
            Err(e) => {
                let _ = reply.send(Err(Error::wrapped(ErrorKind::Io, e.to_string())));
            }
        },
        Command::PeerAddrs(peer, reply) => {
            let addrs: Vec<Multiaddr> = swarm.behaviour_mut().lan_kad.addresses_of_peer(&peer);
            let _ = reply.send(addrs);
        }
        Command::Dial(peer, addrs, reply) => {
            for addr in &addrs {
                swarm.behaviour_mut().lan_kad.add_address(&peer, addr.clone());
            }
            let result = swarm
                .dial(peer)
                .map_err(|e| Error::wrapped(ErrorKind::Io, e.to_string()));
            let _ = reply.send(result);
        }
        Command::TagPeer(peer, addrs) => {
            tagged_peers.insert(peer, addrs);
        }
        Command::ProtectPeer(peer) => {
            // No generic connection-manager "protect" primitive exists in
            // this stack; tagging the peer keeps the router from
            // spending idle-timeout cycles redialing it from scratch.
            tagged_peers.entry(peer).or_default();
        }
        Command::IsTagged(peer, reply) => {
            let _ = reply.send(tagged_peers.contains_key(&peer));
        }
        Command::OpenStream(peer, protocol, reply) => {
            let mut control = swarm.behaviour().stream.new_control();
            tokio::spawn(async move {
                let result = control
                    .open_stream(peer, protocol)
                    .await
                    .map_err(|e| Error::wrapped(ErrorKind::Io, e.to_string()));
                let _ = reply.send(result);
            });
        }
        Command::ListenOn(addr, reply) => {
            let result = swarm
                .listen_on(addr)
                .map(|_| ())
                .map_err(|e| Error::wrapped(ErrorKind::Io, e.to_string()));
            let _ = reply.send(result);
        }
        Command::PeerNodeId(peer, reply) => {
            let _ = reply.send(identified_peers.get(&peer).copied());
        }
        Command::AcceptIncoming(protocol, reply) => {
            let result = swarm
                .behaviour_mut()
                .stream
                .new_control()
                .accept(protocol)
                .map_err(|e| Error::wrapped(ErrorKind::Unexpected, e.to_string()));
            let _ = reply.send(result);
        }
    }
}

fn handle_swarm_event(
    swarm: &mut Swarm<NodeBehaviour>,
    event: SwarmEvent<NodeBehaviourEvent>,
    providers_lan: &mut PendingProviders,
    providers_wan: &mut PendingProviders,
    closest_peers: &mut PendingClosestPeers,
    pending_bootstrap: &mut PendingBootstrap,
    _tagged_peers: &HashMap<PeerId, Vec<Multiaddr>>,
    identified_peers: &mut HashMap<PeerId, NodeId>,
) {
    match event {
        SwarmEvent::Behaviour(NodeBehaviourEvent::Identify(identify::Event::Received {
            peer_id,
            info,
            ..
        })) => {
            identified_peers.insert(peer_id, NodeId::from_public_key_bytes(&info.public_key.encode_protobuf()));
        }
        SwarmEvent::Behaviour(NodeBehaviourEvent::Mdns(mdns::Event::Discovered(peers))) => {
            for (peer_id, addr) in peers {
                swarm.behaviour_mut().lan_kad.add_address(&peer_id, addr.clone());
                let _ = swarm.dial(peer_id);
            }
        }
        SwarmEvent::Behaviour(NodeBehaviourEvent::LanKad(kad::Event::OutboundQueryProgressed {
            id,
            result: kad::QueryResult::GetProviders(result),
            ..
        })) => {
            if let Some(reply) = providers_lan.remove(&id) {
                let _ = reply.send(get_providers_result(result));
            }
        }
        SwarmEvent::Behaviour(NodeBehaviourEvent::WanKad(kad::Event::OutboundQueryProgressed {
            id,
            result: kad::QueryResult::GetProviders(result),
            ..
        })) => {
            if let Some(reply) = providers_wan.remove(&id) {
                let _ = reply.send(get_providers_result(result));
            }
        }
        SwarmEvent::Behaviour(NodeBehaviourEvent::WanKad(kad::Event::OutboundQueryProgressed {
            id,
            result: kad::QueryResult::GetClosestPeers(result),
            ..
        })) => {
            if let Some(reply) = closest_peers.remove(&id) {
                let mapped = result
                    .map(|ok| ok.peers.into_iter().map(|p| p.peer_id).collect())
                    .map_err(|e| Error::wrapped(ErrorKind::Io, e.to_string()));
                let _ = reply.send(mapped);
            }
        }
        SwarmEvent::Behaviour(NodeBehaviourEvent::WanKad(kad::Event::OutboundQueryProgressed {
            id,
            result: kad::QueryResult::Bootstrap(result),
            step,
            ..
        })) => {
            if step.last {
                if let Some(reply) = pending_bootstrap.remove(&id) {
                    let mapped = result
                        .map(|_| ())
                        .map_err(|e| Error::wrapped(ErrorKind::Io, e.to_string()));
                    let _ = reply.send(mapped);
                }
            }
        }
        _ => {}
    }
}

fn get_providers_result(
    result: std::result::Result<kad::GetProvidersOk, kad::GetProvidersError>,
) -> Result<Vec<PeerId>> {
    match result {
        Ok(kad::GetProvidersOk::FoundProviders { providers, .. }) => {
            Ok(providers.into_iter().collect())
        }
        Ok(_) => Ok(Vec::new()),
        Err(e) => Err(Error::wrapped(ErrorKind::Io, e.to_string())),
    }
}
