//! Reference libp2p gossipsub transport.
//!
//! The swarm lives in one task; callers talk to it through a
//! [`NetworkHandle`]. Topic frames carry raw canonical payloads; blob
//! fetch rides a dedicated control topic with request/response envelopes.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use futures::StreamExt;
use libp2p::{
    gossipsub, identify, kad, noise, ping, tcp, yamux,
    swarm::{NetworkBehaviour, SwarmEvent},
    Multiaddr, PeerId, Swarm,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use credence_core::error::CredenceError;
use credence_core::types::ContentAddress;

use crate::config::GossipConfig;
use crate::message::GossipEnvelope;
use crate::topic::Topic;
use crate::{GossipMessage, GossipTransport};

/// Control topic carrying blob request/response envelopes.
const BLOB_TOPIC: &str = "credence/blobs";

/// Combined libp2p network behaviour for Credence.
///
/// The `#[derive(NetworkBehaviour)]` macro auto-generates a
/// `CredenceBehaviourEvent` enum with one variant per field.
#[derive(NetworkBehaviour)]
pub struct CredenceBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
}

enum Command {
    Subscribe {
        topic: Topic,
        responder: oneshot::Sender<mpsc::Receiver<GossipMessage>>,
    },
    Fetch {
        addr: ContentAddress,
        responder: oneshot::Sender<Result<Vec<u8>, CredenceError>>,
    },
}

/// Application-facing handle; implements [`GossipTransport`].
#[derive(Clone)]
pub struct NetworkHandle {
    outbound_tx: mpsc::Sender<(Topic, Vec<u8>)>,
    command_tx: mpsc::Sender<Command>,
    pub local_peer_id: PeerId,
}

impl GossipTransport for NetworkHandle {
    async fn publish(&self, topic: &Topic, payload: Vec<u8>) -> Result<(), CredenceError> {
        // Bounded queue: a full queue is back-pressure, not an error state.
        self.outbound_tx
            .try_send((topic.clone(), payload))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => CredenceError::Busy,
                mpsc::error::TrySendError::Closed(_) => {
                    CredenceError::SignerUnavailable("gossip task stopped".into())
                }
            })
    }

    async fn subscribe(
        &self,
        topic: &Topic,
    ) -> Result<mpsc::Receiver<GossipMessage>, CredenceError> {
        let (responder, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Subscribe {
                topic: topic.clone(),
                responder,
            })
            .await
            .map_err(|_| CredenceError::SignerUnavailable("gossip task stopped".into()))?;
        rx.await
            .map_err(|_| CredenceError::SignerUnavailable("gossip task stopped".into()))
    }

    async fn fetch(
        &self,
        addr: &ContentAddress,
        deadline: Duration,
    ) -> Result<Vec<u8>, CredenceError> {
        let (responder, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Fetch {
                addr: *addr,
                responder,
            })
            .await
            .map_err(|_| CredenceError::SignerUnavailable("gossip task stopped".into()))?;
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CredenceError::Cancelled),
            Err(_) => Err(CredenceError::Timeout(deadline.as_millis() as u64)),
        }
    }
}

/// Resolves blob requests from peers against local storage.
pub type BlobResolver = Box<dyn Fn(&ContentAddress) -> Option<Vec<u8>> + Send>;

/// Owns the libp2p Swarm. Pass to `tokio::spawn(network.run())`.
pub struct GossipNetwork {
    swarm: Swarm<CredenceBehaviour>,
    outbound_rx: mpsc::Receiver<(Topic, Vec<u8>)>,
    command_rx: mpsc::Receiver<Command>,
    subscribers: HashMap<String, Vec<mpsc::Sender<GossipMessage>>>,
    pending_fetches: HashMap<ContentAddress, Vec<oneshot::Sender<Result<Vec<u8>, CredenceError>>>>,
    blob_resolver: BlobResolver,
    inbound_buffer: usize,
}

impl GossipNetwork {
    /// Build the network and return `(GossipNetwork, NetworkHandle)`.
    pub fn new(
        config: &GossipConfig,
        blob_resolver: BlobResolver,
    ) -> Result<(Self, NetworkHandle), Box<dyn std::error::Error + Send + Sync>> {
        let mut swarm = libp2p::SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )?
            .with_behaviour(|key: &libp2p::identity::Keypair| {
                let message_id_fn = |msg: &gossipsub::Message| {
                    let mut s = DefaultHasher::new();
                    msg.data.hash(&mut s);
                    gossipsub::MessageId::from(s.finish().to_string())
                };

                let gossipsub_config = gossipsub::ConfigBuilder::default()
                    .heartbeat_interval(Duration::from_secs(1))
                    .validation_mode(gossipsub::ValidationMode::Strict)
                    .message_id_fn(message_id_fn)
                    .build()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let gossipsub = gossipsub::Behaviour::new(
                    gossipsub::MessageAuthenticity::Signed(key.clone()),
                    gossipsub_config,
                )
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let store = kad::store::MemoryStore::new(key.public().to_peer_id());
                let kademlia = kad::Behaviour::new(key.public().to_peer_id(), store);

                let identify = identify::Behaviour::new(identify::Config::new(
                    config.protocol_version.clone(),
                    key.public(),
                ));

                let ping = ping::Behaviour::default();

                Ok(CredenceBehaviour { gossipsub, kademlia, identify, ping })
            })?
            .build();

        swarm
            .behaviour_mut()
            .gossipsub
            .subscribe(&gossipsub::IdentTopic::new(BLOB_TOPIC))?;

        let listen_addr: Multiaddr = config.listen_addr.parse()?;
        swarm.listen_on(listen_addr)?;

        for addr_str in &config.bootstrap_peers {
            if let Ok(addr) = addr_str.parse::<Multiaddr>() {
                if let Some(libp2p::multiaddr::Protocol::P2p(peer_id)) = addr.iter().last() {
                    swarm.behaviour_mut().kademlia.add_address(&peer_id, addr.clone());
                    debug!(peer = %peer_id, "added bootstrap peer");
                }
            }
        }

        let local_peer_id = *swarm.local_peer_id();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_buffer);
        let (command_tx, command_rx) = mpsc::channel(64);

        let network = GossipNetwork {
            swarm,
            outbound_rx,
            command_rx,
            subscribers: HashMap::new(),
            pending_fetches: HashMap::new(),
            blob_resolver,
            inbound_buffer: config.inbound_buffer,
        };
        let handle = NetworkHandle {
            outbound_tx,
            command_tx,
            local_peer_id,
        };
        Ok((network, handle))
    }

    /// Drive the gossip event loop. Run in a dedicated tokio task.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some((topic, payload)) = self.outbound_rx.recv() => {
                    let ident = gossipsub::IdentTopic::new(topic.to_string());
                    if let Err(e) = self.swarm.behaviour_mut().gossipsub.publish(ident, payload) {
                        warn!(topic = %topic, error = %e, "gossipsub publish failed");
                    }
                }

                Some(command) = self.command_rx.recv() => self.handle_command(command),

                event = self.swarm.select_next_some() => match event {
                    SwarmEvent::NewListenAddr { address, .. } => {
                        info!(addr = %address, "gossip listening on");
                    }
                    SwarmEvent::Behaviour(CredenceBehaviourEvent::Gossipsub(
                        gossipsub::Event::Message { message, .. },
                    )) => self.handle_inbound(message),
                    SwarmEvent::Behaviour(CredenceBehaviourEvent::Identify(
                        identify::Event::Received { peer_id, info, .. },
                    )) => {
                        debug!(peer = %peer_id, agent = %info.agent_version, "identified peer");
                        for addr in info.listen_addrs {
                            self.swarm.behaviour_mut().kademlia.add_address(&peer_id, addr);
                        }
                    }
                    _ => {}
                },
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Subscribe { topic, responder } => {
                let name = topic.to_string();
                let ident = gossipsub::IdentTopic::new(name.clone());
                if let Err(e) = self.swarm.behaviour_mut().gossipsub.subscribe(&ident) {
                    warn!(topic = %name, error = %e, "subscribe failed");
                }
                let (tx, rx) = mpsc::channel(self.inbound_buffer);
                self.subscribers.entry(name).or_default().push(tx);
                let _ = responder.send(rx);
            }
            Command::Fetch { addr, responder } => {
                let envelope = GossipEnvelope::RequestBlob { addr };
                let ident = gossipsub::IdentTopic::new(BLOB_TOPIC);
                if let Err(e) = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(ident, envelope.to_bytes())
                {
                    let _ = responder.send(Err(CredenceError::Busy));
                    warn!(error = %e, "blob request publish failed");
                    return;
                }
                self.pending_fetches.entry(addr).or_default().push(responder);
            }
        }
    }

    fn handle_inbound(&mut self, message: gossipsub::Message) {
        let topic_name = message.topic.as_str();
        if topic_name == BLOB_TOPIC {
            match GossipEnvelope::from_bytes(&message.data) {
                Ok(GossipEnvelope::RequestBlob { addr }) => {
                    if let Some(payload) = (self.blob_resolver)(&addr) {
                        let response = GossipEnvelope::BlobResponse { addr, payload };
                        let ident = gossipsub::IdentTopic::new(BLOB_TOPIC);
                        if let Err(e) = self
                            .swarm
                            .behaviour_mut()
                            .gossipsub
                            .publish(ident, response.to_bytes())
                        {
                            debug!(error = %e, "blob response publish failed");
                        }
                    }
                }
                Ok(GossipEnvelope::BlobResponse { addr, payload }) => {
                    if let Some(waiters) = self.pending_fetches.remove(&addr) {
                        for waiter in waiters {
                            let _ = waiter.send(Ok(payload.clone()));
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "failed to decode blob envelope"),
            }
            return;
        }

        if let Ok(topic) = topic_name.parse::<Topic>() {
            if let Some(list) = self.subscribers.get_mut(topic_name) {
                list.retain(|tx| !tx.is_closed());
                for tx in list.iter() {
                    let _ = tx.try_send(GossipMessage {
                        topic: topic.clone(),
                        payload: message.data.clone(),
                    });
                }
            }
        } else {
            debug!(topic = %topic_name, "message on unrecognized topic");
        }
    }
}
