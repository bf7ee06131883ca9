/// Configuration for the libp2p gossip transport.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Local listen address (e.g. "/ip4/0.0.0.0/tcp/7878").
    pub listen_addr: String,
    /// Bootstrap peer multiaddresses.
    pub bootstrap_peers: Vec<String>,
    /// Protocol version string advertised to peers.
    pub protocol_version: String,
    /// Per-subscriber inbound buffer before back-pressure.
    pub inbound_buffer: usize,
    /// Outbound queue depth before `publish` reports `Busy`.
    pub outbound_buffer: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/7878".into(),
            bootstrap_peers: Vec::new(),
            protocol_version: "/credence/1.0.0".into(),
            inbound_buffer: 256,
            outbound_buffer: 256,
        }
    }
}
