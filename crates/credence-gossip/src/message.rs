use serde::{Deserialize, Serialize};

use credence_core::types::ContentAddress;

/// Messages exchanged over the Credence gossip fabric.
///
/// Event, ruleset, and checkpoint payloads are the canonical wire bytes of
/// the object itself; the envelope adds only routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipEnvelope {
    /// A freshly signed event (canonical bytes, no wrapper).
    NewEvent { payload: Vec<u8> },

    /// An issuer's new revocation status bitmap.
    NewStatusList {
        issuer: String,
        epoch: String,
        payload: Vec<u8>,
    },

    /// A governance-signed ruleset bundle.
    NewRuleset { payload: Vec<u8> },

    /// A threshold-sealed checkpoint (canonical bytes).
    NewCheckpoint { payload: Vec<u8> },

    /// Point-to-point: ask peers for a blob by content address.
    RequestBlob { addr: ContentAddress },

    /// Point-to-point: answer a blob request.
    BlobResponse {
        addr: ContentAddress,
        payload: Vec<u8>,
    },
}

impl GossipEnvelope {
    /// Serialize for transport propagation.
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("GossipEnvelope serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credence_core::types::Hash32;

    #[test]
    fn envelope_round_trips_through_bincode() {
        let envelope = GossipEnvelope::RequestBlob {
            addr: ContentAddress::from_digest(Hash32([5; 32])),
        };
        let bytes = envelope.to_bytes();
        let back = GossipEnvelope::from_bytes(&bytes).unwrap();
        match back {
            GossipEnvelope::RequestBlob { addr } => {
                assert_eq!(addr, ContentAddress::from_digest(Hash32([5; 32])));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
