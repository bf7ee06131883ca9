//! Log seals: signed tree heads and committee checkpoints.
//!
//! Both live in the core data model because the store persists them, the
//! log and committee produce them, and the scorer binds score records to
//! them. Signatures are opaque bytes here; signing and verification live
//! in credence-log / credence-committee.

use serde::{Deserialize, Serialize};

use crate::canonical::{self, Value};
use crate::error::CredenceError;
use crate::types::{EpochNumber, Hash32, KeyId, Timestamp, TreeId, TreeSize};

// ── SignedTreeHead ───────────────────────────────────────────────────────────

/// A log operator's signed statement about the root at a given size.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTreeHead {
    pub tree_id: TreeId,
    pub tree_size: TreeSize,
    pub root_hash: Hash32,
    pub timestamp: Timestamp,
    pub signer_key_id: KeyId,
    pub signature: Vec<u8>,
}

impl SignedTreeHead {
    /// The canonical bytes covered by the signature.
    pub fn signing_bytes(
        tree_id: TreeId,
        tree_size: TreeSize,
        root_hash: &Hash32,
        timestamp: Timestamp,
    ) -> Result<Vec<u8>, CredenceError> {
        canonical::canonical_bytes(&Value::map(vec![
            ("tree_id", Value::int(tree_id as i64)),
            ("tree_size", Value::int(tree_size as i64)),
            ("root_hash", Value::str(root_hash.to_hex())),
            ("timestamp", Value::int(timestamp)),
        ]))
    }

    /// Wire form: canonical bytes of the full STH.
    pub fn wire_bytes(&self) -> Result<Vec<u8>, CredenceError> {
        canonical::canonical_bytes(&Value::map(vec![
            ("tree_id", Value::int(self.tree_id as i64)),
            ("tree_size", Value::int(self.tree_size as i64)),
            ("root_hash", Value::str(self.root_hash.to_hex())),
            ("timestamp", Value::int(self.timestamp)),
            ("signer_key_id", Value::str(self.signer_key_id.0.to_hex())),
            ("signature", Value::str(hex::encode(&self.signature))),
        ]))
    }
}

// ── Checkpoint ───────────────────────────────────────────────────────────────

/// Threshold-signed seal over a log head, published once per epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch_number: EpochNumber,
    pub tree_id: TreeId,
    pub tree_size: TreeSize,
    pub root_hash: Hash32,
    pub committee_id: Hash32,
    pub signer_bitmap: Vec<u8>,
    pub aggregate_signature: Vec<u8>,
    pub timestamp: Timestamp,
}

impl Checkpoint {
    /// The canonical bytes the threshold signature covers.
    pub fn signing_bytes(
        tree_id: TreeId,
        tree_size: TreeSize,
        root_hash: &Hash32,
        epoch_number: EpochNumber,
    ) -> Result<Vec<u8>, CredenceError> {
        canonical::canonical_bytes(&Value::map(vec![
            ("tree_id", Value::int(tree_id as i64)),
            ("tree_size", Value::int(tree_size as i64)),
            ("root_hash", Value::str(root_hash.to_hex())),
            ("epoch_number", Value::int(epoch_number as i64)),
        ]))
    }

    /// Wire form: canonical bytes of the full checkpoint.
    pub fn wire_bytes(&self) -> Result<Vec<u8>, CredenceError> {
        canonical::canonical_bytes(&Value::map(vec![
            ("epoch_number", Value::int(self.epoch_number as i64)),
            ("tree_id", Value::int(self.tree_id as i64)),
            ("tree_size", Value::int(self.tree_size as i64)),
            ("root_hash", Value::str(self.root_hash.to_hex())),
            ("committee_id", Value::str(self.committee_id.to_hex())),
            ("signer_bitmap", Value::str(hex::encode(&self.signer_bitmap))),
            (
                "aggregate_signature",
                Value::str(hex::encode(&self.aggregate_signature)),
            ),
            ("timestamp", Value::int(self.timestamp)),
        ]))
    }
}
