//! Committee-level equivocation evidence: one member, two roots.

use serde::{Deserialize, Serialize};

use credence_core::canonical::{self, Value};
use credence_core::error::CredenceError;
use credence_core::types::{ContentAddress, EpochNumber, Hash32, Id, TreeId, TreeSize};
use credence_crypto::PartialSignature;

/// A member emitted partial signatures over two different roots for the
/// same `(tree_id, tree_size, epoch_number)`. Persisted and publishable;
/// never aggregated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialEquivocation {
    pub epoch_number: EpochNumber,
    pub tree_id: TreeId,
    pub tree_size: TreeSize,
    pub member: Id,
    pub first_root: Hash32,
    pub second_root: Hash32,
    pub first: PartialSignature,
    pub second: PartialSignature,
}

impl PartialEquivocation {
    pub fn wire_bytes(&self) -> Result<Vec<u8>, CredenceError> {
        canonical::canonical_bytes(&Value::map(vec![
            ("kind", Value::str("partial_equivocation")),
            ("epoch_number", Value::int(self.epoch_number as i64)),
            ("tree_id", Value::int(self.tree_id as i64)),
            ("tree_size", Value::int(self.tree_size as i64)),
            ("member", Value::str(self.member.as_str())),
            ("first_root", Value::str(self.first_root.to_hex())),
            ("second_root", Value::str(self.second_root.to_hex())),
            ("first_partial", Value::str(hex::encode(&self.first.bytes))),
            ("second_partial", Value::str(hex::encode(&self.second.bytes))),
        ]))
    }

    pub fn content_address(&self) -> Result<ContentAddress, CredenceError> {
        Ok(canonical::content_address_of_bytes(&self.wire_bytes()?))
    }
}
