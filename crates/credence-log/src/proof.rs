//! Proof bundles handed to relying parties.

use serde::{Deserialize, Serialize};

use credence_core::canonical::Value;
use credence_core::types::{Hash32, LeafIndex, TreeSize};

use crate::merkle::{verify_consistency, verify_inclusion};

/// Audit path binding one leaf into a tree of `tree_size` leaves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    pub leaf_hash: Hash32,
    pub leaf_index: LeafIndex,
    pub tree_size: TreeSize,
    pub audit_path: Vec<Hash32>,
}

impl InclusionProof {
    pub fn verify(&self, root: &Hash32) -> bool {
        verify_inclusion(
            &self.leaf_hash,
            self.leaf_index,
            self.tree_size,
            &self.audit_path,
            root,
        )
    }

    pub fn to_value(&self) -> Value {
        Value::map(vec![
            ("leaf_hash", Value::str(self.leaf_hash.to_hex())),
            ("leaf_index", Value::int(self.leaf_index as i64)),
            ("tree_size", Value::int(self.tree_size as i64)),
            (
                "audit_path",
                Value::seq(
                    self.audit_path
                        .iter()
                        .map(|h| Value::str(h.to_hex()))
                        .collect(),
                ),
            ),
        ])
    }
}

/// Proof that the tree at `to_size` extends the tree at `from_size`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyProof {
    pub from_size: TreeSize,
    pub to_size: TreeSize,
    pub path: Vec<Hash32>,
}

impl ConsistencyProof {
    pub fn verify(&self, from_root: &Hash32, to_root: &Hash32) -> bool {
        verify_consistency(self.from_size, self.to_size, from_root, to_root, &self.path)
    }

    pub fn to_value(&self) -> Value {
        Value::map(vec![
            ("from_size", Value::int(self.from_size as i64)),
            ("to_size", Value::int(self.to_size as i64)),
            (
                "path",
                Value::seq(self.path.iter().map(|h| Value::str(h.to_hex())).collect()),
            ),
        ])
    }
}
