//! The operator eligibility registry read by sortition.
//!
//! Eligibility for epoch `e` is operator reputation ≥ θ_op at `e−1`,
//! against the current ruleset. Reputation is an input here, never derived.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use credence_core::fixed::Fixed;
use credence_core::types::{Hash32, Id};

/// One registered checkpoint operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorRecord {
    pub id: Id,
    /// Ed25519 VRF public key bytes.
    pub vrf_public: [u8; 32],
    /// Public share for the threshold scheme (opaque to this crate).
    pub threshold_public: Vec<u8>,
    /// Operator reputation as of the previous epoch.
    pub reputation: Fixed,
}

/// The operators eligible to enter sortition for one epoch, in a canonical
/// order (ascending id) so sampling is reproducible.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EligibleSet {
    operators: Vec<OperatorRecord>,
}

impl EligibleSet {
    /// Filter `registered` down to reputation ≥ `threshold` and sort by id.
    pub fn select(registered: Vec<OperatorRecord>, threshold: Fixed) -> Self {
        let mut operators: Vec<OperatorRecord> = registered
            .into_iter()
            .filter(|op| op.reputation >= threshold)
            .collect();
        operators.sort_by(|a, b| a.id.cmp(&b.id));
        operators.dedup_by(|a, b| a.id == b.id);
        Self { operators }
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperatorRecord> {
        self.operators.iter()
    }

    pub fn get(&self, id: &Id) -> Option<&OperatorRecord> {
        self.operators.iter().find(|op| op.id == *id)
    }
}

/// Stable identifier of a committee: SHA2-256 over the ascending member ids.
pub fn committee_id(member_ids: &[Id]) -> Hash32 {
    let mut sorted: Vec<&Id> = member_ids.iter().collect();
    sorted.sort();
    let mut hasher = Sha256::new();
    for id in sorted {
        hasher.update(id.as_str().as_bytes());
        hasher.update([0u8]);
    }
    Hash32(hasher.finalize().into())
}
