//! VRF sortition: deterministic committee sampling for each epoch.
//!
//! `seed_e = SHA256(previous_checkpoint_root ‖ epoch_number)`. Each eligible
//! operator evaluates its VRF on the seed and enters iff `output < target`,
//! where `target` is tuned so the expected committee size meets the
//! configured N. The same `(seed, eligible_set)` always yields the same
//! committee.

use sha2::{Digest, Sha256};

use credence_core::error::CredenceError;
use credence_core::types::{EpochNumber, Hash32, Id};
use credence_crypto::{vrf_verify, VrfKeyPair, VrfOutput, VrfProof};
use ed25519_dalek::VerifyingKey;

use crate::operators::{committee_id, EligibleSet};

/// Public sortition seed for an epoch.
pub fn epoch_seed(previous_checkpoint_root: &Hash32, epoch_number: EpochNumber) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(previous_checkpoint_root.as_bytes());
    hasher.update(epoch_number.to_be_bytes());
    Hash32(hasher.finalize().into())
}

/// Inclusion target over the first 8 VRF output bytes: tuned so an
/// eligible set of `eligible` operators yields `expected_size` members in
/// expectation. A target of `u64::MAX` admits everyone.
pub fn sortition_target(eligible: usize, expected_size: usize) -> u64 {
    if eligible == 0 || expected_size >= eligible {
        return u64::MAX;
    }
    (u64::MAX / eligible as u64).saturating_mul(expected_size as u64)
}

/// One seat won through sortition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitteeSeat {
    pub operator: Id,
    pub output: VrfOutput,
    pub proof: VrfProof,
}

/// A formed committee for one epoch. Members are ordered by ascending
/// operator id; the position is the member's signer index in the
/// threshold scheme.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Committee {
    pub epoch_number: EpochNumber,
    pub seed: Hash32,
    pub seats: Vec<CommitteeSeat>,
}

impl Committee {
    pub fn id(&self) -> Hash32 {
        let ids: Vec<Id> = self.seats.iter().map(|s| s.operator.clone()).collect();
        committee_id(&ids)
    }

    pub fn size(&self) -> u32 {
        self.seats.len() as u32
    }

    /// Threshold t = ceil(2N/3).
    pub fn threshold(&self) -> u32 {
        let n = self.size();
        (2 * n + 2) / 3
    }

    pub fn signer_index(&self, operator: &Id) -> Option<u32> {
        self.seats
            .iter()
            .position(|s| s.operator == *operator)
            .map(|i| i as u32)
    }
}

/// Member side: evaluate the VRF and claim a seat if under target.
pub fn try_enter(
    operator: &Id,
    vrf: &VrfKeyPair,
    seed: &Hash32,
    target: u64,
) -> Option<CommitteeSeat> {
    let (output, proof) = vrf.eval(seed);
    if output.as_u64() < target {
        Some(CommitteeSeat {
            operator: operator.clone(),
            output,
            proof,
        })
    } else {
        None
    }
}

/// Verifier side: check every claimed seat against the eligible set and
/// form the committee. Rejects seats from ineligible operators, invalid
/// proofs, and outputs at or above target.
pub fn form_committee(
    epoch_number: EpochNumber,
    seed: Hash32,
    eligible: &EligibleSet,
    target: u64,
    claimed: Vec<CommitteeSeat>,
) -> Result<Committee, CredenceError> {
    let mut seats = Vec::with_capacity(claimed.len());
    for seat in claimed {
        let operator = eligible.get(&seat.operator).ok_or_else(|| {
            CredenceError::ProofInvalid(format!("operator {} not eligible", seat.operator))
        })?;
        let vk = VerifyingKey::from_bytes(&operator.vrf_public)
            .map_err(|_| CredenceError::Malformed("operator VRF key invalid".into()))?;
        vrf_verify(&vk, &seed, &seat.output, &seat.proof)?;
        if seat.output.as_u64() >= target {
            return Err(CredenceError::ProofInvalid(format!(
                "operator {} output above sortition target",
                seat.operator
            )));
        }
        seats.push(seat);
    }
    seats.sort_by(|a, b| a.operator.cmp(&b.operator));
    seats.dedup_by(|a, b| a.operator == b.operator);
    Ok(Committee {
        epoch_number,
        seed,
        seats,
    })
}
