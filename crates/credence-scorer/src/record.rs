//! Score records: what relying parties actually receive.
//!
//! A record binds a score to a checkpoint and a pinned ruleset, commits to
//! the factor values, and bundles inclusion / consistency / status proofs
//! for everything counted. A relying party never sees a partially computed
//! score: a record is `ok` or `stale(last_good_checkpoint, reason)`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use credence_core::canonical::{self, Value};
use credence_core::error::CredenceError;
use credence_core::fixed::Fixed;
use credence_core::records::Checkpoint;
use credence_core::types::{ContentAddress, Context, Epoch, EpochNumber, Hash32, Id};
use credence_log::{ConsistencyProof, InclusionProof};
use credence_rules::Ruleset;

use crate::score::ScoreBreakdown;

/// Proof that an attestation's revocation bit was read from the issuer's
/// committed status list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusProof {
    pub issuer: Id,
    pub epoch: Epoch,
    pub bitmap_ref: ContentAddress,
    pub index: u32,
    pub revoked: bool,
}

impl StatusProof {
    fn to_value(&self) -> Value {
        Value::map(vec![
            ("issuer", Value::str(self.issuer.as_str())),
            ("epoch", Value::str(self.epoch.to_string())),
            ("bitmap_ref", Value::str(self.bitmap_ref.to_string())),
            ("index", Value::int(self.index as i64)),
            ("revoked", Value::Bool(self.revoked)),
        ])
    }
}

/// Whether the scorer could stand behind a fresh value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    Ok,
    /// A required blob was missing or invalid; the score is the one from
    /// the last checkpoint where all inputs were available.
    Stale {
        last_good: EpochNumber,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub id: Id,
    pub context: Context,
    pub status: RecordStatus,
    pub score: Fixed,
    pub ruleset_id: String,
    pub ruleset_hash: Hash32,
    pub checkpoint: Checkpoint,
    /// SHA2-256 over the canonical decimal of each factor, in K A V R T
    /// order.
    pub factor_commitments: [Hash32; 5],
    pub inclusion_proofs: Vec<InclusionProof>,
    pub consistency_proof: Option<ConsistencyProof>,
    pub status_proofs: Vec<StatusProof>,
}

/// Commit to one factor value.
pub fn factor_commitment(value: Fixed) -> Result<Hash32, CredenceError> {
    let bytes = canonical::canonical_bytes(&value.to_value())?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(Hash32(hasher.finalize().into()))
}

/// Commitments for a full breakdown, K A V R T order.
pub fn factor_commitments(breakdown: &ScoreBreakdown) -> Result<[Hash32; 5], CredenceError> {
    Ok([
        factor_commitment(breakdown.k)?,
        factor_commitment(breakdown.a)?,
        factor_commitment(breakdown.v)?,
        factor_commitment(breakdown.r)?,
        factor_commitment(breakdown.t)?,
    ])
}

impl ScoreRecord {
    pub fn to_value(&self) -> Value {
        let status = match &self.status {
            RecordStatus::Ok => Value::map(vec![("state", Value::str("ok"))]),
            RecordStatus::Stale { last_good, reason } => Value::map(vec![
                ("state", Value::str("stale")),
                ("last_good_checkpoint", Value::int(*last_good as i64)),
                ("reason", Value::str(reason)),
            ]),
        };
        let checkpoint = Value::map(vec![
            ("epoch", Value::int(self.checkpoint.epoch_number as i64)),
            ("tree_id", Value::int(self.checkpoint.tree_id as i64)),
            ("tree_size", Value::int(self.checkpoint.tree_size as i64)),
            ("root_hash", Value::str(self.checkpoint.root_hash.to_hex())),
            (
                "committee_id",
                Value::str(self.checkpoint.committee_id.to_hex()),
            ),
            (
                "signature",
                Value::str(hex::encode(&self.checkpoint.aggregate_signature)),
            ),
        ]);
        let commitments = Value::map(vec![
            ("k", Value::str(self.factor_commitments[0].to_hex())),
            ("a", Value::str(self.factor_commitments[1].to_hex())),
            ("v", Value::str(self.factor_commitments[2].to_hex())),
            ("r", Value::str(self.factor_commitments[3].to_hex())),
            ("t", Value::str(self.factor_commitments[4].to_hex())),
        ]);
        Value::map(vec![
            ("id", Value::str(self.id.as_str())),
            ("context", Value::str(self.context.as_str())),
            ("status", status),
            ("score", self.score.to_value()),
            ("score_quantum", Value::Decimal(
                canonical::Decimal::new(1, 6).expect("1e-6 is representable"),
            )),
            (
                "ruleset",
                Value::map(vec![
                    ("id", Value::str(&self.ruleset_id)),
                    ("content_hash", Value::str(self.ruleset_hash.to_hex())),
                ]),
            ),
            ("checkpoint", checkpoint),
            ("factor_commitments", commitments),
            (
                "inclusion_proofs",
                Value::seq(self.inclusion_proofs.iter().map(|p| p.to_value()).collect()),
            ),
            (
                "consistency_proof",
                self.consistency_proof
                    .as_ref()
                    .map(|p| p.to_value())
                    .unwrap_or(Value::Null),
            ),
            (
                "status_proofs",
                Value::seq(self.status_proofs.iter().map(|p| p.to_value()).collect()),
            ),
        ])
    }

    /// Wire form. Score records can be large; they are exempt from the
    /// 16 KiB event bound only in that callers persist them as blobs.
    pub fn wire_bytes(&self) -> Result<Vec<u8>, CredenceError> {
        canonical::canonical_bytes(&self.to_value())
    }

    /// Verify every inclusion proof against the record's own checkpoint.
    pub fn verify_inclusions(&self) -> Result<(), CredenceError> {
        for proof in &self.inclusion_proofs {
            if proof.tree_size != self.checkpoint.tree_size {
                return Err(CredenceError::ProofInvalid(
                    "inclusion proof not at checkpoint size".into(),
                ));
            }
            if !proof.verify(&self.checkpoint.root_hash) {
                return Err(CredenceError::ProofInvalid(format!(
                    "inclusion proof for leaf {} rejected",
                    proof.leaf_index
                )));
            }
        }
        Ok(())
    }

    /// Verify the consistency proof against a head the relying party
    /// already trusts.
    pub fn verify_consistency_from(&self, known_root: &Hash32) -> Result<(), CredenceError> {
        let proof = self
            .consistency_proof
            .as_ref()
            .ok_or_else(|| CredenceError::ProofInvalid("no consistency proof bundled".into()))?;
        if proof.to_size != self.checkpoint.tree_size {
            return Err(CredenceError::ProofInvalid(
                "consistency proof not anchored at checkpoint size".into(),
            ));
        }
        if !proof.verify(known_root, &self.checkpoint.root_hash) {
            return Err(CredenceError::ProofInvalid(
                "consistency proof rejected".into(),
            ));
        }
        Ok(())
    }

    /// The migration check relying parties run on the pinned ruleset.
    pub fn verify_ruleset_pin(&self, ruleset: &Ruleset) -> Result<(), CredenceError> {
        if ruleset.id != self.ruleset_id || ruleset.content_hash()? != self.ruleset_hash {
            return Err(CredenceError::CanonicalMismatch);
        }
        if ruleset.valid_from > self.checkpoint.timestamp {
            return Err(CredenceError::SemanticInvalid(
                "ruleset not yet valid at checkpoint time".into(),
            ));
        }
        Ok(())
    }
}
