//! The per-epoch signing state machine.
//!
//! ```text
//! WAITING_ROOT  --(STH fetched)-->  COLLECTING_PARTIALS
//! COLLECTING_PARTIALS --(t partials, same root)--> AGGREGATING
//! COLLECTING_PARTIALS --(timeout)--> DEGRADED (retry next epoch)
//! AGGREGATING --(aggregate ok)--> PUBLISHED
//! AGGREGATING --(verify fail)--> DEGRADED
//! ```
//!
//! Partials over a different root for the same `(tree_id, tree_size,
//! epoch_number)` are persisted as equivocation evidence and never
//! aggregated with the honest root. If two distinct roots independently
//! reach threshold, both checkpoints are produced and the epoch is flagged
//! byzantine; downstream scorers fall back to the last unambiguous
//! checkpoint.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use credence_core::error::CredenceError;
use credence_core::records::{Checkpoint, SignedTreeHead};
use credence_core::types::{EpochNumber, Hash32, Timestamp, TreeId, TreeSize};
use credence_crypto::{PartialSignature, ThresholdScheme};

use crate::evidence::PartialEquivocation;
use crate::sortition::Committee;

/// Where an epoch task currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpochPhase {
    WaitingRoot,
    CollectingPartials,
    Aggregating,
    Published,
    Degraded,
}

/// A partial signature in flight between members.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialMsg {
    pub epoch_number: EpochNumber,
    pub tree_id: TreeId,
    pub tree_size: TreeSize,
    pub root_hash: Hash32,
    pub signer_index: u32,
    pub partial: PartialSignature,
}

/// Result of a seal attempt.
#[derive(Clone, Debug)]
pub enum SealOutcome {
    /// No root has reached threshold yet.
    NotYet,
    /// Exactly one root sealed.
    Published(Checkpoint),
    /// Two distinct roots sealed; the epoch is unresolved downstream.
    Byzantine(Vec<Checkpoint>),
}

pub struct EpochState {
    epoch_number: EpochNumber,
    tree_id: TreeId,
    committee: Committee,
    /// Public threshold shares by signer index.
    member_publics: Vec<Vec<u8>>,
    scheme: Arc<dyn ThresholdScheme>,
    phase: EpochPhase,
    /// The head this member is signing, once fetched.
    sealed: Option<(TreeSize, Hash32)>,
    /// Inbox keyed by root: signer index → partial.
    inbox: BTreeMap<Hash32, BTreeMap<u32, PartialSignature>>,
    /// First root each member was seen signing.
    member_roots: HashMap<u32, (Hash32, PartialSignature)>,
    evidence: Vec<PartialEquivocation>,
}

impl EpochState {
    pub fn new(
        epoch_number: EpochNumber,
        tree_id: TreeId,
        committee: Committee,
        member_publics: Vec<Vec<u8>>,
        scheme: Arc<dyn ThresholdScheme>,
    ) -> Self {
        debug_assert_eq!(committee.size() as usize, member_publics.len());
        Self {
            epoch_number,
            tree_id,
            committee,
            member_publics,
            scheme,
            phase: EpochPhase::WaitingRoot,
            sealed: None,
            inbox: BTreeMap::new(),
            member_roots: HashMap::new(),
            evidence: Vec::new(),
        }
    }

    pub fn phase(&self) -> EpochPhase {
        self.phase
    }

    pub fn epoch_number(&self) -> EpochNumber {
        self.epoch_number
    }

    pub fn committee(&self) -> &Committee {
        &self.committee
    }

    pub fn evidence(&self) -> &[PartialEquivocation] {
        &self.evidence
    }

    /// Fix the head to sign from the log's latest STH at epoch start.
    pub fn observe_sth(&mut self, sth: &SignedTreeHead) -> Result<(), CredenceError> {
        if sth.tree_id != self.tree_id {
            return Err(CredenceError::SemanticInvalid(format!(
                "STH for tree {} in epoch task for tree {}",
                sth.tree_id, self.tree_id
            )));
        }
        if self.phase != EpochPhase::WaitingRoot {
            return Err(CredenceError::SemanticInvalid(
                "epoch already has a root".into(),
            ));
        }
        self.sealed = Some((sth.tree_size, sth.root_hash));
        self.phase = EpochPhase::CollectingPartials;
        Ok(())
    }

    /// Restart recovery: re-derive the task from the latest STH, drop
    /// partials whose root no longer matches. The caller re-signs.
    pub fn resume(&mut self, sth: &SignedTreeHead) {
        self.sealed = Some((sth.tree_size, sth.root_hash));
        self.inbox.retain(|root, _| *root == sth.root_hash);
        self.member_roots
            .retain(|_, (root, _)| *root == sth.root_hash);
        self.phase = EpochPhase::CollectingPartials;
        info!(
            epoch = self.epoch_number,
            tree_size = sth.tree_size,
            "epoch task re-derived from latest STH"
        );
    }

    /// Produce this member's partial over the sealed head.
    pub fn local_partial(
        &self,
        secret: &[u8],
        signer_index: u32,
    ) -> Result<PartialMsg, CredenceError> {
        let (tree_size, root_hash) = self.sealed.ok_or_else(|| {
            CredenceError::SemanticInvalid("no root fetched for this epoch yet".into())
        })?;
        let body =
            Checkpoint::signing_bytes(self.tree_id, tree_size, &root_hash, self.epoch_number)?;
        let partial = self.scheme.partial_sign(secret, signer_index, &body)?;
        Ok(PartialMsg {
            epoch_number: self.epoch_number,
            tree_id: self.tree_id,
            tree_size,
            root_hash,
            signer_index,
            partial,
        })
    }

    /// Accept a partial into the inbox. Returns the number of partials
    /// collected for that message's root.
    pub fn accept_partial(&mut self, msg: PartialMsg) -> Result<usize, CredenceError> {
        if msg.epoch_number != self.epoch_number || msg.tree_id != self.tree_id {
            return Err(CredenceError::SemanticInvalid(
                "partial for a different epoch or tree".into(),
            ));
        }
        let (tree_size, our_root) = self.sealed.ok_or_else(|| {
            CredenceError::SemanticInvalid("collecting before root fetched".into())
        })?;
        if msg.tree_size != tree_size {
            return Err(CredenceError::SemanticInvalid(format!(
                "partial over size {} but epoch sealed size {tree_size}",
                msg.tree_size
            )));
        }
        let index = msg.signer_index;
        let public = self
            .member_publics
            .get(index as usize)
            .ok_or_else(|| CredenceError::Malformed(format!("unknown signer index {index}")))?;

        let body =
            Checkpoint::signing_bytes(self.tree_id, tree_size, &msg.root_hash, self.epoch_number)?;
        self.scheme.verify_partial(public, &body, &msg.partial)?;

        // Equivocation check: one member, two roots.
        match self.member_roots.get(&index) {
            Some((first_root, first_partial)) if *first_root != msg.root_hash => {
                let member = self.committee.seats[index as usize].operator.clone();
                warn!(
                    epoch = self.epoch_number,
                    %member,
                    "member signed two roots; recording equivocation evidence"
                );
                self.evidence.push(PartialEquivocation {
                    epoch_number: self.epoch_number,
                    tree_id: self.tree_id,
                    tree_size,
                    member,
                    first_root: *first_root,
                    second_root: msg.root_hash,
                    first: first_partial.clone(),
                    second: msg.partial.clone(),
                });
            }
            Some(_) => {}
            None => {
                self.member_roots
                    .insert(index, (msg.root_hash, msg.partial.clone()));
            }
        }

        if msg.root_hash != our_root {
            // Divergent root: persisted (kept in the inbox and surfaced as
            // evidence by the caller), never merged with ours.
            warn!(
                epoch = self.epoch_number,
                root = %msg.root_hash,
                "partial over divergent root"
            );
        }

        let slot = self.inbox.entry(msg.root_hash).or_default();
        slot.entry(index).or_insert(msg.partial);
        Ok(slot.len())
    }

    /// Aggregate any root that reached threshold.
    pub fn try_seal(&mut self, timestamp: Timestamp) -> Result<SealOutcome, CredenceError> {
        let Some((tree_size, _)) = self.sealed else {
            return Ok(SealOutcome::NotYet);
        };
        let threshold = self.committee.threshold();
        let ready: Vec<Hash32> = self
            .inbox
            .iter()
            .filter(|(_, partials)| partials.len() as u32 >= threshold)
            .map(|(root, _)| *root)
            .collect();
        if ready.is_empty() {
            return Ok(SealOutcome::NotYet);
        }

        self.phase = EpochPhase::Aggregating;
        let mut checkpoints = Vec::with_capacity(ready.len());
        for root in &ready {
            let partials: Vec<PartialSignature> =
                self.inbox[root].values().cloned().collect();
            let aggregate = self.scheme.aggregate(self.committee.size(), &partials)?;
            let body =
                Checkpoint::signing_bytes(self.tree_id, tree_size, root, self.epoch_number)?;
            if let Err(e) = self.scheme.verify_aggregate(
                &self.member_publics,
                threshold,
                &body,
                &aggregate,
            ) {
                warn!(epoch = self.epoch_number, error = %e, "aggregate failed verification");
                self.phase = EpochPhase::Degraded;
                return Err(e);
            }
            checkpoints.push(Checkpoint {
                epoch_number: self.epoch_number,
                tree_id: self.tree_id,
                tree_size,
                root_hash: *root,
                committee_id: self.committee.id(),
                signer_bitmap: aggregate.bitmap.to_bytes(),
                aggregate_signature: aggregate.bytes,
                timestamp,
            });
        }

        if checkpoints.len() == 1 {
            self.phase = EpochPhase::Published;
            info!(
                epoch = self.epoch_number,
                tree_size, "checkpoint sealed"
            );
            Ok(SealOutcome::Published(checkpoints.pop().expect("len is 1")))
        } else {
            self.phase = EpochPhase::Degraded;
            warn!(
                epoch = self.epoch_number,
                roots = checkpoints.len(),
                "two roots reached threshold; committee byzantine for this epoch"
            );
            Ok(SealOutcome::Byzantine(checkpoints))
        }
    }

    /// Collection window elapsed without a sealable root.
    pub fn timeout(&mut self) {
        if matches!(
            self.phase,
            EpochPhase::WaitingRoot | EpochPhase::CollectingPartials
        ) {
            warn!(epoch = self.epoch_number, "epoch timed out; degraded, retry next epoch");
            self.phase = EpochPhase::Degraded;
        }
    }
}
