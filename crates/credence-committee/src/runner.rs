//! The async task driving one committee member through an epoch.
//!
//! One task per member: fetch the latest STH, emit the local partial,
//! collect peer partials from a bounded inbox, seal when threshold is met,
//! persist the checkpoint and any equivocation evidence. On a byzantine
//! outcome the conflicting checkpoints are returned for publication but
//! never persisted under `checkpoint/<epoch>`, so readers naturally fall
//! back to the last unambiguous checkpoint.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::{info, warn};

use credence_core::constants::{EPOCH_INTERVAL_SECS, EPOCH_JITTER_SECS};
use credence_core::error::CredenceError;
use credence_core::types::{EpochNumber, Hash32, Id, TreeId};
use credence_crypto::ThresholdScheme;
use credence_store::EventStore;
use zeroize::Zeroizing;

use crate::epoch::{EpochState, SealOutcome};
pub use crate::epoch::PartialMsg;
use crate::sortition::Committee;

/// Target delay to the next epoch with deterministic jitter in
/// [−EPOCH_JITTER_SECS, +EPOCH_JITTER_SECS], derived from the epoch seed so
/// every member agrees on the cadence.
pub fn next_epoch_delay(seed: &Hash32) -> Duration {
    let mut hasher = Sha256::new();
    hasher.update(b"credence-cadence");
    hasher.update(seed.as_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    let raw = u64::from_be_bytes(digest[..8].try_into().expect("32 >= 8"));
    let jitter = (raw % (2 * EPOCH_JITTER_SECS + 1)) as i64 - EPOCH_JITTER_SECS as i64;
    Duration::from_secs((EPOCH_INTERVAL_SECS as i64 + jitter).max(1) as u64)
}

pub struct CommitteeRunner {
    store: Arc<dyn EventStore>,
    scheme: Arc<dyn ThresholdScheme>,
    tree_id: TreeId,
    committee: Committee,
    member_publics: Vec<Vec<u8>>,
    local_operator: Id,
    local_secret: Zeroizing<Vec<u8>>,
    inbox: mpsc::Receiver<PartialMsg>,
    outbound: mpsc::Sender<PartialMsg>,
}

impl CommitteeRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn EventStore>,
        scheme: Arc<dyn ThresholdScheme>,
        tree_id: TreeId,
        committee: Committee,
        member_publics: Vec<Vec<u8>>,
        local_operator: Id,
        local_secret: Vec<u8>,
        inbox: mpsc::Receiver<PartialMsg>,
        outbound: mpsc::Sender<PartialMsg>,
    ) -> Self {
        Self {
            store,
            scheme,
            tree_id,
            committee,
            member_publics,
            local_operator,
            local_secret: Zeroizing::new(local_secret),
            inbox,
            outbound,
        }
    }

    /// Drive one epoch to completion or degradation.
    pub async fn run_epoch(
        &mut self,
        epoch_number: EpochNumber,
        collect_window: Duration,
    ) -> Result<SealOutcome, CredenceError> {
        let signer_index = self
            .committee
            .signer_index(&self.local_operator)
            .ok_or_else(|| {
                CredenceError::SemanticInvalid("local operator not in this committee".into())
            })?;

        let mut state = EpochState::new(
            epoch_number,
            self.tree_id,
            self.committee.clone(),
            self.member_publics.clone(),
            self.scheme.clone(),
        );

        // WAITING_ROOT → COLLECTING_PARTIALS.
        let sth = self
            .store
            .latest_sth()?
            .ok_or_else(|| CredenceError::NotFound("log has no STH yet".into()))?;
        state.observe_sth(&sth)?;

        // Contribute and broadcast the local partial.
        let local = state.local_partial(&self.local_secret, signer_index)?;
        state.accept_partial(local.clone())?;
        if self.outbound.send(local).await.is_err() {
            warn!(epoch = epoch_number, "partial broadcast channel closed");
        }

        let deadline = tokio::time::Instant::now() + collect_window;
        let outcome = loop {
            match self.try_seal_now(&mut state)? {
                SealOutcome::NotYet => {}
                sealed => break sealed,
            }
            tokio::select! {
                msg = self.inbox.recv() => match msg {
                    Some(msg) => {
                        if msg.epoch_number != epoch_number {
                            continue; // stale traffic from an earlier epoch
                        }
                        if let Err(e) = state.accept_partial(msg) {
                            warn!(epoch = epoch_number, error = %e, "partial rejected");
                        }
                    }
                    None => {
                        state.timeout();
                        break SealOutcome::NotYet;
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    state.timeout();
                    break SealOutcome::NotYet;
                }
            }
        };

        // Persist evidence regardless of outcome.
        for evidence in state.evidence() {
            let bytes = evidence.wire_bytes()?;
            let addr = self.store.put_blob(&bytes)?;
            info!(epoch = epoch_number, %addr, "equivocation evidence persisted");
        }

        match &outcome {
            SealOutcome::Published(checkpoint) => {
                self.store.put_checkpoint(checkpoint)?;
                info!(
                    epoch = epoch_number,
                    tree_size = checkpoint.tree_size,
                    "checkpoint persisted"
                );
            }
            SealOutcome::Byzantine(checkpoints) => {
                warn!(
                    epoch = epoch_number,
                    roots = checkpoints.len(),
                    "unresolved epoch: conflicting checkpoints withheld from store"
                );
            }
            SealOutcome::NotYet => {
                info!(epoch = epoch_number, "epoch degraded; retry next epoch");
            }
        }
        Ok(outcome)
    }

    fn try_seal_now(&self, state: &mut EpochState) -> Result<SealOutcome, CredenceError> {
        match state.try_seal(Utc::now().timestamp()) {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "seal attempt failed; epoch degraded");
                Ok(SealOutcome::NotYet)
            }
        }
    }
}
