//! The rule-set registry: governance-signed bundles, time-locked activation,
//! version pinning.

use std::sync::Arc;

use ed25519_dalek::{Signature, VerifyingKey};
use tracing::info;

use credence_core::error::CredenceError;
use credence_core::types::{Hash32, KeyId, Timestamp};
use credence_store::EventStore;

use crate::ruleset::{Ruleset, SignedRuleset};

const SECS_PER_DAY: i64 = 86_400;

/// Verifies, persists, and serves rule sets.
pub struct RulesetRegistry {
    store: Arc<dyn EventStore>,
    governance: Vec<(KeyId, VerifyingKey)>,
}

impl RulesetRegistry {
    pub fn new(store: Arc<dyn EventStore>, governance_keys: Vec<VerifyingKey>) -> Self {
        let governance = governance_keys
            .into_iter()
            .map(|vk| {
                use sha2::{Digest, Sha256};
                let mut hasher = Sha256::new();
                hasher.update(vk.as_bytes());
                (KeyId(Hash32(hasher.finalize().into())), vk)
            })
            .collect();
        Self { store, governance }
    }

    /// Verify and persist a published bundle.
    ///
    /// Rejects unknown signers, bad signatures, and bundles whose
    /// `valid_from` violates the time-lock relative to `published_at`.
    pub fn publish(
        &self,
        signed: &SignedRuleset,
        published_at: Timestamp,
    ) -> Result<(), CredenceError> {
        let vk = self
            .governance
            .iter()
            .find(|(key_id, _)| *key_id == signed.signer_key_id)
            .map(|(_, vk)| vk)
            .ok_or_else(|| {
                CredenceError::BadSignature
            })?;

        let body = signed.signing_bytes()?;
        let sig_bytes: [u8; 64] = signed
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| CredenceError::Malformed("governance signature must be 64 bytes".into()))?;
        vk.verify_strict(&body, &Signature::from_bytes(&sig_bytes))
            .map_err(|_| CredenceError::BadSignature)?;

        let lock_floor =
            published_at + signed.ruleset.time_lock_days as i64 * SECS_PER_DAY;
        if signed.ruleset.valid_from < lock_floor {
            return Err(CredenceError::SemanticInvalid(format!(
                "valid_from {} violates time-lock (publication {published_at} + {} days)",
                signed.ruleset.valid_from, signed.ruleset.time_lock_days
            )));
        }

        self.store
            .put_ruleset_bytes(&signed.ruleset.id, &signed.wire_bytes()?)?;
        info!(
            id = %signed.ruleset.id,
            valid_from = signed.ruleset.valid_from,
            "ruleset published (pending until valid_from)"
        );
        Ok(())
    }

    /// The rule set active at `at_time`: the persisted bundle with the
    /// greatest `valid_from ≤ at_time` (ties broken by id, ascending).
    pub fn active(&self, at_time: Timestamp) -> Result<Ruleset, CredenceError> {
        let mut best: Option<Ruleset> = None;
        for id in self.store.ruleset_ids()? {
            let Some(bytes) = self.store.get_ruleset_bytes(&id)? else {
                continue;
            };
            let signed = SignedRuleset::from_wire(&bytes)?;
            if signed.ruleset.valid_from > at_time {
                continue; // still pending
            }
            let better = match &best {
                None => true,
                Some(current) => {
                    (signed.ruleset.valid_from, &signed.ruleset.id)
                        > (current.valid_from, &current.id)
                }
            };
            if better {
                best = Some(signed.ruleset);
            }
        }
        best.ok_or_else(|| CredenceError::NotFound(format!("no ruleset active at {at_time}")))
    }

    /// Load a pinned rule set, verifying its content hash.
    pub fn pin(&self, id: &str, content_hash: &Hash32) -> Result<Ruleset, CredenceError> {
        let bytes = self
            .store
            .get_ruleset_bytes(id)?
            .ok_or_else(|| CredenceError::NotFound(format!("ruleset {id}")))?;
        let signed = SignedRuleset::from_wire(&bytes)?;
        let actual = signed.ruleset.content_hash()?;
        if actual != *content_hash {
            return Err(CredenceError::CanonicalMismatch);
        }
        Ok(signed.ruleset)
    }
}
