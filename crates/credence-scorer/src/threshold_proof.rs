//! Threshold-proof interface: "score ≥ θ" without revealing factors.
//!
//! The zero-knowledge construction is external; the core only fixes the
//! statement shape. A proof is opaque bytes bound to `(id, context, θ,
//! nonce, checkpoint, ruleset_hash)`.

use credence_core::error::CredenceError;
use credence_core::fixed::Fixed;
use credence_core::records::Checkpoint;
use credence_core::types::{Context, Hash32, Id};

pub trait ThresholdProver: Send + Sync {
    /// Assert `score(id, context) ≥ θ` at the prover's current checkpoint.
    fn prove(
        &self,
        id: &Id,
        context: Context,
        theta: Fixed,
        nonce: &[u8],
    ) -> Result<Vec<u8>, CredenceError>;

    /// Check an opaque proof against the checkpoint and pinned ruleset the
    /// verifier trusts.
    fn verify(
        &self,
        proof: &[u8],
        checkpoint: &Checkpoint,
        ruleset_hash: &Hash32,
        theta: Fixed,
        nonce: &[u8],
    ) -> Result<bool, CredenceError>;
}
