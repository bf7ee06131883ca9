//! The scorer tail: apply each published checkpoint and persist fresh
//! score records for everything the update recomputed.

use tokio::sync::mpsc;
use tracing::{info, warn};

use credence_core::error::CredenceError;
use credence_core::records::Checkpoint;
use credence_scorer::ScorerEngine;

pub struct ScorerTail {
    engine: ScorerEngine,
}

impl ScorerTail {
    pub fn new(engine: ScorerEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ScorerEngine {
        &self.engine
    }

    /// Apply one checkpoint and persist records for the recomputed set.
    pub fn apply(&mut self, checkpoint: &Checkpoint) -> Result<usize, CredenceError> {
        let affected = self.engine.apply_checkpoint(checkpoint)?;
        for (id, context) in &affected {
            let record = self.engine.score_record(id, *context, 0)?;
            self.engine.persist_record(&record)?;
        }
        Ok(affected.len())
    }

    /// Drain a channel of checkpoints until it closes. An unresolved or
    /// out-of-order checkpoint is skipped; the last good state stands.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Checkpoint>) {
        while let Some(checkpoint) = rx.recv().await {
            match self.apply(&checkpoint) {
                Ok(recomputed) => {
                    info!(
                        epoch = checkpoint.epoch_number,
                        recomputed, "scorer caught up to checkpoint"
                    );
                }
                Err(e) => warn!(
                    epoch = checkpoint.epoch_number,
                    error = %e,
                    "checkpoint not applied"
                ),
            }
        }
    }
}
