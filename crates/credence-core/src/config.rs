use serde::{Deserialize, Serialize};

use crate::constants::{
    BATCH_WINDOW_MS, DECAY_TABLE_HORIZON_DAYS, EPOCH_INTERVAL_SECS, MAX_BATCH, MIN_BATCH,
};

/// Operational knobs for the core. The scoring parameters themselves live
/// in the signed ruleset; this struct only tunes machinery. No environment
/// variables are consumed by the core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Micro-batch window for the log appender (milliseconds).
    pub batch_window_ms: u64,
    /// Leaves per append batch before an early flush.
    pub max_batch: usize,
    /// Lower bound documented for operators; batches smaller than this
    /// still flush when the window closes.
    pub min_batch: usize,
    /// Expected committee size fed into the sortition target.
    pub committee_size_target: usize,
    /// How far decay tables are meaningful before a factor reads as zero.
    pub decay_horizon_days: u32,
    /// Target interval between checkpoints (seconds).
    pub epoch_interval_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: BATCH_WINDOW_MS,
            max_batch: MAX_BATCH,
            min_batch: MIN_BATCH,
            committee_size_target: 5,
            decay_horizon_days: DECAY_TABLE_HORIZON_DAYS,
            epoch_interval_secs: EPOCH_INTERVAL_SECS,
        }
    }
}
