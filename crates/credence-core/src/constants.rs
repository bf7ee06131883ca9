//! ─── Credence Protocol Constants ────────────────────────────────────────────
//!
//! Consensus-critical limits and domain prefixes. Changing any value here is
//! a wire-format break.

// ── Canonical encoding ───────────────────────────────────────────────────────

/// Hard upper bound on the canonical byte length of any single value.
pub const MAX_CANONICAL_BYTES: usize = 16 * 1024;

/// Multihash code for SHA2-256.
pub const MULTIHASH_SHA2_256: u8 = 0x12;

/// Multihash digest length for SHA2-256.
pub const MULTIHASH_LEN_32: u8 = 0x20;

/// Multibase prefix for base58btc (the project's chosen multibase).
pub const MULTIBASE_BASE58BTC: char = 'z';

// ── Events ───────────────────────────────────────────────────────────────────

/// Exact nonce length in bytes (before base64 encoding).
pub const NONCE_LEN: usize = 12;

/// Ingestion accepts `issued_at` no further than this many seconds in the past.
pub const CLOCK_SKEW_PAST_SECS: i64 = 24 * 3600;

/// Ingestion accepts `issued_at` no further than this many seconds ahead.
pub const CLOCK_SKEW_FUTURE_SECS: i64 = 5 * 60;

// ── Transparency log ─────────────────────────────────────────────────────────

/// Domain-separation prefix for leaf hashes (RFC 6962).
pub const LEAF_PREFIX: u8 = 0x00;

/// Domain-separation prefix for interior node hashes (RFC 6962).
pub const NODE_PREFIX: u8 = 0x01;

/// Micro-batch window for the appender (milliseconds).
pub const BATCH_WINDOW_MS: u64 = 200;

/// Maximum leaves per append batch.
pub const MAX_BATCH: usize = 1000;

/// Minimum leaves before the appender flushes ahead of the window.
pub const MIN_BATCH: usize = 100;

/// Compact binary leaf encoding: content_hash || header_hash.
pub const LEAF_BYTES: usize = 64;

// ── Committee ────────────────────────────────────────────────────────────────

/// Fraction of members required to aggregate a checkpoint (numerator /
/// denominator). Threshold t = ceil(2N/3).
pub const CHECKPOINT_THRESHOLD_NUM: u64 = 2;
pub const CHECKPOINT_THRESHOLD_DEN: u64 = 3;

/// Target interval between checkpoints (seconds).
pub const EPOCH_INTERVAL_SECS: u64 = 600;

/// Maximum jitter applied to the epoch interval (seconds).
pub const EPOCH_JITTER_SECS: u64 = 120;

// ── Scoring ──────────────────────────────────────────────────────────────────

/// Fixed-point quantum: all score arithmetic is in units of 10^-6.
pub const SCORE_QUANTUM_DENOM: i64 = 1_000_000;

/// Decay tables are precomputed out to this many days.
pub const DECAY_TABLE_HORIZON_DAYS: u32 = 3650;
