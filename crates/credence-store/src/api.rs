//! The pluggable store contract the core consumes.
//!
//! `put` is idempotent; an event put and its index updates are observable
//! together (a reader that sees a content address through an index can
//! `get` it). Implementations guard their own transactions; callers never
//! hold store locks across suspension points.

use credence_core::error::CredenceError;
use credence_core::records::{Checkpoint, SignedTreeHead};
use credence_core::types::{
    ContentAddress, Context, Epoch, EpochNumber, Hash32, Id, Leaf, LeafIndex, TreeSize,
};
use credence_events::{Event, EventKind};

pub trait EventStore: Send + Sync {
    // ── Blobs ────────────────────────────────────────────────────────────────

    /// Store raw bytes under their content address. Idempotent.
    fn put_blob(&self, bytes: &[u8]) -> Result<ContentAddress, CredenceError>;

    fn get_blob(&self, addr: &ContentAddress) -> Result<Option<Vec<u8>>, CredenceError>;

    fn has_blob(&self, addr: &ContentAddress) -> Result<bool, CredenceError>;

    /// Prune an event blob. Only blobs whose leaf is covered by
    /// `checkpointed_size` may go; the leaf itself always stays.
    fn prune_blob(
        &self,
        addr: &ContentAddress,
        checkpointed_size: TreeSize,
    ) -> Result<(), CredenceError>;

    // ── Events + secondary indexes ───────────────────────────────────────────

    /// Persist a validated event and its index entries atomically.
    /// Returns `DuplicateEvent` if `(from, content_address)` already exists.
    fn put_event(&self, event: &Event) -> Result<ContentAddress, CredenceError>;

    fn get_event(&self, addr: &ContentAddress) -> Result<Option<Event>, CredenceError>;

    /// Events where `to = id`, ascending `(epoch, content_address)`.
    fn by_subject(
        &self,
        id: &Id,
        context: Context,
        epochs: (Epoch, Epoch),
    ) -> Result<Vec<ContentAddress>, CredenceError>;

    /// Events where `from = id`, ascending `(epoch, content_address)`.
    fn by_author(
        &self,
        id: &Id,
        context: Context,
        epochs: (Epoch, Epoch),
    ) -> Result<Vec<ContentAddress>, CredenceError>;

    /// Events of a kind, ascending `(epoch, content_address)`.
    fn by_type(
        &self,
        kind: EventKind,
        epochs: (Epoch, Epoch),
    ) -> Result<Vec<ContentAddress>, CredenceError>;

    // ── Status lists ─────────────────────────────────────────────────────────

    fn put_status_list(
        &self,
        issuer: &Id,
        epoch: Epoch,
        bitmap_ref: &ContentAddress,
    ) -> Result<(), CredenceError>;

    fn status_list(
        &self,
        issuer: &Id,
        epoch: Epoch,
    ) -> Result<Option<ContentAddress>, CredenceError>;

    // ── Transparency log state ───────────────────────────────────────────────

    /// Persist a batch of leaves starting at `first_index`, atomically and
    /// durably (the appender refuses further work if this fails).
    fn append_leaves(&self, first_index: LeafIndex, leaves: &[Leaf])
        -> Result<(), CredenceError>;

    fn get_leaf(&self, index: LeafIndex) -> Result<Option<Leaf>, CredenceError>;

    fn leaf_count(&self) -> Result<TreeSize, CredenceError>;

    /// All leaves in `[start, end)`, in index order.
    fn leaf_range(&self, start: LeafIndex, end: LeafIndex)
        -> Result<Vec<Leaf>, CredenceError>;

    /// Index of the leaf carrying `content_hash`, if appended.
    fn leaf_index_of(&self, content_hash: &Hash32) -> Result<Option<LeafIndex>, CredenceError>;

    /// Persist an STH. Rejects a second STH for the same `tree_size` with a
    /// different root as `Equivocation`.
    fn put_sth(&self, sth: &SignedTreeHead) -> Result<(), CredenceError>;

    fn get_sth(&self, tree_size: TreeSize) -> Result<Option<SignedTreeHead>, CredenceError>;

    fn latest_sth(&self) -> Result<Option<SignedTreeHead>, CredenceError>;

    // ── Checkpoints ──────────────────────────────────────────────────────────

    fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), CredenceError>;

    fn get_checkpoint(&self, epoch: EpochNumber) -> Result<Option<Checkpoint>, CredenceError>;

    /// Checkpoints with `epoch_number` in `[start, end]`, ascending.
    fn checkpoints(
        &self,
        range: (EpochNumber, EpochNumber),
    ) -> Result<Vec<Checkpoint>, CredenceError>;

    fn latest_checkpoint(&self) -> Result<Option<Checkpoint>, CredenceError>;

    // ── Rulesets & score records (opaque canonical bytes) ────────────────────

    fn put_ruleset_bytes(&self, id: &str, bytes: &[u8]) -> Result<(), CredenceError>;

    fn get_ruleset_bytes(&self, id: &str) -> Result<Option<Vec<u8>>, CredenceError>;

    fn ruleset_ids(&self) -> Result<Vec<String>, CredenceError>;

    fn put_score_record_bytes(
        &self,
        id: &Id,
        context: Context,
        epoch: EpochNumber,
        bytes: &[u8],
    ) -> Result<(), CredenceError>;

    fn get_score_record_bytes(
        &self,
        id: &Id,
        context: Context,
        epoch: EpochNumber,
    ) -> Result<Option<Vec<u8>>, CredenceError>;

    /// Flush pending writes to disk.
    fn flush(&self) -> Result<(), CredenceError>;
}
