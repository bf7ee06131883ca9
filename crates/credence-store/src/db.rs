use sled::transaction::ConflictableTransactionError;
use sled::Transactional;
use std::path::Path;
use tracing::debug;

use credence_core::canonical;
use credence_core::error::CredenceError;
use credence_core::records::{Checkpoint, SignedTreeHead};
use credence_core::types::{
    ContentAddress, Context, Epoch, EpochNumber, Hash32, Id, Leaf, LeafIndex, TreeSize,
};
use credence_events::{Event, EventKind};

use crate::api::EventStore;

/// Separator inside composite index keys. Identifier opaque parts are
/// multibase strings and epoch tags are `YYYY-MM`, so 0x00 never collides.
const SEP: u8 = 0x00;

const LEAF_COUNT_KEY: &str = "leaf_count";

/// Reference content-addressed store backed by sled (pure-Rust, no C deps).
///
/// Named trees:
///   blobs         — digest (32B)                         → raw bytes
///   idx_subject   — to  ‖ ctx ‖ epoch ‖ digest           → [] (membership)
///   idx_author    — from ‖ ctx ‖ epoch ‖ digest          → [] (membership)
///   idx_type      — kind ‖ epoch ‖ digest                → [] (membership)
///   status        — issuer ‖ epoch                       → digest (32B)
///   leaves        — index u64 BE                         → leaf (64B)
///   leaf_by_hash  — content_hash (32B)                   → index u64 BE
///   sths          — tree_size u64 BE                     → bincode(SignedTreeHead)
///   checkpoints   — epoch_number u64 BE                  → bincode(Checkpoint)
///   rulesets      — ruleset id utf8                      → canonical bytes
///   scores        — id ‖ ctx ‖ epoch_number u64 BE       → canonical bytes
///   meta          — utf8 key                             → raw bytes
pub struct SledStore {
    db: sled::Db,
    blobs: sled::Tree,
    idx_subject: sled::Tree,
    idx_author: sled::Tree,
    idx_type: sled::Tree,
    status: sled::Tree,
    leaves: sled::Tree,
    leaf_by_hash: sled::Tree,
    sths: sled::Tree,
    checkpoints: sled::Tree,
    rulesets: sled::Tree,
    scores: sled::Tree,
    meta: sled::Tree,
}

fn storage_err(e: sled::Error) -> CredenceError {
    CredenceError::Storage(e.to_string())
}

fn codec_err(e: bincode::Error) -> CredenceError {
    CredenceError::Serialization(e.to_string())
}

impl SledStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CredenceError> {
        let db = sled::open(path).map_err(storage_err)?;
        let open = |name: &str| db.open_tree(name).map_err(storage_err);
        Ok(Self {
            blobs: open("blobs")?,
            idx_subject: open("idx_subject")?,
            idx_author: open("idx_author")?,
            idx_type: open("idx_type")?,
            status: open("status")?,
            leaves: open("leaves")?,
            leaf_by_hash: open("leaf_by_hash")?,
            sths: open("sths")?,
            checkpoints: open("checkpoints")?,
            rulesets: open("rulesets")?,
            scores: open("scores")?,
            meta: open("meta")?,
            db,
        })
    }

    fn subject_key(id: &Id, context: Context, epoch: &Epoch, digest: &Hash32) -> Vec<u8> {
        let mut key = Vec::with_capacity(id.as_str().len() + 48);
        key.extend_from_slice(id.as_str().as_bytes());
        key.push(SEP);
        key.extend_from_slice(context.as_str().as_bytes());
        key.push(SEP);
        key.extend_from_slice(epoch.to_string().as_bytes());
        key.push(SEP);
        key.extend_from_slice(digest.as_bytes());
        key
    }

    fn type_key(kind: EventKind, epoch: &Epoch, digest: &Hash32) -> Vec<u8> {
        let mut key = Vec::with_capacity(64);
        key.extend_from_slice(kind.as_str().as_bytes());
        key.push(SEP);
        key.extend_from_slice(epoch.to_string().as_bytes());
        key.push(SEP);
        key.extend_from_slice(digest.as_bytes());
        key
    }

    fn status_key(issuer: &Id, epoch: &Epoch) -> Vec<u8> {
        let mut key = Vec::with_capacity(issuer.as_str().len() + 8);
        key.extend_from_slice(issuer.as_str().as_bytes());
        key.push(SEP);
        key.extend_from_slice(epoch.to_string().as_bytes());
        key
    }

    fn score_key(id: &Id, context: Context, epoch: EpochNumber) -> Vec<u8> {
        let mut key = Vec::with_capacity(id.as_str().len() + 24);
        key.extend_from_slice(id.as_str().as_bytes());
        key.push(SEP);
        key.extend_from_slice(context.as_str().as_bytes());
        key.push(SEP);
        key.extend_from_slice(&epoch.to_be_bytes());
        key
    }

    /// Scan an index tree under `prefix`, keeping entries whose epoch tag
    /// lies inside `epochs` (inclusive) and decoding the trailing digest.
    fn scan_epoch_range(
        tree: &sled::Tree,
        prefix: &[u8],
        epochs: (Epoch, Epoch),
    ) -> Result<Vec<ContentAddress>, CredenceError> {
        let lo = epochs.0.to_string();
        let hi = epochs.1.to_string();
        let mut out = Vec::new();
        for item in tree.scan_prefix(prefix) {
            let (key, _) = item.map_err(storage_err)?;
            let rest = &key[prefix.len()..];
            // rest = epoch (7 ascii bytes) ‖ SEP ‖ digest (32 bytes)
            if rest.len() != 7 + 1 + 32 {
                return Err(CredenceError::StorageCorrupt(
                    "malformed index key".into(),
                ));
            }
            let epoch_tag = std::str::from_utf8(&rest[..7])
                .map_err(|_| CredenceError::StorageCorrupt("non-utf8 epoch in index".into()))?;
            if epoch_tag < lo.as_str() || epoch_tag > hi.as_str() {
                continue;
            }
            let mut digest = [0u8; 32];
            digest.copy_from_slice(&rest[8..]);
            out.push(ContentAddress::from_digest(Hash32(digest)));
        }
        Ok(out)
    }

    fn current_leaf_count(&self) -> Result<u64, CredenceError> {
        Ok(self
            .meta
            .get(LEAF_COUNT_KEY)
            .map_err(storage_err)?
            .map(|b| {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&b[..8]);
                u64::from_be_bytes(arr)
            })
            .unwrap_or(0))
    }
}

impl EventStore for SledStore {
    // ── Blobs ────────────────────────────────────────────────────────────────

    fn put_blob(&self, bytes: &[u8]) -> Result<ContentAddress, CredenceError> {
        let addr = canonical::content_address_of_bytes(bytes);
        self.blobs
            .insert(addr.digest().as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(addr)
    }

    fn get_blob(&self, addr: &ContentAddress) -> Result<Option<Vec<u8>>, CredenceError> {
        Ok(self
            .blobs
            .get(addr.digest().as_bytes())
            .map_err(storage_err)?
            .map(|iv| iv.to_vec()))
    }

    fn has_blob(&self, addr: &ContentAddress) -> Result<bool, CredenceError> {
        self.blobs
            .contains_key(addr.digest().as_bytes())
            .map_err(storage_err)
    }

    fn prune_blob(
        &self,
        addr: &ContentAddress,
        checkpointed_size: TreeSize,
    ) -> Result<(), CredenceError> {
        let index = self
            .leaf_index_of(addr.digest())?
            .ok_or_else(|| CredenceError::NotFound(format!("no leaf for {addr}")))?;
        if index >= checkpointed_size {
            return Err(CredenceError::SemanticInvalid(format!(
                "leaf {index} not covered by checkpointed size {checkpointed_size}"
            )));
        }
        // The blob goes; the leaf and its index entries stay.
        self.blobs
            .remove(addr.digest().as_bytes())
            .map_err(storage_err)?;
        debug!(%addr, index, "pruned checkpointed blob");
        Ok(())
    }

    // ── Events ───────────────────────────────────────────────────────────────

    fn put_event(&self, event: &Event) -> Result<ContentAddress, CredenceError> {
        let wire = event.wire_bytes()?;
        let addr = canonical::content_address_of_bytes(&wire);
        let digest = *addr.digest();

        let subject_key = event
            .to
            .as_ref()
            .map(|to| Self::subject_key(to, event.context, &event.epoch, &digest));
        let author_key = Self::subject_key(&event.from, event.context, &event.epoch, &digest);
        let type_key = Self::type_key(event.kind, &event.epoch, &digest);

        let result = (&self.blobs, &self.idx_subject, &self.idx_author, &self.idx_type)
            .transaction(|(blobs, idx_subject, idx_author, idx_type)| -> sled::transaction::ConflictableTransactionResult<(), CredenceError> {
                if blobs.get(digest.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        CredenceError::DuplicateEvent(addr.to_string()),
                    ));
                }
                blobs.insert(digest.as_bytes().to_vec(), wire.clone())?;
                if let Some(key) = &subject_key {
                    idx_subject.insert(key.clone(), b"".to_vec())?;
                }
                idx_author.insert(author_key.clone(), b"".to_vec())?;
                idx_type.insert(type_key.clone(), b"".to_vec())?;
                Ok(())
            });

        match result {
            Ok(()) => Ok(addr),
            Err(sled::transaction::TransactionError::Abort(e)) => Err(e),
            Err(sled::transaction::TransactionError::Storage(e)) => Err(storage_err(e)),
        }
    }

    fn get_event(&self, addr: &ContentAddress) -> Result<Option<Event>, CredenceError> {
        let Some(bytes) = self.get_blob(addr)? else {
            return Ok(None);
        };
        let value = canonical::check_canonical(&bytes)
            .map_err(|e| CredenceError::StorageCorrupt(format!("stored event invalid: {e}")))?;
        let event = Event::from_value(&value)
            .map_err(|e| CredenceError::StorageCorrupt(format!("stored event invalid: {e}")))?;
        Ok(Some(event))
    }

    fn by_subject(
        &self,
        id: &Id,
        context: Context,
        epochs: (Epoch, Epoch),
    ) -> Result<Vec<ContentAddress>, CredenceError> {
        let mut prefix = Vec::with_capacity(id.as_str().len() + 16);
        prefix.extend_from_slice(id.as_str().as_bytes());
        prefix.push(SEP);
        prefix.extend_from_slice(context.as_str().as_bytes());
        prefix.push(SEP);
        Self::scan_epoch_range(&self.idx_subject, &prefix, epochs)
    }

    fn by_author(
        &self,
        id: &Id,
        context: Context,
        epochs: (Epoch, Epoch),
    ) -> Result<Vec<ContentAddress>, CredenceError> {
        let mut prefix = Vec::with_capacity(id.as_str().len() + 16);
        prefix.extend_from_slice(id.as_str().as_bytes());
        prefix.push(SEP);
        prefix.extend_from_slice(context.as_str().as_bytes());
        prefix.push(SEP);
        Self::scan_epoch_range(&self.idx_author, &prefix, epochs)
    }

    fn by_type(
        &self,
        kind: EventKind,
        epochs: (Epoch, Epoch),
    ) -> Result<Vec<ContentAddress>, CredenceError> {
        let mut prefix = Vec::with_capacity(24);
        prefix.extend_from_slice(kind.as_str().as_bytes());
        prefix.push(SEP);
        Self::scan_epoch_range(&self.idx_type, &prefix, epochs)
    }

    // ── Status lists ─────────────────────────────────────────────────────────

    fn put_status_list(
        &self,
        issuer: &Id,
        epoch: Epoch,
        bitmap_ref: &ContentAddress,
    ) -> Result<(), CredenceError> {
        self.status
            .insert(Self::status_key(issuer, &epoch), bitmap_ref.digest().as_bytes())
            .map_err(storage_err)?;
        Ok(())
    }

    fn status_list(
        &self,
        issuer: &Id,
        epoch: Epoch,
    ) -> Result<Option<ContentAddress>, CredenceError> {
        match self
            .status
            .get(Self::status_key(issuer, &epoch))
            .map_err(storage_err)?
        {
            Some(bytes) => {
                let mut digest = [0u8; 32];
                digest.copy_from_slice(&bytes[..32]);
                Ok(Some(ContentAddress::from_digest(Hash32(digest))))
            }
            None => Ok(None),
        }
    }

    // ── Transparency log state ───────────────────────────────────────────────

    fn append_leaves(
        &self,
        first_index: LeafIndex,
        leaves: &[Leaf],
    ) -> Result<(), CredenceError> {
        let current = self.current_leaf_count()?;
        if first_index != current {
            return Err(CredenceError::StorageCorrupt(format!(
                "append at index {first_index} but leaf count is {current}"
            )));
        }
        let result = (&self.leaves, &self.leaf_by_hash, &self.meta).transaction(
            |(leaves_t, by_hash, meta)| -> sled::transaction::ConflictableTransactionResult<(), CredenceError> {
                for (offset, leaf) in leaves.iter().enumerate() {
                    let index = first_index + offset as u64;
                    let index_key = index.to_be_bytes().to_vec();
                    leaves_t.insert(index_key.clone(), leaf.to_bytes().to_vec())?;
                    // First occurrence wins; duplicates collapsed upstream.
                    if by_hash.get(leaf.content_hash.as_bytes())?.is_none() {
                        by_hash.insert(leaf.content_hash.as_bytes().to_vec(), index_key)?;
                    }
                }
                let new_count = first_index + leaves.len() as u64;
                meta.insert(LEAF_COUNT_KEY, new_count.to_be_bytes().to_vec())?;
                Ok(())
            },
        );
        match result {
            Ok(()) => {}
            Err(sled::transaction::TransactionError::Abort(e)) => return Err(e),
            Err(sled::transaction::TransactionError::Storage(e)) => return Err(storage_err(e)),
        }
        // Appends must be durable before the append future resolves.
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }

    fn get_leaf(&self, index: LeafIndex) -> Result<Option<Leaf>, CredenceError> {
        match self.leaves.get(index.to_be_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(Leaf::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn leaf_count(&self) -> Result<TreeSize, CredenceError> {
        self.current_leaf_count()
    }

    fn leaf_range(&self, start: LeafIndex, end: LeafIndex) -> Result<Vec<Leaf>, CredenceError> {
        let mut out = Vec::with_capacity((end.saturating_sub(start)) as usize);
        for index in start..end {
            let leaf = self.get_leaf(index)?.ok_or_else(|| {
                CredenceError::StorageCorrupt(format!("missing leaf {index} in range"))
            })?;
            out.push(leaf);
        }
        Ok(out)
    }

    fn leaf_index_of(&self, content_hash: &Hash32) -> Result<Option<LeafIndex>, CredenceError> {
        Ok(self
            .leaf_by_hash
            .get(content_hash.as_bytes())
            .map_err(storage_err)?
            .map(|b| {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&b[..8]);
                u64::from_be_bytes(arr)
            }))
    }

    fn put_sth(&self, sth: &SignedTreeHead) -> Result<(), CredenceError> {
        if let Some(existing) = self.get_sth(sth.tree_size)? {
            if existing.root_hash != sth.root_hash {
                return Err(CredenceError::Equivocation(format!(
                    "two STHs at size {} with roots {} and {}",
                    sth.tree_size, existing.root_hash, sth.root_hash
                )));
            }
            return Ok(());
        }
        let bytes = bincode::serialize(sth).map_err(codec_err)?;
        self.sths
            .insert(sth.tree_size.to_be_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    fn get_sth(&self, tree_size: TreeSize) -> Result<Option<SignedTreeHead>, CredenceError> {
        match self.sths.get(tree_size.to_be_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(codec_err)?)),
            None => Ok(None),
        }
    }

    fn latest_sth(&self) -> Result<Option<SignedTreeHead>, CredenceError> {
        match self.sths.last().map_err(storage_err)? {
            Some((_, bytes)) => Ok(Some(bincode::deserialize(&bytes).map_err(codec_err)?)),
            None => Ok(None),
        }
    }

    // ── Checkpoints ──────────────────────────────────────────────────────────

    fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), CredenceError> {
        let bytes = bincode::serialize(checkpoint).map_err(codec_err)?;
        self.checkpoints
            .insert(checkpoint.epoch_number.to_be_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    fn get_checkpoint(&self, epoch: EpochNumber) -> Result<Option<Checkpoint>, CredenceError> {
        match self
            .checkpoints
            .get(epoch.to_be_bytes())
            .map_err(storage_err)?
        {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(codec_err)?)),
            None => Ok(None),
        }
    }

    fn checkpoints(
        &self,
        range: (EpochNumber, EpochNumber),
    ) -> Result<Vec<Checkpoint>, CredenceError> {
        let mut out = Vec::new();
        for item in self
            .checkpoints
            .range(range.0.to_be_bytes()..=range.1.to_be_bytes())
        {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(bincode::deserialize(&bytes).map_err(codec_err)?);
        }
        Ok(out)
    }

    fn latest_checkpoint(&self) -> Result<Option<Checkpoint>, CredenceError> {
        match self.checkpoints.last().map_err(storage_err)? {
            Some((_, bytes)) => Ok(Some(bincode::deserialize(&bytes).map_err(codec_err)?)),
            None => Ok(None),
        }
    }

    // ── Rulesets & score records ─────────────────────────────────────────────

    fn put_ruleset_bytes(&self, id: &str, bytes: &[u8]) -> Result<(), CredenceError> {
        self.rulesets
            .insert(id.as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    fn get_ruleset_bytes(&self, id: &str) -> Result<Option<Vec<u8>>, CredenceError> {
        Ok(self
            .rulesets
            .get(id.as_bytes())
            .map_err(storage_err)?
            .map(|iv| iv.to_vec()))
    }

    fn ruleset_ids(&self) -> Result<Vec<String>, CredenceError> {
        let mut out = Vec::new();
        for item in self.rulesets.iter() {
            let (key, _) = item.map_err(storage_err)?;
            out.push(
                String::from_utf8(key.to_vec())
                    .map_err(|_| CredenceError::StorageCorrupt("non-utf8 ruleset id".into()))?,
            );
        }
        Ok(out)
    }

    fn put_score_record_bytes(
        &self,
        id: &Id,
        context: Context,
        epoch: EpochNumber,
        bytes: &[u8],
    ) -> Result<(), CredenceError> {
        self.scores
            .insert(Self::score_key(id, context, epoch), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    fn get_score_record_bytes(
        &self,
        id: &Id,
        context: Context,
        epoch: EpochNumber,
    ) -> Result<Option<Vec<u8>>, CredenceError> {
        Ok(self
            .scores
            .get(Self::score_key(id, context, epoch))
            .map_err(storage_err)?
            .map(|iv| iv.to_vec()))
    }

    fn flush(&self) -> Result<(), CredenceError> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }
}
