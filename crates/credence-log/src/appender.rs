//! The single append task that owns the tree state.
//!
//! Callers submit leaves through a bounded channel and await a future that
//! resolves when the containing micro-batch is durable. Batches close after
//! `BATCH_WINDOW_MS` or `MAX_BATCH` leaves, whichever comes first. A store
//! durability failure is fatal: the appender poisons itself and refuses
//! further appends until an operator intervenes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use credence_core::config::CoreConfig;
use credence_core::error::CredenceError;
use credence_core::types::{Hash32, Leaf, LeafIndex};
use credence_store::EventStore;

use crate::merkle::HistoryTree;
use crate::sth::SthSigner;

struct AppendRequest {
    leaves: Vec<Leaf>,
    responder: oneshot::Sender<Result<Vec<LeafIndex>, CredenceError>>,
}

/// Cheap, cloneable handle to the append task.
#[derive(Clone)]
pub struct LogHandle {
    tx: mpsc::Sender<AppendRequest>,
}

impl LogHandle {
    /// Queue leaves for appending; resolves with their indices once the
    /// containing batch is durable. Indices are strictly increasing within
    /// a batch; a duplicate content hash collapses to its first occurrence.
    pub async fn queue(
        &self,
        leaves: Vec<Leaf>,
        deadline: Duration,
    ) -> Result<Vec<LeafIndex>, CredenceError> {
        let (responder, result_rx) = oneshot::channel();
        let fut = async {
            self.tx
                .send(AppendRequest { leaves, responder })
                .await
                .map_err(|_| CredenceError::SignerUnavailable("log appender stopped".into()))?;
            result_rx
                .await
                .map_err(|_| CredenceError::Cancelled)?
        };
        tokio::time::timeout(deadline, fut)
            .await
            .map_err(|_| CredenceError::Timeout(deadline.as_millis() as u64))?
    }
}

/// Owns the history tree. Run via [`spawn_appender`].
pub struct LogAppender {
    store: Arc<dyn EventStore>,
    signer: SthSigner,
    tree: HistoryTree,
    rx: mpsc::Receiver<AppendRequest>,
    poisoned: bool,
    batch_window_ms: u64,
    max_batch: usize,
}

/// Start an appender with default batching knobs.
pub fn spawn_appender(
    store: Arc<dyn EventStore>,
    signer: SthSigner,
) -> Result<(LogHandle, JoinHandle<()>), CredenceError> {
    spawn_appender_with(store, signer, &CoreConfig::default())
}

/// Recover tree state from the persisted leaf sequence and start the
/// append task.
pub fn spawn_appender_with(
    store: Arc<dyn EventStore>,
    signer: SthSigner,
    config: &CoreConfig,
) -> Result<(LogHandle, JoinHandle<()>), CredenceError> {
    let count = store.leaf_count()?;
    let leaves = store.leaf_range(0, count)?;
    let tree = HistoryTree::from_leaves(&leaves);
    info!(tree_size = count, tree_id = signer.tree_id(), "log appender recovered");

    let (tx, rx) = mpsc::channel(1024);
    let appender = LogAppender {
        store,
        signer,
        tree,
        rx,
        poisoned: false,
        batch_window_ms: config.batch_window_ms,
        max_batch: config.max_batch,
    };
    let join = tokio::spawn(appender.run());
    Ok((LogHandle { tx }, join))
}

impl LogAppender {
    async fn run(mut self) {
        let window = Duration::from_millis(self.batch_window_ms);
        let mut batch: Vec<AppendRequest> = Vec::new();
        let mut batch_leaves = 0usize;
        // Far-future placeholder until a batch opens.
        let mut batch_deadline = Instant::now() + Duration::from_secs(3600);

        loop {
            tokio::select! {
                request = self.rx.recv() => match request {
                    Some(request) => {
                        if batch.is_empty() {
                            batch_deadline = Instant::now() + window;
                        }
                        batch_leaves += request.leaves.len();
                        batch.push(request);
                        if batch_leaves >= self.max_batch {
                            self.flush(&mut batch);
                            batch_leaves = 0;
                        }
                    }
                    None => {
                        self.flush(&mut batch);
                        break;
                    }
                },
                _ = tokio::time::sleep_until(batch_deadline), if !batch.is_empty() => {
                    self.flush(&mut batch);
                    batch_leaves = 0;
                }
            }
        }
        info!("log appender stopped");
    }

    fn flush(&mut self, batch: &mut Vec<AppendRequest>) {
        if batch.is_empty() {
            return;
        }
        let requests = std::mem::take(batch);

        if self.poisoned {
            for request in requests {
                let _ = request
                    .responder
                    .send(Err(CredenceError::StorageCorrupt(
                        "log appender poisoned by earlier durability failure".into(),
                    )));
            }
            return;
        }

        // Collapse duplicate content hashes to the first occurrence and
        // assign indices. Indices are final only once durable.
        let first_index = self.tree.size();
        let mut fresh: Vec<Leaf> = Vec::new();
        let mut assigned: HashMap<Hash32, LeafIndex> = HashMap::new();
        let mut responses: Vec<Vec<LeafIndex>> = Vec::with_capacity(requests.len());
        for request in &requests {
            let mut indices = Vec::with_capacity(request.leaves.len());
            for leaf in &request.leaves {
                let index = *assigned.entry(leaf.content_hash).or_insert_with(|| {
                    let index = first_index + fresh.len() as u64;
                    fresh.push(*leaf);
                    index
                });
                indices.push(index);
            }
            responses.push(indices);
        }

        // Durable append; all-or-nothing per batch.
        if let Err(e) = self.store.append_leaves(first_index, &fresh) {
            error!(error = %e, "leaf append not durable; poisoning appender");
            self.poisoned = true;
            for request in requests {
                let _ = request.responder.send(Err(CredenceError::StorageCorrupt(
                    "append rejected by store".into(),
                )));
            }
            return;
        }

        for leaf in &fresh {
            self.tree.push(leaf);
        }

        let tree_size = self.tree.size();
        let root = self.tree.root();
        match self.signer.sign_head(tree_size, root) {
            Ok(sth) => {
                if let Err(e) = self.store.put_sth(&sth) {
                    // Equivocation here would mean our own durable state
                    // diverged; treat anything but success as fatal.
                    error!(error = %e, "failed to persist STH; poisoning appender");
                    self.poisoned = true;
                }
            }
            Err(e) => {
                warn!(error = %e, "STH signing failed");
                self.poisoned = true;
            }
        }

        if self.poisoned {
            for request in requests {
                let _ = request.responder.send(Err(CredenceError::StorageCorrupt(
                    "batch appended but head not sealed".into(),
                )));
            }
            return;
        }

        info!(batch = fresh.len(), tree_size, "batch appended and sealed");
        for (request, indices) in requests.into_iter().zip(responses) {
            let _ = request.responder.send(Ok(indices));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credence_crypto::KeyPair;
    use credence_store::SledStore;

    fn leaf(i: u8) -> Leaf {
        Leaf::new(Hash32([i; 32]), Hash32([i ^ 0xFF; 32]))
    }

    fn setup(dir: &std::path::Path) -> (Arc<dyn EventStore>, LogHandle, JoinHandle<()>) {
        let store: Arc<dyn EventStore> = Arc::new(SledStore::open(dir).unwrap());
        let signer = SthSigner::new(1, KeyPair::from_seed([0x99; 32]));
        let (handle, join) = spawn_appender(store.clone(), signer).unwrap();
        (store, handle, join)
    }

    #[tokio::test]
    async fn queue_returns_monotonic_indices_and_seals_head() {
        let dir = tempfile::tempdir().unwrap();
        let (store, handle, _join) = setup(dir.path());

        let leaves: Vec<Leaf> = (0..100).map(leaf).collect();
        let indices = handle
            .queue(leaves, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(indices, (0..100).collect::<Vec<u64>>());

        let sth = store.latest_sth().unwrap().unwrap();
        assert_eq!(sth.tree_size, 100);
        assert_eq!(store.leaf_count().unwrap(), 100);
    }

    #[tokio::test]
    async fn duplicate_content_hash_collapses_within_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (store, handle, _join) = setup(dir.path());

        let indices = handle
            .queue(vec![leaf(1), leaf(2), leaf(1)], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(indices, vec![0, 1, 0]);
        assert_eq!(store.leaf_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn restart_recovers_tree_state() {
        let dir = tempfile::tempdir().unwrap();
        let root_before = {
            let (store, handle, join) = setup(dir.path());
            handle
                .queue((0..10).map(leaf).collect(), Duration::from_secs(5))
                .await
                .unwrap();
            let root = store.latest_sth().unwrap().unwrap().root_hash;
            drop(handle);
            join.await.unwrap();
            drop(store);
            root
        };

        let (store, handle, _join) = setup(dir.path());
        // Appending after recovery continues the same history.
        let indices = handle
            .queue(vec![leaf(200)], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(indices, vec![10]);
        let sth = store.latest_sth().unwrap().unwrap();
        assert_eq!(sth.tree_size, 11);
        assert_ne!(sth.root_hash, root_before);
    }

    #[tokio::test]
    async fn short_deadline_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, handle, _join) = setup(dir.path());
        // Zero deadline cannot cover even channel send + batch window.
        let result = handle.queue(vec![leaf(7)], Duration::from_millis(0)).await;
        assert!(matches!(result, Err(CredenceError::Timeout(_))));
    }
}
