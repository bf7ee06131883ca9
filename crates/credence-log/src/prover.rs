//! Proof generation from durable log state.
//!
//! Proofs never need the live append task: they are recomputed from the
//! persisted leaf sequence, so any reader holding the store can serve them.

use std::sync::Arc;

use credence_core::error::CredenceError;
use credence_core::types::{Hash32, LeafIndex, TreeSize};
use credence_store::EventStore;

use crate::merkle::{leaf_hash, HistoryTree};
use crate::proof::{ConsistencyProof, InclusionProof};

pub struct Prover {
    store: Arc<dyn EventStore>,
}

impl Prover {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    fn tree_at(&self, size: TreeSize) -> Result<HistoryTree, CredenceError> {
        let durable = self.store.leaf_count()?;
        if size > durable {
            return Err(CredenceError::NotFound(format!(
                "log has {durable} leaves, no view at size {size}"
            )));
        }
        let leaves = self.store.leaf_range(0, size)?;
        Ok(HistoryTree::from_leaves(&leaves))
    }

    /// Root over the first `size` leaves.
    pub fn root_at(&self, size: TreeSize) -> Result<Hash32, CredenceError> {
        self.tree_at(size)?.root_at(size)
    }

    /// Inclusion proof by leaf index.
    pub fn inclusion_proof(
        &self,
        index: LeafIndex,
        tree_size: TreeSize,
    ) -> Result<InclusionProof, CredenceError> {
        let tree = self.tree_at(tree_size)?;
        let leaf = self
            .store
            .get_leaf(index)?
            .ok_or_else(|| CredenceError::NotFound(format!("no leaf at index {index}")))?;
        Ok(InclusionProof {
            leaf_hash: leaf_hash(&leaf),
            leaf_index: index,
            tree_size,
            audit_path: tree.inclusion_path(index, tree_size)?,
        })
    }

    /// Inclusion proof by the content hash carried in a leaf.
    pub fn inclusion_proof_for_hash(
        &self,
        content_hash: &Hash32,
        tree_size: TreeSize,
    ) -> Result<InclusionProof, CredenceError> {
        let index = self
            .store
            .leaf_index_of(content_hash)?
            .ok_or_else(|| CredenceError::NotFound(format!("no leaf for {content_hash}")))?;
        self.inclusion_proof(index, tree_size)
    }

    /// Consistency proof between two sizes, `old ≤ new ≤ tree_size`.
    pub fn consistency_proof(
        &self,
        old_size: TreeSize,
        new_size: TreeSize,
    ) -> Result<ConsistencyProof, CredenceError> {
        let tree = self.tree_at(new_size)?;
        Ok(ConsistencyProof {
            from_size: old_size,
            to_size: new_size,
            path: tree.consistency_path(old_size, new_size)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credence_core::types::Leaf;
    use credence_store::SledStore;

    fn seeded_store(n: u8) -> (Arc<dyn EventStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        let leaves: Vec<Leaf> = (0..n)
            .map(|i| Leaf::new(Hash32([i; 32]), Hash32([i ^ 0xFF; 32])))
            .collect();
        store.append_leaves(0, &leaves).unwrap();
        (Arc::new(store), dir)
    }

    #[test]
    fn proofs_from_durable_state_verify() {
        let (store, _dir) = seeded_store(20);
        let prover = Prover::new(store);

        let root = prover.root_at(20).unwrap();
        let proof = prover.inclusion_proof(5, 20).unwrap();
        assert!(proof.verify(&root));

        let by_hash = prover
            .inclusion_proof_for_hash(&Hash32([5; 32]), 20)
            .unwrap();
        assert_eq!(by_hash, proof);

        let old_root = prover.root_at(12).unwrap();
        let consistency = prover.consistency_proof(12, 20).unwrap();
        assert!(consistency.verify(&old_root, &root));
    }

    #[test]
    fn views_beyond_durable_state_are_not_found() {
        let (store, _dir) = seeded_store(5);
        let prover = Prover::new(store);
        assert!(matches!(
            prover.inclusion_proof(0, 9),
            Err(CredenceError::NotFound(_))
        ));
    }
}
