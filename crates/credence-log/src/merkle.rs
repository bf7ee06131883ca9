//! RFC 6962-style history tree over log leaves.
//!
//! leaf hash = SHA256( 0x00 ‖ content_hash ‖ header_hash )
//! node hash = SHA256( 0x01 ‖ left ‖ right )
//!
//! The tree keeps every leaf hash in memory; roots and proofs are computed
//! by the standard recursive split at the largest power of two strictly
//! below the subtree size. A restart rebuilds the vector by scanning the
//! persisted leaf sequence.

use sha2::{Digest, Sha256};

use credence_core::constants::{LEAF_PREFIX, NODE_PREFIX};
use credence_core::error::CredenceError;
use credence_core::types::{Hash32, Leaf, LeafIndex, TreeSize};

/// Hash of a single leaf, with the 0x00 domain prefix.
pub fn leaf_hash(leaf: &Leaf) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(leaf.to_bytes());
    Hash32(hasher.finalize().into())
}

/// Hash of an interior node, with the 0x01 domain prefix.
pub fn node_hash(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash32(hasher.finalize().into())
}

/// Root of the empty tree: SHA256 of the empty string.
pub fn empty_root() -> Hash32 {
    Hash32(Sha256::digest([]).into())
}

/// Largest power of two strictly less than `n` (n ≥ 2).
fn split_point(n: u64) -> u64 {
    let k = 1u64 << (63 - (n - 1).leading_zeros());
    debug_assert!(k < n && n <= 2 * k);
    k
}

/// In-memory history tree state, owned by the single append task.
#[derive(Debug, Default)]
pub struct HistoryTree {
    leaf_hashes: Vec<Hash32>,
}

impl HistoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted leaf sequence.
    pub fn from_leaves(leaves: &[Leaf]) -> Self {
        Self {
            leaf_hashes: leaves.iter().map(leaf_hash).collect(),
        }
    }

    pub fn size(&self) -> TreeSize {
        self.leaf_hashes.len() as u64
    }

    /// Append a leaf, returning its index.
    pub fn push(&mut self, leaf: &Leaf) -> LeafIndex {
        self.leaf_hashes.push(leaf_hash(leaf));
        self.leaf_hashes.len() as u64 - 1
    }

    pub fn leaf_hash_at(&self, index: LeafIndex) -> Option<Hash32> {
        self.leaf_hashes.get(index as usize).copied()
    }

    /// Root over the whole current tree.
    pub fn root(&self) -> Hash32 {
        self.root_at(self.size()).expect("own size is always in range")
    }

    /// Root over the first `size` leaves.
    pub fn root_at(&self, size: TreeSize) -> Result<Hash32, CredenceError> {
        if size > self.size() {
            return Err(CredenceError::NotFound(format!(
                "tree has {} leaves, no root at size {size}",
                self.size()
            )));
        }
        Ok(subtree_root(&self.leaf_hashes[..size as usize]))
    }

    /// Audit path for `index` within the tree of the first `size` leaves.
    /// Path length is ceil(log2(max(size, 1))).
    pub fn inclusion_path(
        &self,
        index: LeafIndex,
        size: TreeSize,
    ) -> Result<Vec<Hash32>, CredenceError> {
        if size > self.size() {
            return Err(CredenceError::NotFound(format!(
                "tree has {} leaves, no view at size {size}",
                self.size()
            )));
        }
        if index >= size {
            return Err(CredenceError::NotFound(format!(
                "leaf {index} outside tree of size {size}"
            )));
        }
        let mut path = Vec::new();
        audit_path(&self.leaf_hashes[..size as usize], index, &mut path);
        Ok(path)
    }

    /// Consistency proof between the trees of the first `old` and first
    /// `new` leaves, 0 ≤ old ≤ new ≤ size.
    pub fn consistency_path(
        &self,
        old: TreeSize,
        new: TreeSize,
    ) -> Result<Vec<Hash32>, CredenceError> {
        if new > self.size() || old > new {
            return Err(CredenceError::NotFound(format!(
                "no consistency view for ({old}, {new}) at size {}",
                self.size()
            )));
        }
        if old == 0 || old == new {
            return Ok(Vec::new());
        }
        let mut path = Vec::new();
        subproof(&self.leaf_hashes[..new as usize], old, true, &mut path);
        Ok(path)
    }
}

fn subtree_root(hashes: &[Hash32]) -> Hash32 {
    match hashes.len() {
        0 => empty_root(),
        1 => hashes[0],
        n => {
            let k = split_point(n as u64) as usize;
            node_hash(&subtree_root(&hashes[..k]), &subtree_root(&hashes[k..]))
        }
    }
}

fn audit_path(hashes: &[Hash32], index: u64, out: &mut Vec<Hash32>) {
    let n = hashes.len() as u64;
    if n <= 1 {
        return;
    }
    let k = split_point(n);
    if index < k {
        audit_path(&hashes[..k as usize], index, out);
        out.push(subtree_root(&hashes[k as usize..]));
    } else {
        audit_path(&hashes[k as usize..], index - k, out);
        out.push(subtree_root(&hashes[..k as usize]));
    }
}

fn subproof(hashes: &[Hash32], m: u64, whole: bool, out: &mut Vec<Hash32>) {
    let n = hashes.len() as u64;
    if m == n {
        if !whole {
            out.push(subtree_root(hashes));
        }
        return;
    }
    let k = split_point(n);
    if m <= k {
        subproof(&hashes[..k as usize], m, whole, out);
        out.push(subtree_root(&hashes[k as usize..]));
    } else {
        subproof(&hashes[k as usize..], m - k, false, out);
        out.push(subtree_root(&hashes[..k as usize]));
    }
}

// ── Verification ─────────────────────────────────────────────────────────────

/// Verify an audit path (RFC 9162 §2.1.3.2).
pub fn verify_inclusion(
    leaf: &Hash32,
    index: LeafIndex,
    tree_size: TreeSize,
    path: &[Hash32],
    root: &Hash32,
) -> bool {
    if index >= tree_size {
        return false;
    }
    let mut fn_ = index;
    let mut sn = tree_size - 1;
    let mut r = *leaf;
    for p in path {
        if sn == 0 {
            return false;
        }
        if fn_ & 1 == 1 || fn_ == sn {
            r = node_hash(p, &r);
            if fn_ & 1 == 0 {
                while fn_ & 1 == 0 && fn_ != 0 {
                    fn_ >>= 1;
                    sn >>= 1;
                }
            }
        } else {
            r = node_hash(&r, p);
        }
        fn_ >>= 1;
        sn >>= 1;
    }
    sn == 0 && r == *root
}

/// Verify a consistency proof (RFC 9162 §2.1.4.2).
pub fn verify_consistency(
    old_size: TreeSize,
    new_size: TreeSize,
    old_root: &Hash32,
    new_root: &Hash32,
    path: &[Hash32],
) -> bool {
    if old_size > new_size {
        return false;
    }
    if old_size == new_size {
        return path.is_empty() && old_root == new_root;
    }
    if old_size == 0 {
        // The empty tree is consistent with anything.
        return path.is_empty() && *old_root == empty_root();
    }

    let mut path_iter = path.iter();
    // When old_size is a power of two, the old root itself seeds the walk.
    let (mut fr, mut sr) = if old_size.is_power_of_two() {
        (*old_root, *old_root)
    } else {
        match path_iter.next() {
            Some(first) => (*first, *first),
            None => return false,
        }
    };

    let mut fn_ = old_size - 1;
    let mut sn = new_size - 1;
    while fn_ & 1 == 1 {
        fn_ >>= 1;
        sn >>= 1;
    }

    for p in path_iter {
        if sn == 0 {
            return false;
        }
        if fn_ & 1 == 1 || fn_ == sn {
            fr = node_hash(p, &fr);
            sr = node_hash(p, &sr);
            if fn_ & 1 == 0 {
                while fn_ & 1 == 0 && fn_ != 0 {
                    fn_ >>= 1;
                    sn >>= 1;
                }
            }
        } else {
            sr = node_hash(&sr, p);
        }
        fn_ >>= 1;
        sn >>= 1;
    }
    sn == 0 && fr == *old_root && sr == *new_root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_leaves(n: usize) -> Vec<Leaf> {
        (0..n)
            .map(|i| Leaf::new(Hash32([i as u8; 32]), Hash32([(i + 100) as u8; 32])))
            .collect()
    }

    fn tree_of(n: usize) -> HistoryTree {
        HistoryTree::from_leaves(&make_leaves(n))
    }

    #[test]
    fn audit_path_length_is_log2() {
        let tree = tree_of(100);
        let path = tree.inclusion_path(0, 100).unwrap();
        assert_eq!(path.len(), 7); // ceil(log2(100))
        let path = tree.inclusion_path(0, 1).unwrap();
        assert_eq!(path.len(), 0);
        let path = tree.inclusion_path(1, 2).unwrap();
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn every_leaf_proves_into_every_larger_tree() {
        let leaves = make_leaves(33);
        let tree = HistoryTree::from_leaves(&leaves);
        for size in 1..=33u64 {
            let root = tree.root_at(size).unwrap();
            for index in 0..size {
                let path = tree.inclusion_path(index, size).unwrap();
                let lh = leaf_hash(&leaves[index as usize]);
                assert!(
                    verify_inclusion(&lh, index, size, &path, &root),
                    "inclusion failed at index {index} size {size}"
                );
            }
        }
    }

    #[test]
    fn flipped_audit_path_bit_rejected() {
        let leaves = make_leaves(100);
        let tree = HistoryTree::from_leaves(&leaves);
        let root = tree.root_at(100).unwrap();
        let mut path = tree.inclusion_path(0, 100).unwrap();
        let lh = leaf_hash(&leaves[0]);
        assert!(verify_inclusion(&lh, 0, 100, &path, &root));
        path[3].0[7] ^= 0x10;
        assert!(!verify_inclusion(&lh, 0, 100, &path, &root));
    }

    #[test]
    fn consistency_holds_for_all_size_pairs() {
        let tree = tree_of(33);
        for old in 0..=33u64 {
            for new in old..=33u64 {
                let proof = tree.consistency_path(old, new).unwrap();
                assert!(
                    proof.len() as u64 <= 2 * new.max(1).ilog2() as u64 + 2,
                    "proof unexpectedly long"
                );
                let old_root = tree.root_at(old).unwrap();
                let new_root = tree.root_at(new).unwrap();
                assert!(
                    verify_consistency(old, new, &old_root, &new_root, &proof),
                    "consistency failed for ({old}, {new})"
                );
            }
        }
    }

    #[test]
    fn consistency_rejects_forked_history() {
        let tree = tree_of(16);
        let mut forked_leaves = make_leaves(16);
        forked_leaves[3] = Leaf::new(Hash32([0xEE; 32]), Hash32([0xEF; 32]));
        let forked = HistoryTree::from_leaves(&forked_leaves);

        let proof = forked.consistency_path(8, 16).unwrap();
        let old_root = tree.root_at(8).unwrap(); // honest prefix
        let new_root = forked.root_at(16).unwrap(); // forked head
        assert!(!verify_consistency(8, 16, &old_root, &new_root, &proof));
    }

    #[test]
    fn rebuilt_tree_matches_incremental_tree() {
        let leaves = make_leaves(20);
        let mut incremental = HistoryTree::new();
        for (i, leaf) in leaves.iter().enumerate() {
            assert_eq!(incremental.push(leaf), i as u64);
        }
        let rebuilt = HistoryTree::from_leaves(&leaves);
        assert_eq!(incremental.root(), rebuilt.root());
        assert_eq!(incremental.size(), 20);
    }

    #[test]
    fn empty_tree_root_is_hash_of_empty_string() {
        let tree = HistoryTree::new();
        assert_eq!(tree.root(), empty_root());
        // SHA256("") well-known value.
        assert_eq!(
            tree.root().to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn inclusion_verifies_for_random_shapes(
                n in 1usize..80,
                seed in any::<u8>(),
            ) {
                let leaves: Vec<Leaf> = (0..n)
                    .map(|i| Leaf::new(
                        Hash32([seed.wrapping_add(i as u8); 32]),
                        Hash32([seed.wrapping_mul(3).wrapping_add(i as u8); 32]),
                    ))
                    .collect();
                let tree = HistoryTree::from_leaves(&leaves);
                let root = tree.root();
                let bound = (n as u64).next_power_of_two().ilog2() as usize;
                for index in 0..n as u64 {
                    let path = tree.inclusion_path(index, n as u64).unwrap();
                    prop_assert!(path.len() <= bound);
                    let lh = leaf_hash(&leaves[index as usize]);
                    prop_assert!(verify_inclusion(&lh, index, n as u64, &path, &root));
                }
            }
        }
    }
}
