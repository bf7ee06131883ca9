//! Vouch-graph diversity weighting.
//!
//! A voucher whose 2-hop neighborhood heavily overlaps the vouchers
//! already counted gets damped, which blunts tight collusion clusters.
//! Overlap is |N₂(j) ∩ counted| / |counted|, computed while iterating
//! vouchers in the deterministic scoring order.

use std::collections::{BTreeMap, BTreeSet};

use credence_core::fixed::Fixed;
use credence_core::types::Id;

/// Undirected view of who has vouched for whom, across all contexts.
#[derive(Clone, Debug, Default)]
pub struct VouchGraph {
    edges: BTreeMap<Id, BTreeSet<Id>>,
}

impl VouchGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, from: &Id, to: &Id) {
        self.edges.entry(from.clone()).or_default().insert(to.clone());
        self.edges.entry(to.clone()).or_default().insert(from.clone());
    }

    /// Everything within two hops of `id`, excluding `id` itself.
    pub fn two_hop(&self, id: &Id) -> BTreeSet<Id> {
        let mut out = BTreeSet::new();
        if let Some(first) = self.edges.get(id) {
            for n in first {
                out.insert(n.clone());
                if let Some(second) = self.edges.get(n) {
                    for m in second {
                        out.insert(m.clone());
                    }
                }
            }
        }
        out.remove(id);
        out
    }

    /// Diversity weight for the next voucher given the already-counted set.
    ///
    /// Weight 1 while fewer than `min_cluster` vouchers are counted or
    /// while overlap stays at or under `threshold`; otherwise
    /// `1 − penalty`.
    pub fn diversity_weight(
        &self,
        voucher: &Id,
        counted: &BTreeSet<Id>,
        threshold: Fixed,
        penalty: Fixed,
        min_cluster: u32,
    ) -> Fixed {
        if counted.is_empty() || (counted.len() as u32) < min_cluster {
            return Fixed::ONE;
        }
        let neighborhood = self.two_hop(voucher);
        let hits = counted.iter().filter(|c| neighborhood.contains(*c)).count();
        let overlap = Fixed::from_int(hits as i64).div(Fixed::from_int(counted.len() as i64));
        if overlap <= threshold {
            Fixed::ONE
        } else {
            Fixed::ONE.sub(penalty).max(Fixed::ZERO)
        }
    }
}
