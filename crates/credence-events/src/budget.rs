//! Vouch budgets: `b = b0 + floor(λ · ln(1 + score))` per
//! `(from, context, epoch)`.
//!
//! A vouch past the budget stays in gossip but is excluded from scoring.
//! The threshold score is the sender's last committed score at the
//! checkpoint preceding the vouch's epoch; the caller supplies it, so
//! admissibility is a pure function.

use std::collections::HashMap;

use credence_core::fixed::Fixed;
use credence_core::types::{Context, Epoch, Id};

/// Admissible vouch count for a sender with `last_committed_score`.
pub fn vouch_budget(b0: u32, lambda: Fixed, last_committed_score: Fixed) -> u32 {
    let bonus = lambda.mul(last_committed_score.max(Fixed::ZERO).ln_1p());
    b0.saturating_add(bonus.floor_int().max(0) as u32)
}

/// Whether a vouch counts toward scoring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BudgetOutcome {
    /// Within budget; the vouch participates in score aggregation.
    Admitted,
    /// Budget exhausted; kept in gossip and the log, ignored by the scorer.
    Excluded,
}

/// Counts admitted vouches per `(from, context, epoch)`.
#[derive(Debug, Default)]
pub struct BudgetTracker {
    admitted: HashMap<(Id, Context, Epoch), u32>,
}

impl BudgetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one vouch attempt under the given budget; first `budget`
    /// vouches are admitted, the rest excluded.
    pub fn admit(
        &mut self,
        from: &Id,
        context: Context,
        epoch: Epoch,
        budget: u32,
    ) -> BudgetOutcome {
        let used = self
            .admitted
            .entry((from.clone(), context, epoch))
            .or_insert(0);
        if *used < budget {
            *used += 1;
            BudgetOutcome::Admitted
        } else {
            BudgetOutcome::Excluded
        }
    }

    /// Admitted count so far for a scope.
    pub fn used(&self, from: &Id, context: Context, epoch: Epoch) -> u32 {
        self.admitted
            .get(&(from.clone(), context, epoch))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credence_core::types::Id;

    #[test]
    fn budget_grows_logarithmically_with_score() {
        let lambda = Fixed::from_int(2);
        assert_eq!(vouch_budget(3, lambda, Fixed::ZERO), 3);
        // ln(1 + 1) ≈ 0.693 → floor(2 · 0.693) = 1
        assert_eq!(vouch_budget(3, lambda, Fixed::ONE), 4);
        // ln(1 + 100) ≈ 4.615 → floor(9.23) = 9
        assert_eq!(vouch_budget(3, lambda, Fixed::from_int(100)), 12);
        // Negative scores never reduce the base.
        assert_eq!(vouch_budget(3, lambda, Fixed::from_int(-5)), 3);
    }

    #[test]
    fn tracker_admits_up_to_budget_then_excludes() {
        let mut tracker = BudgetTracker::new();
        let from = Id::new("key:zsender").unwrap();
        let epoch = Epoch::new(2025, 9).unwrap();
        for _ in 0..3 {
            assert_eq!(
                tracker.admit(&from, Context::Commerce, epoch, 3),
                BudgetOutcome::Admitted
            );
        }
        assert_eq!(
            tracker.admit(&from, Context::Commerce, epoch, 3),
            BudgetOutcome::Excluded
        );
        // Different context is a separate budget scope.
        assert_eq!(
            tracker.admit(&from, Context::General, epoch, 3),
            BudgetOutcome::Admitted
        );
        assert_eq!(tracker.used(&from, Context::Commerce, epoch), 3);
    }
}
