//! The deterministic score function.
//!
//! `S = α·K + β·A + γ·agg(V) − δ·R + τ·T`, all arithmetic in 10^-6
//! fixed point, additions in sorted input order, final clamp to
//! `[0, upper_bound]`. Voucher scores are read from the *prior* committed
//! checkpoint, which breaks vouch cycles without iteration.

use std::collections::BTreeSet;

use credence_core::error::CredenceError;
use credence_core::fixed::Fixed;
use credence_core::types::{Context, Timestamp};
use credence_rules::{AggMode, Ruleset};

use crate::decay::{age_days, DecayTable};
use crate::diversity::VouchGraph;
use crate::state::{AttestationIn, IdentState, ScoreMap};

/// Decay tables for every factor, derived once per pinned ruleset.
#[derive(Clone, Debug)]
pub struct DecayTables {
    pub k: DecayTable,
    pub a: DecayTable,
    pub v: DecayTable,
    pub r: DecayTable,
    pub t: DecayTable,
}

impl DecayTables {
    pub fn for_ruleset(ruleset: &Ruleset) -> Self {
        Self {
            k: DecayTable::new(ruleset.half_life_k),
            a: DecayTable::new(ruleset.half_life_a),
            v: DecayTable::new(ruleset.half_life_v),
            r: DecayTable::new(ruleset.half_life_r),
            t: DecayTable::new(ruleset.half_life_t),
        }
    }
}

/// The factor values behind a score, kept for commitments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub k: Fixed,
    pub a: Fixed,
    pub v: Fixed,
    pub r: Fixed,
    pub t: Fixed,
    pub score: Fixed,
}

/// Everything the pure score function needs besides the per-id state.
pub struct ScoreInputs<'a> {
    pub context: Context,
    pub attestations: &'a [AttestationIn],
    /// Revocation status per attestation, same order.
    pub revoked: &'a [bool],
    pub graph: &'a VouchGraph,
    /// Committed scores at the checkpoint prior to this one.
    pub prior: &'a ScoreMap,
    pub ruleset: &'a Ruleset,
    pub tables: &'a DecayTables,
    /// Checkpoint evaluation time.
    pub eval_ts: Timestamp,
}

/// Compute the score for one identifier. Pure: same inputs, same bytes.
pub fn compute_score(
    state: &IdentState,
    inputs: &ScoreInputs<'_>,
) -> Result<ScoreBreakdown, CredenceError> {
    if inputs.attestations.len() != inputs.revoked.len() {
        return Err(CredenceError::SemanticInvalid(
            "attestation/revocation arity mismatch".into(),
        ));
    }
    let rules = inputs.ruleset;

    // ── K and A: attestation factors ─────────────────────────────────────────
    // Deterministic order regardless of provider ordering.
    let mut indexed: Vec<usize> = (0..inputs.attestations.len()).collect();
    indexed.sort_by_key(|&i| {
        let at = &inputs.attestations[i];
        (at.issued_at, at.issuer.clone(), at.kind.clone(), at.status_index)
    });

    let mut k = Fixed::ZERO;
    let mut a = Fixed::ZERO;
    for i in indexed {
        let at = &inputs.attestations[i];
        if inputs.revoked[i] {
            continue;
        }
        let issuer_weight = rules.issuer_weight(at.issuer.as_str());
        if issuer_weight.is_zero() {
            continue;
        }
        if at.is_kyc {
            let recency = inputs.tables.k.recency(age_days(at.issued_at, inputs.eval_ts));
            k = k.add(issuer_weight.mul(recency));
        } else {
            let recency = inputs.tables.a.recency(age_days(at.issued_at, inputs.eval_ts));
            let kind_weight = rules.kind_weight(&at.kind);
            a = a.add(issuer_weight.mul(kind_weight).mul(recency));
        }
    }
    let k = k.clamp(Fixed::ZERO, rules.cap_k);
    let a = a.clamp(Fixed::ZERO, rules.cap_a);

    // ── V: concave vouch aggregation ─────────────────────────────────────────
    let mut vouch_mass = Fixed::ZERO;
    let mut counted = BTreeSet::new();
    for vouch in &state.vouches {
        if !vouch.admitted {
            continue; // budget_indicator = 0
        }
        let s_j = inputs.prior.get(&vouch.voucher, inputs.context);
        let clipped = s_j.min(rules.cap_vouch_in).max(Fixed::ZERO);
        let recency = inputs.tables.v.recency(age_days(vouch.issued_at, inputs.eval_ts));
        let diversity = inputs.graph.diversity_weight(
            &vouch.voucher,
            &counted,
            rules.overlap_threshold,
            rules.overlap_penalty,
            rules.min_cluster_count,
        );
        vouch_mass = vouch_mass.add(clipped.mul(recency).mul(diversity));
        counted.insert(vouch.voucher.clone());
    }
    let v = match rules.vouch_agg {
        AggMode::Sqrt => vouch_mass.sqrt(),
        AggMode::Linear => vouch_mass,
    }
    .clamp(Fixed::ZERO, rules.cap_v);

    // ── R: adjudicated reports ───────────────────────────────────────────────
    let mut r = Fixed::ZERO;
    for report in &state.reports {
        if report.appealed || report.severity < rules.min_severity {
            continue;
        }
        let recency = inputs.tables.r.recency(age_days(report.issued_at, inputs.eval_ts));
        r = r.add(report.severity.mul(recency));
    }
    let r = r.clamp(Fixed::ZERO, rules.cap_r);

    // ── T: time in good standing ─────────────────────────────────────────────
    let t = match (state.first_activity, state.last_activity) {
        (Some(first), Some(last)) => {
            let tenure = inputs.tables.t.recency(age_days(first, inputs.eval_ts));
            let growth = Fixed::ONE.sub(tenure); // saturates toward 1 with age
            let idle = inputs.tables.t.recency(age_days(last, inputs.eval_ts));
            rules.cap_t.mul(growth).mul(idle)
        }
        _ => Fixed::ZERO,
    }
    .clamp(Fixed::ZERO, rules.cap_t);

    // ── Combine ──────────────────────────────────────────────────────────────
    let score = rules
        .alpha
        .mul(k)
        .add(rules.beta.mul(a))
        .add(rules.gamma.mul(v))
        .sub(rules.delta.mul(r))
        .add(rules.tau.mul(t))
        .clamp(Fixed::ZERO, rules.upper_bound);

    Ok(ScoreBreakdown { k, a, v, r, t, score })
}

#[cfg(test)]
mod tests {
    use super::*;
    use credence_core::types::{ContentAddress, Epoch, Hash32, Id};
    use crate::state::{ReportIn, VouchIn};

    const DAY: i64 = 86_400;

    fn id(n: u8) -> Id {
        Id::new(format!("key:zt{n:02}")).unwrap()
    }

    fn vouch(voucher: u8, issued_at: i64, addr: u8, admitted: bool) -> VouchIn {
        VouchIn {
            voucher: id(voucher),
            issued_at,
            content_address: ContentAddress::from_digest(Hash32([addr; 32])),
            epoch: Epoch::new(2025, 9).unwrap(),
            admitted,
        }
    }

    struct Fx {
        ruleset: Ruleset,
        tables: DecayTables,
        graph: VouchGraph,
        prior: ScoreMap,
    }

    fn fx() -> Fx {
        let ruleset = Ruleset::baseline();
        let tables = DecayTables::for_ruleset(&ruleset);
        Fx {
            ruleset,
            tables,
            graph: VouchGraph::new(),
            prior: ScoreMap::default(),
        }
    }

    fn inputs<'a>(fx: &'a Fx, eval_ts: i64) -> ScoreInputs<'a> {
        ScoreInputs {
            context: Context::Commerce,
            attestations: &[],
            revoked: &[],
            graph: &fx.graph,
            prior: &fx.prior,
            ruleset: &fx.ruleset,
            tables: &fx.tables,
            eval_ts,
        }
    }

    #[test]
    fn empty_state_scores_zero() {
        let fx = fx();
        let got = compute_score(&IdentState::default(), &inputs(&fx, 1_000 * DAY)).unwrap();
        assert_eq!(got.score, Fixed::ZERO);
    }

    #[test]
    fn vouch_from_positive_scorer_increases_score() {
        let mut fx = fx();
        fx.prior
            .scores
            .insert((id(1), Context::Commerce), Fixed::from_int(16));

        let mut state = IdentState::default();
        let eval = 1_000 * DAY;
        state.push_vouch(vouch(1, eval, 1, true));
        state.touch(eval);

        let with = compute_score(&state, &inputs(&fx, eval)).unwrap();
        // sqrt(16) = 4, γ = 0.35 → 1.4 plus a hair of T.
        assert_eq!(with.v, Fixed::from_int(4));
        assert!(with.score > Fixed::ZERO);

        // Monotonicity: a second voucher with positive score never lowers it.
        fx.prior
            .scores
            .insert((id(2), Context::Commerce), Fixed::from_int(9));
        state.push_vouch(vouch(2, eval, 2, true));
        let more = compute_score(&state, &inputs(&fx, eval)).unwrap();
        assert!(more.score >= with.score);
    }

    #[test]
    fn excluded_vouches_contribute_nothing() {
        let mut fx = fx();
        fx.prior
            .scores
            .insert((id(1), Context::Commerce), Fixed::from_int(16));
        let eval = 1_000 * DAY;
        let mut state = IdentState::default();
        state.push_vouch(vouch(1, eval, 1, false));
        let got = compute_score(&state, &inputs(&fx, eval)).unwrap();
        assert_eq!(got.v, Fixed::ZERO);
    }

    #[test]
    fn vouch_decays_two_half_lives_to_a_quarter() {
        let mut fx = fx();
        fx.ruleset.vouch_agg = AggMode::Linear; // isolate the recency term
        fx.prior
            .scores
            .insert((id(1), Context::Commerce), Fixed::from_int(10));

        let half_life = fx.ruleset.half_life_v as i64;
        let eval = 3_000 * DAY;

        let mut fresh_state = IdentState::default();
        fresh_state.push_vouch(vouch(1, eval, 1, true));
        let base = compute_score(&fresh_state, &inputs(&fx, eval)).unwrap().v;

        let mut aged_state = IdentState::default();
        aged_state.push_vouch(vouch(1, eval - 2 * half_life * DAY, 1, true));
        let aged = compute_score(&aged_state, &inputs(&fx, eval)).unwrap().v;

        // V = 0.25 · base within one quantum.
        let expected = base.mul(Fixed::from_micros(250_000));
        assert!((aged.micros() - expected.micros()).abs() <= 1);
    }

    #[test]
    fn reports_subtract_and_appeals_clear() {
        let fx = fx();
        let eval = 2_000 * DAY;
        let mut state = IdentState::default();
        state.touch(eval - 400 * DAY);
        let clean = compute_score(&state, &inputs(&fx, eval)).unwrap();

        state.reports.push(ReportIn {
            reporter: id(9),
            issued_at: eval,
            content_address: ContentAddress::from_digest(Hash32([9; 32])),
            severity: Fixed::from_micros(900_000),
            appealed: false,
        });
        let reported = compute_score(&state, &inputs(&fx, eval)).unwrap();
        assert!(reported.score < clean.score);
        assert_eq!(reported.r.micros(), 900_000);

        state.reports[0].appealed = true;
        let appealed = compute_score(&state, &inputs(&fx, eval)).unwrap();
        assert_eq!(appealed.score, clean.score);
    }

    #[test]
    fn caps_and_bounds_hold() {
        let mut fx = fx();
        // Make vouches huge: 60 vouchers, all scored at the clip value.
        for n in 0..60u8 {
            fx.prior
                .scores
                .insert((id(n), Context::Commerce), Fixed::from_int(1_000));
        }
        fx.ruleset.vouch_agg = AggMode::Linear;
        let eval = 1_000 * DAY;
        let mut state = IdentState::default();
        for n in 0..60u8 {
            state.push_vouch(vouch(n, eval, n, true));
        }
        let got = compute_score(&state, &inputs(&fx, eval)).unwrap();
        assert!(got.v <= fx.ruleset.cap_v);
        assert!(got.score <= fx.ruleset.upper_bound);
        assert!(got.score >= Fixed::ZERO);
    }

    #[test]
    fn attestations_feed_k_and_a_with_issuer_weights() {
        let mut fx = fx();
        fx.ruleset
            .issuer_weights
            .insert(id(7).to_string(), Fixed::from_micros(800_000));
        let eval = 1_000 * DAY;
        let attestations = vec![
            AttestationIn {
                issuer: id(7),
                kind: "kyc".into(),
                issued_at: eval,
                status_index: 0,
                status_epoch: Epoch::new(2025, 9).unwrap(),
                is_kyc: true,
            },
            AttestationIn {
                issuer: id(7),
                kind: "employment".into(),
                issued_at: eval,
                status_index: 1,
                status_epoch: Epoch::new(2025, 9).unwrap(),
                is_kyc: false,
            },
            AttestationIn {
                // Unknown issuer weighs zero.
                issuer: id(8),
                kind: "kyc".into(),
                issued_at: eval,
                status_index: 0,
                status_epoch: Epoch::new(2025, 9).unwrap(),
                is_kyc: true,
            },
        ];
        let revoked = vec![false, false, false];
        let mut inp = inputs(&fx, eval);
        inp.attestations = &attestations;
        inp.revoked = &revoked;
        let got = compute_score(&IdentState::default(), &inp).unwrap();
        assert_eq!(got.k.micros(), 800_000);
        assert_eq!(got.a.micros(), 800_000);

        // Revoking the non-KYC attestation zeroes A.
        let revoked = vec![false, true, false];
        inp.revoked = &revoked;
        let got = compute_score(&IdentState::default(), &inp).unwrap();
        assert_eq!(got.a, Fixed::ZERO);
    }
}
