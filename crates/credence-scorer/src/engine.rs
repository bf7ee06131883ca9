//! The checkpoint-driven scoring engine.
//!
//! On each new checkpoint: enumerate the leaves it added, partition by
//! `(subject, context)`, union with identifiers due for decay, recompute
//! exactly that set, and publish the new committed map atomically.
//! Identifiers outside the affected set keep their previous value
//! byte-identically. Voucher scores are read from the map committed at the
//! *previous* checkpoint, so vouch cycles never iterate.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use credence_core::canonical;
use credence_core::error::CredenceError;
use credence_core::fixed::Fixed;
use credence_core::records::Checkpoint;
use credence_core::types::{ContentAddress, Context, Epoch, EpochNumber, Hash32, Id};
use credence_events::{vouch_budget, BudgetOutcome, BudgetTracker, Event, EventKind};
use credence_log::Prover;
use credence_rules::Ruleset;
use credence_store::EventStore;

use crate::record::{factor_commitments, RecordStatus, ScoreRecord, StatusProof};
use crate::score::{compute_score, DecayTables, ScoreBreakdown, ScoreInputs};
use crate::state::{
    AttestationProvider, IdentState, ReportIn, ScoreMap, Snapshot, VouchIn,
};
use crate::status::is_revoked;
use crate::diversity::VouchGraph;

const SECS_PER_DAY: i64 = 86_400;

type IdCtx = (Id, Context);

pub struct ScorerEngine {
    store: Arc<dyn EventStore>,
    prover: Prover,
    attestations: Arc<dyn AttestationProvider>,
    ruleset: Ruleset,
    ruleset_hash: Hash32,
    tables: DecayTables,

    states: HashMap<IdCtx, IdentState>,
    graph: VouchGraph,
    budgets: BudgetTracker,
    /// Committed map at the first checkpoint touching each calendar month;
    /// budget thresholds read from here.
    month_baselines: HashMap<Epoch, Arc<ScoreMap>>,

    prior: Arc<ScoreMap>,
    current: Arc<ScoreMap>,
    breakdowns: HashMap<IdCtx, ScoreBreakdown>,
    /// Last checkpoint each identifier was fully computable at.
    last_good: HashMap<IdCtx, EpochNumber>,
    stale: HashMap<IdCtx, String>,
    /// Day number at which an identifier's decay next shifts a quantum.
    next_decay_day: HashMap<IdCtx, i64>,

    last_checkpoint: Option<Checkpoint>,
    version: u64,
}

impl ScorerEngine {
    pub fn new(
        store: Arc<dyn EventStore>,
        attestations: Arc<dyn AttestationProvider>,
        ruleset: Ruleset,
    ) -> Result<Self, CredenceError> {
        let ruleset_hash = ruleset.content_hash()?;
        let tables = DecayTables::for_ruleset(&ruleset);
        Ok(Self {
            prover: Prover::new(store.clone()),
            store,
            attestations,
            ruleset,
            ruleset_hash,
            tables,
            states: HashMap::new(),
            graph: VouchGraph::new(),
            budgets: BudgetTracker::new(),
            month_baselines: HashMap::new(),
            prior: Arc::new(ScoreMap::default()),
            current: Arc::new(ScoreMap::default()),
            breakdowns: HashMap::new(),
            last_good: HashMap::new(),
            stale: HashMap::new(),
            next_decay_day: HashMap::new(),
            last_checkpoint: None,
            version: 0,
        })
    }

    /// Warm-start from a previously committed score map, e.g. after a
    /// restart before tailing resumes. The map becomes the committed state
    /// the next checkpoint's voucher lookups read from.
    pub fn restore(&mut self, committed: ScoreMap) {
        self.current = Arc::new(committed);
    }

    /// The published snapshot: readers see a consistent (prior, current)
    /// pair tied to the last applied checkpoint.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: self.version,
            prior: self.prior.clone(),
            current: self.current.clone(),
        }
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    /// Tail the log through a new checkpoint. Returns the recomputed set.
    pub fn apply_checkpoint(
        &mut self,
        checkpoint: &Checkpoint,
    ) -> Result<Vec<IdCtx>, CredenceError> {
        let prev_size = self
            .last_checkpoint
            .as_ref()
            .map(|c| c.tree_size)
            .unwrap_or(0);
        if let Some(last) = &self.last_checkpoint {
            if checkpoint.epoch_number <= last.epoch_number
                || checkpoint.tree_size < last.tree_size
            {
                return Err(CredenceError::SemanticInvalid(format!(
                    "checkpoint {} does not advance epoch {} / size {}",
                    checkpoint.epoch_number, last.epoch_number, last.tree_size
                )));
            }
        }

        let mut affected: BTreeSet<IdCtx> = BTreeSet::new();
        let leaves = self.store.leaf_range(prev_size, checkpoint.tree_size)?;
        for leaf in &leaves {
            let addr = ContentAddress::from_digest(leaf.content_hash);
            let event = match self.store.get_event(&addr) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    warn!(%addr, "leaf committed but event blob missing; skipping");
                    continue;
                }
                Err(e) => {
                    warn!(%addr, error = %e, "leaf committed but event unreadable; skipping");
                    continue;
                }
            };
            self.ingest_event(&event, &addr, &mut affected)?;
        }

        // Union with identifiers whose decay is due.
        let today = checkpoint.timestamp / SECS_PER_DAY;
        for (key, due_day) in &self.next_decay_day {
            if *due_day <= today && self.states.contains_key(key) {
                affected.insert(key.clone());
            }
        }

        // Recompute the affected set against the prior committed map.
        let mut next = ScoreMap {
            epoch_number: checkpoint.epoch_number,
            scores: self.current.scores.clone(),
        };
        for key in &affected {
            let state = self.states.entry(key.clone()).or_default();
            match Self::compute_one(
                state,
                key,
                &self.store,
                self.attestations.as_ref(),
                &self.graph,
                &self.current,
                &self.ruleset,
                &self.tables,
                checkpoint.timestamp,
            ) {
                Ok(breakdown) => {
                    next.scores.insert(key.clone(), breakdown.score);
                    self.breakdowns.insert(key.clone(), breakdown);
                    self.last_good.insert(key.clone(), checkpoint.epoch_number);
                    self.stale.remove(key);
                }
                Err(e) => {
                    // Unrecoverable inputs are isolated per identifier; the
                    // previous committed value stands and the record goes
                    // stale. The scorer itself never panics here.
                    warn!(id = %key.0, context = %key.1, error = %e, "score stale");
                    self.stale.insert(key.clone(), e.to_string());
                }
            }
            self.next_decay_day.insert(key.clone(), today + 1);
        }

        // Atomic publish: readers swap to the new Arc pair.
        self.prior = self.current.clone();
        self.current = Arc::new(next);
        self.version += 1;
        self.last_checkpoint = Some(checkpoint.clone());
        info!(
            epoch = checkpoint.epoch_number,
            leaves = leaves.len(),
            recomputed = affected.len(),
            "checkpoint applied"
        );
        Ok(affected.into_iter().collect())
    }

    fn ingest_event(
        &mut self,
        event: &Event,
        addr: &ContentAddress,
        affected: &mut BTreeSet<IdCtx>,
    ) -> Result<(), CredenceError> {
        let issued_ts = event.issued_at.timestamp();
        match event.kind {
            EventKind::Vouch => {
                let subject = event.to.clone().ok_or_else(|| {
                    CredenceError::StorageCorrupt("committed vouch without subject".into())
                })?;
                let baseline = self
                    .month_baselines
                    .entry(event.epoch)
                    .or_insert_with(|| self.current.clone())
                    .clone();
                let budget = vouch_budget(
                    self.ruleset.vouch_b0,
                    self.ruleset.vouch_lambda,
                    baseline.get(&event.from, event.context),
                );
                let outcome =
                    self.budgets
                        .admit(&event.from, event.context, event.epoch, budget);
                if outcome == BudgetOutcome::Excluded {
                    debug!(from = %event.from, epoch = %event.epoch, "vouch over budget; excluded from scoring");
                }
                let key = (subject.clone(), event.context);
                let state = self.states.entry(key.clone()).or_default();
                state.push_vouch(VouchIn {
                    voucher: event.from.clone(),
                    issued_at: issued_ts,
                    content_address: *addr,
                    epoch: event.epoch,
                    admitted: outcome == BudgetOutcome::Admitted,
                });
                state.touch(issued_ts);
                self.graph.add_edge(&event.from, &subject);
                affected.insert(key);
                // The voucher acted; their standing clock moves too.
                let author_key = (event.from.clone(), event.context);
                self.states.entry(author_key.clone()).or_default().touch(issued_ts);
                affected.insert(author_key);
            }
            EventKind::Report => {
                let subject = event.to.clone().ok_or_else(|| {
                    CredenceError::StorageCorrupt("committed report without subject".into())
                })?;
                let key = (subject, event.context);
                let severity = self.report_severity(event);
                let state = self.states.entry(key.clone()).or_default();
                match severity {
                    Ok(severity) => {
                        let pos = state
                            .reports
                            .partition_point(|r| (r.issued_at, r.content_address) < (issued_ts, *addr));
                        state.reports.insert(
                            pos,
                            ReportIn {
                                reporter: event.from.clone(),
                                issued_at: issued_ts,
                                content_address: *addr,
                                severity,
                                appealed: false,
                            },
                        );
                    }
                    Err(e) => {
                        // Counted leaf with an unreadable payload: the
                        // subject goes stale rather than mis-scored.
                        self.stale.insert(key.clone(), e.to_string());
                    }
                }
                affected.insert(key);
            }
            EventKind::Appeal => {
                // An appeal is filed by the reported identity and targets a
                // report by content address; an accepted appeal clears it.
                if let Ok((target, accepted)) = self.appeal_target(event) {
                    let key = (event.from.clone(), event.context);
                    if let Some(state) = self.states.get_mut(&key) {
                        for report in &mut state.reports {
                            if report.content_address == target {
                                report.appealed = accepted;
                            }
                        }
                    }
                    affected.insert(key);
                }
            }
            EventKind::RevocationAnnounce => {
                // A new status list from this issuer may flip revocation
                // bits under any holder's attestations; recompute everyone
                // currently tracked. Announcements are rare.
                if let Some(bitmap_ref) = &event.payload_ref {
                    self.store
                        .put_status_list(&event.from, event.epoch, bitmap_ref)?;
                }
                for key in self.states.keys() {
                    affected.insert(key.clone());
                }
            }
        }
        Ok(())
    }

    /// Adjudicated severity from the report's payload blob:
    /// `{"severity": <decimal in [0,1]>}`.
    fn report_severity(&self, event: &Event) -> Result<Fixed, CredenceError> {
        let payload_ref = event.payload_ref.as_ref().ok_or_else(|| {
            CredenceError::SchemaInvalid("report carries no adjudication payload".into())
        })?;
        let bytes = self.store.get_blob(payload_ref)?.ok_or_else(|| {
            CredenceError::NotFound(format!("report payload {payload_ref}"))
        })?;
        let value = canonical::check_canonical(&bytes)?;
        let severity = value
            .as_map()
            .and_then(|m| m.get("severity"))
            .and_then(|v| v.as_micros())
            .ok_or_else(|| {
                CredenceError::SchemaInvalid("report payload missing severity".into())
            })?;
        let severity = Fixed::from_micros(severity);
        if severity < Fixed::ZERO || severity > Fixed::ONE {
            return Err(CredenceError::SemanticInvalid(
                "severity outside [0, 1]".into(),
            ));
        }
        Ok(severity)
    }

    /// Appeal payload: `{"report": "<content address>", "accepted": bool}`.
    fn appeal_target(&self, event: &Event) -> Result<(ContentAddress, bool), CredenceError> {
        let payload_ref = event.payload_ref.as_ref().ok_or_else(|| {
            CredenceError::SchemaInvalid("appeal carries no payload".into())
        })?;
        let bytes = self.store.get_blob(payload_ref)?.ok_or_else(|| {
            CredenceError::NotFound(format!("appeal payload {payload_ref}"))
        })?;
        let value = canonical::check_canonical(&bytes)?;
        let map = value
            .as_map()
            .ok_or_else(|| CredenceError::SchemaInvalid("appeal payload not a map".into()))?;
        let target: ContentAddress = map
            .get("report")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CredenceError::SchemaInvalid("appeal payload missing report".into()))?
            .parse()?;
        let accepted = matches!(map.get("accepted"), Some(canonical::Value::Bool(true)));
        Ok((target, accepted))
    }

    #[allow(clippy::too_many_arguments)]
    fn compute_one(
        state: &IdentState,
        key: &IdCtx,
        store: &Arc<dyn EventStore>,
        attestations: &dyn AttestationProvider,
        graph: &VouchGraph,
        prior: &ScoreMap,
        ruleset: &Ruleset,
        tables: &DecayTables,
        eval_ts: i64,
    ) -> Result<ScoreBreakdown, CredenceError> {
        let atts = attestations.attestations(&key.0, key.1)?;
        let mut revoked = Vec::with_capacity(atts.len());
        for at in &atts {
            revoked.push(is_revoked(store, &at.issuer, at.status_epoch, at.status_index)?);
        }
        compute_score(
            state,
            &ScoreInputs {
                context: key.1,
                attestations: &atts,
                revoked: &revoked,
                graph,
                prior,
                ruleset,
                tables,
                eval_ts,
            },
        )
    }

    /// Assemble the relying-party record for `(id, context)` at the last
    /// applied checkpoint. `caller_tree_size` is the head the caller
    /// already trusts (0 for none); the consistency proof bridges from it.
    pub fn score_record(
        &self,
        id: &Id,
        context: Context,
        caller_tree_size: u64,
    ) -> Result<ScoreRecord, CredenceError> {
        let checkpoint = self
            .last_checkpoint
            .clone()
            .ok_or_else(|| CredenceError::NotFound("no checkpoint applied yet".into()))?;
        let key = (id.clone(), context);

        let status = match self.stale.get(&key) {
            Some(reason) => RecordStatus::Stale {
                last_good: self.last_good.get(&key).copied().unwrap_or(0),
                reason: reason.clone(),
            },
            None => RecordStatus::Ok,
        };

        let breakdown = self.breakdowns.get(&key).copied().unwrap_or_default();
        let score = self.current.get(id, context);

        // Inclusion proofs for every event counted into the score.
        let mut inclusion_proofs = Vec::new();
        if let Some(state) = self.states.get(&key) {
            let mut counted: Vec<ContentAddress> = state
                .vouches
                .iter()
                .filter(|v| v.admitted)
                .map(|v| v.content_address)
                .chain(
                    state
                        .reports
                        .iter()
                        .filter(|r| !r.appealed && r.severity >= self.ruleset.min_severity)
                        .map(|r| r.content_address),
                )
                .collect();
            counted.sort();
            counted.dedup();
            for addr in counted {
                inclusion_proofs.push(
                    self.prover
                        .inclusion_proof_for_hash(addr.digest(), checkpoint.tree_size)?,
                );
            }
        }

        let consistency_proof = if caller_tree_size <= checkpoint.tree_size {
            Some(
                self.prover
                    .consistency_proof(caller_tree_size, checkpoint.tree_size)?,
            )
        } else {
            None
        };

        // Status proofs for the attestations read during scoring.
        let mut status_proofs = Vec::new();
        for at in self.attestations.attestations(id, context)? {
            if let Some(bitmap_ref) = self.store.status_list(&at.issuer, at.status_epoch)? {
                status_proofs.push(StatusProof {
                    issuer: at.issuer.clone(),
                    epoch: at.status_epoch,
                    bitmap_ref,
                    index: at.status_index,
                    revoked: is_revoked(&self.store, &at.issuer, at.status_epoch, at.status_index)?,
                });
            }
        }

        Ok(ScoreRecord {
            id: id.clone(),
            context,
            status,
            score,
            ruleset_id: self.ruleset.id.clone(),
            ruleset_hash: self.ruleset_hash,
            checkpoint,
            factor_commitments: factor_commitments(&breakdown)?,
            inclusion_proofs,
            consistency_proof,
            status_proofs,
        })
    }

    /// Persist the canonical record bytes under `score/<id>/<ctx>/<epoch>`.
    pub fn persist_record(&self, record: &ScoreRecord) -> Result<(), CredenceError> {
        self.store.put_score_record_bytes(
            &record.id,
            record.context,
            record.checkpoint.epoch_number,
            &record.wire_bytes()?,
        )
    }

    /// Per-month committed baselines used for budget admissibility (the
    /// map at the checkpoint preceding the month's first committed leaf).
    pub fn month_baseline(&self, epoch: Epoch) -> Option<Arc<ScoreMap>> {
        self.month_baselines.get(&epoch).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use credence_core::types::{Hash32, Leaf};
    use credence_crypto::KeyPair;
    use credence_store::SledStore;
    use crate::state::NoAttestations;

    struct Harness {
        store: Arc<dyn EventStore>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn EventStore> = Arc::new(SledStore::open(dir.path()).unwrap());
        Harness { store, _dir: dir }
    }

    fn keypair(n: u8) -> KeyPair {
        KeyPair::from_seed([n; 32])
    }

    fn vouch_event(from: &KeyPair, to: &KeyPair, nonce: u8, day: u32) -> Event {
        let issued = chrono::Utc
            .with_ymd_and_hms(2025, 9, day, 12, 0, 0)
            .unwrap();
        let mut ev = Event::new(
            EventKind::Vouch,
            from.id.clone(),
            Some(to.id.clone()),
            Context::Commerce,
            Epoch::new(2025, 9).unwrap(),
            &[nonce; 12],
            issued,
        );
        ev.sign(from).unwrap();
        ev
    }

    fn commit_events(harness: &Harness, events: &[Event], epoch_number: u64) -> Checkpoint {
        let first = harness.store.leaf_count().unwrap();
        let leaves: Vec<Leaf> = events.iter().map(|e| e.leaf().unwrap()).collect();
        harness.store.append_leaves(first, &leaves).unwrap();
        Checkpoint {
            epoch_number,
            tree_id: 1,
            tree_size: harness.store.leaf_count().unwrap(),
            root_hash: Hash32([epoch_number as u8; 32]),
            committee_id: Hash32([0xCC; 32]),
            signer_bitmap: vec![0b1111],
            aggregate_signature: vec![0; 64],
            timestamp: chrono::Utc
                .with_ymd_and_hms(2025, 9, 28, 0, 0, 0)
                .unwrap()
                .timestamp()
                + epoch_number as i64 * 600,
        }
    }

    fn engine(harness: &Harness) -> ScorerEngine {
        ScorerEngine::new(
            harness.store.clone(),
            Arc::new(NoAttestations),
            Ruleset::baseline(),
        )
        .unwrap()
    }

    #[test]
    fn vouches_move_scores_through_checkpoints() {
        let harness = harness();
        let a = keypair(0x01);
        let b = keypair(0x02);
        let c = keypair(0x03);

        // Checkpoint 1: A vouches for B (A has no score yet → contributes 0).
        let e1 = vouch_event(&a, &b, 1, 1);
        harness.store.put_event(&e1).unwrap();
        let cp1 = commit_events(&harness, &[e1], 1);

        let mut engine = engine(&harness);
        engine.apply_checkpoint(&cp1).unwrap();
        let b_score_1 = engine.snapshot().current.get(&b.id, Context::Commerce);

        // Checkpoint 2: B vouches for C. B's activity earned some T by now,
        // so C picks up a nonzero vouch mass derived from B's prior score.
        let e2 = vouch_event(&b, &c, 2, 2);
        harness.store.put_event(&e2).unwrap();
        let cp2 = commit_events(&harness, &[e2], 2);
        engine.apply_checkpoint(&cp2).unwrap();

        let snap = engine.snapshot();
        assert_eq!(snap.prior.get(&b.id, Context::Commerce), b_score_1);
        let c_score = snap.current.get(&c.id, Context::Commerce);
        assert!(c_score >= Fixed::ZERO);
        assert_eq!(snap.version, 2);
    }

    #[test]
    fn untouched_identifiers_keep_scores_byte_identically() {
        let harness = harness();
        let a = keypair(0x04);
        let b = keypair(0x05);
        let x = keypair(0x06);
        let y = keypair(0x07);

        let e1 = vouch_event(&a, &b, 1, 1);
        let e2 = vouch_event(&x, &y, 2, 1);
        harness.store.put_event(&e1).unwrap();
        harness.store.put_event(&e2).unwrap();
        let cp1 = commit_events(&harness, &[e1, e2], 1);
        let mut engine = engine(&harness);
        engine.apply_checkpoint(&cp1).unwrap();
        let y_before = engine.snapshot().current.get(&y.id, Context::Commerce);
        // Force decay day forward so nothing is due next checkpoint.
        let e3 = vouch_event(&a, &b, 3, 2);
        harness.store.put_event(&e3).unwrap();
        let mut cp2 = commit_events(&harness, &[e3], 2);
        // Same day as cp1: decay not due, y not touched by the new leaf.
        cp2.timestamp = cp1.timestamp;
        let recomputed = engine.apply_checkpoint(&cp2).unwrap();
        assert!(!recomputed.contains(&(y.id.clone(), Context::Commerce)));
        assert_eq!(
            engine.snapshot().current.get(&y.id, Context::Commerce),
            y_before
        );
    }

    #[test]
    fn ingestion_order_into_the_store_does_not_matter() {
        // Two stores, same leaf sequence, events inserted in opposite
        // order. Records must come out byte-identical.
        let a = keypair(0x08);
        let b = keypair(0x09);
        let c = keypair(0x0A);
        let events: Vec<Event> = vec![
            vouch_event(&a, &b, 1, 1),
            vouch_event(&c, &b, 2, 2),
            vouch_event(&a, &c, 3, 3),
        ];

        let run = |insert_order: Vec<usize>| -> Vec<u8> {
            let harness = harness();
            for i in insert_order {
                harness.store.put_event(&events[i]).unwrap();
            }
            let cp = commit_events(&harness, &events, 1);
            let mut engine = engine(&harness);
            engine.apply_checkpoint(&cp).unwrap();
            engine
                .score_record(&b.id, Context::Commerce, 0)
                .unwrap()
                .wire_bytes()
                .unwrap()
        };

        let forward = run(vec![0, 1, 2]);
        let reverse = run(vec![2, 1, 0]);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn score_record_bundles_verifying_proofs() {
        let harness = harness();
        let a = keypair(0x0B);
        let b = keypair(0x0C);
        let e1 = vouch_event(&a, &b, 1, 1);
        harness.store.put_event(&e1).unwrap();
        let mut cp = commit_events(&harness, &[e1], 1);
        // Root must be the real tree root for proof verification.
        let prover = Prover::new(harness.store.clone());
        cp.root_hash = prover.root_at(cp.tree_size).unwrap();

        let mut engine = engine(&harness);
        engine.apply_checkpoint(&cp).unwrap();
        let record = engine.score_record(&b.id, Context::Commerce, 0).unwrap();

        assert_eq!(record.status, RecordStatus::Ok);
        assert_eq!(record.inclusion_proofs.len(), 1);
        record.verify_inclusions().unwrap();
        record
            .verify_consistency_from(&credence_log::empty_root())
            .unwrap();
        engine.persist_record(&record).unwrap();
        assert!(harness
            .store
            .get_score_record_bytes(&b.id, Context::Commerce, 1)
            .unwrap()
            .is_some());
    }

    #[test]
    fn missing_report_payload_marks_subject_stale() {
        let harness = harness();
        let a = keypair(0x0D);
        let b = keypair(0x0E);
        let issued = chrono::Utc.with_ymd_and_hms(2025, 9, 5, 12, 0, 0).unwrap();
        let mut report = Event::new(
            EventKind::Report,
            a.id.clone(),
            Some(b.id.clone()),
            Context::Commerce,
            Epoch::new(2025, 9).unwrap(),
            &[1; 12],
            issued,
        );
        // Payload reference that was never stored.
        report.payload_ref = Some(ContentAddress::from_digest(Hash32([0xEE; 32])));
        report.sign(&a).unwrap();
        harness.store.put_event(&report).unwrap();
        let cp = commit_events(&harness, &[report], 1);

        let mut engine = engine(&harness);
        engine.apply_checkpoint(&cp).unwrap();
        let record = engine.score_record(&b.id, Context::Commerce, 0).unwrap();
        assert!(matches!(record.status, RecordStatus::Stale { .. }));
    }

    #[test]
    fn budget_excludes_excess_vouches_from_scoring() {
        let harness = harness();
        let spender = keypair(0x0F);
        // Give the spender b0 = 5 budget (score 0 → floor(λ·ln1p(0)) = 0).
        let targets: Vec<KeyPair> = (0x10..0x17).map(keypair).collect();
        let events: Vec<Event> = targets
            .iter()
            .enumerate()
            .map(|(i, t)| vouch_event(&spender, t, i as u8, 1 + i as u32))
            .collect();
        for e in &events {
            harness.store.put_event(e).unwrap();
        }
        let cp = commit_events(&harness, &events, 1);
        let mut engine = engine(&harness);
        engine.apply_checkpoint(&cp).unwrap();

        // First five admitted, the remaining two excluded.
        let admitted: usize = targets
            .iter()
            .map(|t| {
                engine.states[&(t.id.clone(), Context::Commerce)]
                    .vouches
                    .iter()
                    .filter(|v| v.admitted)
                    .count()
            })
            .sum();
        assert_eq!(admitted, 5);
    }
}
