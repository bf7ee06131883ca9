//! Full-fabric scenarios: wallet → gossip → relay → log → committee →
//! scorer → relying party.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use credence_committee::{
    epoch_seed, form_committee, try_enter, Committee, EligibleSet, EpochState, OperatorRecord,
    SealOutcome,
};
use credence_core::canonical;
use credence_core::error::CredenceError;
use credence_core::fixed::Fixed;
use credence_core::records::Checkpoint;
use credence_core::types::{Context, Epoch, Hash32, Id, Leaf};
use credence_crypto::{
    AggregateSignature, KeyPair, MultiEd25519, SignerBitmap, ThresholdScheme, VrfKeyPair,
};
use credence_events::{Event, EventKind};
use credence_core::config::CoreConfig;
use credence_gossip::{GossipTransport, MemoryTransport, Topic};
use credence_log::{spawn_appender_with, verify_inclusion, LogHandle, Prover, SthSigner};
use credence_relay::{Relay, ScorerTail};
use credence_rules::{AggMode, Ruleset};
use credence_scorer::{NoAttestations, RecordStatus, ScorerEngine};
use credence_store::{EventStore, SledStore};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 12, 20, 0, 0).unwrap()
}

fn vouch(from: &KeyPair, to: &KeyPair, nonce: &[u8], issued: DateTime<Utc>) -> Event {
    let mut ev = Event::new(
        EventKind::Vouch,
        from.id.clone(),
        Some(to.id.clone()),
        Context::Commerce,
        Epoch::new(2025, 9).unwrap(),
        nonce,
        issued,
    );
    ev.sign(from).unwrap();
    ev
}

struct Fabric {
    store: Arc<dyn EventStore>,
    log: LogHandle,
    _dir: tempfile::TempDir,
}

fn fabric() -> Fabric {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn EventStore> = Arc::new(SledStore::open(dir.path()).unwrap());
    let signer = SthSigner::new(1, KeyPair::from_seed([0xA0; 32]));
    let config = CoreConfig {
        batch_window_ms: 5,
        ..CoreConfig::default()
    };
    let (log, _join) = spawn_appender_with(store.clone(), signer, &config).unwrap();
    Fabric {
        store,
        log,
        _dir: dir,
    }
}

// ── Scenario: vouch round-trip ───────────────────────────────────────────────

#[tokio::test]
async fn vouch_round_trip() {
    let a = KeyPair::from_seed([0x01; 32]);
    let b = KeyPair::from_seed([0x02; 32]);
    let issued = Utc.with_ymd_and_hms(2025, 9, 12, 19, 12, 45).unwrap();
    let event = vouch(&a, &b, &[0u8; 12], issued);

    let wire = event.wire_bytes().unwrap();
    assert!(wire.len() < 512, "canonical vouch is {} bytes", wire.len());

    // Content address is stable across serializations.
    let addr1 = event.content_address().unwrap();
    let addr2 = event.content_address().unwrap();
    assert_eq!(addr1, addr2);

    let fx = fabric();
    let relay = Relay::new(fx.store.clone(), fx.log.clone());
    let prior_size = fx.store.leaf_count().unwrap();
    let outcome = relay.ingest_at(&wire, now()).await.unwrap();
    assert_eq!(outcome.address, addr1);
    assert_eq!(outcome.leaf_index, prior_size);

    // Replayed gossip is a duplicate, silently droppable.
    let dup = relay.ingest_at(&wire, now()).await;
    assert!(matches!(dup, Err(CredenceError::DuplicateEvent(_))));
}

// ── Scenario: canonical stability under key shuffling ────────────────────────

#[tokio::test]
async fn canonical_stability_under_key_shuffle() {
    let a = KeyPair::from_seed([0x01; 32]);
    let b = KeyPair::from_seed([0x02; 32]);
    let issued = Utc.with_ymd_and_hms(2025, 9, 12, 19, 12, 45).unwrap();
    let event = vouch(&a, &b, &[0u8; 12], issued);
    let wire = event.wire_bytes().unwrap();

    // Rebuild the same mapping with keys in scrambled order.
    let value = canonical::parse(&wire).unwrap();
    let map = value.as_map().unwrap();
    let mut scrambled = String::from("{");
    let mut keys: Vec<&String> = map.keys().collect();
    keys.reverse();
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            scrambled.push(',');
        }
        let field = canonical::canonical_bytes(&map[key.as_str()]).unwrap();
        scrambled.push_str(&format!("\"{key}\":{}", String::from_utf8(field).unwrap()));
    }
    scrambled.push('}');

    let reparsed = canonical::parse(scrambled.as_bytes()).unwrap();
    let recanonical = canonical::canonical_bytes(&reparsed).unwrap();
    assert_eq!(recanonical, wire);
    assert_eq!(
        canonical::content_address_of_bytes(&recanonical),
        event.content_address().unwrap()
    );
}

// ── Scenario: inclusion proofs over 100 deterministic vouches ────────────────

#[tokio::test]
async fn inclusion_proof_over_one_hundred_leaves() {
    let fx = fabric();
    let relay = Relay::new(fx.store.clone(), fx.log.clone());
    let a = KeyPair::from_seed([0x01; 32]);

    let issued = Utc.with_ymd_and_hms(2025, 9, 12, 12, 0, 0).unwrap();
    for i in 1..=100u8 {
        let b = KeyPair::from_seed([i.wrapping_add(0x40); 32]);
        let event = vouch(&a, &b, &[i; 12], issued);
        relay
            .ingest_at(&event.wire_bytes().unwrap(), now())
            .await
            .unwrap();
    }
    assert_eq!(fx.store.leaf_count().unwrap(), 100);

    let prover = Prover::new(fx.store.clone());
    let root = prover.root_at(100).unwrap();
    let proof = prover.inclusion_proof(0, 100).unwrap();
    assert_eq!(proof.audit_path.len(), 7);
    assert!(proof.verify(&root));

    // One flipped bit anywhere in the audit path breaks it.
    let mut bad = proof.clone();
    bad.audit_path[2].0[11] ^= 0x04;
    assert!(!bad.verify(&root));

    // The sealed head matches the recomputed root.
    let sth = fx.store.latest_sth().unwrap().unwrap();
    assert_eq!(sth.tree_size, 100);
    assert_eq!(sth.root_hash, root);
    assert!(verify_inclusion(
        &proof.leaf_hash,
        0,
        100,
        &proof.audit_path,
        &sth.root_hash
    ));
}

// ── Scenario: checkpoint with four of five honest members ────────────────────

struct CommitteeNet {
    committee: Committee,
    publics: Vec<Vec<u8>>,
    secrets: Vec<[u8; 32]>,
}

fn committee_of_five() -> CommitteeNet {
    let mut records = Vec::new();
    let mut vrfs = Vec::new();
    let mut secrets = Vec::new();
    for i in 0..5u8 {
        let signing = KeyPair::from_seed([i + 0x10; 32]);
        let vrf = VrfKeyPair::from_seed([i + 0x70; 32]);
        records.push(OperatorRecord {
            id: Id::new(format!("key:zop{i:02}")).unwrap(),
            vrf_public: *vrf.verifying_key().as_bytes(),
            threshold_public: signing.verifying_key().as_bytes().to_vec(),
            reputation: Fixed::from_int(10),
        });
        secrets.push(*signing.to_seed());
        vrfs.push(vrf);
    }
    let set = EligibleSet::select(records, Fixed::ZERO);
    let seed = epoch_seed(&Hash32([0; 32]), 1);
    let seats = set
        .iter()
        .zip(vrfs.iter())
        .filter_map(|(op, vrf)| try_enter(&op.id, vrf, &seed, u64::MAX))
        .collect();
    let committee = form_committee(1, seed, &set, u64::MAX, seats).unwrap();
    let publics = committee
        .seats
        .iter()
        .map(|s| set.get(&s.operator).unwrap().threshold_public.clone())
        .collect();
    CommitteeNet {
        committee,
        publics,
        secrets,
    }
}

fn seal_checkpoint(
    net: &CommitteeNet,
    store: &Arc<dyn EventStore>,
    epoch_number: u64,
    timestamp: i64,
) -> Checkpoint {
    let sth = store.latest_sth().unwrap().unwrap();
    let mut state = EpochState::new(
        epoch_number,
        sth.tree_id,
        net.committee.clone(),
        net.publics.clone(),
        Arc::new(MultiEd25519),
    );
    state.observe_sth(&sth).unwrap();
    for index in 0..4u32 {
        let msg = state
            .local_partial(&net.secrets[index as usize], index)
            .unwrap();
        state.accept_partial(msg).unwrap();
    }
    match state.try_seal(timestamp).unwrap() {
        SealOutcome::Published(cp) => {
            store.put_checkpoint(&cp).unwrap();
            cp
        }
        other => panic!("expected published checkpoint, got {other:?}"),
    }
}

#[tokio::test]
async fn checkpoint_seals_and_divergent_partial_is_evidence() {
    let fx = fabric();
    let relay = Relay::new(fx.store.clone(), fx.log.clone());
    let a = KeyPair::from_seed([0x01; 32]);
    let issued = Utc.with_ymd_and_hms(2025, 9, 12, 12, 0, 0).unwrap();
    for i in 1..=100u8 {
        let b = KeyPair::from_seed([i.wrapping_add(0x40); 32]);
        let event = vouch(&a, &b, &[i; 12], issued);
        relay
            .ingest_at(&event.wire_bytes().unwrap(), now())
            .await
            .unwrap();
    }

    let net = committee_of_five();
    let sth = fx.store.latest_sth().unwrap().unwrap();
    let mut state = EpochState::new(
        1,
        1,
        net.committee.clone(),
        net.publics.clone(),
        Arc::new(MultiEd25519),
    );
    state.observe_sth(&sth).unwrap();
    for index in 0..4u32 {
        let msg = state
            .local_partial(&net.secrets[index as usize], index)
            .unwrap();
        state.accept_partial(msg).unwrap();
    }
    // The fifth member signs a different root.
    let rogue_root = Hash32([0xEE; 32]);
    let body = Checkpoint::signing_bytes(1, sth.tree_size, &rogue_root, 1).unwrap();
    let scheme = MultiEd25519;
    let rogue = credence_committee::PartialMsg {
        epoch_number: 1,
        tree_id: 1,
        tree_size: sth.tree_size,
        root_hash: rogue_root,
        signer_index: 4,
        partial: scheme.partial_sign(&net.secrets[4], 4, &body).unwrap(),
    };
    state.accept_partial(rogue).unwrap();

    let SealOutcome::Published(cp) = state.try_seal(now().timestamp()).unwrap() else {
        panic!("honest root must seal");
    };
    assert_eq!(cp.tree_size, 100);
    assert_eq!(cp.root_hash, sth.root_hash, "rogue root never aggregates");

    // The aggregate verifies as a 4-of-5 threshold signature.
    let bitmap = SignerBitmap::from_bytes(cp.signer_bitmap.clone(), 5).unwrap();
    assert_eq!(bitmap.count_ones(), 4);
    let aggregate = AggregateSignature {
        bitmap,
        bytes: cp.aggregate_signature.clone(),
    };
    let honest_body =
        Checkpoint::signing_bytes(cp.tree_id, cp.tree_size, &cp.root_hash, cp.epoch_number)
            .unwrap();
    scheme
        .verify_aggregate(&net.publics, 4, &honest_body, &aggregate)
        .unwrap();
}

// ── Scenario: the whole fabric, gossip to relying party ──────────────────────

#[tokio::test]
async fn gossip_to_score_record() {
    let fx = fabric();
    let transport = MemoryTransport::new();
    let relay = Arc::new(Relay::new(fx.store.clone(), fx.log.clone()));

    // Relay consumes the commerce topic in the background.
    let serve_relay = relay.clone();
    let serve_transport = transport.clone();
    let server = tokio::spawn(async move {
        serve_relay
            .serve(&serve_transport, Context::Commerce)
            .await
    });

    // Give the subscription a beat to land, then publish a vouch.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let a = KeyPair::from_seed([0x01; 32]);
    let b = KeyPair::from_seed([0x02; 32]);
    let event = vouch(&a, &b, &[3u8; 12], Utc::now());
    transport
        .publish(
            &Topic::events(Context::Commerce.as_str()),
            event.wire_bytes().unwrap(),
        )
        .await
        .unwrap();

    // Wait for the leaf to land and the head to seal.
    let mut sealed = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if let Some(sth) = fx.store.latest_sth().unwrap() {
            if sth.tree_size == 1 {
                sealed = Some(sth);
                break;
            }
        }
    }
    let sth = sealed.expect("event should flow from gossip into a sealed head");
    assert_eq!(sth.tree_size, 1);

    // Committee seals the epoch, scorer tails it.
    let net = committee_of_five();
    let cp = seal_checkpoint(&net, &fx.store, 1, Utc::now().timestamp());

    let engine = ScorerEngine::new(
        fx.store.clone(),
        Arc::new(NoAttestations),
        Ruleset::baseline(),
    )
    .unwrap();
    let mut tail = ScorerTail::new(engine);
    let recomputed = tail.apply(&cp).unwrap();
    assert!(recomputed >= 1);

    let record = tail
        .engine()
        .score_record(&b.id, Context::Commerce, 0)
        .unwrap();
    assert_eq!(record.status, RecordStatus::Ok);
    record.verify_inclusions().unwrap();
    record
        .verify_consistency_from(&credence_log::empty_root())
        .unwrap();
    record.verify_ruleset_pin(&Ruleset::baseline()).unwrap();

    // A persisted record is retrievable by relying parties.
    assert!(fx
        .store
        .get_score_record_bytes(&b.id, Context::Commerce, 1)
        .unwrap()
        .is_some());

    drop(transport);
    server.abort();
}

// ── Scenario: scorer determinism over a 1000-event fixture ───────────────────

#[tokio::test]
async fn scorer_is_deterministic_under_reversed_replay() {
    let authors: Vec<KeyPair> = (0..20u8).map(|i| KeyPair::from_seed([i + 1; 32])).collect();
    let subjects: Vec<KeyPair> = (0..10u8)
        .map(|i| KeyPair::from_seed([i + 0xB0; 32]))
        .collect();

    // 1000 deterministic vouches spread across authors and subjects.
    let mut events = Vec::with_capacity(1000);
    for n in 0..1000usize {
        let from = &authors[n % authors.len()];
        let to = &subjects[(n / authors.len()) % subjects.len()];
        if from.id == to.id {
            continue;
        }
        let issued = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap()
            + chrono::Duration::seconds(n as i64 * 977);
        let nonce = [(n % 251) as u8; 12];
        events.push(vouch(from, to, &nonce, issued));
    }

    let run = |reverse: bool| {
        let events = events.clone();
        let subjects_ids: Vec<Id> = subjects.iter().map(|s| s.id.clone()).collect();
        async move {
            let dir = tempfile::tempdir().unwrap();
            let store: Arc<dyn EventStore> = Arc::new(SledStore::open(dir.path()).unwrap());

            // Ingestion order varies; the committed leaf order does not.
            let mut ingest_order: Vec<&Event> = events.iter().collect();
            if reverse {
                ingest_order.reverse();
            }
            for event in ingest_order {
                store.put_event(event).unwrap();
            }
            let leaves: Vec<Leaf> = events.iter().map(|e| e.leaf().unwrap()).collect();
            store.append_leaves(0, &leaves).unwrap();

            let cp = Checkpoint {
                epoch_number: 1,
                tree_id: 1,
                tree_size: leaves.len() as u64,
                root_hash: Prover::new(store.clone())
                    .root_at(leaves.len() as u64)
                    .unwrap(),
                committee_id: Hash32([0xCC; 32]),
                signer_bitmap: vec![0b1111],
                aggregate_signature: vec![0; 64],
                timestamp: Utc
                    .with_ymd_and_hms(2025, 9, 30, 0, 0, 0)
                    .unwrap()
                    .timestamp(),
            };
            let mut engine =
                ScorerEngine::new(store, Arc::new(NoAttestations), Ruleset::baseline()).unwrap();
            engine.apply_checkpoint(&cp).unwrap();

            let mut records = Vec::new();
            for id in &subjects_ids {
                records.push(
                    engine
                        .score_record(id, Context::Commerce, 0)
                        .unwrap()
                        .wire_bytes()
                        .unwrap(),
                );
            }
            records
        }
    };

    let forward = run(false).await;
    let reversed = run(true).await;
    assert_eq!(forward, reversed, "score records must be byte-identical");
}

// ── Scenario: decay across two half-lives ────────────────────────────────────

#[tokio::test]
async fn vouch_decays_to_a_quarter_after_two_half_lives() {
    // Isolate the V factor: γ = 1, everything else 0, linear aggregation.
    let mut ruleset = Ruleset::baseline();
    ruleset.alpha = Fixed::ZERO;
    ruleset.beta = Fixed::ZERO;
    ruleset.gamma = Fixed::ONE;
    ruleset.delta = Fixed::ZERO;
    ruleset.tau = Fixed::ZERO;
    ruleset.vouch_agg = AggMode::Linear;
    let half_life_secs = ruleset.half_life_v as i64 * 86_400;

    let score_at = |age_secs: i64, ruleset: Ruleset| async move {
        let voucher = KeyPair::from_seed([0x21; 32]);
        let subject = KeyPair::from_seed([0x22; 32]);
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn EventStore> = Arc::new(SledStore::open(dir.path()).unwrap());
        let issued = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();
        let event = vouch(&voucher, &subject, &[9u8; 12], issued);
        store.put_event(&event).unwrap();
        store.append_leaves(0, &[event.leaf().unwrap()]).unwrap();

        // The voucher enters with a committed score of 10 from an earlier
        // checkpoint; the next checkpoint picks the vouch up at the target
        // age.
        let mut engine =
            ScorerEngine::new(store.clone(), Arc::new(NoAttestations), ruleset).unwrap();
        let mut committed = credence_scorer::ScoreMap {
            epoch_number: 1,
            ..Default::default()
        };
        committed
            .scores
            .insert((voucher.id.clone(), Context::Commerce), Fixed::from_int(10));
        engine.restore(committed);

        let cp = Checkpoint {
            epoch_number: 2,
            tree_id: 1,
            tree_size: 1,
            root_hash: Hash32([2; 32]),
            committee_id: Hash32([0; 32]),
            signer_bitmap: vec![],
            aggregate_signature: vec![],
            timestamp: issued.timestamp() + age_secs,
        };
        engine.apply_checkpoint(&cp).unwrap();
        engine.snapshot().current.get(&subject.id, Context::Commerce)
    };

    let fresh = score_at(0, ruleset.clone()).await;
    let aged = score_at(2 * half_life_secs, ruleset).await;
    assert_eq!(fresh, Fixed::from_int(10));
    let expected = fresh.mul(Fixed::from_micros(250_000));
    assert!(
        (aged.micros() - expected.micros()).abs() <= 1,
        "aged {aged} vs expected {expected}"
    );
}
