//! Signed scoring-parameter bundles.
//!
//! Consumers pin a rule set by `(id, content_hash)`; every score record
//! carries both. The content hash covers the canonical bytes of the
//! unsigned bundle; the governance signature covers the same bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use credence_core::canonical::{self, Value};
use credence_core::error::CredenceError;
use credence_core::fixed::Fixed;
use credence_core::types::{Hash32, KeyId, Timestamp};
use credence_crypto::KeyPair;

/// How incoming vouch mass is aggregated before the γ weight applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggMode {
    /// Concave square-root aggregation (the default; dampens collusion).
    Sqrt,
    /// Straight sum, clipped by the factor cap.
    Linear,
}

impl AggMode {
    fn as_str(&self) -> &'static str {
        match self {
            AggMode::Sqrt => "sqrt",
            AggMode::Linear => "linear",
        }
    }

    fn parse(s: &str) -> Result<Self, CredenceError> {
        match s {
            "sqrt" => Ok(AggMode::Sqrt),
            "linear" => Ok(AggMode::Linear),
            other => Err(CredenceError::SchemaInvalid(format!(
                "unknown aggregation mode: {other}"
            ))),
        }
    }
}

/// The complete scoring parameter bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    pub id: String,

    // Factor weights: S = α·K + β·A + γ·agg(V) − δ·R + τ·T.
    pub alpha: Fixed,
    pub beta: Fixed,
    pub gamma: Fixed,
    pub delta: Fixed,
    pub tau: Fixed,

    // Per-factor caps.
    pub cap_k: Fixed,
    pub cap_a: Fixed,
    pub cap_v: Fixed,
    pub cap_r: Fixed,
    pub cap_t: Fixed,
    /// Per-voucher clip inside the V aggregation.
    pub cap_vouch_in: Fixed,

    // Per-factor half-lives (days).
    pub half_life_k: u32,
    pub half_life_a: u32,
    pub half_life_v: u32,
    pub half_life_r: u32,
    pub half_life_t: u32,

    // Vouch budget: b = b0 + floor(λ · ln(1 + score)).
    pub vouch_b0: u32,
    pub vouch_lambda: Fixed,
    pub vouch_agg: AggMode,

    // Diversity damping on the vouch graph.
    pub overlap_threshold: Fixed,
    pub overlap_penalty: Fixed,
    pub min_cluster_count: u32,

    /// Reports below this adjudicated severity are ignored.
    pub min_severity: Fixed,

    /// Operator reputation floor for committee eligibility (θ_op).
    pub operator_threshold: Fixed,

    /// Final score clamp: S ∈ [0, upper_bound].
    pub upper_bound: Fixed,

    /// Attestation kind → weight.
    pub kind_weights: BTreeMap<String, Fixed>,

    /// Issuer identifier → weight. Read, never derived, by the scorer.
    pub issuer_weights: BTreeMap<String, Fixed>,

    /// Unix time at which this bundle becomes active.
    pub valid_from: Timestamp,

    /// Minimum days between publication and `valid_from`.
    pub time_lock_days: u32,
}

impl Ruleset {
    /// A conservative parameter set used across the test suites.
    pub fn baseline() -> Self {
        Self {
            id: "credence-rules-v1".into(),
            alpha: Fixed::from_micros(300_000),  // 0.3
            beta: Fixed::from_micros(200_000),   // 0.2
            gamma: Fixed::from_micros(350_000),  // 0.35
            delta: Fixed::from_micros(400_000),  // 0.4
            tau: Fixed::from_micros(150_000),    // 0.15
            cap_k: Fixed::from_int(10),
            cap_a: Fixed::from_int(20),
            cap_v: Fixed::from_int(50),
            cap_r: Fixed::from_int(40),
            cap_t: Fixed::from_int(10),
            cap_vouch_in: Fixed::from_int(25),
            half_life_k: 365,
            half_life_a: 180,
            half_life_v: 180,
            half_life_r: 90,
            half_life_t: 120,
            vouch_b0: 5,
            vouch_lambda: Fixed::from_int(2),
            vouch_agg: AggMode::Sqrt,
            overlap_threshold: Fixed::from_micros(500_000), // 0.5
            overlap_penalty: Fixed::from_micros(600_000),   // 0.6
            min_cluster_count: 2,
            min_severity: Fixed::from_micros(100_000), // 0.1
            operator_threshold: Fixed::from_int(5),
            upper_bound: Fixed::from_int(100),
            kind_weights: BTreeMap::new(),
            issuer_weights: BTreeMap::new(),
            valid_from: 0,
            time_lock_days: 7,
        }
    }

    /// Weight for an attestation kind; unknown kinds weigh 1.
    pub fn kind_weight(&self, kind: &str) -> Fixed {
        self.kind_weights.get(kind).copied().unwrap_or(Fixed::ONE)
    }

    /// Weight for an issuer; unknown issuers weigh 0 and contribute nothing.
    pub fn issuer_weight(&self, issuer: &str) -> Fixed {
        self.issuer_weights.get(issuer).copied().unwrap_or(Fixed::ZERO)
    }

    pub fn to_value(&self) -> Value {
        let weights = Value::map(vec![
            ("alpha", self.alpha.to_value()),
            ("beta", self.beta.to_value()),
            ("gamma", self.gamma.to_value()),
            ("delta", self.delta.to_value()),
            ("tau", self.tau.to_value()),
        ]);
        let caps = Value::map(vec![
            ("k", self.cap_k.to_value()),
            ("a", self.cap_a.to_value()),
            ("v", self.cap_v.to_value()),
            ("r", self.cap_r.to_value()),
            ("t", self.cap_t.to_value()),
            ("vouch_in", self.cap_vouch_in.to_value()),
        ]);
        let half_lives = Value::map(vec![
            ("k", Value::int(self.half_life_k as i64)),
            ("a", Value::int(self.half_life_a as i64)),
            ("v", Value::int(self.half_life_v as i64)),
            ("r", Value::int(self.half_life_r as i64)),
            ("t", Value::int(self.half_life_t as i64)),
        ]);
        let vouch_budget = Value::map(vec![
            ("b0", Value::int(self.vouch_b0 as i64)),
            ("lambda", self.vouch_lambda.to_value()),
            ("aggregation", Value::str(self.vouch_agg.as_str())),
        ]);
        let diversity = Value::map(vec![
            ("overlap_threshold", self.overlap_threshold.to_value()),
            ("penalty", self.overlap_penalty.to_value()),
            ("min_cluster_count", Value::int(self.min_cluster_count as i64)),
        ]);
        let adjudication = Value::map(vec![("min_severity", self.min_severity.to_value())]);
        let kind_weights = Value::Map(
            self.kind_weights
                .iter()
                .map(|(k, w)| (k.clone(), w.to_value()))
                .collect(),
        );
        let issuer_weights = Value::Map(
            self.issuer_weights
                .iter()
                .map(|(k, w)| (k.clone(), w.to_value()))
                .collect(),
        );
        Value::map(vec![
            ("id", Value::str(&self.id)),
            ("weights", weights),
            ("caps", caps),
            ("half_life_days", half_lives),
            ("vouch_budget", vouch_budget),
            ("diversity", diversity),
            ("adjudication", adjudication),
            ("kind_weights", kind_weights),
            ("issuer_weights", issuer_weights),
            ("operator_threshold", self.operator_threshold.to_value()),
            ("upper_bound", self.upper_bound.to_value()),
            ("valid_from", Value::int(self.valid_from)),
            ("time_lock_days", Value::int(self.time_lock_days as i64)),
        ])
    }

    /// Content hash over the canonical bytes of the unsigned bundle.
    pub fn content_hash(&self) -> Result<Hash32, CredenceError> {
        canonical::digest(&self.to_value())
    }

    pub fn from_value(value: &Value) -> Result<Self, CredenceError> {
        let map = value
            .as_map()
            .ok_or_else(|| CredenceError::SchemaInvalid("ruleset must be a mapping".into()))?;
        let section = |key: &str| -> Result<&BTreeMap<String, Value>, CredenceError> {
            map.get(key)
                .and_then(Value::as_map)
                .ok_or_else(|| CredenceError::SchemaInvalid(format!("missing section `{key}`")))
        };
        let micros = |m: &BTreeMap<String, Value>, key: &str| -> Result<Fixed, CredenceError> {
            m.get(key)
                .and_then(Value::as_micros)
                .map(Fixed::from_micros)
                .ok_or_else(|| CredenceError::SchemaInvalid(format!("missing number `{key}`")))
        };
        let int = |m: &BTreeMap<String, Value>, key: &str| -> Result<i64, CredenceError> {
            m.get(key)
                .and_then(Value::as_int)
                .ok_or_else(|| CredenceError::SchemaInvalid(format!("missing integer `{key}`")))
        };

        let weights = section("weights")?;
        let caps = section("caps")?;
        let half_lives = section("half_life_days")?;
        let vouch_budget = section("vouch_budget")?;
        let diversity = section("diversity")?;
        let adjudication = section("adjudication")?;

        let weight_table = |key: &str| -> Result<BTreeMap<String, Fixed>, CredenceError> {
            match map.get(key) {
                // An empty table is omitted from the canonical form.
                None => Ok(BTreeMap::new()),
                Some(v) => {
                    let m = v.as_map().ok_or_else(|| {
                        CredenceError::SchemaInvalid(format!("`{key}` must be a mapping"))
                    })?;
                    m.iter()
                        .map(|(k, v)| {
                            v.as_micros().map(|u| (k.clone(), Fixed::from_micros(u))).ok_or_else(
                                || {
                                    CredenceError::SchemaInvalid(format!(
                                        "bad weight for `{k}` in `{key}`"
                                    ))
                                },
                            )
                        })
                        .collect()
                }
            }
        };

        Ok(Self {
            id: map
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| CredenceError::SchemaInvalid("missing ruleset id".into()))?
                .to_string(),
            alpha: micros(weights, "alpha")?,
            beta: micros(weights, "beta")?,
            gamma: micros(weights, "gamma")?,
            delta: micros(weights, "delta")?,
            tau: micros(weights, "tau")?,
            cap_k: micros(caps, "k")?,
            cap_a: micros(caps, "a")?,
            cap_v: micros(caps, "v")?,
            cap_r: micros(caps, "r")?,
            cap_t: micros(caps, "t")?,
            cap_vouch_in: micros(caps, "vouch_in")?,
            half_life_k: int(half_lives, "k")? as u32,
            half_life_a: int(half_lives, "a")? as u32,
            half_life_v: int(half_lives, "v")? as u32,
            half_life_r: int(half_lives, "r")? as u32,
            half_life_t: int(half_lives, "t")? as u32,
            vouch_b0: int(vouch_budget, "b0")? as u32,
            vouch_lambda: micros(vouch_budget, "lambda")?,
            vouch_agg: AggMode::parse(
                vouch_budget
                    .get("aggregation")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        CredenceError::SchemaInvalid("missing aggregation mode".into())
                    })?,
            )?,
            overlap_threshold: micros(diversity, "overlap_threshold")?,
            overlap_penalty: micros(diversity, "penalty")?,
            min_cluster_count: int(diversity, "min_cluster_count")? as u32,
            min_severity: micros(adjudication, "min_severity")?,
            operator_threshold: micros(map, "operator_threshold")?,
            upper_bound: micros(map, "upper_bound")?,
            kind_weights: weight_table("kind_weights")?,
            issuer_weights: weight_table("issuer_weights")?,
            valid_from: map
                .get("valid_from")
                .and_then(Value::as_int)
                .unwrap_or(0),
            time_lock_days: map
                .get("time_lock_days")
                .and_then(Value::as_int)
                .unwrap_or(0) as u32,
        })
    }
}

// ── SignedRuleset ────────────────────────────────────────────────────────────

/// A rule set plus its governance signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRuleset {
    pub ruleset: Ruleset,
    pub signer_key_id: KeyId,
    pub signature: Vec<u8>,
}

impl SignedRuleset {
    /// Sign a bundle with a governance key.
    pub fn sign(ruleset: Ruleset, governance: &KeyPair) -> Result<Self, CredenceError> {
        let bytes = canonical::canonical_bytes(&ruleset.to_value())?;
        let signature = governance.sign(&bytes).0.to_vec();
        Ok(Self {
            ruleset,
            signer_key_id: governance.key_id(),
            signature,
        })
    }

    /// Wire form: the unsigned bundle plus signer fields.
    pub fn wire_bytes(&self) -> Result<Vec<u8>, CredenceError> {
        let mut map = match self.ruleset.to_value() {
            Value::Map(m) => m,
            _ => unreachable!("ruleset value is always a map"),
        };
        map.insert(
            "signer_key_id".into(),
            Value::str(self.signer_key_id.0.to_hex()),
        );
        map.insert("signature".into(), Value::str(hex::encode(&self.signature)));
        canonical::canonical_bytes(&Value::Map(map))
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self, CredenceError> {
        let value = canonical::check_canonical(bytes)?;
        let map = value
            .as_map()
            .ok_or_else(|| CredenceError::SchemaInvalid("ruleset must be a mapping".into()))?;
        let signer_key_id = KeyId(Hash32::from_hex(
            map.get("signer_key_id")
                .and_then(Value::as_str)
                .ok_or_else(|| CredenceError::SchemaInvalid("missing signer_key_id".into()))?,
        )?);
        let signature = hex::decode(
            map.get("signature")
                .and_then(Value::as_str)
                .ok_or_else(|| CredenceError::SchemaInvalid("missing signature".into()))?,
        )
        .map_err(|e| CredenceError::SchemaInvalid(format!("bad signature hex: {e}")))?;
        let mut unsigned = map.clone();
        unsigned.remove("signer_key_id");
        unsigned.remove("signature");
        let ruleset = Ruleset::from_value(&Value::Map(unsigned))?;
        Ok(Self {
            ruleset,
            signer_key_id,
            signature,
        })
    }

    /// The bytes the governance signature covers.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, CredenceError> {
        canonical::canonical_bytes(&self.ruleset.to_value())
    }
}
