use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use credence_core::canonical::{self, Value};
use credence_core::error::CredenceError;
use credence_core::types::{ContentAddress, Context, Epoch, Hash32, Id, Leaf};
use credence_crypto::{KeyPair, SignatureBytes};

// ── EventKind ────────────────────────────────────────────────────────────────

/// Tagged event variants. The validator dispatches on the tag; there is no
/// inheritance hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Vouch,
    Report,
    Appeal,
    RevocationAnnounce,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Vouch => "vouch",
            EventKind::Report => "report",
            EventKind::Appeal => "appeal",
            EventKind::RevocationAnnounce => "revocation_announce",
        }
    }

    /// Whether this kind asserts something about a second identifier.
    pub fn requires_subject(&self) -> bool {
        !matches!(self, EventKind::RevocationAnnounce)
    }
}

impl FromStr for EventKind {
    type Err = CredenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vouch" => Ok(EventKind::Vouch),
            "report" => Ok(EventKind::Report),
            "appeal" => Ok(EventKind::Appeal),
            "revocation_announce" => Ok(EventKind::RevocationAnnounce),
            other => Err(CredenceError::SchemaInvalid(format!(
                "unknown event type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Timestamp form ───────────────────────────────────────────────────────────

/// The single canonical RFC3339 rendering: UTC, seconds precision, `Z`.
pub fn format_issued_at(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parse an `issued_at` string, requiring the canonical rendering.
pub fn parse_issued_at(s: &str) -> Result<DateTime<Utc>, CredenceError> {
    let parsed = DateTime::parse_from_rfc3339(s)
        .map_err(|e| CredenceError::SchemaInvalid(format!("bad issued_at: {e}")))?
        .with_timezone(&Utc);
    if format_issued_at(&parsed) != s {
        return Err(CredenceError::SchemaInvalid(format!(
            "issued_at not in canonical form: {s}"
        )));
    }
    Ok(parsed)
}

// ── Event ────────────────────────────────────────────────────────────────────

/// A signed assertion by one identifier about another (or about a
/// revocation list). Immutable once signed; the wire format is the
/// canonical bytes of the full signed object, no wrapper.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub from: Id,
    /// Absent iff `kind == RevocationAnnounce`.
    pub to: Option<Id>,
    pub context: Context,
    /// Calendar tag scoping budgets, `YYYY-MM`.
    pub epoch: Epoch,
    /// Content address of an auxiliary blob, if any.
    pub payload_ref: Option<ContentAddress>,
    /// Base64 of at least 12 random bytes.
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    /// Detached signature over the canonical bytes of all other fields.
    pub signature: Option<SignatureBytes>,
}

impl Event {
    pub fn new(
        kind: EventKind,
        from: Id,
        to: Option<Id>,
        context: Context,
        epoch: Epoch,
        nonce: &[u8],
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            from,
            to,
            context,
            epoch,
            payload_ref: None,
            nonce: BASE64.encode(nonce),
            issued_at,
            signature: None,
        }
    }

    pub fn with_payload_ref(mut self, payload_ref: ContentAddress) -> Self {
        self.payload_ref = Some(payload_ref);
        self
    }

    /// Decoded nonce bytes, if the field is valid base64.
    pub fn nonce_bytes(&self) -> Result<Vec<u8>, CredenceError> {
        BASE64
            .decode(&self.nonce)
            .map_err(|e| CredenceError::SchemaInvalid(format!("nonce is not base64: {e}")))
    }

    fn to_value(&self, include_signature: bool) -> Value {
        let mut entries = vec![
            ("type", Value::str(self.kind.as_str())),
            ("from", Value::str(self.from.as_str())),
            ("context", Value::str(self.context.as_str())),
            ("epoch", Value::str(self.epoch.to_string())),
            ("nonce", Value::str(&self.nonce)),
            ("issued_at", Value::str(format_issued_at(&self.issued_at))),
        ];
        if let Some(to) = &self.to {
            entries.push(("to", Value::str(to.as_str())));
        }
        if let Some(pr) = &self.payload_ref {
            entries.push(("payload_ref", Value::str(pr.to_string())));
        }
        if include_signature {
            if let Some(sig) = &self.signature {
                entries.push(("signature", Value::str(sig.to_hex())));
            }
        }
        Value::map(entries)
    }

    /// Canonical bytes covered by the signature (no `signature` key).
    pub fn signing_bytes(&self) -> Result<Vec<u8>, CredenceError> {
        canonical::canonical_bytes(&self.to_value(false))
    }

    /// Sign in place with `keypair`, which must hold the key bound to
    /// `from`.
    pub fn sign(&mut self, keypair: &KeyPair) -> Result<(), CredenceError> {
        if keypair.id != self.from {
            return Err(CredenceError::SemanticInvalid(
                "signing key does not match the `from` identifier".into(),
            ));
        }
        let bytes = self.signing_bytes()?;
        self.signature = Some(keypair.sign(&bytes));
        Ok(())
    }

    /// Wire bytes: canonical form of the full signed object.
    pub fn wire_bytes(&self) -> Result<Vec<u8>, CredenceError> {
        if self.signature.is_none() {
            return Err(CredenceError::SemanticInvalid(
                "event is unsigned; wire form covers the signature".into(),
            ));
        }
        canonical::canonical_bytes(&self.to_value(true))
    }

    /// Content address over the full signed object.
    pub fn content_address(&self) -> Result<ContentAddress, CredenceError> {
        Ok(canonical::content_address_of_bytes(&self.wire_bytes()?))
    }

    pub fn header(&self) -> EventHeader {
        EventHeader {
            kind: self.kind,
            from: self.from.clone(),
            to: self.to.clone(),
            context: self.context,
            epoch: self.epoch,
            issued_at: self.issued_at,
        }
    }

    /// The log leaf for this event: (content hash, header hash).
    pub fn leaf(&self) -> Result<Leaf, CredenceError> {
        Ok(Leaf::new(
            *self.content_address()?.digest(),
            self.header().hash()?,
        ))
    }

    /// Rebuild an event from a parsed canonical value. Checks field shape
    /// and enumerations only; semantic rules live in the validator.
    pub fn from_value(value: &Value) -> Result<Event, CredenceError> {
        let map = match value {
            Value::Map(m) => m,
            _ => return Err(CredenceError::SchemaInvalid("event must be a mapping".into())),
        };
        let get_str = |key: &str| -> Result<&str, CredenceError> {
            match map.get(key) {
                Some(Value::Str(s)) => Ok(s.as_str()),
                Some(_) => Err(CredenceError::SchemaInvalid(format!(
                    "field `{key}` must be a string"
                ))),
                None => Err(CredenceError::SchemaInvalid(format!(
                    "missing required field `{key}`"
                ))),
            }
        };
        let opt_str = |key: &str| -> Result<Option<&str>, CredenceError> {
            match map.get(key) {
                Some(Value::Str(s)) => Ok(Some(s.as_str())),
                Some(_) => Err(CredenceError::SchemaInvalid(format!(
                    "field `{key}` must be a string"
                ))),
                None => Ok(None),
            }
        };

        for key in map.keys() {
            if !matches!(
                key.as_str(),
                "type" | "from" | "to" | "context" | "epoch" | "payload_ref" | "nonce"
                    | "issued_at" | "signature"
            ) {
                return Err(CredenceError::SchemaInvalid(format!(
                    "unknown field `{key}`"
                )));
            }
        }

        let kind: EventKind = get_str("type")?.parse()?;
        let from = Id::new(get_str("from")?).map_err(schema)?;
        let to = opt_str("to")?.map(Id::new).transpose().map_err(schema)?;
        let context: Context = get_str("context")?.parse()?;
        let epoch: Epoch = get_str("epoch")?.parse()?;
        let payload_ref = opt_str("payload_ref")?
            .map(ContentAddress::from_str)
            .transpose()
            .map_err(schema)?;
        let nonce = get_str("nonce")?.to_string();
        let issued_at = parse_issued_at(get_str("issued_at")?)?;
        let signature = opt_str("signature")?
            .map(|s| {
                let bytes = hex::decode(s)
                    .map_err(|e| CredenceError::SchemaInvalid(format!("bad signature hex: {e}")))?;
                SignatureBytes::from_slice(&bytes).ok_or_else(|| {
                    CredenceError::SchemaInvalid("signature must be 64 bytes".into())
                })
            })
            .transpose()?;

        Ok(Event {
            kind,
            from,
            to,
            context,
            epoch,
            payload_ref,
            nonce,
            issued_at,
            signature,
        })
    }
}

fn schema(e: CredenceError) -> CredenceError {
    CredenceError::SchemaInvalid(e.to_string())
}

// ── EventHeader ──────────────────────────────────────────────────────────────

/// The PII-minimal header committed into the transparency log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    pub kind: EventKind,
    pub from: Id,
    pub to: Option<Id>,
    pub context: Context,
    pub epoch: Epoch,
    pub issued_at: DateTime<Utc>,
}

impl EventHeader {
    pub fn to_value(&self) -> Value {
        let mut entries = vec![
            ("type", Value::str(self.kind.as_str())),
            ("from", Value::str(self.from.as_str())),
            ("context", Value::str(self.context.as_str())),
            ("epoch", Value::str(self.epoch.to_string())),
            ("issued_at", Value::str(format_issued_at(&self.issued_at))),
        ];
        if let Some(to) = &self.to {
            entries.push(("to", Value::str(to.as_str())));
        }
        Value::map(entries)
    }

    /// `sha2-256(canonical(header))`.
    pub fn hash(&self) -> Result<Hash32, CredenceError> {
        canonical::digest(&self.to_value())
    }
}
