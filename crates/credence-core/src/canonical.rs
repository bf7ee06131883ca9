//! Deterministic canonical encoding for JSON-like value trees.
//!
//! One byte string per value: mapping keys in code-point-ascending order,
//! omitted-key stripping (null / empty string / empty sequence / empty
//! mapping vanish from mappings, arrays keep position), a single lexical
//! form per number, minimal string escaping, no whitespace. The encoder is
//! the project's wire format; every digest and content address is taken
//! over these bytes.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::constants::MAX_CANONICAL_BYTES;
use crate::error::CredenceError;
use crate::types::{ContentAddress, Hash32};

/// Maximum digits after the decimal point (bounded by i128 mantissa range).
const MAX_DECIMAL_SCALE: u32 = 38;

// ── Value model ──────────────────────────────────────────────────────────────

/// An exact decimal: `mantissa × 10^-scale`, normalized so the fractional
/// part carries no trailing zeros. `scale == 0` is an integer-valued decimal
/// (emitted without a point).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    pub fn new(mut mantissa: i128, mut scale: u32) -> Result<Self, CredenceError> {
        if scale > MAX_DECIMAL_SCALE {
            return Err(CredenceError::NonCanonicalInput(format!(
                "decimal scale {scale} not exactly representable"
            )));
        }
        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }
        if mantissa == 0 {
            scale = 0;
        }
        Ok(Self { mantissa, scale })
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }
}

/// A JSON-like tree with a total canonical byte encoding.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Str(String),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    pub fn int(i: i64) -> Value {
        Value::Int(i)
    }

    /// A decimal in micro-units (10^-6), the scoring quantum.
    pub fn micros(micros: i64) -> Value {
        Value::Decimal(
            Decimal::new(micros as i128, 6).expect("scale 6 is always representable"),
        )
    }

    pub fn map(entries: Vec<(&str, Value)>) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    pub fn seq(items: Vec<Value>) -> Value {
        Value::Seq(items)
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    /// Numeric value in micro-units. Accepts integers and decimals of scale
    /// at most 6 (finer quanta are not representable in scoring arithmetic).
    pub fn as_micros(&self) -> Option<i64> {
        match self {
            Value::Int(i) => i.checked_mul(1_000_000),
            Value::Decimal(d) if d.scale() <= 6 => {
                let factor = 10i128.pow(6 - d.scale());
                i64::try_from(d.mantissa().checked_mul(factor)?).ok()
            }
            _ => None,
        }
    }

    /// Whether this value vanishes when it appears under a mapping key.
    /// A mapping whose every value is omitted collapses to `{}` and is
    /// itself omitted.
    pub fn is_omitted(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Str(s) => s.is_empty(),
            Value::Seq(items) => items.is_empty(),
            Value::Map(entries) => entries.values().all(Value::is_omitted),
            _ => false,
        }
    }
}

// ── Encoder ──────────────────────────────────────────────────────────────────

/// Serialize `value` to its canonical bytes.
///
/// Fails with `CanonicalTooLarge` past the 16 KiB hard limit.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>, CredenceError> {
    let mut out = Vec::with_capacity(256);
    write_value(&mut out, value)?;
    if out.len() > MAX_CANONICAL_BYTES {
        return Err(CredenceError::CanonicalTooLarge {
            max: MAX_CANONICAL_BYTES,
            got: out.len(),
        });
    }
    Ok(out)
}

fn write_value(out: &mut Vec<u8>, value: &Value) -> Result<(), CredenceError> {
    // Bail early so a pathological tree cannot balloon memory before the
    // final size check.
    if out.len() > MAX_CANONICAL_BYTES {
        return Err(CredenceError::CanonicalTooLarge {
            max: MAX_CANONICAL_BYTES,
            got: out.len(),
        });
    }
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Int(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Value::Decimal(d) => write_decimal(out, d),
        Value::Str(s) => write_string(out, s),
        Value::Seq(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item)?;
            }
            out.push(b']');
        }
        Value::Map(entries) => {
            // BTreeMap iterates keys in byte order, which for UTF-8 equals
            // code-point-ascending order.
            out.push(b'{');
            let mut first = true;
            for (key, val) in entries {
                if val.is_omitted() {
                    continue;
                }
                if !first {
                    out.push(b',');
                }
                first = false;
                write_string(out, key);
                out.push(b':');
                write_value(out, val)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_decimal(out: &mut Vec<u8>, d: &Decimal) {
    if d.scale == 0 {
        out.extend_from_slice(d.mantissa.to_string().as_bytes());
        return;
    }
    if d.mantissa < 0 {
        out.push(b'-');
    }
    let abs = d.mantissa.unsigned_abs();
    let pow = 10u128.pow(d.scale);
    let int_part = abs / pow;
    let frac_part = abs % pow;
    out.extend_from_slice(int_part.to_string().as_bytes());
    out.push(b'.');
    out.extend_from_slice(format!("{:0width$}", frac_part, width = d.scale as usize).as_bytes());
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\u{08}' => out.extend_from_slice(b"\\b"),
            '\t' => out.extend_from_slice(b"\\t"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\u{0c}' => out.extend_from_slice(b"\\f"),
            '\r' => out.extend_from_slice(b"\\r"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}

// ── Parser ───────────────────────────────────────────────────────────────────

/// Parse JSON bytes into a `Value`. Total on syntactically valid JSON whose
/// numbers are exactly representable as i64 integers or bounded decimals;
/// everything else is rejected. Parsing does NOT imply the input was
/// canonical — use [`check_canonical`] for that.
pub fn parse(bytes: &[u8]) -> Result<Value, CredenceError> {
    if bytes.len() > MAX_CANONICAL_BYTES {
        return Err(CredenceError::CanonicalTooLarge {
            max: MAX_CANONICAL_BYTES,
            got: bytes.len(),
        });
    }
    let json: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| CredenceError::Malformed(e.to_string()))?;
    from_json(json)
}

/// Parse and verify that re-encoding reproduces the input bytes exactly.
/// Non-canonical input (reordered keys, whitespace, redundant number forms,
/// un-omitted empties) is rejected with `NonCanonicalInput`.
pub fn check_canonical(bytes: &[u8]) -> Result<Value, CredenceError> {
    let value = parse(bytes)?;
    let reencoded = canonical_bytes(&value)?;
    if reencoded != bytes {
        return Err(CredenceError::NonCanonicalInput(
            "re-canonicalization is not a no-op".into(),
        ));
    }
    Ok(value)
}

fn from_json(json: serde_json::Value) -> Result<Value, CredenceError> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => parse_number(&n.to_string())?,
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => Value::Seq(
            items
                .into_iter()
                .map(from_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        serde_json::Value::Object(entries) => {
            let mut map = BTreeMap::new();
            for (k, v) in entries {
                map.insert(k, from_json(v)?);
            }
            Value::Map(map)
        }
    })
}

/// Parse a JSON number literal into the exact value model. `1e3` normalizes
/// to `1000`; values with no exact decimal form are rejected.
fn parse_number(lit: &str) -> Result<Value, CredenceError> {
    let not_exact =
        || CredenceError::NonCanonicalInput(format!("number {lit} not exactly representable"));

    let (sign, rest) = match lit.strip_prefix('-') {
        Some(rest) => (-1i128, rest),
        None => (1i128, lit),
    };
    let (mantissa_part, exp) = match rest.split_once(['e', 'E']) {
        Some((m, e)) => {
            let exp: i32 = e.parse().map_err(|_| not_exact())?;
            (m, exp)
        }
        None => (rest, 0),
    };
    let (int_digits, frac_digits) = match mantissa_part.split_once('.') {
        Some((i, f)) => (i, f),
        None => (mantissa_part, ""),
    };

    let mut mantissa: i128 = 0;
    for b in int_digits.bytes().chain(frac_digits.bytes()) {
        if !b.is_ascii_digit() {
            return Err(CredenceError::Malformed(format!("bad number literal: {lit}")));
        }
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add((b - b'0') as i128))
            .ok_or_else(not_exact)?;
    }
    mantissa *= sign;

    let mut scale = frac_digits.len() as i64 - exp as i64;
    if scale < 0 {
        // 1e3 → mantissa 1000, scale 0.
        while scale < 0 {
            mantissa = mantissa.checked_mul(10).ok_or_else(not_exact)?;
            scale += 1;
        }
    }
    if scale > MAX_DECIMAL_SCALE as i64 {
        return Err(not_exact());
    }

    if scale == 0 {
        if let Ok(i) = i64::try_from(mantissa) {
            return Ok(Value::Int(i));
        }
        // Integers past i64 keep the exact decimal representation.
        return Ok(Value::Decimal(Decimal::new(mantissa, 0)?));
    }
    Ok(Value::Decimal(Decimal::new(mantissa, scale as u32)?))
}

// ── Digests ──────────────────────────────────────────────────────────────────

/// SHA2-256 over raw bytes.
pub fn digest_bytes(bytes: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Hash32(hasher.finalize().into())
}

/// SHA2-256 over the canonical bytes of `value`.
pub fn digest(value: &Value) -> Result<Hash32, CredenceError> {
    Ok(digest_bytes(&canonical_bytes(value)?))
}

/// Content address of `value`: multihash(sha2-256, digest).
pub fn content_address(value: &Value) -> Result<ContentAddress, CredenceError> {
    Ok(ContentAddress::from_digest(digest(value)?))
}

/// Content address of pre-serialized canonical bytes.
pub fn content_address_of_bytes(bytes: &[u8]) -> ContentAddress {
    ContentAddress::from_digest(digest_bytes(bytes))
}
