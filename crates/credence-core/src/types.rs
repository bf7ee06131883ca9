use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{MULTIBASE_BASE58BTC, MULTIHASH_LEN_32, MULTIHASH_SHA2_256};
use crate::error::CredenceError;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

/// Index of a leaf in the transparency log (0-based).
pub type LeafIndex = u64;

/// Number of leaves in the transparency log.
pub type TreeSize = u64;

/// Identifier of a transparency log instance.
pub type TreeId = u64;

/// Monotonically increasing checkpoint epoch counter.
pub type EpochNumber = u64;

// ── Hash32 ───────────────────────────────────────────────────────────────────

/// 32-byte SHA2-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CredenceError> {
        let bytes = hex::decode(s).map_err(|e| CredenceError::Malformed(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CredenceError::Malformed("expected 32 hex-encoded bytes".into()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({}…)", &self.to_hex()[..16])
    }
}

// ── ContentAddress ───────────────────────────────────────────────────────────

/// Content address of a blob: multihash(sha2-256, digest), rendered as
/// multibase base58btc with a `z` prefix.
///
/// By project convention the address of a signed event covers the full signed
/// object including its signature; the signing digest covers the canonical
/// bytes with the `signature` key removed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentAddress(pub Hash32);

impl ContentAddress {
    pub fn from_digest(digest: Hash32) -> Self {
        Self(digest)
    }

    pub fn digest(&self) -> &Hash32 {
        &self.0
    }

    /// The 34-byte multihash: code || length || digest.
    pub fn to_multihash(&self) -> [u8; 34] {
        let mut out = [0u8; 34];
        out[0] = MULTIHASH_SHA2_256;
        out[1] = MULTIHASH_LEN_32;
        out[2..].copy_from_slice(&self.0 .0);
        out
    }

    pub fn from_multihash(bytes: &[u8]) -> Result<Self, CredenceError> {
        if bytes.len() != 34 || bytes[0] != MULTIHASH_SHA2_256 || bytes[1] != MULTIHASH_LEN_32 {
            return Err(CredenceError::Malformed(
                "expected sha2-256 multihash (0x12 0x20 || 32 bytes)".into(),
            ));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes[2..]);
        Ok(Self(Hash32(arr)))
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            MULTIBASE_BASE58BTC,
            bs58::encode(self.to_multihash()).into_string()
        )
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({})", self)
    }
}

impl FromStr for ContentAddress {
    type Err = CredenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(MULTIBASE_BASE58BTC)
            .ok_or_else(|| CredenceError::Malformed("missing multibase prefix".into()))?;
        let bytes = bs58::decode(rest)
            .into_vec()
            .map_err(|e| CredenceError::Malformed(e.to_string()))?;
        Self::from_multihash(&bytes)
    }
}

// ── Id ───────────────────────────────────────────────────────────────────────

/// Opaque identifier of the form `method:opaque`, bound to a verification
/// key. Equality is bytewise. For the `key` method the public key is
/// recoverable from the identifier itself (see credence-crypto).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id(String);

impl Id {
    /// Construct from a raw `method:opaque` string, checking shape only.
    pub fn new(s: impl Into<String>) -> Result<Self, CredenceError> {
        let s = s.into();
        let (method, opaque) = s
            .split_once(':')
            .ok_or_else(|| CredenceError::Malformed("identifier missing ':' separator".into()))?;
        if method.is_empty() || opaque.is_empty() {
            return Err(CredenceError::Malformed(
                "identifier method and opaque part must be non-empty".into(),
            ));
        }
        if !method.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()) {
            return Err(CredenceError::Malformed(
                "identifier method must be lowercase alphanumeric".into(),
            ));
        }
        Ok(Self(s))
    }

    pub fn method(&self) -> &str {
        self.0.split_once(':').map(|(m, _)| m).unwrap_or("")
    }

    pub fn opaque(&self) -> &str {
        self.0.split_once(':').map(|(_, o)| o).unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.0)
    }
}

// ── Context ──────────────────────────────────────────────────────────────────

/// Policy domain under which scores are computed and budgets are scoped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Context {
    General,
    Commerce,
    Hiring,
}

impl Context {
    pub fn as_str(&self) -> &'static str {
        match self {
            Context::General => "general",
            Context::Commerce => "commerce",
            Context::Hiring => "hiring",
        }
    }

    pub fn all() -> [Context; 3] {
        [Context::General, Context::Commerce, Context::Hiring]
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Context {
    type Err = CredenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(Context::General),
            "commerce" => Ok(Context::Commerce),
            "hiring" => Ok(Context::Hiring),
            other => Err(CredenceError::SchemaInvalid(format!(
                "unknown context: {other}"
            ))),
        }
    }
}

// ── Epoch ────────────────────────────────────────────────────────────────────

/// Calendar month tag `YYYY-MM` used to scope budgets and group events.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Epoch {
    pub year: u16,
    pub month: u8,
}

impl Epoch {
    pub fn new(year: u16, month: u8) -> Result<Self, CredenceError> {
        if !(1..=12).contains(&month) || !(1970..=9999).contains(&year) {
            return Err(CredenceError::SchemaInvalid(format!(
                "epoch out of range: {year:04}-{month:02}"
            )));
        }
        Ok(Self { year, month })
    }

    /// The month immediately before this one.
    pub fn pred(&self) -> Epoch {
        if self.month == 1 {
            Epoch { year: self.year - 1, month: 12 }
        } else {
            Epoch { year: self.year, month: self.month - 1 }
        }
    }

    /// The month immediately after this one.
    pub fn succ(&self) -> Epoch {
        if self.month == 12 {
            Epoch { year: self.year + 1, month: 1 }
        } else {
            Epoch { year: self.year, month: self.month + 1 }
        }
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl fmt::Debug for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch({self})")
    }
}

impl FromStr for Epoch {
    type Err = CredenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 7 || bytes[4] != b'-' {
            return Err(CredenceError::SchemaInvalid(format!("bad epoch tag: {s}")));
        }
        let year: u16 = s[..4]
            .parse()
            .map_err(|_| CredenceError::SchemaInvalid(format!("bad epoch year: {s}")))?;
        let month: u8 = s[5..]
            .parse()
            .map_err(|_| CredenceError::SchemaInvalid(format!("bad epoch month: {s}")))?;
        Epoch::new(year, month)
    }
}

// ── Leaf ─────────────────────────────────────────────────────────────────────

/// A transparency-log leaf: the content hash of a stored event plus the
/// hash of its canonical header. Nothing else ever enters the log.
///
/// Compact binary form: `content_hash || header_hash`, 64 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Leaf {
    pub content_hash: Hash32,
    pub header_hash: Hash32,
}

impl Leaf {
    pub fn new(content_hash: Hash32, header_hash: Hash32) -> Self {
        Self { content_hash, header_hash }
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(self.content_hash.as_bytes());
        out[32..].copy_from_slice(self.header_hash.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CredenceError> {
        if bytes.len() != 64 {
            return Err(CredenceError::Malformed(format!(
                "leaf must be 64 bytes, got {}",
                bytes.len()
            )));
        }
        let mut content = [0u8; 32];
        let mut header = [0u8; 32];
        content.copy_from_slice(&bytes[..32]);
        header.copy_from_slice(&bytes[32..]);
        Ok(Self {
            content_hash: Hash32(content),
            header_hash: Hash32(header),
        })
    }
}

// ── KeyId ────────────────────────────────────────────────────────────────────

/// Stable identifier of a signing key: SHA2-256 of the public key bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(pub Hash32);

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({}…)", &self.0.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_address_round_trips_through_multibase() {
        let ca = ContentAddress::from_digest(Hash32([7u8; 32]));
        let rendered = ca.to_string();
        assert!(rendered.starts_with('z'));
        let parsed: ContentAddress = rendered.parse().unwrap();
        assert_eq!(parsed, ca);
    }

    #[test]
    fn content_address_rejects_wrong_multihash_code() {
        let mut mh = ContentAddress::from_digest(Hash32([1u8; 32])).to_multihash();
        mh[0] = 0x13;
        assert!(ContentAddress::from_multihash(&mh).is_err());
    }

    #[test]
    fn id_shape_is_checked() {
        assert!(Id::new("key:z6Mkf").is_ok());
        assert!(Id::new("nocolon").is_err());
        assert!(Id::new(":opaque").is_err());
        assert!(Id::new("key:").is_err());
        assert!(Id::new("KEY:abc").is_err());
    }

    #[test]
    fn epoch_parses_and_orders() {
        let e: Epoch = "2025-09".parse().unwrap();
        assert_eq!(e, Epoch::new(2025, 9).unwrap());
        assert_eq!(e.pred().to_string(), "2025-08");
        assert_eq!(Epoch::new(2025, 1).unwrap().pred().to_string(), "2024-12");
        assert_eq!(Epoch::new(2025, 12).unwrap().succ().to_string(), "2026-01");
        assert!("2025-13".parse::<Epoch>().is_err());
        assert!("202509".parse::<Epoch>().is_err());
    }
}
