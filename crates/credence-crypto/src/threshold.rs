//! Threshold-signature abstraction for checkpoint sealing.
//!
//! The committee is generic over any scheme supporting non-interactive
//! aggregation with a signer bitmap (BLS-class). The reference scheme here
//! is multi-Ed25519: partials are plain Ed25519 signatures and the
//! aggregate is their bitmap-ordered concatenation. A pairing-based scheme
//! drops in behind the same trait without touching the committee.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

use credence_core::error::CredenceError;

// ── SignerBitmap ─────────────────────────────────────────────────────────────

/// Which committee members contributed to an aggregate, bit `i` = member
/// index `i`, little-endian within each byte.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerBitmap {
    bits: Vec<u8>,
    members: u32,
}

impl SignerBitmap {
    pub fn new(members: u32) -> Self {
        Self {
            bits: vec![0u8; members.div_ceil(8) as usize],
            members,
        }
    }

    pub fn set(&mut self, index: u32) {
        debug_assert!(index < self.members);
        self.bits[(index / 8) as usize] |= 1 << (index % 8);
    }

    pub fn get(&self, index: u32) -> bool {
        index < self.members && self.bits[(index / 8) as usize] & (1 << (index % 8)) != 0
    }

    pub fn members(&self) -> u32 {
        self.members
    }

    pub fn count_ones(&self) -> u32 {
        self.bits.iter().map(|b| b.count_ones()).sum()
    }

    /// Set member indexes in ascending order.
    pub fn iter_set(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.members).filter(|i| self.get(*i))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bits)
    }

    /// Raw bitmap bytes, LSB-first per byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits.clone()
    }

    /// Rebuild from raw bytes (e.g. a checkpoint's `signer_bitmap`).
    pub fn from_bytes(bits: Vec<u8>, members: u32) -> Result<Self, CredenceError> {
        if bits.len() != members.div_ceil(8) as usize {
            return Err(CredenceError::Malformed(format!(
                "bitmap of {} bytes cannot cover {members} members",
                bits.len()
            )));
        }
        Ok(Self { bits, members })
    }
}

impl std::fmt::Debug for SignerBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SignerBitmap({}/{})", self.count_ones(), self.members)
    }
}

// ── Scheme types ─────────────────────────────────────────────────────────────

/// One member's contribution to a checkpoint signature.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PartialSignature {
    pub signer_index: u32,
    pub bytes: Vec<u8>,
}

/// Combined signature plus the bitmap of contributing members.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct AggregateSignature {
    pub bitmap: SignerBitmap,
    pub bytes: Vec<u8>,
}

/// A threshold scheme with non-interactive aggregation. Key material is
/// opaque bytes so pairing-based schemes fit the same interface.
pub trait ThresholdScheme: Send + Sync {
    /// Sign `message` with the local member's secret share.
    fn partial_sign(
        &self,
        secret: &[u8],
        signer_index: u32,
        message: &[u8],
    ) -> Result<PartialSignature, CredenceError>;

    /// Verify a single member's partial against that member's public share.
    fn verify_partial(
        &self,
        member_public: &[u8],
        message: &[u8],
        partial: &PartialSignature,
    ) -> Result<(), CredenceError>;

    /// Combine partials (any order, deduplicated by signer index) into an
    /// aggregate over a committee of `members`.
    fn aggregate(
        &self,
        members: u32,
        partials: &[PartialSignature],
    ) -> Result<AggregateSignature, CredenceError>;

    /// Verify an aggregate: at least `threshold` contributing members, each
    /// contribution valid under its member's public share.
    fn verify_aggregate(
        &self,
        member_publics: &[Vec<u8>],
        threshold: u32,
        message: &[u8],
        aggregate: &AggregateSignature,
    ) -> Result<(), CredenceError>;
}

// ── Reference scheme: multi-Ed25519 ──────────────────────────────────────────

/// Reference scheme: independent Ed25519 partials, aggregate = bitmap-ordered
/// concatenation.
#[derive(Clone, Copy, Debug, Default)]
pub struct MultiEd25519;

impl MultiEd25519 {
    fn decode_public(bytes: &[u8]) -> Result<VerifyingKey, CredenceError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CredenceError::Malformed("expected 32-byte ed25519 public key".into()))?;
        VerifyingKey::from_bytes(&arr)
            .map_err(|_| CredenceError::Malformed("invalid ed25519 point".into()))
    }
}

impl ThresholdScheme for MultiEd25519 {
    fn partial_sign(
        &self,
        secret: &[u8],
        signer_index: u32,
        message: &[u8],
    ) -> Result<PartialSignature, CredenceError> {
        let seed: [u8; 32] = secret
            .try_into()
            .map_err(|_| CredenceError::SignerUnavailable("expected 32-byte seed".into()))?;
        let signing = SigningKey::from_bytes(&seed);
        Ok(PartialSignature {
            signer_index,
            bytes: signing.sign(message).to_bytes().to_vec(),
        })
    }

    fn verify_partial(
        &self,
        member_public: &[u8],
        message: &[u8],
        partial: &PartialSignature,
    ) -> Result<(), CredenceError> {
        let vk = Self::decode_public(member_public)?;
        let sig_bytes: [u8; 64] = partial
            .bytes
            .as_slice()
            .try_into()
            .map_err(|_| CredenceError::Malformed("expected 64-byte partial".into()))?;
        vk.verify_strict(message, &Signature::from_bytes(&sig_bytes))
            .map_err(|_| CredenceError::BadSignature)
    }

    fn aggregate(
        &self,
        members: u32,
        partials: &[PartialSignature],
    ) -> Result<AggregateSignature, CredenceError> {
        let mut bitmap = SignerBitmap::new(members);
        let mut ordered: Vec<&PartialSignature> = Vec::with_capacity(partials.len());
        for p in partials {
            if p.signer_index >= members {
                return Err(CredenceError::Malformed(format!(
                    "signer index {} out of range for committee of {members}",
                    p.signer_index
                )));
            }
            if bitmap.get(p.signer_index) {
                continue; // first partial per member wins
            }
            bitmap.set(p.signer_index);
            ordered.push(p);
        }
        ordered.sort_by_key(|p| p.signer_index);
        let mut bytes = Vec::with_capacity(ordered.len() * 64);
        for p in &ordered {
            bytes.extend_from_slice(&p.bytes);
        }
        Ok(AggregateSignature { bitmap, bytes })
    }

    fn verify_aggregate(
        &self,
        member_publics: &[Vec<u8>],
        threshold: u32,
        message: &[u8],
        aggregate: &AggregateSignature,
    ) -> Result<(), CredenceError> {
        if aggregate.bitmap.members() as usize != member_publics.len() {
            return Err(CredenceError::Malformed(
                "bitmap size does not match committee size".into(),
            ));
        }
        let signers = aggregate.bitmap.count_ones();
        if signers < threshold {
            return Err(CredenceError::ProofInvalid(format!(
                "aggregate carries {signers} signers, threshold is {threshold}"
            )));
        }
        if aggregate.bytes.len() != signers as usize * 64 {
            return Err(CredenceError::Malformed(
                "aggregate length does not match bitmap popcount".into(),
            ));
        }
        for (chunk, index) in aggregate.bytes.chunks_exact(64).zip(aggregate.bitmap.iter_set()) {
            let partial = PartialSignature {
                signer_index: index,
                bytes: chunk.to_vec(),
            };
            self.verify_partial(&member_publics[index as usize], message, &partial)
                .map_err(|_| {
                    CredenceError::ProofInvalid(format!("partial from member {index} invalid"))
                })?;
        }
        Ok(())
    }
}
