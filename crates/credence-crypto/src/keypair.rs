use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use credence_core::types::{Hash32, Id, KeyId};

use crate::verify::id_from_verifying_key;

/// Detached Ed25519 signature bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SignatureBytes(pub [u8; 64]);

impl Serialize for SignatureBytes {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for SignatureBytes {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SigBytesVisitor;
        impl<'de> serde::de::Visitor<'de> for SigBytesVisitor {
            type Value = SignatureBytes;
            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "64 bytes")
            }
            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                let array: [u8; 64] = v
                    .try_into()
                    .map_err(|_| E::custom("expected 64 bytes"))?;
                Ok(SignatureBytes(array))
            }
            fn visit_byte_buf<E: serde::de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                self.visit_bytes(&v)
            }
        }
        deserializer.deserialize_bytes(SigBytesVisitor)
    }
}

impl SignatureBytes {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(SignatureBytes)
    }
}

impl std::fmt::Debug for SignatureBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SignatureBytes({}…)", &self.to_hex()[..16])
    }
}

/// A Credence keypair: Ed25519 signing key with its derived `key:` method
/// identifier.
///
/// The seed bytes are wiped on drop.
pub struct KeyPair {
    pub id: Id,
    verifying: VerifyingKey,
    signing: SigningKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(signing)
    }

    /// Deterministic keypair from a 32-byte seed. Fixture and sortition
    /// tests rely on this being stable.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(&seed))
    }

    fn from_signing_key(signing: SigningKey) -> Self {
        let verifying = signing.verifying_key();
        Self {
            id: id_from_verifying_key(&verifying),
            verifying,
            signing,
        }
    }

    /// Detached signature over `message`.
    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes(self.signing.sign(message).to_bytes())
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying
    }

    /// Stable key identifier: SHA2-256 of the public key bytes.
    pub fn key_id(&self) -> KeyId {
        let mut hasher = Sha256::new();
        hasher.update(self.verifying.as_bytes());
        KeyId(Hash32(hasher.finalize().into()))
    }

    /// Export the 32-byte seed (e.g. for a wallet file). The returned
    /// buffer wipes itself on drop.
    pub fn to_seed(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing.to_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ id: {} }}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_keypair_is_stable() {
        let a = KeyPair::from_seed([0x01; 32]);
        let b = KeyPair::from_seed([0x01; 32]);
        assert_eq!(a.id, b.id);
        assert_eq!(a.sign(b"msg").0, b.sign(b"msg").0);
    }

    #[test]
    fn distinct_seeds_distinct_ids() {
        let a = KeyPair::from_seed([0x01; 32]);
        let b = KeyPair::from_seed([0x02; 32]);
        assert_ne!(a.id, b.id);
    }
}
