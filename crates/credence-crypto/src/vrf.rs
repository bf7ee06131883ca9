//! Verifiable random function over Ed25519.
//!
//! The proof is a deterministic (RFC 8032) signature over a domain-separated
//! seed; the output is SHA2-256 of the proof. Anyone holding the public key
//! can re-derive the output from the proof, and the signer cannot grind:
//! one seed, one signature, one output.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use credence_core::error::CredenceError;
use credence_core::types::Hash32;

const VRF_DOMAIN: &[u8] = b"credence-vrf-v1";

/// VRF output: uniformly distributed 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct VrfOutput(pub Hash32);

impl VrfOutput {
    /// The first 8 output bytes as a big-endian integer, for threshold
    /// comparison in sortition.
    pub fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0 .0[..8].try_into().expect("32 >= 8"))
    }
}

/// VRF proof: the deterministic signature over the domain-separated seed.
#[derive(Clone, PartialEq, Eq)]
pub struct VrfProof(pub [u8; 64]);

impl Serialize for VrfProof {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for VrfProof {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VrfProofVisitor;
        impl<'de> serde::de::Visitor<'de> for VrfProofVisitor {
            type Value = VrfProof;
            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "64 bytes")
            }
            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                let array: [u8; 64] = v
                    .try_into()
                    .map_err(|_| E::custom("expected 64 bytes"))?;
                Ok(VrfProof(array))
            }
            fn visit_byte_buf<E: serde::de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                self.visit_bytes(&v)
            }
        }
        deserializer.deserialize_bytes(VrfProofVisitor)
    }
}

impl std::fmt::Debug for VrfProof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VrfProof({}…)", &hex::encode(&self.0[..8]))
    }
}

/// Per-operator VRF keypair.
pub struct VrfKeyPair {
    signing: SigningKey,
    verifying: VerifyingKey,
}

impl VrfKeyPair {
    pub fn generate() -> Self {
        Self::from_seed(SigningKey::generate(&mut OsRng).to_bytes())
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(&seed);
        let verifying = signing.verifying_key();
        Self { signing, verifying }
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying
    }

    /// Evaluate the VRF on `seed`.
    pub fn eval(&self, seed: &Hash32) -> (VrfOutput, VrfProof) {
        let sig = self.signing.sign(&domain_message(seed));
        let proof = VrfProof(sig.to_bytes());
        (output_of(&proof), proof)
    }
}

/// Verify a VRF evaluation: the proof must be a valid signature over the
/// seed under `vk`, and the claimed output must be the proof's digest.
pub fn vrf_verify(
    vk: &VerifyingKey,
    seed: &Hash32,
    output: &VrfOutput,
    proof: &VrfProof,
) -> Result<(), CredenceError> {
    let sig = Signature::from_bytes(&proof.0);
    vk.verify_strict(&domain_message(seed), &sig)
        .map_err(|_| CredenceError::ProofInvalid("vrf proof signature invalid".into()))?;
    if output_of(proof) != *output {
        return Err(CredenceError::ProofInvalid(
            "vrf output does not match proof digest".into(),
        ));
    }
    Ok(())
}

fn domain_message(seed: &Hash32) -> Vec<u8> {
    let mut msg = Vec::with_capacity(VRF_DOMAIN.len() + 32);
    msg.extend_from_slice(VRF_DOMAIN);
    msg.extend_from_slice(seed.as_bytes());
    msg
}

fn output_of(proof: &VrfProof) -> VrfOutput {
    let mut hasher = Sha256::new();
    hasher.update(proof.0);
    VrfOutput(Hash32(hasher.finalize().into()))
}
