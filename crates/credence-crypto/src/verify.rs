//! Identifier ↔ verification-key binding and detached-signature checks.
//!
//! For the `key` method the public key is embedded in the identifier
//! itself: `key:z<base58btc(0xed || pubkey)>`. Other methods go through an
//! externally supplied [`KeyResolver`].

use ed25519_dalek::{Signature, VerifyingKey};
use subtle::ConstantTimeEq;

use credence_core::constants::MULTIBASE_BASE58BTC;
use credence_core::error::CredenceError;
use credence_core::types::Id;

use crate::keypair::SignatureBytes;

/// Multicodec tag for an Ed25519 public key.
const ED25519_CODEC: u8 = 0xed;

/// Result of a signature check. `Mismatch` means the bytes were well-formed
/// but the signature does not verify under the identifier's key;
/// `Malformed` means the identifier or signature could not be decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Ok,
    Mismatch,
    Malformed,
}

/// Resolves an identifier to its verification key. The `key` method is
/// handled inline; deployments supply resolvers for any other method.
pub trait KeyResolver: Send + Sync {
    fn resolve(&self, id: &Id) -> Result<VerifyingKey, CredenceError>;
}

/// The built-in resolver: handles the `key` method only.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyMethodResolver;

impl KeyResolver for KeyMethodResolver {
    fn resolve(&self, id: &Id) -> Result<VerifyingKey, CredenceError> {
        verifying_key_from_id(id)
    }
}

/// Derive the `key` method identifier embedding `vk`.
pub fn id_from_verifying_key(vk: &VerifyingKey) -> Id {
    let mut payload = Vec::with_capacity(33);
    payload.push(ED25519_CODEC);
    payload.extend_from_slice(vk.as_bytes());
    let opaque = format!("{}{}", MULTIBASE_BASE58BTC, bs58::encode(payload).into_string());
    Id::new(format!("key:{opaque}")).expect("key identifier shape is always valid")
}

/// Recover the verification key embedded in a `key` method identifier,
/// without external resolution.
pub fn verifying_key_from_id(id: &Id) -> Result<VerifyingKey, CredenceError> {
    if id.method() != "key" {
        return Err(CredenceError::Malformed(format!(
            "cannot recover key from method '{}'",
            id.method()
        )));
    }
    let opaque = id.opaque();
    let rest = opaque
        .strip_prefix(MULTIBASE_BASE58BTC)
        .ok_or_else(|| CredenceError::Malformed("identifier missing multibase prefix".into()))?;
    let bytes = bs58::decode(rest)
        .into_vec()
        .map_err(|e| CredenceError::Malformed(e.to_string()))?;
    if bytes.len() != 33 || bytes[0] != ED25519_CODEC {
        return Err(CredenceError::Malformed(
            "identifier does not encode an ed25519 key".into(),
        ));
    }
    let arr: [u8; 32] = bytes[1..].try_into().expect("length checked above");
    VerifyingKey::from_bytes(&arr)
        .map_err(|_| CredenceError::Malformed("invalid ed25519 point".into()))
}

/// Verify a detached signature over `message` under the key bound to `id`.
///
/// Never returns an error: decode failures surface as `Malformed` so the
/// caller can map them into its own taxonomy. Verification is constant-time
/// with respect to secret material (Ed25519 batch-free verify).
pub fn verify(id: &Id, message: &[u8], signature: &SignatureBytes) -> VerifyOutcome {
    verify_with(&KeyMethodResolver, id, message, signature)
}

/// Like [`verify`], resolving the key through `resolver`.
pub fn verify_with(
    resolver: &dyn KeyResolver,
    id: &Id,
    message: &[u8],
    signature: &SignatureBytes,
) -> VerifyOutcome {
    let vk = match resolver.resolve(id) {
        Ok(vk) => vk,
        Err(_) => return VerifyOutcome::Malformed,
    };
    let sig = Signature::from_bytes(&signature.0);
    match vk.verify_strict(message, &sig) {
        Ok(()) => VerifyOutcome::Ok,
        Err(_) => VerifyOutcome::Mismatch,
    }
}

/// Constant-time equality of two public keys.
pub fn keys_equal(a: &VerifyingKey, b: &VerifyingKey) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
