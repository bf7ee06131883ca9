//! Signed tree heads.

use chrono::Utc;
use ed25519_dalek::{Signature, VerifyingKey};

use credence_core::error::CredenceError;
use credence_core::records::SignedTreeHead;
use credence_core::types::{Hash32, TreeId, TreeSize};
use credence_crypto::KeyPair;

/// Signs tree heads for one log instance.
pub struct SthSigner {
    tree_id: TreeId,
    keypair: KeyPair,
}

impl SthSigner {
    pub fn new(tree_id: TreeId, keypair: KeyPair) -> Self {
        Self { tree_id, keypair }
    }

    pub fn tree_id(&self) -> TreeId {
        self.tree_id
    }

    pub fn sign_head(
        &self,
        tree_size: TreeSize,
        root_hash: Hash32,
    ) -> Result<SignedTreeHead, CredenceError> {
        let timestamp = Utc::now().timestamp();
        self.sign_head_at(tree_size, root_hash, timestamp)
    }

    /// Timestamp-explicit variant for deterministic tests.
    pub fn sign_head_at(
        &self,
        tree_size: TreeSize,
        root_hash: Hash32,
        timestamp: i64,
    ) -> Result<SignedTreeHead, CredenceError> {
        let body = SignedTreeHead::signing_bytes(self.tree_id, tree_size, &root_hash, timestamp)?;
        let signature = self.keypair.sign(&body);
        Ok(SignedTreeHead {
            tree_id: self.tree_id,
            tree_size,
            root_hash,
            timestamp,
            signer_key_id: self.keypair.key_id(),
            signature: signature.0.to_vec(),
        })
    }
}

/// Verify an STH against the log operator's public key.
pub fn verify_sth(sth: &SignedTreeHead, vk: &VerifyingKey) -> Result<(), CredenceError> {
    let body =
        SignedTreeHead::signing_bytes(sth.tree_id, sth.tree_size, &sth.root_hash, sth.timestamp)?;
    let sig_bytes: [u8; 64] = sth
        .signature
        .as_slice()
        .try_into()
        .map_err(|_| CredenceError::Malformed("STH signature must be 64 bytes".into()))?;
    vk.verify_strict(&body, &Signature::from_bytes(&sig_bytes))
        .map_err(|_| CredenceError::BadSignature)
}
