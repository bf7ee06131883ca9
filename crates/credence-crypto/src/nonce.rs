use rand::RngCore;

use credence_core::constants::NONCE_LEN;

/// Produce a cryptographically random nonce of exactly 12 bytes.
/// Callers encode (events use base64).
pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}
