pub mod keypair;
pub mod nonce;
pub mod threshold;
pub mod verify;
pub mod vrf;

pub use keypair::{KeyPair, SignatureBytes};
pub use nonce::random_nonce;
pub use threshold::{
    AggregateSignature, MultiEd25519, PartialSignature, SignerBitmap, ThresholdScheme,
};
pub use verify::{
    id_from_verifying_key, keys_equal, verify, verify_with, verifying_key_from_id,
    KeyMethodResolver, KeyResolver, VerifyOutcome,
};
pub use vrf::{vrf_verify, VrfKeyPair, VrfOutput, VrfProof};
