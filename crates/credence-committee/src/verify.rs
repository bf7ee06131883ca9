//! Relying-party checkpoint verification.
//!
//! A verifier holds the epoch's formed committee (or reconstructs it from
//! the seed and eligible set) and checks a published checkpoint against
//! it: committee identity, signer count, and the threshold aggregate over
//! the canonical signing bytes.

use credence_core::error::CredenceError;
use credence_core::records::Checkpoint;
use credence_crypto::{AggregateSignature, SignerBitmap, ThresholdScheme};

use crate::sortition::Committee;

/// Verify `checkpoint` against the formed committee for its epoch.
pub fn verify_checkpoint(
    checkpoint: &Checkpoint,
    committee: &Committee,
    member_publics: &[Vec<u8>],
    scheme: &dyn ThresholdScheme,
) -> Result<(), CredenceError> {
    if checkpoint.epoch_number != committee.epoch_number {
        return Err(CredenceError::SemanticInvalid(format!(
            "checkpoint for epoch {} checked against committee of epoch {}",
            checkpoint.epoch_number, committee.epoch_number
        )));
    }
    if checkpoint.committee_id != committee.id() {
        return Err(CredenceError::ProofInvalid(
            "checkpoint names a different committee".into(),
        ));
    }
    let bitmap = SignerBitmap::from_bytes(checkpoint.signer_bitmap.clone(), committee.size())?;
    let aggregate = AggregateSignature {
        bitmap,
        bytes: checkpoint.aggregate_signature.clone(),
    };
    let body = Checkpoint::signing_bytes(
        checkpoint.tree_id,
        checkpoint.tree_size,
        &checkpoint.root_hash,
        checkpoint.epoch_number,
    )?;
    scheme.verify_aggregate(member_publics, committee.threshold(), &body, &aggregate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::{EligibleSet, OperatorRecord};
    use crate::sortition::{epoch_seed, form_committee, try_enter};
    use credence_core::fixed::Fixed;
    use credence_core::types::{Hash32, Id};
    use credence_crypto::{KeyPair, MultiEd25519, PartialSignature, VrfKeyPair};

    fn sealed_fixture() -> (Checkpoint, Committee, Vec<Vec<u8>>) {
        let mut records = Vec::new();
        let mut vrfs = Vec::new();
        let mut secrets = Vec::new();
        for i in 0..5u8 {
            let signing = KeyPair::from_seed([i + 30; 32]);
            let vrf = VrfKeyPair::from_seed([i + 90; 32]);
            records.push(OperatorRecord {
                id: Id::new(format!("key:zop{i:02}")).unwrap(),
                vrf_public: *vrf.verifying_key().as_bytes(),
                threshold_public: signing.verifying_key().as_bytes().to_vec(),
                reputation: Fixed::from_int(10),
            });
            secrets.push(*signing.to_seed());
            vrfs.push(vrf);
        }
        let set = EligibleSet::select(records, Fixed::ZERO);
        let seed = epoch_seed(&Hash32([0x44; 32]), 9);
        let seats = set
            .iter()
            .zip(vrfs.iter())
            .filter_map(|(op, vrf)| try_enter(&op.id, vrf, &seed, u64::MAX))
            .collect();
        let committee = form_committee(9, seed, &set, u64::MAX, seats).unwrap();
        let publics: Vec<Vec<u8>> = committee
            .seats
            .iter()
            .map(|s| set.get(&s.operator).unwrap().threshold_public.clone())
            .collect();

        let root = Hash32([0x55; 32]);
        let body = Checkpoint::signing_bytes(1, 64, &root, 9).unwrap();
        let scheme = MultiEd25519;
        let partials: Vec<PartialSignature> = (0..4u32)
            .map(|i| {
                scheme
                    .partial_sign(&secrets[i as usize], i, &body)
                    .unwrap()
            })
            .collect();
        let aggregate = scheme.aggregate(5, &partials).unwrap();
        let checkpoint = Checkpoint {
            epoch_number: 9,
            tree_id: 1,
            tree_size: 64,
            root_hash: root,
            committee_id: committee.id(),
            signer_bitmap: aggregate.bitmap.to_bytes(),
            aggregate_signature: aggregate.bytes,
            timestamp: 1_700_000_000,
        };
        (checkpoint, committee, publics)
    }

    #[test]
    fn honest_checkpoint_verifies() {
        let (checkpoint, committee, publics) = sealed_fixture();
        verify_checkpoint(&checkpoint, &committee, &publics, &MultiEd25519).unwrap();
    }

    #[test]
    fn tampered_root_or_committee_rejected() {
        let (checkpoint, committee, publics) = sealed_fixture();

        let mut forged = checkpoint.clone();
        forged.root_hash = Hash32([0x66; 32]);
        assert!(verify_checkpoint(&forged, &committee, &publics, &MultiEd25519).is_err());

        let mut renamed = checkpoint;
        renamed.committee_id = Hash32([0x77; 32]);
        assert!(verify_checkpoint(&renamed, &committee, &publics, &MultiEd25519).is_err());
    }
}
