//! Publishable equivocation evidence.
//!
//! Two distinct STHs with the same `tree_size` and different `root_hash`
//! are a signed, publishable offense. The record is canonical-encoded,
//! content-addressed, and countersigned by the observer that assembled it.

use serde::{Deserialize, Serialize};

use credence_core::canonical::{self, Value};
use credence_core::error::CredenceError;
use credence_core::records::SignedTreeHead;
use credence_core::types::{ContentAddress, Timestamp};
use credence_crypto::KeyPair;

/// Evidence that one signer produced two conflicting tree heads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub first: SignedTreeHead,
    pub second: SignedTreeHead,
    pub observed_at: Timestamp,
    pub observer: String,
    pub observer_signature: Vec<u8>,
}

impl EvidenceRecord {
    /// Assemble and countersign evidence. Fails unless the two heads
    /// genuinely conflict.
    pub fn assemble(
        first: SignedTreeHead,
        second: SignedTreeHead,
        observed_at: Timestamp,
        observer: &KeyPair,
    ) -> Result<Self, CredenceError> {
        if first.tree_id != second.tree_id
            || first.tree_size != second.tree_size
            || first.root_hash == second.root_hash
        {
            return Err(CredenceError::SemanticInvalid(
                "heads do not form an equivocation pair".into(),
            ));
        }
        let body = Self::body_value(&first, &second, observed_at, observer.id.as_str())?;
        let bytes = canonical::canonical_bytes(&body)?;
        let observer_signature = observer.sign(&bytes).0.to_vec();
        Ok(Self {
            first,
            second,
            observed_at,
            observer: observer.id.to_string(),
            observer_signature,
        })
    }

    fn body_value(
        first: &SignedTreeHead,
        second: &SignedTreeHead,
        observed_at: Timestamp,
        observer: &str,
    ) -> Result<Value, CredenceError> {
        Ok(Value::map(vec![
            ("kind", Value::str("sth_equivocation")),
            ("first", Value::str(hex::encode(first.wire_bytes()?))),
            ("second", Value::str(hex::encode(second.wire_bytes()?))),
            ("observed_at", Value::int(observed_at)),
            ("observer", Value::str(observer)),
        ]))
    }

    /// Wire form: canonical bytes of the full record.
    pub fn wire_bytes(&self) -> Result<Vec<u8>, CredenceError> {
        let mut body = match Self::body_value(
            &self.first,
            &self.second,
            self.observed_at,
            &self.observer,
        )? {
            Value::Map(m) => m,
            _ => unreachable!("body_value always builds a map"),
        };
        body.insert(
            "observer_signature".into(),
            Value::str(hex::encode(&self.observer_signature)),
        );
        canonical::canonical_bytes(&Value::Map(body))
    }

    pub fn content_address(&self) -> Result<ContentAddress, CredenceError> {
        Ok(canonical::content_address_of_bytes(&self.wire_bytes()?))
    }
}
