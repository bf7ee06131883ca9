//! Ordered, fail-fast validation pipeline for incoming events.
//!
//! size → canonical form → schema → semantic rules → signature. The caller
//! supplies "now" so ingestion is testable; replay protection (duplicate
//! `(from, content_address)`) is enforced by the store, not here.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use credence_core::canonical;
use credence_core::constants::{
    CLOCK_SKEW_FUTURE_SECS, CLOCK_SKEW_PAST_SECS, MAX_CANONICAL_BYTES, NONCE_LEN,
};
use credence_core::error::CredenceError;
use credence_crypto::{verify_with, KeyMethodResolver, KeyResolver, VerifyOutcome};

use crate::event::Event;

/// Event validator parameterized over identifier resolution.
pub struct Validator<R: KeyResolver = KeyMethodResolver> {
    resolver: R,
}

impl Default for Validator<KeyMethodResolver> {
    fn default() -> Self {
        Self { resolver: KeyMethodResolver }
    }
}

impl<R: KeyResolver> Validator<R> {
    pub fn with_resolver(resolver: R) -> Self {
        Self { resolver }
    }

    /// Validate raw wire bytes and return the decoded event.
    pub fn validate_bytes(
        &self,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Event, CredenceError> {
        // 1. Size.
        if bytes.len() > MAX_CANONICAL_BYTES {
            return Err(CredenceError::TooLarge { max: MAX_CANONICAL_BYTES });
        }

        // 2. Canonical form.
        let value = canonical::check_canonical(bytes)?;

        // 3. Schema (required fields, enumerations).
        let event = Event::from_value(&value)?;

        // 4 + 5. Semantics, then signature.
        self.validate_event(&event, now)?;
        Ok(event)
    }

    /// Semantic rules and signature check for an already-decoded event.
    pub fn validate_event(
        &self,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Result<(), CredenceError> {
        // ── Semantic rules ───────────────────────────────────────────────────
        match (&event.to, event.kind.requires_subject()) {
            (None, true) => {
                return Err(CredenceError::SemanticInvalid(format!(
                    "{} requires a `to` identifier",
                    event.kind
                )));
            }
            (Some(_), false) => {
                return Err(CredenceError::SemanticInvalid(
                    "revocation_announce must not carry `to`".into(),
                ));
            }
            _ => {}
        }
        if let Some(to) = &event.to {
            if *to == event.from {
                return Err(CredenceError::SemanticInvalid(
                    "`from` and `to` must differ".into(),
                ));
            }
        }

        let nonce = event.nonce_bytes()?;
        if nonce.len() < NONCE_LEN {
            return Err(CredenceError::SemanticInvalid(format!(
                "nonce must be at least {NONCE_LEN} bytes, got {}",
                nonce.len()
            )));
        }

        let oldest = now - Duration::seconds(CLOCK_SKEW_PAST_SECS);
        let newest = now + Duration::seconds(CLOCK_SKEW_FUTURE_SECS);
        if event.issued_at < oldest || event.issued_at > newest {
            return Err(CredenceError::ClockSkew(format!(
                "issued_at {} outside [{oldest}, {newest}]",
                event.issued_at
            )));
        }

        // ── Signature ────────────────────────────────────────────────────────
        let signature = event
            .signature
            .as_ref()
            .ok_or_else(|| CredenceError::SchemaInvalid("missing signature".into()))?;
        let signing_bytes = event.signing_bytes()?;
        match verify_with(&self.resolver, &event.from, &signing_bytes, signature) {
            VerifyOutcome::Ok => Ok(()),
            VerifyOutcome::Mismatch => {
                debug!(from = %event.from, kind = %event.kind, "signature mismatch");
                Err(CredenceError::BadSignature)
            }
            VerifyOutcome::Malformed => Err(CredenceError::Malformed(
                "identifier or signature undecodable".into(),
            )),
        }
    }
}

/// Validate with the built-in `key` method resolver.
pub fn validate_bytes(bytes: &[u8], now: DateTime<Utc>) -> Result<Event, CredenceError> {
    Validator::default().validate_bytes(bytes, now)
}

/// Validate a decoded event with the built-in resolver.
pub fn validate_event(event: &Event, now: DateTime<Utc>) -> Result<(), CredenceError> {
    Validator::default().validate_event(event, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind};
    use chrono::TimeZone;
    use credence_core::types::{Context, Epoch};
    use credence_crypto::KeyPair;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 12, 20, 0, 0).unwrap()
    }

    fn signed_vouch() -> Event {
        let a = KeyPair::from_seed([0x01; 32]);
        let b = KeyPair::from_seed([0x02; 32]);
        let mut ev = Event::new(
            EventKind::Vouch,
            a.id.clone(),
            Some(b.id.clone()),
            Context::Commerce,
            Epoch::new(2025, 9).unwrap(),
            &[0u8; 12],
            Utc.with_ymd_and_hms(2025, 9, 12, 19, 12, 45).unwrap(),
        );
        ev.sign(&a).unwrap();
        ev
    }

    #[test]
    fn valid_vouch_passes_the_full_pipeline() {
        let ev = signed_vouch();
        let wire = ev.wire_bytes().unwrap();
        let validated = validate_bytes(&wire, now()).unwrap();
        assert_eq!(validated, ev);
    }

    #[test]
    fn bit_flip_in_wire_bytes_invalidates() {
        let ev = signed_vouch();
        let mut wire = ev.wire_bytes().unwrap();
        // Flip one bit inside the nonce payload; the event stays parseable
        // but the signature no longer covers the bytes.
        let pos = wire.windows(7).position(|w| w == b"\"nonce\"").unwrap() + 10;
        wire[pos] ^= 0x01;
        let err = validate_bytes(&wire, now());
        assert!(err.is_err());
    }

    #[test]
    fn self_vouch_rejected() {
        let a = KeyPair::from_seed([0x03; 32]);
        let mut ev = Event::new(
            EventKind::Vouch,
            a.id.clone(),
            Some(a.id.clone()),
            Context::General,
            Epoch::new(2025, 9).unwrap(),
            &[1u8; 12],
            now(),
        );
        ev.sign(&a).unwrap();
        assert!(matches!(
            validate_event(&ev, now()),
            Err(CredenceError::SemanticInvalid(_))
        ));
    }

    #[test]
    fn clock_skew_window_is_enforced() {
        let a = KeyPair::from_seed([0x04; 32]);
        let b = KeyPair::from_seed([0x05; 32]);
        let make = |issued: DateTime<Utc>| {
            let mut ev = Event::new(
                EventKind::Report,
                a.id.clone(),
                Some(b.id.clone()),
                Context::General,
                Epoch::new(2025, 9).unwrap(),
                &[1u8; 12],
                issued,
            );
            ev.sign(&a).unwrap();
            ev
        };
        let too_old = make(now() - Duration::hours(25));
        assert!(matches!(
            validate_event(&too_old, now()),
            Err(CredenceError::ClockSkew(_))
        ));
        let too_new = make(now() + Duration::minutes(6));
        assert!(matches!(
            validate_event(&too_new, now()),
            Err(CredenceError::ClockSkew(_))
        ));
        let in_window = make(now() - Duration::hours(23));
        assert!(validate_event(&in_window, now()).is_ok());
    }

    #[test]
    fn short_nonce_rejected() {
        let a = KeyPair::from_seed([0x06; 32]);
        let b = KeyPair::from_seed([0x07; 32]);
        let mut ev = Event::new(
            EventKind::Vouch,
            a.id.clone(),
            Some(b.id.clone()),
            Context::Hiring,
            Epoch::new(2025, 9).unwrap(),
            &[1u8; 8],
            now(),
        );
        ev.sign(&a).unwrap();
        assert!(matches!(
            validate_event(&ev, now()),
            Err(CredenceError::SemanticInvalid(_))
        ));
    }

    #[test]
    fn oversized_input_rejected_before_parsing() {
        let blob = vec![b'x'; MAX_CANONICAL_BYTES + 1];
        assert!(matches!(
            validate_bytes(&blob, now()),
            Err(CredenceError::TooLarge { .. })
        ));
    }
}
