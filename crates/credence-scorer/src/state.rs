//! Scorer-owned per-identifier state.
//!
//! Everything here is derived from the committed log plus attestation
//! inputs and is recomputable from scratch; two honest scorers holding the
//! same inputs hold byte-identical state.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use credence_core::error::CredenceError;
use credence_core::fixed::Fixed;
use credence_core::types::{ContentAddress, Context, Epoch, EpochNumber, Id, Timestamp};

/// One incoming vouch as the scorer tracks it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VouchIn {
    pub voucher: Id,
    pub issued_at: Timestamp,
    pub content_address: ContentAddress,
    pub epoch: Epoch,
    /// Admitted under the voucher's budget for `(context, epoch)`.
    pub admitted: bool,
}

/// An attestation as the scorer reads it. The credential document model
/// lives outside the core; this is the minimal projection the score
/// function consumes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationIn {
    pub issuer: Id,
    pub kind: String,
    pub issued_at: Timestamp,
    /// Index into the issuer's revocation status list.
    pub status_index: u32,
    pub status_epoch: Epoch,
    /// KYC / proof-of-personhood class attestations feed factor K;
    /// everything else feeds factor A.
    pub is_kyc: bool,
}

/// An adjudicated report against an identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportIn {
    pub reporter: Id,
    pub issued_at: Timestamp,
    pub content_address: ContentAddress,
    /// Adjudicated severity in [0, 1].
    pub severity: Fixed,
    /// An accepted appeal clears the report.
    pub appealed: bool,
}

/// Supplies attestations for an identifier. Implementations adapt whatever
/// credential store a deployment uses; the scorer never parses credential
/// documents itself.
pub trait AttestationProvider: Send + Sync {
    fn attestations(
        &self,
        id: &Id,
        context: Context,
    ) -> Result<Vec<AttestationIn>, CredenceError>;
}

/// A provider with no attestations; useful for tests and vouch-only
/// deployments.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAttestations;

impl AttestationProvider for NoAttestations {
    fn attestations(
        &self,
        _id: &Id,
        _context: Context,
    ) -> Result<Vec<AttestationIn>, CredenceError> {
        Ok(Vec::new())
    }
}

/// Mutable per-`(id, context)` scorer state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentState {
    /// Incoming vouches in ascending `(issued_at, content_address)`.
    pub vouches: Vec<VouchIn>,
    pub reports: Vec<ReportIn>,
    pub first_activity: Option<Timestamp>,
    pub last_activity: Option<Timestamp>,
}

impl IdentState {
    /// Record activity bounds for tenure and inactivity decay.
    pub fn touch(&mut self, ts: Timestamp) {
        self.first_activity = Some(self.first_activity.map_or(ts, |t| t.min(ts)));
        self.last_activity = Some(self.last_activity.map_or(ts, |t| t.max(ts)));
    }

    /// Insert keeping the deterministic vouch order.
    pub fn push_vouch(&mut self, vouch: VouchIn) {
        let key = (vouch.issued_at, vouch.content_address);
        let pos = self
            .vouches
            .partition_point(|v| (v.issued_at, v.content_address) < key);
        self.vouches.insert(pos, vouch);
    }
}

/// A committed score map, one per checkpoint. Readers clone the `Arc` and
/// see a consistent snapshot tied to that checkpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScoreMap {
    pub epoch_number: EpochNumber,
    pub scores: BTreeMap<(Id, Context), Fixed>,
}

impl ScoreMap {
    pub fn get(&self, id: &Id, context: Context) -> Fixed {
        self.scores
            .get(&(id.clone(), context))
            .copied()
            .unwrap_or(Fixed::ZERO)
    }
}

/// The scorer's published view: a versioned pair of (prior, current)
/// committed maps. The prior map breaks vouch cycles.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub version: u64,
    pub prior: Arc<ScoreMap>,
    pub current: Arc<ScoreMap>,
}
