pub mod decay;
pub mod diversity;
pub mod engine;
pub mod record;
pub mod score;
pub mod state;
pub mod status;
pub mod threshold_proof;

pub use decay::{age_days, DecayTable};
pub use diversity::VouchGraph;
pub use engine::ScorerEngine;
pub use record::{factor_commitments, RecordStatus, ScoreRecord, StatusProof};
pub use score::{compute_score, DecayTables, ScoreBreakdown, ScoreInputs};
pub use state::{
    AttestationIn, AttestationProvider, IdentState, NoAttestations, ReportIn, ScoreMap,
    Snapshot, VouchIn,
};
pub use status::{is_revoked, publish_status_list, StatusBitmap};
pub use threshold_proof::ThresholdProver;
