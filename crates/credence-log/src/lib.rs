pub mod appender;
pub mod evidence;
pub mod merkle;
pub mod proof;
pub mod prover;
pub mod sth;

pub use appender::{spawn_appender, spawn_appender_with, LogAppender, LogHandle};
pub use evidence::EvidenceRecord;
pub use merkle::{
    empty_root, leaf_hash, node_hash, verify_consistency, verify_inclusion, HistoryTree,
};
pub use proof::{ConsistencyProof, InclusionProof};
pub use prover::Prover;
pub use sth::{verify_sth, SthSigner};
