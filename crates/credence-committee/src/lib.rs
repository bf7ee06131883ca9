pub mod epoch;
pub mod evidence;
pub mod operators;
pub mod runner;
pub mod sortition;
pub mod verify;

pub use epoch::{EpochPhase, EpochState, PartialMsg, SealOutcome};
pub use evidence::PartialEquivocation;
pub use operators::{committee_id, EligibleSet, OperatorRecord};
pub use runner::{next_epoch_delay, CommitteeRunner};
pub use sortition::{
    epoch_seed, form_committee, sortition_target, try_enter, Committee, CommitteeSeat,
};
pub use verify::verify_checkpoint;
