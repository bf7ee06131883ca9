pub mod canonical;
pub mod config;
pub mod constants;
pub mod error;
pub mod fixed;
pub mod records;
pub mod types;

pub use canonical::{canonical_bytes, check_canonical, content_address, digest, parse, Value};
pub use config::CoreConfig;
pub use constants::*;
pub use error::CredenceError;
pub use fixed::Fixed;
pub use records::{Checkpoint, SignedTreeHead};
pub use types::*;
