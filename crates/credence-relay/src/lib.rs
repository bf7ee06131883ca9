pub mod ingest;
pub mod publisher;
pub mod tail;

pub use ingest::{IngestOutcome, Relay};
pub use publisher::Publisher;
pub use tail::ScorerTail;
