pub mod registry;
pub mod ruleset;

pub use registry::RulesetRegistry;
pub use ruleset::{AggMode, Ruleset, SignedRuleset};
