use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use credence_core::error::CredenceError;

/// The four topic families the core publishes into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopicFamily {
    Events,
    Revocations,
    Rules,
    Checkpoints,
}

impl TopicFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicFamily::Events => "events",
            TopicFamily::Revocations => "revocations",
            TopicFamily::Rules => "rules",
            TopicFamily::Checkpoints => "checkpoints",
        }
    }
}

/// A concrete topic: `<family>/<segment>`, e.g. `events/commerce`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub family: TopicFamily,
    pub segment: String,
}

impl Topic {
    pub fn new(family: TopicFamily, segment: impl Into<String>) -> Self {
        Self {
            family,
            segment: segment.into(),
        }
    }

    pub fn events(segment: impl Into<String>) -> Self {
        Self::new(TopicFamily::Events, segment)
    }

    pub fn revocations(segment: impl Into<String>) -> Self {
        Self::new(TopicFamily::Revocations, segment)
    }

    pub fn rules(segment: impl Into<String>) -> Self {
        Self::new(TopicFamily::Rules, segment)
    }

    pub fn checkpoints(segment: impl Into<String>) -> Self {
        Self::new(TopicFamily::Checkpoints, segment)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.family.as_str(), self.segment)
    }
}

impl FromStr for Topic {
    type Err = CredenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (family, segment) = s
            .split_once('/')
            .ok_or_else(|| CredenceError::Malformed(format!("bad topic: {s}")))?;
        let family = match family {
            "events" => TopicFamily::Events,
            "revocations" => TopicFamily::Revocations,
            "rules" => TopicFamily::Rules,
            "checkpoints" => TopicFamily::Checkpoints,
            other => {
                return Err(CredenceError::Malformed(format!(
                    "unknown topic family: {other}"
                )))
            }
        };
        Ok(Topic::new(family, segment))
    }
}
