use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a harvest session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationReason {
    /// Reached an item persisted by an earlier run.
    KnownBoundary,
    /// Too many consecutive passes without a new record.
    Exhausted,
    /// Hit the per-target record ceiling.
    Capped,
    /// The source could not be reached.
    SourceError,
    /// Wall-clock budget ran out.
    Cancelled,
}

impl TerminationReason {
    /// Whether the session saw the whole reachable content.
    pub fn is_complete(self) -> bool {
        matches!(self, Self::KnownBoundary | Self::Exhausted)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::KnownBoundary => "KNOWN_BOUNDARY",
            Self::Exhausted => "EXHAUSTED",
            Self::Capped => "CAPPED",
            Self::SourceError => "SOURCE_ERROR",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(label)
    }
}
