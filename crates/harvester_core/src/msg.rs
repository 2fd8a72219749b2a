use crate::{CursorSet, Fingerprint};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Source is open and the cursor set has been loaded.
    Started { cursor: CursorSet },
    /// Result of asking the source for newest-first order.
    OrderingApplied { enforced: bool },
    /// One extracted candidate of the current pass.
    Candidate { fingerprint: Fingerprint },
    /// One item of the current pass could not be extracted.
    ExtractionFailed,
    /// Every visible item of the current pass has been offered.
    PassCompleted,
    /// Source finished revealing; `action_taken` is false when it fell back
    /// to a passive scroll.
    RevealCompleted { action_taken: bool },
    /// Transient failure while revealing more items.
    RevealFailed,
    /// The content container can no longer be reached.
    SourceLost,
    /// Wall-clock budget exhausted.
    Cancelled,
}
