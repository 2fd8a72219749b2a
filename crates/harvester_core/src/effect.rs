use crate::TerminationReason;

/// Canonical order a source can be asked to enforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    NewestFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Already accepted in this session; the source re-rendered it.
    Duplicate,
    /// Present in the cursor set but the boundary policy does not stop on it.
    Known,
}

/// Work the driver must perform after an `update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ApplyOrdering(SortOrder),
    /// Enumerate the visible items and feed each one back as a candidate.
    Collect,
    /// Keep the current candidate and drop it from the live view if possible.
    Accept,
    Skip(SkipReason),
    RevealMore,
    Stop(TerminationReason),
}
