use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::view_model::SessionView;
use crate::{Fingerprint, Target, TerminationReason};

/// Default number of consecutive no-progress passes before a session is
/// considered exhausted.
pub const DEFAULT_STABILITY_THRESHOLD: u32 = 3;
/// Default ceiling on records accepted for one target.
pub const DEFAULT_MAX_RECORDS: usize = 1000;

/// What to do when a candidate is already in the cursor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Stop the session: content is assumed newest-first.
    #[default]
    Trust,
    /// Stop only if the source confirmed newest-first ordering, else skip.
    RequireOrdering,
    /// Never stop early; skip known candidates.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestLimits {
    pub stability_threshold: u32,
    pub max_records: usize,
    pub boundary: BoundaryPolicy,
}

impl Default for HarvestLimits {
    fn default() -> Self {
        Self {
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
            max_records: DEFAULT_MAX_RECORDS,
            boundary: BoundaryPolicy::default(),
        }
    }
}

/// Fingerprints persisted by earlier runs for one target. Read-only for the
/// life of a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CursorSet(HashSet<Fingerprint>);

impl CursorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.0.contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Fingerprint> for CursorSet {
    fn from_iter<I: IntoIterator<Item = Fingerprint>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Sorting,
    Collecting,
    Revealing,
    Stopped(TerminationReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub passes: u32,
    pub accepted: usize,
    pub duplicates_skipped: usize,
    pub known_skipped: usize,
    pub extraction_failures: usize,
    pub reveal_failures: usize,
}

/// State of one harvest session. Owned by exactly one driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestState {
    target: Target,
    limits: HarvestLimits,
    phase: Phase,
    cursor: CursorSet,
    seen: HashSet<Fingerprint>,
    ordering_enforced: bool,
    accepted_at_pass_start: usize,
    stale_passes: u32,
    stats: SessionStats,
}

impl HarvestState {
    pub fn new(target: Target, limits: HarvestLimits) -> Self {
        Self {
            target,
            limits,
            phase: Phase::Init,
            cursor: CursorSet::new(),
            seen: HashSet::new(),
            ordering_enforced: false,
            accepted_at_pass_start: 0,
            stale_passes: 0,
            stats: SessionStats::default(),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn limits(&self) -> HarvestLimits {
        self.limits
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn stale_passes(&self) -> u32 {
        self.stale_passes
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.phase, Phase::Stopped(_))
    }

    pub fn termination(&self) -> Option<TerminationReason> {
        match self.phase {
            Phase::Stopped(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            target: self.target.clone(),
            phase: self.phase,
            known: self.cursor.len(),
            stale_passes: self.stale_passes,
            stats: self.stats,
        }
    }

    pub(crate) fn start(&mut self, cursor: CursorSet) {
        self.cursor = cursor;
        self.phase = Phase::Sorting;
    }

    pub(crate) fn begin_pass(&mut self, ordering_enforced: Option<bool>) {
        if let Some(enforced) = ordering_enforced {
            self.ordering_enforced = enforced;
        }
        self.phase = Phase::Collecting;
        self.accepted_at_pass_start = self.stats.accepted;
        self.stats.passes += 1;
    }

    pub(crate) fn begin_reveal(&mut self) {
        self.phase = Phase::Revealing;
    }

    pub(crate) fn stop(&mut self, reason: TerminationReason) {
        self.phase = Phase::Stopped(reason);
    }

    pub(crate) fn is_known(&self, fingerprint: &Fingerprint) -> bool {
        self.cursor.contains(fingerprint)
    }

    pub(crate) fn stops_on_known(&self) -> bool {
        match self.limits.boundary {
            BoundaryPolicy::Trust => true,
            BoundaryPolicy::RequireOrdering => self.ordering_enforced,
            BoundaryPolicy::Ignore => false,
        }
    }

    /// Record a new fingerprint; false if it was already accepted.
    pub(crate) fn accept(&mut self, fingerprint: Fingerprint) -> bool {
        if !self.seen.insert(fingerprint) {
            return false;
        }
        self.stats.accepted += 1;
        true
    }

    pub(crate) fn at_capacity(&self) -> bool {
        self.stats.accepted >= self.limits.max_records
    }

    pub(crate) fn note_duplicate(&mut self) {
        self.stats.duplicates_skipped += 1;
    }

    pub(crate) fn note_known(&mut self) {
        self.stats.known_skipped += 1;
    }

    pub(crate) fn note_extraction_failure(&mut self) {
        self.stats.extraction_failures += 1;
    }

    pub(crate) fn note_reveal_failure(&mut self) {
        self.stats.reveal_failures += 1;
    }

    pub(crate) fn made_progress(&self) -> bool {
        self.stats.accepted != self.accepted_at_pass_start
    }

    /// Count a pass without progress; true once the threshold is reached.
    pub(crate) fn register_stale_pass(&mut self) -> bool {
        self.stale_passes += 1;
        self.stale_passes >= self.limits.stability_threshold
    }

    pub(crate) fn reset_stale(&mut self) {
        self.stale_passes = 0;
    }
}
