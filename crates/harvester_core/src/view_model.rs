use crate::state::{Phase, SessionStats};
use crate::Target;

/// Read-only snapshot of a session for logging and reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub target: Target,
    pub phase: Phase,
    pub known: usize,
    pub stale_passes: u32,
    pub stats: SessionStats,
}

impl SessionView {
    pub fn progress_line(&self) -> String {
        format!(
            "{}: pass {} accepted {} (dup {}, known {}, failed {}), stale {}",
            self.target,
            self.stats.passes,
            self.stats.accepted,
            self.stats.duplicates_skipped,
            self.stats.known_skipped,
            self.stats.extraction_failures,
            self.stale_passes
        )
    }
}
