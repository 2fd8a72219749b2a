//! Harvester core: fingerprints, record kinds and the pure harvest state machine.
mod address;
mod effect;
mod fingerprint;
mod msg;
mod record;
mod state;
mod target;
mod termination;
mod update;
mod view_model;

pub use address::clean_address;
pub use effect::{Effect, SkipReason, SortOrder};
pub use fingerprint::{fingerprint, Fingerprint, FingerprintParseError};
pub use msg::Msg;
pub use record::{Listing, Record, Review, ANONYMOUS_AUTHOR, UNNAMED_LISTING};
pub use state::{
    BoundaryPolicy, CursorSet, HarvestLimits, HarvestState, Phase, SessionStats,
    DEFAULT_MAX_RECORDS, DEFAULT_STABILITY_THRESHOLD,
};
pub use target::Target;
pub use termination::TerminationReason;
pub use update::update;
pub use view_model::SessionView;
