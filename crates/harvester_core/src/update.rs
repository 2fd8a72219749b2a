use engine_logging::{engine_debug, engine_info};

use crate::state::Phase;
use crate::{Effect, Fingerprint, HarvestState, Msg, SkipReason, SortOrder, TerminationReason};

/// Pure update function: applies a message to a session and returns the
/// effects the driver must perform next.
///
/// Messages that do not fit the current phase are ignored, and a stopped
/// session ignores everything.
pub fn update(mut state: HarvestState, msg: Msg) -> (HarvestState, Vec<Effect>) {
    if state.is_stopped() {
        return (state, Vec::new());
    }

    let effects = match msg {
        Msg::Started { cursor } => {
            if state.phase() != Phase::Init {
                return (state, Vec::new());
            }
            engine_debug!(
                "session {} started with {} known fingerprints",
                state.target(),
                cursor.len()
            );
            state.start(cursor);
            vec![Effect::ApplyOrdering(SortOrder::NewestFirst)]
        }
        Msg::OrderingApplied { enforced } => {
            if state.phase() != Phase::Sorting {
                return (state, Vec::new());
            }
            state.begin_pass(Some(enforced));
            vec![Effect::Collect]
        }
        Msg::Candidate { fingerprint } => {
            if state.phase() != Phase::Collecting {
                return (state, Vec::new());
            }
            decide(&mut state, fingerprint)
        }
        Msg::ExtractionFailed => {
            if state.phase() == Phase::Collecting {
                state.note_extraction_failure();
            }
            Vec::new()
        }
        Msg::PassCompleted => {
            if state.phase() != Phase::Collecting {
                return (state, Vec::new());
            }
            finish_pass(&mut state)
        }
        Msg::RevealCompleted { action_taken } => {
            if state.phase() != Phase::Revealing {
                return (state, Vec::new());
            }
            if !action_taken {
                engine_debug!("session {} fell back to passive scroll", state.target());
            }
            state.begin_pass(None);
            vec![Effect::Collect]
        }
        Msg::RevealFailed => {
            if state.phase() != Phase::Revealing {
                return (state, Vec::new());
            }
            // One stale pass; nothing new is visible, so reveal again.
            state.note_reveal_failure();
            if state.register_stale_pass() {
                stop(&mut state, TerminationReason::Exhausted)
            } else {
                vec![Effect::RevealMore]
            }
        }
        Msg::SourceLost => stop(&mut state, TerminationReason::SourceError),
        Msg::Cancelled => stop(&mut state, TerminationReason::Cancelled),
    };

    (state, effects)
}

fn decide(state: &mut HarvestState, fingerprint: Fingerprint) -> Vec<Effect> {
    if state.is_known(&fingerprint) {
        if state.stops_on_known() {
            engine_info!(
                "session {} reached known record {}",
                state.target(),
                fingerprint.short()
            );
            return stop(state, TerminationReason::KnownBoundary);
        }
        state.note_known();
        return vec![Effect::Skip(SkipReason::Known)];
    }

    if state.at_capacity() {
        return stop(state, TerminationReason::Capped);
    }

    if !state.accept(fingerprint) {
        state.note_duplicate();
        return vec![Effect::Skip(SkipReason::Duplicate)];
    }

    if state.at_capacity() {
        let mut effects = vec![Effect::Accept];
        effects.extend(stop(state, TerminationReason::Capped));
        return effects;
    }
    vec![Effect::Accept]
}

fn finish_pass(state: &mut HarvestState) -> Vec<Effect> {
    if state.at_capacity() {
        return stop(state, TerminationReason::Capped);
    }

    if state.made_progress() {
        state.reset_stale();
    } else if state.register_stale_pass() {
        return stop(state, TerminationReason::Exhausted);
    }

    state.begin_reveal();
    vec![Effect::RevealMore]
}

fn stop(state: &mut HarvestState, reason: TerminationReason) -> Vec<Effect> {
    state.stop(reason);
    vec![Effect::Stop(reason)]
}
