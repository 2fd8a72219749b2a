use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};
use harvester_core::{
    update, CursorSet, Effect, HarvestLimits, HarvestState, Msg, Record, SessionStats, Target,
    TerminationReason,
};
use tokio_util::sync::CancellationToken;

use crate::extract::Extractor;
use crate::source::SourceAdapter;
use crate::store::CursorStore;
use crate::{RawItem, RevealOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub limits: HarvestLimits,
    /// Pause after each reveal so the source can render new items.
    pub settle_delay: Duration,
    /// Pause after activating an in-item "show more" control.
    pub expand_delay: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            limits: HarvestLimits::default(),
            settle_delay: Duration::from_secs(2),
            expand_delay: Duration::from_secs(1),
        }
    }
}

/// Outcome of one session. Records are in acceptance order.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestResult<R> {
    pub target: Target,
    pub records: Vec<R>,
    pub reason: TerminationReason,
    pub stats: SessionStats,
}

/// Drives one harvest session: executes the effects of the core state
/// machine against a source adapter and feeds the outcomes back as messages.
pub struct HarvestController<E: Extractor> {
    extractor: Arc<E>,
    cursor_store: Arc<dyn CursorStore>,
    settings: ControllerSettings,
}

impl<E: Extractor> Clone for HarvestController<E> {
    fn clone(&self) -> Self {
        Self {
            extractor: self.extractor.clone(),
            cursor_store: self.cursor_store.clone(),
            settings: self.settings,
        }
    }
}

impl<E: Extractor> HarvestController<E> {
    pub fn new(
        extractor: Arc<E>,
        cursor_store: Arc<dyn CursorStore>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            extractor,
            cursor_store,
            settings,
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Run a session to completion. Never fails: every ending is a
    /// [`TerminationReason`], and records accepted before it are kept.
    pub async fn harvest(
        &self,
        target: Target,
        source: &mut dyn SourceAdapter,
        cancel: &CancellationToken,
    ) -> HarvestResult<E::Output> {
        let mut session = Session::new(target.clone(), self.settings.limits);

        let mut queue: VecDeque<Effect> = match guarded(cancel, source.open()).await {
            None => session.dispatch(Msg::Cancelled).into(),
            Some(Err(err)) => {
                engine_warn!("cannot open {}: {}", target, err);
                session.dispatch(Msg::SourceLost).into()
            }
            Some(Ok(())) => {
                let cursor = self.load_cursor(&target).await;
                session.dispatch(Msg::Started { cursor }).into()
            }
        };

        while let Some(effect) = queue.pop_front() {
            if cancel.is_cancelled() && !matches!(effect, Effect::Stop(_)) {
                queue = session.dispatch(Msg::Cancelled).into();
                continue;
            }
            let next = match effect {
                Effect::ApplyOrdering(order) => {
                    match guarded(cancel, source.apply_ordering(order)).await {
                        None => Msg::Cancelled,
                        Some(Ok(enforced)) => Msg::OrderingApplied { enforced },
                        Some(Err(err)) if err.is_fatal() => {
                            engine_warn!("{} lost while ordering: {}", target, err);
                            Msg::SourceLost
                        }
                        Some(Err(err)) => {
                            engine_debug!("ordering not applied on {}: {}", target, err);
                            Msg::OrderingApplied { enforced: false }
                        }
                    }
                }
                Effect::Collect => {
                    queue.extend(self.collect(&mut session, source, cancel).await);
                    continue;
                }
                Effect::RevealMore => self.reveal(&target, source, cancel).await,
                Effect::Stop(_) => break,
                Effect::Accept | Effect::Skip(_) => continue,
            };
            queue.extend(session.dispatch(next));
        }

        let reason = session
            .state
            .termination()
            .unwrap_or(TerminationReason::SourceError);
        let stats = session.state.stats();
        if reason.is_complete() {
            engine_info!(
                "session {} finished: {} with {} records after {} passes",
                target,
                reason,
                session.records.len(),
                stats.passes
            );
        } else {
            engine_warn!(
                "session {} ended early: {} with {} records after {} passes",
                target,
                reason,
                session.records.len(),
                stats.passes
            );
        }
        HarvestResult {
            target,
            records: session.records,
            reason,
            stats,
        }
    }

    async fn load_cursor(&self, target: &Target) -> CursorSet {
        match self.cursor_store.load_known(&target.key).await {
            Ok(cursor) => cursor,
            Err(err) => {
                engine_warn!("cursor for {} unavailable, starting empty: {}", target, err);
                CursorSet::new()
            }
        }
    }

    /// One pass over the visible items. Returns the effects that follow the
    /// pass, or the stop effect if the session ended mid-pass.
    async fn collect(
        &self,
        session: &mut Session<E::Output>,
        source: &mut dyn SourceAdapter,
        cancel: &CancellationToken,
    ) -> Vec<Effect> {
        let items = match guarded(cancel, source.current_items()).await {
            None => return session.dispatch(Msg::Cancelled),
            Some(Ok(items)) => items,
            Some(Err(err)) if err.is_fatal() => {
                engine_warn!("{} lost while collecting: {}", session.state.target(), err);
                return session.dispatch(Msg::SourceLost);
            }
            Some(Err(err)) => {
                engine_debug!("{} pass saw no items: {}", session.state.target(), err);
                Vec::new()
            }
        };

        for item in items {
            if session.excluded.contains(&item.handle) {
                continue;
            }
            if cancel.is_cancelled() {
                return session.dispatch(Msg::Cancelled);
            }
            let item = self.expand(item, source, cancel).await;

            let record = match self.extractor.extract(&item, session.state.target()) {
                Ok(record) => record,
                Err(err) => {
                    engine_warn!("skipping item {} of {}: {}", item.handle, session.state.target(), err);
                    session.excluded.insert(item.handle);
                    session.dispatch(Msg::ExtractionFailed);
                    continue;
                }
            };

            let fingerprint = record.fingerprint();
            let mut record = Some(record);
            for effect in session.dispatch(Msg::Candidate { fingerprint }) {
                match effect {
                    Effect::Accept => {
                        if let Some(record) = record.take() {
                            session.records.push(record);
                        }
                        let removed = matches!(
                            guarded(cancel, source.remove_item(&item)).await,
                            Some(Ok(true))
                        );
                        if !removed {
                            session.excluded.insert(item.handle.clone());
                        }
                    }
                    Effect::Skip(reason) => {
                        engine_debug!("skipped {} ({:?})", fingerprint.short(), reason);
                        session.excluded.insert(item.handle.clone());
                    }
                    stop @ Effect::Stop(_) => return vec![stop],
                    other => engine_debug!("unexpected effect during collect: {:?}", other),
                }
            }
        }

        let effects = session.dispatch(Msg::PassCompleted);
        engine_debug!("{}", session.state.view().progress_line());
        effects
    }

    /// Activate the extractor's "show more" control if the item has one.
    async fn expand(
        &self,
        item: RawItem,
        source: &mut dyn SourceAdapter,
        cancel: &CancellationToken,
    ) -> RawItem {
        let Some(control) = self.extractor.expand_control() else {
            return item;
        };
        match guarded(cancel, source.activate(&item, control)).await {
            Some(Ok(Some(expanded))) => {
                settle(cancel, self.settings.expand_delay).await;
                expanded
            }
            Some(Err(err)) => {
                engine_debug!("could not expand {}: {}", item.handle, err);
                item
            }
            _ => item,
        }
    }

    async fn reveal(
        &self,
        target: &Target,
        source: &mut dyn SourceAdapter,
        cancel: &CancellationToken,
    ) -> Msg {
        let msg = match guarded(cancel, source.reveal_more()).await {
            None => return Msg::Cancelled,
            Some(Ok(outcome)) => Msg::RevealCompleted {
                action_taken: outcome == RevealOutcome::Revealed,
            },
            Some(Err(err)) if err.is_fatal() => {
                engine_warn!("{} lost while revealing: {}", target, err);
                return Msg::SourceLost;
            }
            Some(Err(err)) => {
                engine_debug!("reveal on {} failed: {}", target, err);
                Msg::RevealFailed
            }
        };
        if !settle(cancel, self.settings.settle_delay).await {
            return Msg::Cancelled;
        }
        msg
    }
}

/// Per-session mutable state owned by the driver.
struct Session<R> {
    state: HarvestState,
    records: Vec<R>,
    /// Handles already decided in this session, for sources that cannot
    /// remove items from their view.
    excluded: HashSet<String>,
}

impl<R> Session<R> {
    fn new(target: Target, limits: HarvestLimits) -> Self {
        Self {
            state: HarvestState::new(target, limits),
            records: Vec::new(),
            excluded: HashSet::new(),
        }
    }

    fn dispatch(&mut self, msg: Msg) -> Vec<Effect> {
        let placeholder = HarvestState::new(self.state.target().clone(), self.state.limits());
        let current = std::mem::replace(&mut self.state, placeholder);
        let (next, effects) = update(current, msg);
        self.state = next;
        effects
    }
}

/// Await `fut` unless the token fires first.
async fn guarded<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Sleep for `delay`; false if cancelled meanwhile.
async fn settle(cancel: &CancellationToken, delay: Duration) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    guarded(cancel, tokio::time::sleep(delay)).await.is_some()
}
