use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_error, engine_info, engine_warn};
use harvester_core::{Record, SessionStats, Target, TerminationReason};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::controller::{HarvestController, HarvestResult};
use crate::extract::Extractor;
use crate::source::SourceFactory;
use crate::store::{group_by_key, PersistReceipt, Sink, StoreError};
use crate::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Sessions allowed to run at once.
    pub concurrency: usize,
    /// Wall-clock budget per session; the partial result is kept on expiry.
    pub session_budget: Option<Duration>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            session_budget: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not set up source: {0}")]
    Source(#[from] SourceError),
    #[error("session task failed: {0}")]
    Task(String),
}

#[derive(Debug)]
pub struct SessionOutcome<R> {
    pub target: Target,
    pub result: Result<HarvestResult<R>, SessionError>,
}

/// Records that survived the cross-target merge, plus what was dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome<R> {
    pub records: Vec<R>,
    pub dropped_known: usize,
    pub dropped_duplicate: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub target: Target,
    pub reason: Option<TerminationReason>,
    pub accepted: usize,
    pub stats: SessionStats,
    pub error: Option<String>,
}

impl SessionReport {
    pub fn summary_line(&self) -> String {
        match (&self.reason, &self.error) {
            (Some(reason), _) => format!(
                "{}: {} new records, {} after {} passes",
                self.target, self.accepted, reason, self.stats.passes
            ),
            (None, Some(error)) => format!("{}: failed: {}", self.target, error),
            (None, None) => format!("{}: no result", self.target),
        }
    }
}

/// What one orchestrated run did, per target and in total.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunReport {
    pub sessions: Vec<SessionReport>,
    pub merged: usize,
    pub dropped_known: usize,
    pub dropped_duplicate: usize,
    pub receipts: Vec<PersistReceipt>,
}

impl RunReport {
    pub fn total_accepted(&self) -> usize {
        self.sessions.iter().map(|session| session.accepted).sum()
    }

    pub fn failed_sessions(&self) -> usize {
        self.sessions.iter().filter(|s| s.error.is_some()).count()
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.sessions.iter().map(SessionReport::summary_line).collect();
        lines.push(format!(
            "total: {} accepted, {} merged, {} already known, {} duplicates across targets, {} failed sessions",
            self.total_accepted(),
            self.merged,
            self.dropped_known,
            self.dropped_duplicate,
            self.failed_sessions()
        ));
        lines
    }
}

/// Runs one harvest session per target with bounded parallelism, then merges
/// and persists what they accepted.
pub struct SessionOrchestrator<E: Extractor> {
    controller: HarvestController<E>,
    factory: Arc<dyn SourceFactory>,
    sink: Arc<dyn Sink>,
    settings: OrchestratorSettings,
}

impl<E: Extractor> SessionOrchestrator<E> {
    pub fn new(
        controller: HarvestController<E>,
        factory: Arc<dyn SourceFactory>,
        sink: Arc<dyn Sink>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            controller,
            factory,
            sink,
            settings,
        }
    }

    /// Run every target to completion. Outcomes come back in target order;
    /// one failing session never affects its siblings.
    pub async fn run_sessions(
        &self,
        targets: &[Target],
        cancel: &CancellationToken,
    ) -> Vec<SessionOutcome<E::Output>> {
        let permits = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut slots = HashMap::new();

        for (index, target) in targets.iter().cloned().enumerate() {
            let permits = permits.clone();
            let controller = self.controller.clone();
            let factory = self.factory.clone();
            let token = cancel.child_token();
            let budget = self.settings.session_budget;

            let handle = tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|err| SessionError::Task(err.to_string()))?;
                let mut source = factory.create(&target)?;
                if let Some(budget) = budget {
                    spawn_budget_timer(target.clone(), token.clone(), budget);
                }
                let _stop_timer = token.clone().drop_guard();
                Ok::<_, SessionError>(controller.harvest(target, source.as_mut(), &token).await)
            });
            slots.insert(handle.id(), index);
        }

        let mut results: Vec<Option<Result<HarvestResult<E::Output>, SessionError>>> =
            targets.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(err) => (err.id(), Err(SessionError::Task(err.to_string()))),
            };
            if let Some(&index) = slots.get(&id) {
                results[index] = Some(result);
            }
        }

        targets
            .iter()
            .cloned()
            .zip(results)
            .map(|(target, result)| {
                let result = result
                    .unwrap_or_else(|| Err(SessionError::Task("session never reported".into())));
                if let Err(err) = &result {
                    engine_error!("session {} failed: {}", target, err);
                }
                SessionOutcome { target, result }
            })
            .collect()
    }

    /// Business keys already in the sink. Fails soft to an empty set, and
    /// skips the sink entirely for record kinds without a business key.
    pub async fn load_known_keys(&self) -> HashSet<String> {
        if !<E::Output as Record>::HAS_BUSINESS_KEY {
            return HashSet::new();
        }
        match self.sink.list_known_business_keys(None).await {
            Ok(keys) => keys,
            Err(err) => {
                engine_warn!("known keys unavailable, merging without them: {}", err);
                HashSet::new()
            }
        }
    }

    /// Append records to the sink, one call per target key.
    pub async fn persist(&self, records: &[E::Output]) -> Result<Vec<PersistReceipt>, StoreError> {
        let mut keyed = Vec::with_capacity(records.len());
        for record in records {
            keyed.push((record.target_key().to_string(), serde_json::to_value(record)?));
        }
        let mut receipts = Vec::new();
        for (key, batch) in group_by_key(keyed) {
            receipts.push(self.sink.append_records(&key, batch).await?);
        }
        Ok(receipts)
    }

    /// Harvest, merge and persist. Returns the report and the merged records.
    pub async fn run(
        &self,
        targets: &[Target],
        cancel: &CancellationToken,
    ) -> Result<(RunReport, Vec<E::Output>), StoreError> {
        let known = self.load_known_keys().await;
        let outcomes = self.run_sessions(targets, cancel).await;
        let sessions = outcomes.iter().map(session_report).collect();
        let merged = merge_results(outcomes, &known);
        engine_info!(
            "merged {} records ({} known, {} duplicate)",
            merged.records.len(),
            merged.dropped_known,
            merged.dropped_duplicate
        );
        let receipts = self.persist(&merged.records).await?;
        let report = RunReport {
            sessions,
            merged: merged.records.len(),
            dropped_known: merged.dropped_known,
            dropped_duplicate: merged.dropped_duplicate,
            receipts,
        };
        Ok((report, merged.records))
    }
}

fn spawn_budget_timer(target: Target, token: CancellationToken, budget: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(budget) => {
                engine_warn!("session {} exceeded its {:?} budget", target, budget);
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
}

pub fn session_report<R>(outcome: &SessionOutcome<R>) -> SessionReport {
    match &outcome.result {
        Ok(result) => SessionReport {
            target: outcome.target.clone(),
            reason: Some(result.reason),
            accepted: result.records.len(),
            stats: result.stats,
            error: None,
        },
        Err(err) => SessionReport {
            target: outcome.target.clone(),
            reason: None,
            accepted: 0,
            stats: SessionStats::default(),
            error: Some(err.to_string()),
        },
    }
}

/// Concatenate session results in target order, dropping records whose
/// business key is already known or was merged earlier in this run.
/// Fingerprints only dedup within one target key: equal content at two
/// places is two records.
pub fn merge_results<R: Record>(
    outcomes: Vec<SessionOutcome<R>>,
    known_keys: &HashSet<String>,
) -> MergeOutcome<R> {
    let mut merged = MergeOutcome {
        records: Vec::new(),
        dropped_known: 0,
        dropped_duplicate: 0,
    };
    let mut keys = HashSet::new();
    let mut fingerprints = HashSet::new();

    for record in outcomes
        .into_iter()
        .filter_map(|outcome| outcome.result.ok())
        .flat_map(|result| result.records)
    {
        if let Some(key) = record.business_key() {
            if known_keys.contains(key) {
                merged.dropped_known += 1;
                continue;
            }
            if !keys.insert(key.to_string()) {
                merged.dropped_duplicate += 1;
                continue;
            }
        }
        if !fingerprints.insert((record.target_key().to_string(), record.fingerprint())) {
            merged.dropped_duplicate += 1;
            continue;
        }
        merged.records.push(record);
    }
    merged
}
