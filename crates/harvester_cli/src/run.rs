use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use engine_logging::{engine_info, engine_warn};
use harvester_core::{Listing, Target};
use harvester_engine::{
    emit_work_items, merge_results, session_report, ControllerSettings, DetailEnricher,
    DispatchReport, Extractor, FetchSettings, Fetcher, Geocoder, HarvestController,
    HttpDispatcher, HttpPagedSource, JsonFileStore, ListingExtractor, NominatimGeocoder,
    PagedSourceSettings, PersistReceipt, ReqwestFetcher, ReviewExtractor, RunReport,
    SessionOrchestrator, SourceAdapter, SourceError, SourceFactory,
};
use tokio_util::sync::CancellationToken;

use crate::cli::Command;
use crate::config::HarvestConfig;

const REVIEWS_DIR: &str = "reviews";
const RESTAURANTS_DIR: &str = "restaurants";

/// Everything one invocation did.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub report: RunReport,
    pub dispatch: Option<DispatchReport>,
}

impl RunSummary {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = self.report.summary_lines();
        for receipt in &self.report.receipts {
            lines.push(format!(
                "stored {} new of {} at {}",
                receipt.appended, receipt.total, receipt.location
            ));
        }
        if let Some(dispatch) = &self.dispatch {
            lines.push(format!(
                "dispatched {} work items, {} failed",
                dispatch.submitted.len(),
                dispatch.failed.len()
            ));
        }
        lines
    }
}

pub async fn run(
    command: Command,
    config: &HarvestConfig,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let fetcher: Arc<dyn Fetcher> = Arc::new(
        ReqwestFetcher::new(FetchSettings::default()).context("building http client")?,
    );
    let store_dir = config
        .store_dir
        .clone()
        .context("store directory missing")?;
    match command {
        Command::Reviews => run_reviews(config, fetcher, &store_dir, cancel).await,
        Command::Restaurants => run_restaurants(config, fetcher, &store_dir, cancel).await,
    }
}

async fn run_reviews(
    config: &HarvestConfig,
    fetcher: Arc<dyn Fetcher>,
    store_dir: &Path,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let store = Arc::new(JsonFileStore::new(store_dir.join(REVIEWS_DIR), "place_id"));
    let orchestrator = orchestrator(
        ReviewExtractor,
        config,
        config.review_settings(),
        paged_sources(fetcher, config.review_source.settings()),
        store,
    );
    let targets: Vec<Target> = config.targets.iter().map(Target::new).collect();

    let (report, _) = orchestrator
        .run(&targets, cancel)
        .await
        .context("persisting reviews")?;
    Ok(RunSummary {
        report,
        dispatch: None,
    })
}

async fn run_restaurants(
    config: &HarvestConfig,
    fetcher: Arc<dyn Fetcher>,
    store_dir: &Path,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let store = Arc::new(JsonFileStore::new(store_dir.join(RESTAURANTS_DIR), "place_id"));
    let orchestrator = orchestrator(
        ListingExtractor,
        config,
        config.listing_settings(),
        paged_sources(fetcher.clone(), config.listing_source.settings()),
        store,
    );
    let targets: Vec<Target> = config
        .targets
        .iter()
        .flat_map(|query| config.pages.iter().map(move |&page| Target::with_page(query, page)))
        .collect();

    let known = orchestrator.load_known_keys().await;
    let outcomes = orchestrator.run_sessions(&targets, cancel).await;
    let sessions = outcomes.iter().map(session_report).collect();
    let merged = merge_results(outcomes, &known);

    let listings = enricher(config, fetcher).enrich_all(merged.records).await;
    let receipts = orchestrator
        .persist(&listings)
        .await
        .context("persisting restaurants")?;

    let dispatch = match &config.dispatch_url {
        Some(url) => Some(dispatch_new_places(url, config, &listings, &receipts).await?),
        None => None,
    };

    Ok(RunSummary {
        report: RunReport {
            sessions,
            merged: listings.len(),
            dropped_known: merged.dropped_known,
            dropped_duplicate: merged.dropped_duplicate,
            receipts,
        },
        dispatch,
    })
}

fn orchestrator<E: Extractor>(
    extractor: E,
    config: &HarvestConfig,
    settings: ControllerSettings,
    factory: Arc<dyn SourceFactory>,
    store: Arc<JsonFileStore>,
) -> SessionOrchestrator<E> {
    let controller = HarvestController::new(Arc::new(extractor), store.clone(), settings);
    SessionOrchestrator::new(controller, factory, store, config.orchestrator_settings())
}

fn paged_sources(fetcher: Arc<dyn Fetcher>, settings: PagedSourceSettings) -> Arc<dyn SourceFactory> {
    Arc::new(
        move |target: &Target| -> Result<Box<dyn SourceAdapter>, SourceError> {
            Ok(Box::new(HttpPagedSource::new(
                fetcher.clone(),
                settings.clone(),
                target.clone(),
            )))
        },
    )
}

fn enricher(config: &HarvestConfig, fetcher: Arc<dyn Fetcher>) -> DetailEnricher {
    let geocoder: Option<Arc<dyn Geocoder>> = config.geocode.then(|| {
        Arc::new(NominatimGeocoder::new(fetcher.clone(), config.geocoder_url.clone()))
            as Arc<dyn Geocoder>
    });
    DetailEnricher::new(fetcher, geocoder, config.detail_url_template.clone())
}

/// One work item per newly stored place, pointing at the file it landed in.
async fn dispatch_new_places(
    url: &str,
    config: &HarvestConfig,
    listings: &[Listing],
    receipts: &[PersistReceipt],
) -> Result<DispatchReport> {
    let dispatcher = HttpDispatcher::new(url, Duration::from_secs(config.dispatch_timeout_secs))
        .context("building dispatcher")?;
    let locations: HashMap<&str, &str> = receipts
        .iter()
        .map(|receipt| (receipt.target_key.as_str(), receipt.location.as_str()))
        .collect();

    let mut by_location: Vec<(&str, Vec<String>)> = Vec::new();
    for listing in listings {
        let Some(&location) = locations.get(listing.query.as_str()) else {
            engine_warn!("no stored location for {}", listing.place_id);
            continue;
        };
        match by_location.iter_mut().find(|(existing, _)| *existing == location) {
            Some((_, keys)) => keys.push(listing.place_id.clone()),
            None => by_location.push((location, vec![listing.place_id.clone()])),
        }
    }

    let mut report = DispatchReport::default();
    for (location, keys) in by_location {
        let part = emit_work_items(&dispatcher, &keys, location).await;
        report.submitted.extend(part.submitted);
        report.failed.extend(part.failed);
    }
    engine_info!(
        "dispatch finished: {} submitted, {} failed",
        report.submitted.len(),
        report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvester_core::{SessionStats, TerminationReason};
    use harvester_engine::SessionReport;

    #[test]
    fn summary_lists_targets_storage_and_dispatch() {
        let summary = RunSummary {
            report: RunReport {
                sessions: vec![SessionReport {
                    target: Target::new("1234"),
                    reason: Some(TerminationReason::KnownBoundary),
                    accepted: 7,
                    stats: SessionStats {
                        passes: 2,
                        ..SessionStats::default()
                    },
                    error: None,
                }],
                merged: 7,
                receipts: vec![PersistReceipt {
                    target_key: "1234".into(),
                    location: "out/reviews/1234.json".into(),
                    appended: 7,
                    total: 40,
                }],
                ..RunReport::default()
            },
            dispatch: Some(DispatchReport {
                submitted: vec!["1".into()],
                failed: Vec::new(),
            }),
        };

        let lines = summary.lines();
        assert_eq!(lines[0], "1234: 7 new records, KNOWN_BOUNDARY after 2 passes");
        assert!(lines[1].starts_with("total: 7 accepted, 7 merged"));
        assert_eq!(lines[2], "stored 7 new of 40 at out/reviews/1234.json");
        assert_eq!(lines[3], "dispatched 1 work items, 0 failed");
    }
}
