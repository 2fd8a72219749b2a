mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use harvester_core::{BoundaryPolicy, CursorSet, HarvestLimits, Listing, Record, Target, TerminationReason};
use harvester_engine::{HarvestController, ListingExtractor, RawItem, SourceErrorKind};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

fn controller(
    extractor: Arc<CountingExtractor>,
    store: Arc<MemoryStore>,
    limits: HarvestLimits,
) -> HarvestController<CountingExtractor> {
    HarvestController::new(extractor, store, fast_settings(limits))
}

fn handles(records: &[harvester_core::Review]) -> Vec<String> {
    records.iter().map(|r| r.author.trim_start_matches("user-").to_string()).collect()
}

#[tokio::test]
async fn known_fingerprint_ends_the_session_at_the_boundary() {
    init_logging();
    let known = review_for("place", "F").fingerprint();
    let store = shared(MemoryStore::with_cursor("place", [known].into_iter().collect()));
    let extractor = Arc::new(CountingExtractor::default());
    let mut source = ScriptedSource::single(["A", "B", "F", "C"].map(review_item).to_vec());

    let result = controller(extractor.clone(), store, HarvestLimits::default())
        .harvest(Target::new("place"), &mut source, &CancellationToken::new())
        .await;

    assert_eq!(result.reason, TerminationReason::KnownBoundary);
    assert_eq!(handles(&result.records), vec!["A", "B"]);
    assert_eq!(extractor.calls(), 3);
}

#[tokio::test]
async fn unchanging_source_exhausts_after_three_stale_passes() {
    init_logging();
    let extractor = Arc::new(CountingExtractor::default());
    let mut source = ScriptedSource::single(["1", "2", "3", "4", "5"].map(review_item).to_vec());

    let result = controller(extractor.clone(), shared(MemoryStore::default()), HarvestLimits::default())
        .harvest(Target::new("place"), &mut source, &CancellationToken::new())
        .await;

    assert_eq!(result.reason, TerminationReason::Exhausted);
    assert_eq!(handles(&result.records), vec!["1", "2", "3", "4", "5"]);
    assert_eq!(result.stats.passes, 4);
    assert_eq!(extractor.calls(), 5);
}

#[tokio::test]
async fn removable_source_reaches_the_same_result() {
    init_logging();
    let extractor = Arc::new(CountingExtractor::default());
    let mut source =
        ScriptedSource::single(["1", "2", "3"].map(review_item).to_vec()).removable();

    let result = controller(extractor, shared(MemoryStore::default()), HarvestLimits::default())
        .harvest(Target::new("place"), &mut source, &CancellationToken::new())
        .await;

    assert_eq!(result.reason, TerminationReason::Exhausted);
    assert_eq!(result.records.len(), 3);
}

#[tokio::test]
async fn rerendered_item_is_accepted_once() {
    init_logging();
    let html = review_item("A").html;
    let mut source = ScriptedSource::single(vec![
        RawItem::new("first", html.clone()),
        RawItem::new("second", html),
    ]);

    let result = controller(
        Arc::new(CountingExtractor::default()),
        shared(MemoryStore::default()),
        HarvestLimits::default(),
    )
    .harvest(Target::new("place"), &mut source, &CancellationToken::new())
    .await;

    assert_eq!(result.records.len(), 1);
    assert_eq!(result.stats.duplicates_skipped, 1);
}

#[tokio::test]
async fn endless_source_is_capped_at_the_ceiling() {
    init_logging();
    let mut source = EndlessSource::new();

    let result = controller(
        Arc::new(CountingExtractor::default()),
        shared(MemoryStore::default()),
        HarvestLimits::default(),
    )
    .harvest(Target::new("place"), &mut source, &CancellationToken::new())
    .await;

    assert_eq!(result.reason, TerminationReason::Capped);
    assert_eq!(result.records.len(), 1000);
    assert_eq!(source.produced(), 1000);
}

#[tokio::test]
async fn cap_applies_inside_a_single_pass() {
    init_logging();
    let limits = HarvestLimits {
        max_records: 2,
        ..HarvestLimits::default()
    };
    let extractor = Arc::new(CountingExtractor::default());
    let mut source = ScriptedSource::single(["1", "2", "3", "4"].map(review_item).to_vec());

    let result = controller(extractor.clone(), shared(MemoryStore::default()), limits)
        .harvest(Target::new("place"), &mut source, &CancellationToken::new())
        .await;

    assert_eq!(result.reason, TerminationReason::Capped);
    assert_eq!(handles(&result.records), vec!["1", "2"]);
    assert_eq!(extractor.calls(), 2);
}

#[tokio::test]
async fn malformed_item_is_skipped_and_order_kept() {
    init_logging();
    let mut items = ["1", "2", "3", "4", "5"].map(review_item).to_vec();
    items[2] = RawItem::new("3", r#"<li class="EjjAW"><p>광고</p></li>"#);
    let mut source = ScriptedSource::single(items);

    let result = controller(
        Arc::new(CountingExtractor::default()),
        shared(MemoryStore::default()),
        HarvestLimits::default(),
    )
    .harvest(Target::new("place"), &mut source, &CancellationToken::new())
    .await;

    assert_eq!(handles(&result.records), vec!["1", "2", "4", "5"]);
    assert_eq!(result.stats.extraction_failures, 1);
}

#[tokio::test]
async fn unreachable_source_ends_with_source_error() {
    init_logging();
    let mut source = ScriptedSource::failing_open(SourceErrorKind::Unreachable);

    let result = controller(
        Arc::new(CountingExtractor::default()),
        shared(MemoryStore::default()),
        HarvestLimits::default(),
    )
    .harvest(Target::new("place"), &mut source, &CancellationToken::new())
    .await;

    assert_eq!(result.reason, TerminationReason::SourceError);
    assert!(result.records.is_empty());
}

#[tokio::test]
async fn lost_container_keeps_partial_result() {
    init_logging();
    let mut source = ScriptedSource::new(vec![
        ["1", "2"].map(review_item).to_vec(),
        ["3"].map(review_item).to_vec(),
    ]);
    source.fatal_reveal = true;

    let result = controller(
        Arc::new(CountingExtractor::default()),
        shared(MemoryStore::default()),
        HarvestLimits::default(),
    )
    .harvest(Target::new("place"), &mut source, &CancellationToken::new())
    .await;

    assert_eq!(result.reason, TerminationReason::SourceError);
    assert_eq!(handles(&result.records), vec!["1", "2"]);
}

#[tokio::test]
async fn transient_reveal_failures_do_not_hide_later_pages() {
    init_logging();
    let mut source = ScriptedSource::new(vec![
        ["1", "2"].map(review_item).to_vec(),
        ["3"].map(review_item).to_vec(),
    ]);
    source.reveal_failures = 2;

    let result = controller(
        Arc::new(CountingExtractor::default()),
        shared(MemoryStore::default()),
        HarvestLimits::default(),
    )
    .harvest(Target::new("place"), &mut source, &CancellationToken::new())
    .await;

    assert_eq!(result.reason, TerminationReason::Exhausted);
    assert_eq!(handles(&result.records), vec!["1", "2", "3"]);
    assert_eq!(result.stats.reveal_failures, 2);
    // Page two, then three passes without progress.
    assert_eq!(result.stats.passes, 5);
}

#[tokio::test]
async fn unavailable_cursor_means_first_harvest() {
    init_logging();
    let store = MemoryStore {
        fail_cursor: true,
        ..MemoryStore::default()
    };
    let mut source = ScriptedSource::single(["1", "2"].map(review_item).to_vec());

    let result = controller(
        Arc::new(CountingExtractor::default()),
        shared(store),
        HarvestLimits::default(),
    )
    .harvest(Target::new("place"), &mut source, &CancellationToken::new())
    .await;

    assert_eq!(result.reason, TerminationReason::Exhausted);
    assert_eq!(result.records.len(), 2);
}

#[tokio::test]
async fn cancellation_keeps_what_was_accepted() {
    init_logging();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let mut source = HangingSource::new(["1", "2"].map(review_item).to_vec());

    let result = controller(
        Arc::new(CountingExtractor::default()),
        shared(MemoryStore::default()),
        HarvestLimits::default(),
    )
    .harvest(Target::new("place"), &mut source, &cancel)
    .await;

    assert_eq!(result.reason, TerminationReason::Cancelled);
    assert_eq!(handles(&result.records), vec!["1", "2"]);
}

#[tokio::test]
async fn empty_cursor_set_is_a_first_harvest() {
    init_logging();
    let store = shared(MemoryStore::with_cursor("place", CursorSet::new()));
    let mut source = ScriptedSource::single(["1"].map(review_item).to_vec());

    let result = controller(Arc::new(CountingExtractor::default()), store, HarvestLimits::default())
        .harvest(Target::new("place"), &mut source, &CancellationToken::new())
        .await;

    assert_eq!(result.records, vec![review_for("place", "1")]);
}

fn listing_item(place_id: &str, name: &str) -> RawItem {
    RawItem::new(
        place_id,
        format!(
            r#"<li class="UEzoS"><a class="place_bluelink" href="/place/{place_id}"><span class="TYaxT">{name}</span></a><span class="KCMnt">한식</span></li>"#
        ),
    )
}

#[tokio::test]
async fn unordered_search_page_skips_a_known_listing() {
    init_logging();
    let known = Listing::new("공덕", "1", "첫집", "한식").fingerprint();
    let store = shared(MemoryStore::with_cursor("공덕", [known].into_iter().collect()));
    let mut source = ScriptedSource::single(vec![
        listing_item("1", "첫집"),
        listing_item("2", "둘집"),
        listing_item("3", "셋집"),
    ]);
    source.ordering = false;
    let limits = HarvestLimits {
        boundary: BoundaryPolicy::RequireOrdering,
        ..HarvestLimits::default()
    };

    let result = HarvestController::new(Arc::new(ListingExtractor), store, fast_settings(limits))
        .harvest(Target::new("공덕"), &mut source, &CancellationToken::new())
        .await;

    assert_eq!(result.reason, TerminationReason::Exhausted);
    let ids: Vec<&str> = result.records.iter().map(|l| l.place_id.as_str()).collect();
    assert_eq!(ids, vec!["2", "3"]);
    assert!(result.stats.known_skipped >= 1);
}
