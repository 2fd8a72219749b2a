#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use harvester_core::{CursorSet, HarvestLimits, Review, SortOrder, Target};
use harvester_engine::{
    ControllerSettings, CursorStore, ExtractError, Extractor, PersistReceipt, RawItem,
    ReviewExtractor, RevealOutcome, Sink, SourceAdapter, SourceError, SourceErrorKind, StoreError,
};
use serde_json::Value;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

pub fn review_html(author: &str, content: &str, date: &str) -> String {
    format!(
        r#"<li class="EjjAW"><span class="pui__NMi-Dp">{author}</span><div class="pui__vn15t2"><a>{content}</a></div><time>{date}</time></li>"#
    )
}

pub fn review_item(handle: &str) -> RawItem {
    RawItem::new(handle, review_html(&format!("user-{handle}"), &format!("text {handle}"), "24.1.1.월"))
}

/// The review a `review_item(handle)` extracts to.
pub fn review_for(target: &str, handle: &str) -> Review {
    Review::new(target, format!("user-{handle}"), format!("text {handle}"), "24.1.1.월")
}

pub fn fast_settings(limits: HarvestLimits) -> ControllerSettings {
    ControllerSettings {
        limits,
        settle_delay: Duration::ZERO,
        expand_delay: Duration::ZERO,
    }
}

/// Review extractor that counts how often it runs.
#[derive(Default)]
pub struct CountingExtractor {
    pub calls: AtomicUsize,
}

impl CountingExtractor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Extractor for CountingExtractor {
    type Output = Review;

    fn extract(&self, item: &RawItem, target: &Target) -> Result<Review, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ReviewExtractor.extract(item, target)
    }
}

/// Source whose pages are fixed up front. Each reveal appends the next page.
pub struct ScriptedSource {
    pages: Vec<Vec<RawItem>>,
    revealed: usize,
    live: Vec<RawItem>,
    pub removable: bool,
    pub ordering: bool,
    pub fail_open: Option<SourceErrorKind>,
    pub reveal_failures: usize,
    pub fatal_reveal: bool,
}

impl ScriptedSource {
    pub fn new(pages: Vec<Vec<RawItem>>) -> Self {
        Self {
            pages,
            revealed: 0,
            live: Vec::new(),
            removable: false,
            ordering: true,
            fail_open: None,
            reveal_failures: 0,
            fatal_reveal: false,
        }
    }

    pub fn single(items: Vec<RawItem>) -> Self {
        Self::new(vec![items])
    }

    pub fn removable(mut self) -> Self {
        self.removable = true;
        self
    }

    pub fn failing_open(kind: SourceErrorKind) -> Self {
        let mut source = Self::new(Vec::new());
        source.fail_open = Some(kind);
        source
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    async fn open(&mut self) -> Result<(), SourceError> {
        if let Some(kind) = self.fail_open.clone() {
            return Err(SourceError::new(kind, "scripted failure"));
        }
        self.live = self.pages.first().cloned().unwrap_or_default();
        self.revealed = 1;
        Ok(())
    }

    async fn current_items(&mut self) -> Result<Vec<RawItem>, SourceError> {
        Ok(self.live.clone())
    }

    async fn reveal_more(&mut self) -> Result<RevealOutcome, SourceError> {
        if self.fatal_reveal {
            return Err(SourceError::new(SourceErrorKind::ContainerMissing, "gone"));
        }
        if self.reveal_failures > 0 {
            self.reveal_failures -= 1;
            return Err(SourceError::new(SourceErrorKind::Timeout, "slow"));
        }
        match self.pages.get(self.revealed) {
            Some(page) => {
                self.live.extend(page.iter().cloned());
                self.revealed += 1;
                Ok(RevealOutcome::Revealed)
            }
            None => Ok(RevealOutcome::NoAction),
        }
    }

    async fn apply_ordering(&mut self, _order: SortOrder) -> Result<bool, SourceError> {
        Ok(self.ordering)
    }

    async fn remove_item(&mut self, item: &RawItem) -> Result<bool, SourceError> {
        if !self.removable {
            return Ok(false);
        }
        self.live.retain(|live| live.handle != item.handle);
        Ok(true)
    }
}

/// Source that reveals exactly one never-seen item per reveal, forever.
pub struct EndlessSource {
    next: usize,
    live: Vec<RawItem>,
}

impl EndlessSource {
    pub fn new() -> Self {
        Self {
            next: 0,
            live: Vec::new(),
        }
    }

    fn push_new(&mut self) {
        self.live.push(review_item(&format!("n{}", self.next)));
        self.next += 1;
    }

    pub fn produced(&self) -> usize {
        self.next
    }
}

#[async_trait]
impl SourceAdapter for EndlessSource {
    async fn open(&mut self) -> Result<(), SourceError> {
        self.push_new();
        Ok(())
    }

    async fn current_items(&mut self) -> Result<Vec<RawItem>, SourceError> {
        Ok(self.live.clone())
    }

    async fn reveal_more(&mut self) -> Result<RevealOutcome, SourceError> {
        self.push_new();
        Ok(RevealOutcome::Revealed)
    }

    async fn remove_item(&mut self, item: &RawItem) -> Result<bool, SourceError> {
        self.live.retain(|live| live.handle != item.handle);
        Ok(true)
    }
}

/// Source that shows one page and then hangs on every reveal.
pub struct HangingSource {
    items: Vec<RawItem>,
}

impl HangingSource {
    pub fn new(items: Vec<RawItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl SourceAdapter for HangingSource {
    async fn open(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn current_items(&mut self) -> Result<Vec<RawItem>, SourceError> {
        Ok(self.items.clone())
    }

    async fn reveal_more(&mut self) -> Result<RevealOutcome, SourceError> {
        std::future::pending::<()>().await;
        Ok(RevealOutcome::NoAction)
    }
}

/// In-memory cursor store and sink.
#[derive(Default)]
pub struct MemoryStore {
    pub cursors: HashMap<String, CursorSet>,
    pub known_keys: HashSet<String>,
    pub fail_cursor: bool,
    pub appended: Mutex<Vec<(String, Vec<Value>)>>,
    pub key_scans: AtomicUsize,
}

impl MemoryStore {
    pub fn with_cursor(target: &str, cursor: CursorSet) -> Self {
        let mut store = Self::default();
        store.cursors.insert(target.to_string(), cursor);
        store
    }

    pub fn appended(&self) -> Vec<(String, Vec<Value>)> {
        self.appended.lock().unwrap().clone()
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn load_known(&self, target_key: &str) -> Result<CursorSet, StoreError> {
        if self.fail_cursor {
            return Err(StoreError::Dir("unavailable".into()));
        }
        Ok(self.cursors.get(target_key).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl Sink for MemoryStore {
    async fn append_records(
        &self,
        target_key: &str,
        records: Vec<Value>,
    ) -> Result<PersistReceipt, StoreError> {
        let appended = records.len();
        self.appended
            .lock()
            .unwrap()
            .push((target_key.to_string(), records));
        Ok(PersistReceipt {
            target_key: target_key.to_string(),
            location: format!("memory/{target_key}"),
            appended,
            total: appended,
        })
    }

    async fn list_known_business_keys(
        &self,
        _target_key: Option<&str>,
    ) -> Result<HashSet<String>, StoreError> {
        self.key_scans.fetch_add(1, Ordering::SeqCst);
        Ok(self.known_keys.clone())
    }
}

pub fn shared(store: MemoryStore) -> Arc<MemoryStore> {
    Arc::new(store)
}
