use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use harvester_core::{BoundaryPolicy, HarvestLimits, DEFAULT_MAX_RECORDS, DEFAULT_STABILITY_THRESHOLD};
use harvester_engine::{
    ControllerSettings, OrchestratorSettings, PagedSourceSettings, DETAIL_URL_TEMPLATE,
    NOMINATIM_BASE_URL,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {message}")]
    Read { path: String, message: String },
    #[error("invalid config file {path}: {message}")]
    Parse { path: String, message: String },
    #[error("invalid value {value:?} for {name}")]
    Value { name: String, value: String },
    #[error("no targets given")]
    NoTargets,
    #[error("no store directory given")]
    NoStore,
    #[error("no result pages given")]
    NoPages,
    #[error("concurrency must be at least 1")]
    NoConcurrency,
}

/// One paged HTML source, as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    pub url_template: String,
    pub container_selector: String,
    pub item_selector: String,
    #[serde(default)]
    pub handle_attribute: Option<String>,
    #[serde(default)]
    pub newest_first_param: Option<(String, String)>,
    #[serde(default)]
    pub paginate: bool,
    /// Known-item policy for this flow; `None` takes the flow's default.
    #[serde(default)]
    pub boundary: Option<BoundaryPolicy>,
}

impl SourceConfig {
    pub fn settings(&self) -> PagedSourceSettings {
        PagedSourceSettings {
            url_template: self.url_template.clone(),
            container_selector: self.container_selector.clone(),
            item_selector: self.item_selector.clone(),
            handle_attribute: self.handle_attribute.clone(),
            newest_first_param: self.newest_first_param.clone(),
            paginate: self.paginate,
        }
    }

    fn default_reviews() -> Self {
        Self {
            url_template: "https://pcmap.place.naver.com/restaurant/{target}/review/visitor?page={page}"
                .to_string(),
            container_selector: "ul#_review_list".to_string(),
            item_selector: "li.EjjAW".to_string(),
            handle_attribute: None,
            newest_first_param: Some(("reviewSort".to_string(), "recent".to_string())),
            paginate: true,
            boundary: None,
        }
    }

    fn default_listings() -> Self {
        Self {
            url_template: "https://pcmap.place.naver.com/restaurant/list?query={target}&page={page}"
                .to_string(),
            container_selector: "body".to_string(),
            item_selector: "li.UEzoS".to_string(),
            handle_attribute: None,
            newest_first_param: None,
            paginate: false,
            boundary: None,
        }
    }
}

/// Run configuration. Layered: defaults, then the RON file, then
/// environment, then command-line flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Place ids for reviews, search queries for restaurants.
    pub targets: Vec<String>,
    /// Result pages harvested per search query.
    pub pages: Vec<u32>,
    pub store_dir: Option<PathBuf>,
    pub concurrency: usize,
    pub session_budget_secs: Option<u64>,
    pub max_records: usize,
    pub stability_threshold: u32,
    /// Overrides the per-source boundary policy for every flow.
    pub boundary: Option<BoundaryPolicy>,
    pub settle_delay_ms: u64,
    pub expand_delay_ms: u64,
    pub review_source: SourceConfig,
    pub listing_source: SourceConfig,
    pub detail_url_template: String,
    pub geocode: bool,
    pub geocoder_url: String,
    pub dispatch_url: Option<String>,
    pub dispatch_timeout_secs: u64,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            pages: vec![1],
            store_dir: None,
            concurrency: 4,
            session_budget_secs: None,
            max_records: DEFAULT_MAX_RECORDS,
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
            boundary: None,
            settle_delay_ms: 2000,
            expand_delay_ms: 1000,
            review_source: SourceConfig::default_reviews(),
            listing_source: SourceConfig::default_listings(),
            detail_url_template: DETAIL_URL_TEMPLATE.to_string(),
            geocode: true,
            geocoder_url: NOMINATIM_BASE_URL.to_string(),
            dispatch_url: None,
            dispatch_timeout_secs: 10,
            log_level: "info".to_string(),
            log_file: Some(PathBuf::from("harvest.log")),
        }
    }
}

impl HarvestConfig {
    pub fn from_ron_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Self::from_ron(&text).map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })
    }

    pub fn from_ron(text: &str) -> Result<Self, String> {
        ron::from_str(text).map_err(|err| err.to_string())
    }

    /// Apply `HARVEST_*` variables, plus the legacy `PLACE_ID`, through
    /// `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(targets) = lookup("HARVEST_TARGETS") {
            self.targets = split_list(&targets);
        }
        if let Some(place) = lookup("PLACE_ID").filter(|p| !p.trim().is_empty()) {
            let place = place.trim().to_string();
            if !self.targets.contains(&place) {
                self.targets.push(place);
            }
        }
        if let Some(pages) = lookup("HARVEST_PAGES") {
            self.pages = parse_pages(&pages)?;
        }
        if let Some(dir) = lookup("HARVEST_STORE_DIR") {
            self.store_dir = Some(PathBuf::from(dir));
        }
        if let Some(value) = lookup("HARVEST_CONCURRENCY") {
            self.concurrency = parse_number("HARVEST_CONCURRENCY", &value)?;
        }
        if let Some(value) = lookup("HARVEST_BUDGET_SECS") {
            self.session_budget_secs = Some(parse_number("HARVEST_BUDGET_SECS", &value)?);
        }
        if let Some(value) = lookup("HARVEST_MAX_RECORDS") {
            self.max_records = parse_number("HARVEST_MAX_RECORDS", &value)?;
        }
        if let Some(value) = lookup("HARVEST_BOUNDARY") {
            self.boundary = Some(parse_boundary(&value)?);
        }
        if let Some(url) = lookup("HARVEST_DISPATCH_URL") {
            self.dispatch_url = Some(url);
        }
        if let Some(level) = lookup("HARVEST_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    /// Category (d) checks: fail before any session starts.
    pub fn validate(&self, needs_pages: bool) -> Result<(), ConfigError> {
        if self.targets.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::NoTargets);
        }
        if self.store_dir.is_none() {
            return Err(ConfigError::NoStore);
        }
        if needs_pages && self.pages.is_empty() {
            return Err(ConfigError::NoPages);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::NoConcurrency);
        }
        Ok(())
    }

    /// Reviews are shown newest-first, so a known review ends the session.
    pub fn review_settings(&self) -> ControllerSettings {
        self.controller_settings(self.boundary_for(&self.review_source, BoundaryPolicy::Trust))
    }

    /// Search results have no time order: stop at a known listing only when
    /// the source confirmed an ordering, otherwise skip it.
    pub fn listing_settings(&self) -> ControllerSettings {
        self.controller_settings(
            self.boundary_for(&self.listing_source, BoundaryPolicy::RequireOrdering),
        )
    }

    fn boundary_for(&self, source: &SourceConfig, fallback: BoundaryPolicy) -> BoundaryPolicy {
        self.boundary.or(source.boundary).unwrap_or(fallback)
    }

    fn controller_settings(&self, boundary: BoundaryPolicy) -> ControllerSettings {
        ControllerSettings {
            limits: HarvestLimits {
                stability_threshold: self.stability_threshold,
                max_records: self.max_records,
                boundary,
            },
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            expand_delay: Duration::from_millis(self.expand_delay_ms),
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            concurrency: self.concurrency,
            session_budget: self.session_budget_secs.map(Duration::from_secs),
        }
    }
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `1,3,5-7` into sorted, deduplicated page numbers.
pub fn parse_pages(raw: &str) -> Result<Vec<u32>, ConfigError> {
    let bad = || ConfigError::Value {
        name: "pages".to_string(),
        value: raw.to_string(),
    };
    let mut pages = Vec::new();
    for part in split_list(raw) {
        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start.trim().parse().map_err(|_| bad())?;
            let end: u32 = end.trim().parse().map_err(|_| bad())?;
            if start == 0 || start > end {
                return Err(bad());
            }
            pages.extend(start..=end);
        } else {
            let page: u32 = part.parse().map_err(|_| bad())?;
            if page == 0 {
                return Err(bad());
            }
            pages.push(page);
        }
    }
    pages.sort_unstable();
    pages.dedup();
    Ok(pages)
}

pub fn parse_boundary(raw: &str) -> Result<BoundaryPolicy, ConfigError> {
    match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "trust" => Ok(BoundaryPolicy::Trust),
        "require_ordering" => Ok(BoundaryPolicy::RequireOrdering),
        "ignore" => Ok(BoundaryPolicy::Ignore),
        _ => Err(ConfigError::Value {
            name: "boundary".to_string(),
            value: raw.to_string(),
        }),
    }
}

pub fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Value {
        name: name.to_string(),
        value: raw.to_string(),
    })
}
