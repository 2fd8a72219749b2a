//! Harvester engine: source adapters, extraction, session driving and storage.
mod controller;
mod dispatch;
mod enrich;
mod extract;
mod fetch;
mod geocode;
mod http_source;
mod orchestrator;
mod source;
mod store;
mod types;

pub use controller::{ControllerSettings, HarvestController, HarvestResult};
pub use dispatch::{emit_work_items, DispatchError, DispatchReport, HttpDispatcher, WorkDispatcher, WorkItem};
pub use enrich::{parse_detail, DetailEnricher, DetailFields, DETAIL_URL_TEMPLATE};
pub use extract::{place_id_from_href, ExtractError, Extractor, ListingExtractor, ReviewExtractor};
pub use fetch::{FetchOutput, FetchSettings, Fetcher, ReqwestFetcher};
pub use geocode::{Coordinates, GeocodeError, Geocoder, NominatimGeocoder, NOMINATIM_BASE_URL};
pub use http_source::{HttpPagedSource, PagedSourceSettings};
pub use orchestrator::{
    merge_results, session_report, MergeOutcome, OrchestratorSettings, RunReport, SessionError,
    SessionOrchestrator, SessionOutcome, SessionReport,
};
pub use source::{SourceAdapter, SourceFactory};
pub use store::{
    ensure_store_dir, group_by_key, storage_file_name, CursorStore, JsonFileStore, PersistReceipt,
    Sink, StoreError, ID_FIELD,
};
pub use types::{FailureKind, FetchError, RawItem, RevealOutcome, SourceError, SourceErrorKind};
