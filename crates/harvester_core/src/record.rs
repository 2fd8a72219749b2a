use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::fingerprint::{fingerprint, Fingerprint};

/// Sentinel author for reviews that do not show one.
pub const ANONYMOUS_AUTHOR: &str = "익명";
/// Sentinel name for listings that do not show one.
pub const UNNAMED_LISTING: &str = "이름 없음";

/// A harvested unit whose identity is derived from its semantic fields.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Whether [`Record::business_key`] can return a key for this kind.
    const HAS_BUSINESS_KEY: bool = false;

    /// Storage key of the target this record belongs to.
    fn target_key(&self) -> &str;

    fn fingerprint(&self) -> Fingerprint;

    /// Coarse business identity used for cross-target dedup, if the kind has one.
    fn business_key(&self) -> Option<&str> {
        None
    }
}

/// A visitor review of one place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: Fingerprint,
    pub place_id: String,
    pub author: String,
    pub content: String,
    pub visit_date: String,
}

impl Review {
    pub fn new(
        place_id: impl Into<String>,
        author: impl Into<String>,
        content: impl Into<String>,
        visit_date: impl Into<String>,
    ) -> Self {
        let author = author.into();
        let content = content.into();
        let visit_date = visit_date.into();
        let id = fingerprint(&[&author, &content, &visit_date]);
        Self {
            id,
            place_id: place_id.into(),
            author,
            content,
            visit_date,
        }
    }
}

impl Record for Review {
    fn target_key(&self) -> &str {
        &self.place_id
    }

    fn fingerprint(&self) -> Fingerprint {
        self.id
    }
}

/// A restaurant surfaced by a search-result page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Fingerprint,
    pub query: String,
    pub place_id: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub origin_address: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Listing {
    pub fn new(
        query: impl Into<String>,
        place_id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        let place_id = place_id.into();
        let name = name.into();
        let category = category.into();
        let id = fingerprint(&[&place_id, &name, &category]);
        Self {
            id,
            query: query.into(),
            place_id,
            name,
            category,
            thumbnail_url: String::new(),
            page: None,
            origin_address: None,
            address: None,
            latitude: None,
            longitude: None,
        }
    }

    pub fn on_page(mut self, page: Option<u32>) -> Self {
        self.page = page;
        self
    }

    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

impl Record for Listing {
    const HAS_BUSINESS_KEY: bool = true;

    fn target_key(&self) -> &str {
        &self.query
    }

    fn fingerprint(&self) -> Fingerprint {
        self.id
    }

    fn business_key(&self) -> Option<&str> {
        Some(&self.place_id)
    }
}
