use std::sync::Arc;

use async_trait::async_trait;
use engine_logging::engine_debug;
use serde::Deserialize;
use thiserror::Error;

use crate::fetch::Fetcher;
use crate::FetchError;

pub const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("invalid geocoding url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unexpected geocoding response: {0}")]
    Response(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the service knows no place for the address.
    async fn locate(&self, address: &str) -> Result<Option<Coordinates>, GeocodeError>;
}

/// Free-form search against a Nominatim instance, first hit only.
pub struct NominatimGeocoder {
    fetcher: Arc<dyn Fetcher>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn new(fetcher: Arc<dyn Fetcher>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
        }
    }

    fn search_url(&self, address: &str) -> Result<String, GeocodeError> {
        let mut url = url::Url::parse(&format!("{}/search", self.base_url.trim_end_matches('/')))?;
        url.query_pairs_mut()
            .append_pair("q", address)
            .append_pair("format", "json")
            .append_pair("limit", "1");
        Ok(url.into())
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn locate(&self, address: &str) -> Result<Option<Coordinates>, GeocodeError> {
        if address.trim().is_empty() {
            return Ok(None);
        }
        let url = self.search_url(address)?;
        let output = self.fetcher.fetch(&url).await?;
        let places: Vec<NominatimPlace> = serde_json::from_slice(&output.bytes)
            .map_err(|err| GeocodeError::Response(err.to_string()))?;
        let Some(place) = places.into_iter().next() else {
            engine_debug!("no geocoding match for {}", address);
            return Ok(None);
        };
        let latitude = place
            .lat
            .parse()
            .map_err(|_| GeocodeError::Response(format!("bad latitude {}", place.lat)))?;
        let longitude = place
            .lon
            .parse()
            .map_err(|_| GeocodeError::Response(format!("bad longitude {}", place.lon)))?;
        Ok(Some(Coordinates {
            latitude,
            longitude,
        }))
    }
}
