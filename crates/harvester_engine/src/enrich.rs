use std::sync::Arc;

use engine_logging::{engine_debug, engine_warn};
use harvester_core::{clean_address, Listing};
use scraper::Html;

use crate::extract::{first_text, parse, ExtractError};
use crate::fetch::Fetcher;
use crate::geocode::Geocoder;
use crate::http_source::decode_body;

pub const DETAIL_URL_TEMPLATE: &str = "https://pcmap.place.naver.com/place/{place_id}";

const DETAIL_ADDRESS: &str = "span.LDgIH";
const DETAIL_THUMBNAIL: &str = "div.uDR4i div.CEX4u div.fNygA img.K0PDV";

/// Fields read from a listing's detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailFields {
    pub address: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Fills in address, thumbnail and coordinates for harvested listings.
///
/// Every step is best effort: a listing whose detail page or geocoding fails
/// keeps whatever it already had.
pub struct DetailEnricher {
    fetcher: Arc<dyn Fetcher>,
    geocoder: Option<Arc<dyn Geocoder>>,
    url_template: String,
}

impl DetailEnricher {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        geocoder: Option<Arc<dyn Geocoder>>,
        url_template: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            geocoder,
            url_template: url_template.into(),
        }
    }

    pub fn detail_url(&self, place_id: &str) -> String {
        self.url_template.replace("{place_id}", place_id)
    }

    pub async fn enrich_all(&self, listings: Vec<Listing>) -> Vec<Listing> {
        let mut enriched = Vec::with_capacity(listings.len());
        for mut listing in listings {
            self.enrich(&mut listing).await;
            enriched.push(listing);
        }
        enriched
    }

    pub async fn enrich(&self, listing: &mut Listing) {
        let url = self.detail_url(&listing.place_id);
        match self.fetcher.fetch(&url).await {
            Ok(output) => {
                let html = decode_body(&output);
                match parse_detail(&html) {
                    Ok(fields) => apply_detail(listing, fields),
                    Err(err) => engine_warn!("detail page of {} unreadable: {}", listing.place_id, err),
                }
            }
            Err(err) => engine_warn!("detail page of {} failed: {}", listing.place_id, err),
        }

        if listing.has_coordinates() {
            return;
        }
        let (Some(geocoder), Some(address)) = (&self.geocoder, listing.address.clone()) else {
            return;
        };
        match geocoder.locate(&address).await {
            Ok(Some(coordinates)) => {
                listing.latitude = Some(coordinates.latitude);
                listing.longitude = Some(coordinates.longitude);
            }
            Ok(None) => engine_debug!("{} has no coordinates", listing.place_id),
            Err(err) => engine_warn!("geocoding {} failed: {}", listing.place_id, err),
        }
    }
}

pub fn parse_detail(html: &str) -> Result<DetailFields, ExtractError> {
    let address_sel = parse(DETAIL_ADDRESS)?;
    let thumbnail_sel = parse(DETAIL_THUMBNAIL)?;
    let doc = Html::parse_document(html);
    let root = doc.root_element();
    Ok(DetailFields {
        address: first_text(root, &address_sel),
        thumbnail_url: root
            .select(&thumbnail_sel)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string),
    })
}

fn apply_detail(listing: &mut Listing, fields: DetailFields) {
    if let Some(raw) = fields.address {
        listing.address = Some(clean_address(&raw));
        listing.origin_address = Some(raw);
    }
    if let Some(src) = fields.thumbnail_url {
        listing.thumbnail_url = src;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_fields_are_read() {
        let html = r#"<html><body>
            <span class="LDgIH">서울 마포구 마포대로 92 효성해링턴스퀘어 1층</span>
            <div class="uDR4i"><div class="CEX4u"><div class="fNygA">
              <img class="K0PDV" src="https://img.example/a.jpg"></div></div></div>
        </body></html>"#;
        let fields = parse_detail(html).unwrap();
        assert_eq!(
            fields.address.as_deref(),
            Some("서울 마포구 마포대로 92 효성해링턴스퀘어 1층")
        );
        assert_eq!(fields.thumbnail_url.as_deref(), Some("https://img.example/a.jpg"));
    }

    #[test]
    fn applying_keeps_raw_and_cleaned_address() {
        let mut listing = Listing::new("q", "1", "n", "c");
        apply_detail(
            &mut listing,
            DetailFields {
                address: Some("서울 마포구 마포대로 92 효성해링턴스퀘어 1층".into()),
                thumbnail_url: None,
            },
        );
        assert_eq!(
            listing.origin_address.as_deref(),
            Some("서울 마포구 마포대로 92 효성해링턴스퀘어 1층")
        );
        assert_eq!(listing.address.as_deref(), Some("서울 마포구 마포대로 92"));
        assert!(listing.thumbnail_url.is_empty());
    }
}
