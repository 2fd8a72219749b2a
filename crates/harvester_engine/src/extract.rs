use std::sync::OnceLock;

use harvester_core::{clean_address, Listing, Record, Review, Target, ANONYMOUS_AUTHOR, UNNAMED_LISTING};
use scraper::{ElementRef, Html, Selector};

use crate::RawItem;

const REVIEW_AUTHOR: &str = "span.pui__NMi-Dp";
const REVIEW_CONTENT: &str = "div.pui__vn15t2 > a";
const REVIEW_DATE: &str = "time";
const REVIEW_SHOW_MORE: &str = "a.pui__wFzIYl[data-pui-click-code='rvshowmore']";

const LISTING_NAME: &str = "span.TYaxT";
const LISTING_CATEGORY: &str = "span.KCMnt";
const LISTING_LINK: &str = "a.place_bluelink";
const LISTING_ADDRESS: &str = "span.LDgIH";
const LISTING_THUMBNAIL: &str = "div.uDR4i div.CEX4u div.fNygA img.K0PDV";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("invalid selector {0}")]
    Selector(String),
    #[error("item carries none of the expected fields")]
    Empty,
    #[error("missing required field {0}")]
    MissingField(&'static str),
}

/// Turns one raw item into a record.
///
/// Extraction is pure: it only reads the snapshot it is given, so calling it
/// twice on the same snapshot yields the same record.
pub trait Extractor: Send + Sync + 'static {
    type Output: Record;

    /// Selector of an in-item control that reveals truncated content.
    fn expand_control(&self) -> Option<&str> {
        None
    }

    fn extract(&self, item: &RawItem, target: &Target) -> Result<Self::Output, ExtractError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReviewExtractor;

impl Extractor for ReviewExtractor {
    type Output = Review;

    fn expand_control(&self) -> Option<&str> {
        Some(REVIEW_SHOW_MORE)
    }

    fn extract(&self, item: &RawItem, target: &Target) -> Result<Review, ExtractError> {
        let sel = review_selectors()?;
        let fragment = Html::parse_fragment(&item.html);
        let root = fragment.root_element();

        let author = first_text(root, &sel.author);
        let content = first_text(root, &sel.content);
        let visit_date = first_text(root, &sel.date);
        if author.is_none() && content.is_none() && visit_date.is_none() {
            return Err(ExtractError::Empty);
        }

        Ok(Review::new(
            target.key.clone(),
            author.unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string()),
            content.unwrap_or_default(),
            visit_date.unwrap_or_default(),
        ))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ListingExtractor;

impl Extractor for ListingExtractor {
    type Output = Listing;

    fn extract(&self, item: &RawItem, target: &Target) -> Result<Listing, ExtractError> {
        let sel = listing_selectors()?;
        let fragment = Html::parse_fragment(&item.html);
        let root = fragment.root_element();

        let place_id = root
            .select(&sel.link)
            .filter_map(|link| link.value().attr("href"))
            .find_map(place_id_from_href)
            .or_else(|| {
                root.select(&sel.any_with_id)
                    .next()
                    .and_then(|el| el.value().attr("data-id"))
                    .map(str::to_string)
            })
            .ok_or(ExtractError::MissingField("place_id"))?;

        let name = first_text(root, &sel.name).unwrap_or_else(|| UNNAMED_LISTING.to_string());
        let category = first_text(root, &sel.category).unwrap_or_default();
        let mut listing = Listing::new(target.key.clone(), place_id, name, category).on_page(target.page);

        if let Some(src) = root
            .select(&sel.thumbnail)
            .next()
            .and_then(|img| img.value().attr("src"))
        {
            listing.thumbnail_url = src.to_string();
        }
        if let Some(raw) = first_text(root, &sel.address) {
            listing.address = Some(clean_address(&raw));
            listing.origin_address = Some(raw);
        }
        Ok(listing)
    }
}

/// Numeric id following `/place/` in a result link.
pub fn place_id_from_href(href: &str) -> Option<String> {
    let (_, rest) = href.split_once("/place/")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

/// Trimmed text of the first match, `None` when absent or blank.
pub(crate) fn first_text(root: ElementRef<'_>, selector: &Selector) -> Option<String> {
    root.select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

pub(crate) fn parse(raw: &str) -> Result<Selector, ExtractError> {
    Selector::parse(raw).map_err(|err| ExtractError::Selector(format!("{raw}: {err}")))
}

struct ReviewSelectors {
    author: Selector,
    content: Selector,
    date: Selector,
}

struct ListingSelectors {
    name: Selector,
    category: Selector,
    link: Selector,
    any_with_id: Selector,
    address: Selector,
    thumbnail: Selector,
}

fn review_selectors() -> Result<&'static ReviewSelectors, ExtractError> {
    static CELL: OnceLock<Result<ReviewSelectors, ExtractError>> = OnceLock::new();
    CELL.get_or_init(|| {
        Ok(ReviewSelectors {
            author: parse(REVIEW_AUTHOR)?,
            content: parse(REVIEW_CONTENT)?,
            date: parse(REVIEW_DATE)?,
        })
    })
    .as_ref()
    .map_err(Clone::clone)
}

fn listing_selectors() -> Result<&'static ListingSelectors, ExtractError> {
    static CELL: OnceLock<Result<ListingSelectors, ExtractError>> = OnceLock::new();
    CELL.get_or_init(|| {
        Ok(ListingSelectors {
            name: parse(LISTING_NAME)?,
            category: parse(LISTING_CATEGORY)?,
            link: parse(LISTING_LINK)?,
            any_with_id: parse("[data-id]")?,
            address: parse(LISTING_ADDRESS)?,
            thumbnail: parse(LISTING_THUMBNAIL)?,
        })
    })
    .as_ref()
    .map_err(Clone::clone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn href_place_id() {
        assert_eq!(
            place_id_from_href("https://map.naver.com/p/entry/place/1234567?c=1"),
            Some("1234567".to_string())
        );
        assert_eq!(place_id_from_href("/place/abc"), None);
        assert_eq!(place_id_from_href("/restaurant/12"), None);
    }

    #[test]
    fn show_more_selector_parses() {
        assert!(parse(REVIEW_SHOW_MORE).is_ok());
        assert!(matches!(parse("div["), Err(ExtractError::Selector(_))));
    }
}
