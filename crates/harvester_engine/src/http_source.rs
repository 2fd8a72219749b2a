use std::sync::Arc;

use async_trait::async_trait;
use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use engine_logging::{engine_debug, engine_info};
use harvester_core::{SortOrder, Target};
use scraper::{Html, Selector};

use crate::fetch::{FetchOutput, Fetcher};
use crate::source::SourceAdapter;
use crate::{RawItem, RevealOutcome, SourceError, SourceErrorKind};

/// Where and how an [`HttpPagedSource`] finds its items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedSourceSettings {
    /// URL with `{target}` and `{page}` placeholders.
    pub url_template: String,
    pub container_selector: String,
    /// Matched inside the container.
    pub item_selector: String,
    /// Attribute holding a stable item id; positional handles otherwise.
    pub handle_attribute: Option<String>,
    /// Query parameter that switches the listing to newest-first.
    pub newest_first_param: Option<(String, String)>,
    /// Whether `reveal_more` may load the following page.
    pub paginate: bool,
}

/// Source adapter over server-rendered pages: "reveal more" loads the next
/// page and appends its items to the live view.
pub struct HttpPagedSource {
    fetcher: Arc<dyn Fetcher>,
    settings: PagedSourceSettings,
    target: Target,
    newest_first: bool,
    loaded_page: u32,
    exhausted: bool,
    live: Vec<RawItem>,
}

impl HttpPagedSource {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: PagedSourceSettings, target: Target) -> Self {
        let loaded_page = target.page_or_first();
        Self {
            fetcher,
            settings,
            target,
            newest_first: false,
            loaded_page,
            exhausted: false,
            live: Vec::new(),
        }
    }

    pub fn page_url(&self, page: u32) -> Result<String, SourceError> {
        let target = encode_component(&self.target.key);
        let raw = self
            .settings
            .url_template
            .replace("{target}", &target)
            .replace("{page}", &page.to_string());
        let mut url = url::Url::parse(&raw)
            .map_err(|err| SourceError::new(SourceErrorKind::InvalidConfig, err.to_string()))?;
        if self.newest_first {
            if let Some((name, value)) = &self.settings.newest_first_param {
                url.query_pairs_mut().append_pair(name, value);
            }
        }
        Ok(url.to_string())
    }

    /// Fetch one page; `Ok(None)` when the container is absent.
    async fn load_page(&self, page: u32) -> Result<Option<Vec<RawItem>>, SourceError> {
        let url = self.page_url(page)?;
        engine_debug!("loading {} page {} from {}", self.target, page, url);
        let output = self.fetcher.fetch(&url).await?;
        let html = decode_body(&output);
        parse_items(&html, &self.settings, page)
    }
}

#[async_trait]
impl SourceAdapter for HttpPagedSource {
    async fn open(&mut self) -> Result<(), SourceError> {
        let page = self.target.page_or_first();
        match self.load_page(page).await {
            Ok(Some(items)) => {
                engine_info!("opened {} with {} items", self.target, items.len());
                self.live = items;
                self.loaded_page = page;
                Ok(())
            }
            Ok(None) => Err(SourceError::new(
                SourceErrorKind::ContainerMissing,
                format!("{} not found", self.settings.container_selector),
            )),
            Err(err) if err.kind == SourceErrorKind::InvalidConfig => Err(err),
            Err(err) => Err(SourceError::new(SourceErrorKind::Unreachable, err.to_string())),
        }
    }

    async fn current_items(&mut self) -> Result<Vec<RawItem>, SourceError> {
        Ok(self.live.clone())
    }

    async fn reveal_more(&mut self) -> Result<RevealOutcome, SourceError> {
        if self.exhausted || !self.settings.paginate {
            return Ok(RevealOutcome::NoAction);
        }
        let next = self.loaded_page + 1;
        let items = match self.load_page(next).await {
            Ok(Some(items)) => items,
            Ok(None) => Vec::new(),
            Err(err) if err.kind == SourceErrorKind::HttpStatus(404) => Vec::new(),
            Err(err) => return Err(err),
        };
        if items.is_empty() {
            engine_debug!("{} has no page {}", self.target, next);
            self.exhausted = true;
            return Ok(RevealOutcome::NoAction);
        }
        self.loaded_page = next;
        self.live.extend(items);
        Ok(RevealOutcome::Revealed)
    }

    async fn apply_ordering(&mut self, order: SortOrder) -> Result<bool, SourceError> {
        match order {
            SortOrder::NewestFirst => {
                if self.settings.newest_first_param.is_none() {
                    return Ok(false);
                }
                self.newest_first = true;
                let page = self.target.page_or_first();
                match self.load_page(page).await {
                    Ok(Some(items)) => {
                        self.live = items;
                        self.loaded_page = page;
                        self.exhausted = false;
                        Ok(true)
                    }
                    Ok(None) => {
                        self.newest_first = false;
                        Ok(false)
                    }
                    Err(err) => {
                        self.newest_first = false;
                        Err(err)
                    }
                }
            }
        }
    }

    async fn remove_item(&mut self, item: &RawItem) -> Result<bool, SourceError> {
        self.live.retain(|live| live.handle != item.handle);
        Ok(true)
    }
}

fn encode_component(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn parse_items(
    html: &str,
    settings: &PagedSourceSettings,
    page: u32,
) -> Result<Option<Vec<RawItem>>, SourceError> {
    let container_sel = parse_selector(&settings.container_selector)?;
    let item_sel = parse_selector(&settings.item_selector)?;
    let doc = Html::parse_document(html);
    let Some(container) = doc.select(&container_sel).next() else {
        return Ok(None);
    };

    let items = container
        .select(&item_sel)
        .enumerate()
        .map(|(index, element)| {
            let handle = settings
                .handle_attribute
                .as_deref()
                .and_then(|attr| element.value().attr(attr))
                .map(str::to_string)
                .unwrap_or_else(|| format!("p{page}-{index}"));
            RawItem::new(handle, element.html())
        })
        .collect();
    Ok(Some(items))
}

fn parse_selector(raw: &str) -> Result<Selector, SourceError> {
    Selector::parse(raw).map_err(|err| {
        SourceError::new(
            SourceErrorKind::InvalidConfig,
            format!("selector {raw:?}: {err}"),
        )
    })
}

/// Decode a response body: BOM, then the Content-Type charset, then a
/// chardetng guess. Malformed sequences are replaced rather than rejected.
pub(crate) fn decode_body(output: &FetchOutput) -> String {
    let bytes = output.bytes.as_slice();
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| {
            output
                .content_type
                .as_deref()
                .and_then(charset_label)
                .and_then(|label| Encoding::for_label(label.as_bytes()))
        })
        .unwrap_or_else(|| {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            detector.guess(None, true)
        });
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        engine_debug!("body of {} had invalid {} sequences", output.final_url, encoding.name());
    }
    text.into_owned()
}

fn charset_label(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(['"', '\'']).to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PagedSourceSettings {
        PagedSourceSettings {
            url_template: "https://example.com/{target}/reviews?page={page}".to_string(),
            container_selector: "ul#list".to_string(),
            item_selector: "li.item".to_string(),
            handle_attribute: Some("data-id".to_string()),
            newest_first_param: None,
            paginate: true,
        }
    }

    #[test]
    fn items_use_attribute_handles_when_present() {
        let html = r#"<ul id="list"><li class="item" data-id="a">A</li><li class="item">B</li></ul>"#;
        let items = parse_items(html, &settings(), 3).unwrap().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].handle, "a");
        assert_eq!(items[1].handle, "p3-1");
        assert!(items[1].html.contains("B"));
    }

    #[test]
    fn missing_container_is_none() {
        let html = "<div>nothing</div>";
        assert_eq!(parse_items(html, &settings(), 1).unwrap(), None);
    }

    #[test]
    fn bad_selector_is_config_error() {
        let mut bad = settings();
        bad.item_selector = "li[".to_string();
        let err = parse_items("<ul id=\"list\"></ul>", &bad, 1).unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::InvalidConfig);
        assert!(err.is_fatal());
    }

    #[test]
    fn charset_is_read_case_insensitively() {
        assert_eq!(
            charset_label("text/html; Charset=\"EUC-KR\""),
            Some("EUC-KR".to_string())
        );
        assert_eq!(charset_label("text/html"), None);
    }

    #[test]
    fn euc_kr_body_is_decoded() {
        let (bytes, _, _) = encoding_rs::EUC_KR.encode("리뷰");
        let output = FetchOutput {
            final_url: "https://example.com".to_string(),
            content_type: Some("text/html; charset=euc-kr".to_string()),
            bytes: bytes.into_owned(),
        };
        assert_eq!(decode_body(&output), "리뷰");
    }

    #[test]
    fn target_is_percent_encoded() {
        assert_eq!(encode_component("공덕역 식당"), "%EA%B3%B5%EB%8D%95%EC%97%AD%20%EC%8B%9D%EB%8B%B9");
    }
}
