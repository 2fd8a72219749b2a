use std::fmt;

/// The external object one harvest session is scoped to.
///
/// `key` doubles as the storage key: reviews are stored per place id,
/// listings per search query. `page` is set when the target is one page of a
/// paginated search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    pub key: String,
    pub page: Option<u32>,
}

impl Target {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            page: None,
        }
    }

    pub fn with_page(key: impl Into<String>, page: u32) -> Self {
        Self {
            key: key.into(),
            page: Some(page),
        }
    }

    /// Page to start from; targets without a page start at 1.
    pub fn page_or_first(&self) -> u32 {
        self.page.unwrap_or(1)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page {
            Some(page) => write!(f, "{}#{}", self.key, page),
            None => f.write_str(&self.key),
        }
    }
}
