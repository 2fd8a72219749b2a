use std::fmt;

/// Snapshot of one visible item of a source, as outer HTML.
///
/// `handle` identifies the item inside the live view for as long as the view
/// exists; it carries no meaning across sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub handle: String,
    pub html: String,
}

impl RawItem {
    pub fn new(handle: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            html: html.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    /// A "load more" action was taken.
    Revealed,
    /// Nothing to click; the source scrolled or waited passively instead.
    NoAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Navigation to the target failed.
    Unreachable,
    /// The page loaded but the content container never appeared.
    ContainerMissing,
    /// Adapter settings are unusable (bad URL template, bad selector).
    InvalidConfig,
    Timeout,
    Network,
    HttpStatus(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    pub kind: SourceErrorKind,
    pub message: String,
}

impl SourceError {
    pub fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Fatal errors end the session; the rest count as a no-progress pass.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            SourceErrorKind::Unreachable
                | SourceErrorKind::ContainerMissing
                | SourceErrorKind::InvalidConfig
        )
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for SourceError {}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceErrorKind::Unreachable => write!(f, "unreachable"),
            SourceErrorKind::ContainerMissing => write!(f, "content container missing"),
            SourceErrorKind::InvalidConfig => write!(f, "invalid source configuration"),
            SourceErrorKind::Timeout => write!(f, "timeout"),
            SourceErrorKind::Network => write!(f, "network error"),
            SourceErrorKind::HttpStatus(code) => write!(f, "http status {code}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    InvalidHeader,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::InvalidHeader => write!(f, "invalid header value"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

impl From<FetchError> for SourceError {
    fn from(err: FetchError) -> Self {
        let kind = match err.kind {
            FailureKind::InvalidUrl | FailureKind::InvalidHeader => SourceErrorKind::InvalidConfig,
            FailureKind::HttpStatus(code) => SourceErrorKind::HttpStatus(code),
            FailureKind::Timeout => SourceErrorKind::Timeout,
            FailureKind::RedirectLimitExceeded
            | FailureKind::TooLarge { .. }
            | FailureKind::UnsupportedContentType { .. } => SourceErrorKind::Unreachable,
            FailureKind::Network => SourceErrorKind::Network,
        };
        SourceError::new(kind, err.message)
    }
}
