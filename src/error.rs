use crate::types::NoMatch;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GrabError>;

/// A timestamp string matched neither the relative nor the absolute grammar,
/// or used a unit coarser than the site ever emits.
///
/// Recovered per-candidate inside the selector (the row is dropped);
/// surfaced directly when the time parser is invoked standalone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed timestamp: {0:?}")]
pub struct MalformedTimestamp(pub String);

#[derive(Debug, Error)]
pub enum GrabError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("http status {status} for {url}")]
    Http { status: u16, url: String },

    #[error(transparent)]
    Fetch(#[from] reqwest::Error),

    /// The URL did not land on a chapter page after redirects.
    #[error("{url} is not a chapter page")]
    NotAChapterPage { url: String },

    /// The URL did not land on a series page; the series may not exist.
    #[error("series may not exist at {url}")]
    SeriesNotFound { url: String },

    /// A page was fetched but did not have the expected shape. Site may have
    /// changed; an update may be required.
    #[error("unexpected page structure: {0}")]
    PageStructure(&'static str),

    /// Selection over a series listing came back empty. Carries the typed
    /// reason so callers can tell "rejected" apart from "nothing there".
    #[error("no chapter found: {0}")]
    NoChapterFound(NoMatch),
}
