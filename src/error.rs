//! Error taxonomy for an analysis run.
//!
//! Only [`ValidationError`] ever ends a run early. The other kinds are
//! recovered where they occur: a crawl unit yields fewer articles, a row is
//! skipped, a model call turns into visible failure text.

use thiserror::Error;

/// Bad request parameters. Fatal to the request, raised before any I/O.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("keyword must not be empty")]
    EmptyKeyword,

    #[error("{field} must be at least 1 (got {value})")]
    NotPositive { field: &'static str, value: u32 },

    #[error("recent trend window ({recent} days) must be shorter than the total search window ({total} days)")]
    WindowOrder { recent: u32, total: u32 },
}

/// One `(keyword, date, page)` crawl unit failed.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search page returned HTTP {status}")]
    Status { status: u16 },

    #[error("could not build search URL: {0}")]
    Url(#[from] url::ParseError),
}

/// A single store operation failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("could not prepare database location {path}: {source}")]
    Location {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stored date {value:?} is not an ISO date")]
    BadDate { value: String },
}

/// Failure of a call to the remote language-model service.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    #[error("API key is missing")]
    MissingCredential,

    #[error("transport failure{}: {detail}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    TransportFailure { status: Option<u16>, detail: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("response does not match the requested schema: {0}")]
    SchemaMismatch(String),

    #[error("AI call failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<GatewayError>,
    },
}

impl GatewayError {
    /// A missing key cannot heal between attempts.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GatewayError::MissingCredential)
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::TransportFailure {
            status: e.status().map(|s| s.as_u16()),
            detail: e.to_string(),
        }
    }
}
