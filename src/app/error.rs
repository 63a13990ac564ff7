use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChanError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid filter pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error, status code: {0}")]
    ServerError(u16),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0} is not ready yet, await its initialization first")]
    NotReady(&'static str),

    #[error("{0} failed to initialize: {1}")]
    InitFailed(&'static str, String),

    #[error("Inconsistency detected: {0}")]
    Consistency(String),

    #[error("Couldn't find archive id for archive with domain: {0}")]
    UnknownArchiveDomain(String),

    #[error("Site not found: {0}")]
    SiteNotFound(String),

    #[error("Board not found: {0}")]
    BoardNotFound(String),

    #[error("Bookmark not found: {0}")]
    BookmarkNotFound(String),

    #[error("{0} is not supported by {1}")]
    NotSupported(&'static str, String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ChanError>;
