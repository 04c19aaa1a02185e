use thiserror::Error;

#[derive(Error, Debug)]
pub enum CovsyncError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] Box<ureq::Error>),

    #[error("Artifact archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Missing credentials or CI metadata for a provider. The pipeline treats
    /// this as a no-op rather than a failure.
    #[error("Source configuration error: {0}")]
    SourceConfig(String),

    #[error("Artifact download failed: {0}")]
    Download(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(String),
}

impl From<ureq::Error> for CovsyncError {
    fn from(value: ureq::Error) -> Self {
        CovsyncError::Http(Box::new(value))
    }
}

pub type Result<T> = std::result::Result<T, CovsyncError>;
