use elasticsearch::http::transport::BuildError;
use mongodb::error::ErrorKind;
use thiserror::Error;

/// Document store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Mongo(e) => matches!(
                *e.kind,
                ErrorKind::Io(_)
                    | ErrorKind::ServerSelection { .. }
                    | ErrorKind::ConnectionPoolCleared { .. }
            ),
            StoreError::InvalidDocument(_) => false,
            StoreError::Unavailable(_) => true,
        }
    }
}

/// Search index failures.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid Elasticsearch URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to build transport: {0}")]
    TransportBuild(#[from] BuildError),
    #[error("transport error: {0}")]
    Transport(#[from] elasticsearch::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("elasticsearch responded {status}: {body}")]
    Status { status: u16, body: String },
}

impl IndexError {
    pub fn is_transient(&self) -> bool {
        match self {
            IndexError::Transport(_) => true,
            IndexError::Status { status, .. } => *status == 429 || *status >= 500,
            IndexError::InvalidUrl(_) | IndexError::TransportBuild(_) | IndexError::Serde(_) => {
                false
            }
        }
    }
}

/// Error surfaced by topology setup and handlers.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("document store: {0}")]
    Store(#[from] StoreError),
    #[error("search index: {0}")]
    Index(#[from] IndexError),
    #[error("broker: {0}")]
    Broker(#[from] lapin::Error),
}

impl SyncError {
    /// Whether retrying the same operation could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Store(e) => e.is_transient(),
            SyncError::Index(e) => e.is_transient(),
            SyncError::Broker(_) => true,
        }
    }
}
