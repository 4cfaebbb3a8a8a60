use thiserror::Error;

/// Application-wide error types for ssverify.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed or returned a non-success status.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The "last page" pagination reference has no `pageN.ext` suffix.
    #[error("Pagination format error: cannot read page count from '{reference}'")]
    PaginationFormat { reference: String },

    /// A raw item buffer had a length no listing schema accepts.
    #[error("Cannot build listing from {len} values (expected 6 or 8)")]
    RecordBuild { len: usize },

    /// A store write affected no rows or could not be completed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Local file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Returns true if this error came from fetching a page.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            AppError::HttpError(_) | AppError::Timeout(_) | AppError::NetworkError(_)
        )
    }
}
