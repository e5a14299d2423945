use thiserror::Error;

/// Application-wide error types for Iris.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed (fetching a page).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Field extraction from a fetched document failed.
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// Extraction schema could not be loaded or is malformed.
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Writing a batch to the persistence sink failed.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The bounded fan-out itself malfunctioned.
    #[error("Dispatch error: {0}")]
    Dispatch(String),
}
