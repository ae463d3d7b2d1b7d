//! Error types for the Tessera catalog.
//!
//! Errors are organized by operation so callers can tell the user-facing
//! outcomes (duplicate upload, malformed query) apart from opaque failures.

use thiserror::Error;

use crate::types::EntryId;

/// Top-level error type for Tessera operations.
#[derive(Error, Debug)]
pub enum TesseraError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Ingestion errors
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Catalog store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Search request errors
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Ingestion errors, one variant per failing stage.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Upload refused before any work was done (mimetype, size, magic bytes)
    #[error("Upload rejected: {reason}")]
    Rejected { reason: String },

    /// Reading the upload while digesting failed
    #[error("Failed to hash upload: {0}")]
    HashFailure(#[source] std::io::Error),

    /// Byte-identical content is already catalogued
    #[error("Duplicate content: already stored as entry {existing_id}")]
    DuplicateContent { existing_id: EntryId },

    /// The upload could not be decoded as an image
    #[error("Decode failed: {message}")]
    DecodeFailure { message: String },

    /// The thumbnail could not be rendered or encoded
    #[error("Thumbnail rendering failed: {message}")]
    RenderFailure { message: String },

    /// The store rejected the new entry
    #[error("Persist failed: {message}")]
    PersistFailure { message: String },

    /// Temp or permanent file placement failed
    #[error("Storage error during {stage}: {source}")]
    Storage {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl IngestError {
    /// Whether the caller should show this error verbatim to the uploader.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            IngestError::DuplicateContent { .. } | IngestError::Rejected { .. }
        )
    }
}

/// Catalog store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No entry with the given id
    #[error("Entry not found: {0}")]
    NotFound(EntryId),

    /// Insert lost the race on the content digest uniqueness constraint
    #[error("An entry with digest {digest} already exists")]
    UniqueViolation { digest: String },

    /// A caller-supplied value cannot be stored (empty flag set, blank tag)
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A stored row failed validation while mapping to a typed entry
    #[error("Corrupt row for entry {id}: {message}")]
    CorruptRow { id: i64, message: String },

    /// Catalog files could not be created
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Search request errors.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The search options are invalid; rejected before touching the store
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    /// The store failed while executing a valid query
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience type alias for Tessera results.
pub type Result<T> = std::result::Result<T, TesseraError>;

/// Convenience type alias for store results.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
