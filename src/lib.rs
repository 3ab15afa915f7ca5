//! # Tilestore - SQLite tile cache blob store
//!
//! Persists rendered map tiles and small per-layer metadata, one SQLite
//! database file per layer.
//!
//! Tilestore provides:
//! - Lazy per-layer store creation with a fixed `tiles` / `meta` schema
//! - A connection registry that reuses one handle per layer and recovers broken ones
//! - Tile CRUD, grid set bulk delete, layer delete and rename
//! - Synchronous, best-effort store/delete notifications to registered listeners

pub mod tile;
pub mod storage;
pub mod listener;
pub mod blobstore;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use tile::{TileCoordinate, TileKey, TileRange, TileRecord};
pub use listener::BlobStoreListener;
pub use blobstore::{BlobStore, SqliteBlobStore};
pub use config::{MetadataReadPolicy, TileStoreConfig};

/// Result type alias for Tilestore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Tilestore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("SQLite engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Invalid storage root {path}: {reason}")]
    InvalidRoot {
        path: std::path::PathBuf,
        reason: String,
    },

    #[error("IO error on layer '{layer}' during {operation}: {source}")]
    Io {
        layer: String,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema error on layer '{layer}': {reason}")]
    Schema { layer: String, reason: String },

    #[error("Query error on layer '{layer}' during {operation}: {source}")]
    Query {
        layer: String,
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("Cannot rename layer '{from}' to '{to}': a store already exists for '{to}'")]
    TargetExists { from: String, to: String },

    #[error("Invalid tile key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io(layer: &str, operation: &'static str, source: std::io::Error) -> Self {
        Error::Io {
            layer: layer.to_string(),
            operation,
            source,
        }
    }

    pub(crate) fn query(layer: &str, operation: &'static str, source: rusqlite::Error) -> Self {
        Error::Query {
            layer: layer.to_string(),
            operation,
            source,
        }
    }

    /// A store file that cannot be created or opened is an I/O failure;
    /// anything else the engine reports stays a query error.
    pub(crate) fn open(layer: &str, operation: &'static str, source: rusqlite::Error) -> Self {
        if source.sqlite_error_code() == Some(rusqlite::ErrorCode::CannotOpen) {
            Error::io(layer, operation, std::io::Error::other(source))
        } else {
            Error::query(layer, operation, source)
        }
    }

    /// Whether this error reports an explicitly unsupported capability
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Error::NotImplemented(_))
    }
}
