//! Cache error types.
//!
//! A missing element is not an error: lookups return `Ok(None)`. The
//! variants here are structural failures — the database cannot be opened,
//! a payload cannot be decoded.

use camino::Utf8PathBuf;
use osmforge_core::{ElementId, ElementKind};
use thiserror::Error;

/// Errors raised by the element cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Creating the cache working directory failed.
    #[error("failed to create cache directory {path}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Removing a stale cache database failed.
    #[error("failed to discard previous cache at {path}")]
    Discard {
        /// Database path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Opening the SQLite database failed.
    #[error("failed to open element cache at {path}")]
    Open {
        /// Database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Creating the cache schema failed.
    #[error("failed to create element cache schema")]
    Schema {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Serializing an element payload failed.
    #[error("failed to encode {kind:?} {id} for the cache")]
    Encode {
        /// Element kind.
        kind: ElementKind,
        /// Element id.
        id: ElementId,
        /// Source error produced by `bincode`.
        #[source]
        source: bincode::Error,
    },
    /// A stored payload could not be decoded; the cache is corrupt or from
    /// an incompatible version.
    #[error("failed to decode cached {kind:?} {id}")]
    Decode {
        /// Element kind.
        kind: ElementKind,
        /// Element id.
        id: ElementId,
        /// Source error produced by `bincode`.
        #[source]
        source: bincode::Error,
    },
    /// Generic SQLite failure while reading or writing cache rows.
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}
