//! Error types for the feature store and deployment coordinator.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::Slot;

/// Failures raised by [`crate::FeatureStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store directory could not be created.
    #[error("failed to create store directory {path}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The SQLite database could not be opened.
    #[error("failed to open feature database at {path}")]
    Open {
        /// Database file path.
        path: Utf8PathBuf,
        /// Underlying SQLite failure.
        #[source]
        source: rusqlite::Error,
    },
    /// Creating a table from the mapping failed.
    #[error("failed to create table {table}")]
    Schema {
        /// Table being created.
        table: String,
        /// Underlying SQLite failure.
        #[source]
        source: rusqlite::Error,
    },
    /// A feature's tag snapshot could not be serialized.
    #[error("failed to encode tags for feature {id}")]
    EncodeTags {
        /// Encoded element id of the feature.
        id: i64,
        /// Underlying serializer failure.
        #[source]
        source: serde_json::Error,
    },
    /// A stored tag snapshot could not be parsed back.
    #[error("failed to decode stored tags for feature {id}")]
    DecodeTags {
        /// Encoded element id of the feature.
        id: i64,
        /// Underlying deserializer failure.
        #[source]
        source: serde_json::Error,
    },
    /// Any other SQLite failure.
    #[error("feature database operation failed")]
    Database(#[from] rusqlite::Error),
}

/// Failures raised by the deployment coordinator.
#[derive(Debug, Error)]
pub enum DeployError {
    /// A rotation's source slot is missing a required table. The rotation
    /// is refused before any rename, so the database is untouched.
    #[error("{slot} slot is missing table {table}")]
    MissingSlot {
        /// Slot the rotation reads from.
        slot: Slot,
        /// Table absent from that slot.
        table: String,
    },
    /// Any SQLite failure during the rotation transaction.
    #[error("deployment rotation failed")]
    Database(#[from] rusqlite::Error),
}
