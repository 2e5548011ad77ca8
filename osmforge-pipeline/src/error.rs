//! Pipeline-level error type.

use thiserror::Error;

use osmforge_cache::CacheError;
use osmforge_store::StoreError;

/// Failures raised while importing or updating.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The element cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// The feature store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A stream line could not be read.
    #[error("failed to read stream line {line}")]
    ReadLine {
        /// 1-based line number.
        line: usize,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// A stream line was not a valid element or change record. The whole
    /// batch is abandoned before any row is committed.
    #[error("malformed record on stream line {line}")]
    MalformedRecord {
        /// 1-based line number.
        line: usize,
        /// Underlying decode failure.
        #[source]
        source: serde_json::Error,
    },
    /// The configuration document could not be parsed.
    #[error("failed to decode configuration")]
    Config(#[from] serde_json::Error),
}
