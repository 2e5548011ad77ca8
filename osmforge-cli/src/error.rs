//! Error types emitted by the CLI.

use camino::Utf8PathBuf;
use thiserror::Error;

use osmforge_cache::CacheError;
use osmforge_core::mapping::MappingError;
use osmforge_pipeline::PipelineError;
use osmforge_store::{DeployError, StoreError};

/// Errors emitted by the `osmforge` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// The command needs a mapping document and none was given.
    #[error("missing mapping document (set --mapping)")]
    MissingMapping,
    /// An input file could not be read.
    #[error("failed to read {path}")]
    ReadInput {
        /// File the command tried to read.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The mapping document failed to parse or validate.
    #[error(transparent)]
    Mapping(#[from] MappingError),
    /// The element cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// The feature store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A deployment rotation failed.
    #[error(transparent)]
    Deploy(#[from] DeployError),
    /// The import or update pipeline failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// A report could not be rendered as JSON.
    #[error("failed to render report")]
    Render(#[from] serde_json::Error),
}
