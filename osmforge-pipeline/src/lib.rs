//! Import and update drivers tying the cache, geometry, and store
//! together.
//!
//! Full import ([`run_import`]) and incremental update ([`run_update`])
//! share one [`Deriver`], so both paths reach identical rows for the same
//! cache state.

mod config;
mod error;
mod import;
pub mod stream;
mod update;
mod writer;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use import::{run_import, ImportSummary};
pub use update::{run_update, Change, ChangeAction, UpdateSummary};
pub use writer::Deriver;
