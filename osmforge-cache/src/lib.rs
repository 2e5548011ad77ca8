//! Disk-backed element cache with reverse-dependency indices.
//!
//! The cache is the pipeline's working set: every node, way, and relation
//! from the source stream lands here before any feature row is derived,
//! and incremental updates mutate it element by element. Two reverse
//! indices — node→ways and way→relations — drive the dependency closure
//! that decides which rows an update must re-derive.
//!
//! Backed by one SQLite database per working directory. The handle is a
//! single-writer connection; derivation workers read through their own
//! handles once population has finished.

#![forbid(unsafe_code)]

mod error;
mod query;
mod store;

pub use error::CacheError;
pub use query::{
    run_query, Expansion, NodeReport, QueryReport, QueryRequest, RelationReport, WayReport,
};
pub use store::ElementCache;
