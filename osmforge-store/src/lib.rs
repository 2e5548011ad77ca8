//! SQLite feature store and deployment rotation.
//!
//! Derived feature rows land in *import*-slot tables, are promoted to
//! production by [`FeatureStore::deploy`], and can be rolled back while a
//! backup generation exists. Geometry is persisted as WKT text; whatever
//! spatial backend consumes the tables interprets it.

mod deploy;
mod error;
mod row;
mod store;

pub use error::{DeployError, StoreError};
pub use row::{FeatureRow, StoredFeature};
pub use store::{FeatureStore, Slot};
