//! Core domain types for the osmforge import pipeline.
//!
//! This crate defines the OSM element model shared by the cache, the
//! geometry assembler, and the import/update drivers, together with the
//! declarative tag mapping and the feature-identity encoding. Everything
//! here is pure data and pure functions; persistence lives in
//! `osmforge-cache` and `osmforge-store`.

#![forbid(unsafe_code)]

mod element;
mod ids;
pub mod mapping;
mod plan;
mod resolved;

pub use element::{
    tags_from, Element, ElementId, ElementKind, Member, Metadata, Node, Relation, Tags, Way,
};
pub use ids::{IdScheme, RELATION_ID_OFFSET};
pub use plan::{way_decision, InsertDecision};
pub use resolved::{ResolvedMember, ResolvedWay};
