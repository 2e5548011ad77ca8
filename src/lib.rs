//! Facade crate for the osmforge import pipeline.
//!
//! Re-exports the element model, caches, geometry assembly, feature
//! store, and the import/update drivers so applications can depend on a
//! single crate.

#![forbid(unsafe_code)]

pub use osmforge_core::{
    tags_from, way_decision, Element, ElementId, ElementKind, IdScheme, InsertDecision, Member,
    Metadata, Node, Relation, ResolvedMember, ResolvedWay, Tags, Way, RELATION_ID_OFFSET,
};

pub use osmforge_core::mapping::{Mapping, MappingError, TagMatcher};

pub use osmforge_cache::{run_query, CacheError, ElementCache, Expansion, QueryRequest};

pub use osmforge_geom::{
    assemble_relation, way_line, way_polygon, AssembledPolygon, Assembly, GeomError,
    DEFAULT_RING_SNAP_TOLERANCE,
};

pub use osmforge_store::{DeployError, FeatureRow, FeatureStore, Slot, StoreError};

pub use osmforge_pipeline::{
    run_import, run_update, Change, ChangeAction, ImportSummary, PipelineConfig, PipelineError,
    UpdateSummary,
};
