//! Geometry construction for the import pipeline.
//!
//! Ways become lines or polygons here; multipolygon-style relations are
//! assembled from member way fragments, with ring merging, endpoint gap
//! snapping, and containment-based hole assignment. All functions are
//! pure over resolved cache data, so derivation workers can run them
//! concurrently.
//!
//! Geometry failures are per-element and recoverable: the caller skips
//! the offending feature and continues.

#![forbid(unsafe_code)]

mod multipolygon;
mod ring;
mod way;

pub use multipolygon::{assemble_relation, AssembledPolygon, Assembly};
pub use way::{way_line, way_polygon};

use osmforge_core::ElementId;
use thiserror::Error;

/// Default endpoint snap distance for ring merging, in projected units.
/// Closes genuine digitization gaps without gluing unrelated rings; raise
/// it per dataset through the pipeline configuration.
pub const DEFAULT_RING_SNAP_TOLERANCE: f64 = 1e-9;

/// Per-element geometry failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeomError {
    /// A way with fewer than two distinct coordinates cannot form a line.
    #[error("way {id} has fewer than two distinct coordinates")]
    DegenerateLine {
        /// Offending way id.
        id: ElementId,
    },
    /// A way that is not closed (or closes with fewer than four distinct
    /// coordinates) cannot form a ring.
    #[error("way {id} does not form a closed ring")]
    UnclosedRing {
        /// Offending way id.
        id: ElementId,
    },
    /// None of a relation's member fragments closed into a ring.
    #[error("relation {id} has no closable rings")]
    NoRings {
        /// Offending relation id.
        id: ElementId,
    },
    /// The assembled geometry failed validation (self-intersection,
    /// degenerate ring).
    #[error("assembled geometry for relation {id} is invalid")]
    InvalidGeometry {
        /// Offending relation id.
        id: ElementId,
    },
}
