//! Cache-resolved element views handed to the geometry layer.

use geo::Coord;

use crate::{ElementId, Tags};

/// A way whose node references have been resolved to coordinates.
///
/// Produced by the element cache's full-fetch; consumed by the geometry
/// builders. `coords` is parallel to `refs`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWay {
    /// OSM way id.
    pub id: ElementId,
    /// Node references, in order.
    pub refs: Vec<ElementId>,
    /// The way's own tags.
    pub tags: Tags,
    /// One coordinate per ref.
    pub coords: Vec<Coord<f64>>,
}

impl ResolvedWay {
    /// Closed by reference identity, same rule as [`crate::Way::is_closed`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.refs.len() >= 4 && self.refs.first() == self.refs.last()
    }

    /// Number of distinct coordinates; a geometry needs at least 2 for a
    /// line and 4 for a ring.
    #[must_use]
    pub fn distinct_coord_count(&self) -> usize {
        let mut seen: Vec<Coord<f64>> = Vec::with_capacity(self.coords.len());
        for coord in &self.coords {
            if !seen.contains(coord) {
                seen.push(*coord);
            }
        }
        seen.len()
    }
}

/// A relation way-member with its resolved geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMember {
    /// Declared member role (`outer`, `inner`, or other).
    pub role: String,
    /// The resolved member way.
    pub way: ResolvedWay,
}

impl ResolvedMember {
    /// `true` when the member bounds a hole.
    #[must_use]
    pub fn is_inner(&self) -> bool {
        self.role == "inner"
    }
}
