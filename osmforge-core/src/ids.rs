//! Feature-identity encoding for shared output tables.
//!
//! Nodes, ways, and relations draw ids from overlapping numeric spaces.
//! Tables that only ever hold one kind can store raw ids; tables shared
//! across kinds (or holding a way twice, as line and polygon) need the ids
//! mangled into disjoint bands so rows never collide.

use crate::ElementKind;

/// Default offset subtracted from relation ids before negation when the
/// single-id-space encoding is active. Large enough that the relation band
/// can never overlap negated way ids.
pub const RELATION_ID_OFFSET: i64 = -100_000_000_000_000_000;

/// Encodes element ids into a single shared id space and back.
///
/// With `single_id_space` disabled, only relations are mangled (negated),
/// matching stores where ways and nodes never share a table. With it
/// enabled, nodes stay positive, ways are negated, and relations are
/// shifted below [`RELATION_ID_OFFSET`].
///
/// # Examples
/// ```
/// use osmforge_core::{ElementKind, IdScheme};
///
/// let ids = IdScheme::single_space();
/// let encoded = ids.relation(17);
/// assert_eq!(ids.decode(ElementKind::Relation, encoded), 17);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdScheme {
    /// Mangle way ids as well, for mappings that mix kinds in one table.
    pub single_id_space: bool,
    /// Offset applied to relation ids in the single id space.
    pub relation_offset: i64,
}

impl Default for IdScheme {
    fn default() -> Self {
        Self {
            single_id_space: false,
            relation_offset: RELATION_ID_OFFSET,
        }
    }
}

impl IdScheme {
    /// Scheme for mappings where every kind may share one table.
    #[must_use]
    pub fn single_space() -> Self {
        Self {
            single_id_space: true,
            relation_offset: RELATION_ID_OFFSET,
        }
    }

    /// Encoded id for a node-derived row. Always the raw id.
    #[must_use]
    pub fn node(&self, id: i64) -> i64 {
        id
    }

    /// Encoded id for a way-derived row.
    #[must_use]
    pub fn way(&self, id: i64) -> i64 {
        if self.single_id_space {
            -id
        } else {
            id
        }
    }

    /// Encoded id for a relation-derived row.
    #[must_use]
    pub fn relation(&self, id: i64) -> i64 {
        if self.single_id_space {
            self.relation_offset - id
        } else {
            -id
        }
    }

    /// Encoded id for an element of the given kind.
    #[must_use]
    pub fn encode(&self, kind: ElementKind, id: i64) -> i64 {
        match kind {
            ElementKind::Node => self.node(id),
            ElementKind::Way => self.way(id),
            ElementKind::Relation => self.relation(id),
        }
    }

    /// Recover the raw element id from an encoded row id.
    ///
    /// Inverse of [`IdScheme::encode`] for the same kind and offset.
    #[must_use]
    pub fn decode(&self, kind: ElementKind, encoded: i64) -> i64 {
        match kind {
            ElementKind::Node => encoded,
            ElementKind::Way => {
                if self.single_id_space {
                    -encoded
                } else {
                    encoded
                }
            }
            ElementKind::Relation => {
                if self.single_id_space {
                    self.relation_offset - encoded
                } else {
                    -encoded
                }
            }
        }
    }

    /// Classify an encoded id from a shared table back into (kind, raw id).
    ///
    /// Only meaningful with the single id space; without it, positive ids
    /// are ambiguous between nodes and ways and this returns `None`.
    #[must_use]
    pub fn classify(&self, encoded: i64) -> Option<(ElementKind, i64)> {
        if !self.single_id_space {
            return None;
        }
        if encoded >= 0 {
            Some((ElementKind::Node, encoded))
        } else if encoded > self.relation_offset {
            Some((ElementKind::Way, -encoded))
        } else {
            Some((ElementKind::Relation, self.relation_offset - encoded))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ElementKind::Node, 42)]
    #[case(ElementKind::Way, 42)]
    #[case(ElementKind::Relation, 42)]
    fn encode_round_trips_per_kind(#[case] kind: ElementKind, #[case] id: i64) {
        for ids in [IdScheme::default(), IdScheme::single_space()] {
            let encoded = ids.encode(kind, id);
            assert_eq!(ids.decode(kind, encoded), id, "kind {kind:?}, ids {ids:?}");
        }
    }

    #[rstest]
    fn single_space_bands_are_disjoint_for_equal_ids() {
        let ids = IdScheme::single_space();
        let node = ids.node(1001);
        let way = ids.way(1001);
        let rel = ids.relation(1001);
        assert!(node != way && way != rel && node != rel);
        assert_eq!(ids.classify(node), Some((ElementKind::Node, 1001)));
        assert_eq!(ids.classify(way), Some((ElementKind::Way, 1001)));
        assert_eq!(ids.classify(rel), Some((ElementKind::Relation, 1001)));
    }

    #[rstest]
    fn plain_scheme_negates_relations_only() {
        let ids = IdScheme::default();
        assert_eq!(ids.way(7), 7);
        assert_eq!(ids.relation(7), -7);
        assert_eq!(ids.classify(7), None);
    }
}
