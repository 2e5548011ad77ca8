//! Ring fragments and endpoint merging.
//!
//! Relation members arrive as way fragments in arbitrary order and
//! direction. Fragments are joined endpoint-to-endpoint — primarily by
//! shared node ids, secondarily by coordinate proximity within the snap
//! tolerance — until rings close or no join remains.

use geo::{Coord, Point};
use geo::{Distance, Euclidean};

use osmforge_core::{ElementId, ResolvedWay, Tags};

/// A chain of one or more member ways, possibly not yet closed.
#[derive(Debug, Clone)]
pub(crate) struct RingFragment {
    /// (id, tags) of every way merged into this chain.
    pub ways: Vec<(ElementId, Tags)>,
    /// Node refs along the chain.
    pub refs: Vec<ElementId>,
    /// Coordinates along the chain, parallel to `refs`.
    pub coords: Vec<Coord<f64>>,
}

impl RingFragment {
    pub(crate) fn from_way(way: &ResolvedWay) -> Self {
        Self {
            ways: vec![(way.id, way.tags.clone())],
            refs: way.refs.clone(),
            coords: way.coords.clone(),
        }
    }

    /// Closed by node identity: ≥ 4 refs with matching endpoints.
    pub(crate) fn is_closed(&self) -> bool {
        self.refs.len() >= 4 && self.refs.first() == self.refs.last()
    }

    /// Close a nearly-closed chain by snapping the trailing endpoint onto
    /// the leading one. Returns `false` when the endpoints are too far
    /// apart.
    pub(crate) fn try_close(&mut self, tolerance: f64) -> bool {
        if self.is_closed() {
            return true;
        }
        if self.refs.len() < 3 {
            return false;
        }
        let (Some(first), Some(last)) = (self.coords.first().copied(), self.coords.last().copied())
        else {
            return false;
        };
        if endpoint_gap(first, last) > tolerance {
            return false;
        }
        let Some(first_ref) = self.refs.first().copied() else {
            return false;
        };
        if let Some(coord) = self.coords.last_mut() {
            *coord = first;
        }
        if let Some(node_ref) = self.refs.last_mut() {
            *node_ref = first_ref;
        }
        self.is_closed()
    }

    fn reverse(&mut self) {
        self.refs.reverse();
        self.coords.reverse();
    }

    /// Append `other` to this chain, dropping the duplicated joint
    /// coordinate.
    fn extend_with(&mut self, mut other: Self, reversed: bool) {
        if reversed {
            other.reverse();
        }
        self.refs.extend_from_slice(&other.refs[1..]);
        self.coords.extend_from_slice(&other.coords[1..]);
        self.ways.append(&mut other.ways);
    }
}

fn endpoint_gap(a: Coord<f64>, b: Coord<f64>) -> f64 {
    Euclidean.distance(Point::from(a), Point::from(b))
}

/// Whether two fragment endpoints join: same node id, or coordinates
/// within the snap tolerance.
fn endpoints_join(
    (ref_a, coord_a): (ElementId, Coord<f64>),
    (ref_b, coord_b): (ElementId, Coord<f64>),
    tolerance: f64,
) -> bool {
    ref_a == ref_b || endpoint_gap(coord_a, coord_b) <= tolerance
}

/// Merge open fragments into longer chains until no endpoints join.
///
/// Already-closed fragments pass through untouched. The result may still
/// contain open chains; the assembler decides whether those close within
/// tolerance or get dropped.
pub(crate) fn merge_fragments(fragments: Vec<RingFragment>, tolerance: f64) -> Vec<RingFragment> {
    let mut closed = Vec::new();
    let mut open: Vec<RingFragment> = Vec::new();
    for fragment in fragments {
        if fragment.is_closed() {
            closed.push(fragment);
        } else {
            open.push(fragment);
        }
    }

    loop {
        let Some((i, j, tail_of_i, head_of_j)) = find_join(&open, tolerance) else {
            break;
        };
        // find_join returns i < j, so removing j leaves i in place.
        let other = open.swap_remove(j);
        if let Some(base) = open.get_mut(i) {
            if !tail_of_i {
                base.reverse();
            }
            base.extend_with(other, !head_of_j);
        }
        if open.get(i).is_some_and(RingFragment::is_closed) {
            closed.push(open.swap_remove(i));
        }
    }

    closed.extend(open);
    closed
}

type Join = (usize, usize, bool, bool);

// Scan for a pair of open fragments whose endpoints join. Returns the
// indices plus which end of each fragment touches: `tail_of_i` is true
// when fragment i joins at its last coordinate, `head_of_j` when fragment
// j joins at its first.
fn find_join(open: &[RingFragment], tolerance: f64) -> Option<Join> {
    for i in 0..open.len() {
        for j in (i + 1)..open.len() {
            let (a, b) = (&open[i], &open[j]);
            let ends_a = fragment_ends(a)?;
            let ends_b = fragment_ends(b)?;
            let (a_head, a_tail) = ends_a;
            let (b_head, b_tail) = ends_b;
            if endpoints_join(a_tail, b_head, tolerance) {
                return Some((i, j, true, true));
            }
            if endpoints_join(a_tail, b_tail, tolerance) {
                return Some((i, j, true, false));
            }
            if endpoints_join(a_head, b_head, tolerance) {
                return Some((i, j, false, true));
            }
            if endpoints_join(a_head, b_tail, tolerance) {
                return Some((i, j, false, false));
            }
        }
    }
    None
}

type FragmentEnd = (ElementId, Coord<f64>);

fn fragment_ends(fragment: &RingFragment) -> Option<(FragmentEnd, FragmentEnd)> {
    let head = (*fragment.refs.first()?, *fragment.coords.first()?);
    let tail = (*fragment.refs.last()?, *fragment.coords.last()?);
    Some((head, tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn fragment(id: ElementId, refs: &[ElementId], coords: &[(f64, f64)]) -> RingFragment {
        RingFragment {
            ways: vec![(id, Tags::new())],
            refs: refs.to_vec(),
            coords: coords.iter().map(|(x, y)| Coord { x: *x, y: *y }).collect(),
        }
    }

    #[rstest]
    fn two_half_rings_merge_and_close() {
        let top = fragment(1, &[1, 2, 3], &[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0)]);
        let bottom = fragment(2, &[3, 4, 1], &[(2.0, 0.0), (1.0, -1.0), (0.0, 0.0)]);
        let merged = merge_fragments(vec![top, bottom], 0.0);
        assert_eq!(merged.len(), 1, "halves join into one ring");
        assert!(merged[0].is_closed());
        assert_eq!(merged[0].ways.len(), 2);
    }

    #[rstest]
    fn reversed_fragment_still_joins() {
        let top = fragment(1, &[1, 2, 3], &[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0)]);
        // Same bottom half but digitized in the opposite direction.
        let bottom = fragment(2, &[1, 4, 3], &[(0.0, 0.0), (1.0, -1.0), (2.0, 0.0)]);
        let merged = merge_fragments(vec![top, bottom], 0.0);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].is_closed());
    }

    #[rstest]
    fn distant_fragments_stay_apart() {
        let a = fragment(1, &[1, 2], &[(0.0, 0.0), (1.0, 0.0)]);
        let b = fragment(2, &[3, 4], &[(5.0, 5.0), (6.0, 5.0)]);
        let merged = merge_fragments(vec![a, b], 1e-9);
        assert_eq!(merged.len(), 2, "no shared endpoints, no merge");
    }

    #[rstest]
    fn small_endpoint_gap_snaps_closed() {
        // Distinct node ids but coordinates within tolerance at the joint.
        let mut ring = fragment(
            1,
            &[1, 2, 3, 4],
            &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1e-12)],
        );
        assert!(!ring.is_closed());
        assert!(ring.try_close(1e-9), "gap below tolerance closes");
        assert!(ring.is_closed());
    }

    #[rstest]
    fn wide_gap_refuses_to_close() {
        let mut open = fragment(
            1,
            &[1, 2, 3, 4],
            &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.5, 0.5)],
        );
        assert!(!open.try_close(1e-9));
    }
}
