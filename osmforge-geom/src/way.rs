//! Line and polygon geometry from single ways.

use geo::algorithm::orient::{Direction, Orient};
use geo::{Coord, LineString, Polygon};

use osmforge_core::ResolvedWay;

use crate::GeomError;

/// Build a LineString from a way. Consecutive duplicate coordinates are
/// collapsed; fewer than two distinct coordinates is a degenerate way.
pub fn way_line(way: &ResolvedWay) -> Result<LineString<f64>, GeomError> {
    let coords = dedup_consecutive(&way.coords);
    if distinct_count(&coords) < 2 {
        return Err(GeomError::DegenerateLine { id: way.id });
    }
    Ok(LineString::from(coords))
}

/// Build a Polygon from a closed way.
///
/// A triangle (three distinct corners plus the closing repeat) is the
/// smallest valid ring. Duplicate interior references are tolerated as
/// long as the collapsed ring still keeps four distinct coordinates. The
/// exterior is normalized to counter-clockwise winding.
pub fn way_polygon(way: &ResolvedWay) -> Result<Polygon<f64>, GeomError> {
    if !way.is_closed() {
        return Err(GeomError::UnclosedRing { id: way.id });
    }
    ring_polygon(&way.coords).ok_or(GeomError::UnclosedRing { id: way.id })
}

/// Build an exterior-only polygon from ring coordinates, closing the
/// sequence if its endpoints already coincide.
pub(crate) fn ring_polygon(coords: &[Coord<f64>]) -> Option<Polygon<f64>> {
    let mut deduped = dedup_consecutive(coords);
    // Three distinct corners make a ring; a ring that only reaches that
    // size because interior duplicates collapsed is degenerate.
    let minimum = if deduped.len() < coords.len() { 4 } else { 3 };
    if distinct_count(&deduped) < minimum {
        return None;
    }
    if deduped.first() != deduped.last() {
        let first = *deduped.first()?;
        deduped.push(first);
    }
    let polygon = Polygon::new(LineString::from(deduped), Vec::new());
    Some(polygon.orient(Direction::Default))
}

pub(crate) fn dedup_consecutive(coords: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for coord in coords {
        if out.last() != Some(coord) {
            out.push(*coord);
        }
    }
    out
}

pub(crate) fn distinct_count(coords: &[Coord<f64>]) -> usize {
    let mut seen: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for coord in coords {
        if !seen.contains(coord) {
            seen.push(*coord);
        }
    }
    // An explicitly closed ring repeats its first coordinate; that repeat
    // is already excluded by the distinct scan.
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::CoordsIter;
    use osmforge_core::Tags;
    use rstest::rstest;

    fn resolved(refs: &[i64], coords: &[(f64, f64)]) -> ResolvedWay {
        ResolvedWay {
            id: 1,
            refs: refs.to_vec(),
            tags: Tags::new(),
            coords: coords.iter().map(|(x, y)| Coord { x: *x, y: *y }).collect(),
        }
    }

    #[rstest]
    fn single_distinct_coordinate_is_degenerate() {
        let way = resolved(&[1, 2], &[(3.0, 4.0), (3.0, 4.0)]);
        assert_eq!(way_line(&way), Err(GeomError::DegenerateLine { id: 1 }));
    }

    #[rstest]
    fn duplicate_interior_node_still_builds_a_square() {
        // Five refs with one duplicated interior node, four distinct corners.
        let way = resolved(
            &[1, 2, 2, 3, 4, 1],
            &[
                (0.0, 0.0),
                (1.0, 0.0),
                (1.0, 0.0),
                (1.0, 1.0),
                (0.0, 1.0),
                (0.0, 0.0),
            ],
        );
        let polygon = way_polygon(&way).expect("square builds");
        assert_eq!(polygon.exterior().coords_count(), 5, "4 corners plus closing coord");
    }

    #[rstest]
    fn closed_triangle_builds_a_polygon() {
        let way = resolved(
            &[1, 2, 3, 1],
            &[(0.0, 0.0), (1.0, 0.0), (0.5, 1.0), (0.0, 0.0)],
        );
        let polygon = way_polygon(&way).expect("triangle builds");
        assert_eq!(polygon.exterior().coords_count(), 4, "3 corners plus closing coord");
    }

    #[rstest]
    fn ring_collapsing_to_a_triangle_through_duplicates_is_rejected() {
        // Four distinct corners on paper, but the duplicate interior node
        // collapses the ring down to three.
        let way = resolved(
            &[1, 2, 2, 3, 1],
            &[(0.0, 0.0), (1.0, 0.0), (1.0, 0.0), (0.5, 1.0), (0.0, 0.0)],
        );
        assert_eq!(way_polygon(&way), Err(GeomError::UnclosedRing { id: 1 }));
    }

    #[rstest]
    fn two_distinct_coordinates_cannot_ring() {
        let way = resolved(&[1, 2, 1], &[(0.0, 0.0), (1.0, 0.0), (0.0, 0.0)]);
        assert_eq!(way_polygon(&way), Err(GeomError::UnclosedRing { id: 1 }));
    }
}
