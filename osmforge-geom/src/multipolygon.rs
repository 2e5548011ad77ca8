//! Multipolygon assembly from relation members.

use geo::algorithm::orient::{Direction, Orient};
use geo::{Area, Contains, Polygon, Validation};
use log::warn;

use osmforge_core::{ElementId, ResolvedMember, Tags};

use crate::ring::{merge_fragments, RingFragment};
use crate::way::ring_polygon;
use crate::GeomError;

/// One assembled polygon with its resolved tags.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPolygon {
    /// Exterior ring plus any holes assigned by containment.
    pub polygon: Polygon<f64>,
    /// Tags the feature row carries: the relation's own tags, or the
    /// outer way's tags when the relation contributes none.
    pub tags: Tags,
}

/// Result of assembling one relation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assembly {
    /// Polygons in descending outer-ring area order.
    pub polygons: Vec<AssembledPolygon>,
    /// Member ways whose own feature would duplicate a polygon produced
    /// here; the way writer suppresses their direct polygon insertion.
    pub subsumed_ways: Vec<ElementId>,
}

struct Ring {
    fragment: RingFragment,
    polygon: Polygon<f64>,
    area: f64,
    contained_by: Option<usize>,
    holes: Vec<usize>,
}

/// Assemble a relation's member ways into polygon geometry.
///
/// Fragments merge by shared endpoints within each role group; rings that
/// cannot close within `snap_tolerance` are dropped and the remaining
/// rings still produce geometry. The whole relation is rejected only when
/// no ring closes or the assembled geometry is invalid.
pub fn assemble_relation(
    relation_id: ElementId,
    relation_tags: &Tags,
    members: &[ResolvedMember],
    snap_tolerance: f64,
) -> Result<Assembly, GeomError> {
    let mut rings = build_rings(relation_id, members, snap_tolerance);
    if rings.is_empty() {
        return Err(GeomError::NoRings { id: relation_id });
    }

    // Largest first, so containment scans only need to look at smaller
    // rings after each candidate shell.
    rings.sort_by(|a, b| b.area.total_cmp(&a.area));
    assign_containment(&mut rings);

    let payload_tags = relation_payload_tags(relation_tags);
    let shells: Vec<usize> = (0..rings.len()).filter(|&i| is_shell(&rings, i)).collect();
    let mut polygons = Vec::with_capacity(shells.len());
    for &shell in &shells {
        let polygon = compose_polygon(&rings, shell);
        if !polygon.is_valid() {
            return Err(GeomError::InvalidGeometry { id: relation_id });
        }
        let tags = shell_tags(&rings, shell, &payload_tags);
        polygons.push(AssembledPolygon { polygon, tags });
    }

    let subsumed_ways = subsumed_ways(members, &polygons);
    Ok(Assembly {
        polygons,
        subsumed_ways,
    })
}

fn build_rings(
    relation_id: ElementId,
    members: &[ResolvedMember],
    snap_tolerance: f64,
) -> Vec<Ring> {
    // Merge outer and inner fragments separately so a mislabelled joint
    // cannot glue a hole boundary onto a shell.
    let mut rings = Vec::new();
    for inner_role in [false, true] {
        let fragments: Vec<RingFragment> = members
            .iter()
            .filter(|m| m.is_inner() == inner_role)
            .filter(|m| m.way.coords.len() >= 2)
            .map(|m| RingFragment::from_way(&m.way))
            .collect();
        for mut fragment in merge_fragments(fragments, snap_tolerance) {
            if !fragment.try_close(snap_tolerance) {
                warn!(
                    "relation {relation_id}: dropping unclosable ring from ways {:?}",
                    fragment.ways.iter().map(|(id, _)| *id).collect::<Vec<_>>()
                );
                continue;
            }
            let Some(polygon) = ring_polygon(&fragment.coords) else {
                warn!("relation {relation_id}: dropping degenerate ring");
                continue;
            };
            let area = polygon.unsigned_area();
            rings.push(Ring {
                fragment,
                polygon,
                area,
                contained_by: None,
                holes: Vec::new(),
            });
        }
    }
    rings
}

fn assign_containment(rings: &mut [Ring]) {
    for i in 0..rings.len() {
        for j in (i + 1)..rings.len() {
            if !rings[i].polygon.contains(&rings[j].polygon) {
                continue;
            }
            // j may already sit inside a larger ring; the closest
            // container wins, so re-home it under i.
            if let Some(previous) = rings[j].contained_by {
                rings[previous].holes.retain(|&h| h != j);
            }
            rings[j].contained_by = Some(i);
            if nesting_depth(rings, j) % 2 == 1 {
                rings[i].holes.push(j);
            }
        }
    }
}

// Odd nesting depth makes a ring a hole; even depth (an island inside a
// hole) makes it a shell again.
fn nesting_depth(rings: &[Ring], idx: usize) -> usize {
    let mut depth = 0;
    let mut current = rings.get(idx).and_then(|r| r.contained_by);
    while let Some(parent) = current {
        depth += 1;
        current = rings.get(parent).and_then(|r| r.contained_by);
    }
    depth
}

fn is_shell(rings: &[Ring], idx: usize) -> bool {
    nesting_depth(rings, idx) % 2 == 0
}

fn compose_polygon(rings: &[Ring], shell: usize) -> Polygon<f64> {
    let exterior = rings[shell].polygon.exterior().clone();
    let interiors = rings[shell]
        .holes
        .iter()
        .filter_map(|&hole| rings.get(hole))
        .map(|ring| ring.polygon.exterior().clone())
        .collect();
    // Default orientation: counter-clockwise shell, clockwise holes.
    Polygon::new(exterior, interiors).orient(Direction::Default)
}

/// The relation's own descriptive tags: everything but the structural
/// `type` marker.
fn relation_payload_tags(relation_tags: &Tags) -> Tags {
    relation_tags
        .iter()
        .filter(|(key, _)| key.as_str() != "type")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn shell_tags(rings: &[Ring], shell: usize, payload_tags: &Tags) -> Tags {
    if !payload_tags.is_empty() {
        return payload_tags.clone();
    }
    // Untagged relation: each polygon takes the tags of its own outer
    // way(s); the first way of the shell chain is the authority.
    rings[shell]
        .fragment
        .ways
        .iter()
        .map(|(_, tags)| tags)
        .find(|tags| !tags.is_empty())
        .cloned()
        .unwrap_or_default()
}

// A member way is subsumed when some produced polygon carries tags the
// way's own feature would duplicate: the way is untagged, or its tags
// equal the polygon's.
fn subsumed_ways(members: &[ResolvedMember], polygons: &[AssembledPolygon]) -> Vec<ElementId> {
    let mut subsumed = Vec::new();
    for member in members {
        let duplicate = polygons
            .iter()
            .any(|p| member.way.tags.is_empty() || member.way.tags == p.tags);
        if duplicate && !subsumed.contains(&member.way.id) {
            subsumed.push(member.way.id);
        }
    }
    subsumed
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Contains, Coord, Point};
    use osmforge_core::{tags_from, ResolvedWay};
    use rstest::rstest;

    fn member(id: ElementId, role: &str, tags: Tags, square: [(f64, f64); 4]) -> ResolvedMember {
        let mut coords: Vec<Coord<f64>> =
            square.iter().map(|(x, y)| Coord { x: *x, y: *y }).collect();
        coords.push(coords[0]);
        let refs: Vec<ElementId> = (0..4).map(|i| id * 10 + i).chain([id * 10]).collect();
        ResolvedMember {
            role: role.to_owned(),
            way: ResolvedWay { id, refs, tags, coords },
        }
    }

    fn unit_square(offset: f64, size: f64) -> [(f64, f64); 4] {
        [
            (offset, offset),
            (offset + size, offset),
            (offset + size, offset + size),
            (offset, offset + size),
        ]
    }

    #[rstest]
    fn outer_with_nested_inner_becomes_a_holed_polygon() {
        let members = vec![
            member(1, "outer", Tags::new(), unit_square(0.0, 10.0)),
            member(2, "inner", Tags::new(), unit_square(4.0, 2.0)),
        ];
        let assembly = assemble_relation(
            7,
            &tags_from([("type", "multipolygon"), ("landuse", "forest")]),
            &members,
            1e-9,
        )
        .expect("assembles");

        assert_eq!(assembly.polygons.len(), 1);
        let polygon = &assembly.polygons[0].polygon;
        assert_eq!(polygon.interiors().len(), 1, "inner ring became a hole");
        assert!(polygon.contains(&Point::new(1.0, 1.0)), "outside the hole");
        assert!(!polygon.contains(&Point::new(5.0, 5.0)), "inside the hole");
        assert_eq!(assembly.polygons[0].tags, tags_from([("landuse", "forest")]));
    }

    #[rstest]
    fn lone_outer_way_supplies_tags_when_relation_has_none() {
        let members = vec![member(
            1,
            "outer",
            tags_from([("landuse", "meadow")]),
            unit_square(0.0, 1.0),
        )];
        let assembly = assemble_relation(
            7,
            &tags_from([("type", "multipolygon")]),
            &members,
            1e-9,
        )
        .expect("assembles");
        assert_eq!(assembly.polygons[0].tags, tags_from([("landuse", "meadow")]));
        assert_eq!(assembly.subsumed_ways, vec![1], "way feature would duplicate");
    }

    #[rstest]
    fn multiple_outers_share_relation_tags_and_differing_way_stays_standalone() {
        let members = vec![
            member(
                1,
                "outer",
                tags_from([("landuse", "forest")]),
                unit_square(0.0, 2.0),
            ),
            member(
                2,
                "outer",
                tags_from([("landuse", "quarry")]),
                unit_square(5.0, 2.0),
            ),
        ];
        let assembly = assemble_relation(
            7,
            &tags_from([("type", "multipolygon"), ("landuse", "forest")]),
            &members,
            1e-9,
        )
        .expect("assembles");

        assert_eq!(assembly.polygons.len(), 2);
        for polygon in &assembly.polygons {
            assert_eq!(polygon.tags, tags_from([("landuse", "forest")]));
        }
        assert_eq!(
            assembly.subsumed_ways,
            vec![1],
            "the quarry way keeps its own feature"
        );
    }

    #[rstest]
    fn unclosable_fragment_is_dropped_but_siblings_survive() {
        let open_way = ResolvedMember {
            role: "outer".to_owned(),
            way: ResolvedWay {
                id: 3,
                refs: vec![100, 101, 102],
                tags: Tags::new(),
                coords: vec![
                    Coord { x: 20.0, y: 20.0 },
                    Coord { x: 21.0, y: 20.0 },
                    Coord { x: 21.0, y: 21.0 },
                ],
            },
        };
        let members = vec![
            member(1, "outer", Tags::new(), unit_square(0.0, 2.0)),
            open_way,
        ];
        let assembly = assemble_relation(
            7,
            &tags_from([("type", "multipolygon"), ("natural", "water")]),
            &members,
            1e-9,
        )
        .expect("partial success");
        assert_eq!(assembly.polygons.len(), 1, "closed sibling ring survives");
    }

    #[rstest]
    fn single_node_member_is_skipped_not_fatal() {
        let stub = ResolvedMember {
            role: "outer".to_owned(),
            way: ResolvedWay {
                id: 9,
                refs: vec![1],
                tags: Tags::new(),
                coords: vec![Coord { x: 0.0, y: 0.0 }],
            },
        };
        let members = vec![member(1, "outer", Tags::new(), unit_square(0.0, 2.0)), stub];
        let assembly =
            assemble_relation(7, &tags_from([("type", "multipolygon")]), &members, 1e-9)
                .expect("stub member skipped");
        assert_eq!(assembly.polygons.len(), 1);
    }

    #[rstest]
    fn relation_with_no_closable_rings_is_rejected() {
        let open_way = ResolvedMember {
            role: "outer".to_owned(),
            way: ResolvedWay {
                id: 3,
                refs: vec![100, 101],
                tags: Tags::new(),
                coords: vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 }],
            },
        };
        let err = assemble_relation(
            7,
            &tags_from([("type", "multipolygon")]),
            &[open_way],
            1e-9,
        )
        .expect_err("nothing closes");
        assert_eq!(err, GeomError::NoRings { id: 7 });
    }
}
