//! Shared feature derivation for the import and update drivers.
//!
//! Both drivers must reach byte-identical rows for the same cache state,
//! so all matching, geometry building, id encoding, and generalized-table
//! shadowing lives here.

use geo::{Geometry, Point, Simplify};
use log::debug;

use osmforge_cache::ElementCache;
use osmforge_core::mapping::{build_columns, Mapping, Match, RowContext, TagMatcher};
use osmforge_core::{way_decision, ElementKind, IdScheme, Metadata, Node, Relation, Tags, Way};
use osmforge_geom::{assemble_relation, way_line, way_polygon};
use osmforge_store::{FeatureRow, FeatureStore, Slot};

use crate::{PipelineConfig, PipelineError};

/// Derives feature rows from cached elements.
#[derive(Debug)]
pub struct Deriver {
    mapping: Mapping,
    point_matcher: TagMatcher,
    line_matcher: TagMatcher,
    polygon_matcher: TagMatcher,
    id_scheme: IdScheme,
    snap_tolerance: f64,
}

impl Deriver {
    /// Build a deriver for one mapping and configuration.
    #[must_use]
    pub fn new(mapping: &Mapping, config: &PipelineConfig) -> Self {
        Self {
            point_matcher: mapping.point_matcher(),
            line_matcher: mapping.line_matcher(),
            polygon_matcher: mapping.polygon_matcher(),
            id_scheme: IdScheme {
                single_id_space: mapping.use_single_id_space,
                relation_offset: config.relation_id_offset,
            },
            snap_tolerance: config.ring_snap_tolerance,
            mapping: mapping.clone(),
        }
    }

    /// The id encoding in force for this run.
    #[must_use]
    pub fn id_scheme(&self) -> IdScheme {
        self.id_scheme
    }

    /// Derive point rows for a tagged node. Returns the number of rows
    /// inserted.
    pub fn derive_node(
        &self,
        store: &FeatureStore,
        slot: Slot,
        node: &Node,
    ) -> Result<u64, PipelineError> {
        let mut rows = 0;
        let geometry = Geometry::Point(Point::new(node.lon, node.lat));
        for matched in self.point_matcher.match_node(node) {
            let Some(row) = self.row(
                &matched,
                self.id_scheme.node(node.id),
                &node.tags,
                node.metadata.as_ref(),
                geometry.clone(),
            ) else {
                continue;
            };
            self.insert(store, slot, &matched.table, &row)?;
            rows += 1;
        }
        Ok(rows)
    }

    /// Derive line and polygon rows for a way, honouring relation
    /// suppression marks. Registers the way in the node reverse index
    /// when it produced at least one row.
    pub fn derive_way(
        &self,
        cache: &ElementCache,
        store: &FeatureStore,
        slot: Slot,
        way: &Way,
    ) -> Result<u64, PipelineError> {
        let line_matches = self.line_matcher.match_tags(&way.tags);
        let polygon_matches = self.polygon_matcher.match_tags(&way.tags);
        if line_matches.is_empty() && polygon_matches.is_empty() {
            return Ok(0);
        }
        let Some(resolved) = cache.resolve_way(way)? else {
            debug!("way {}: skipped, referenced coordinates missing", way.id);
            return Ok(0);
        };
        let line_geometry = way_line(&resolved)
            .map(Geometry::LineString)
            .map_err(|error| debug!("way {}: {error}", way.id))
            .ok();
        let polygon_geometry = way_polygon(&resolved)
            .map(Geometry::Polygon)
            .map_err(|error| debug!("way {}: {error}", way.id))
            .ok();

        let area = way.tags.get("area").map(String::as_str);
        let mut rows = 0;
        for table in match_tables(&line_matches, &polygon_matches) {
            let line_match = find_match(&line_matches, table);
            let polygon_match = find_match(&polygon_matches, table);
            let decision = way_decision(
                resolved.is_closed(),
                area,
                line_match.is_some(),
                polygon_match.is_some(),
                cache.is_way_inserted(way.id, table)?,
            );
            if decision.inserts_line() {
                rows += self.way_row(
                    store,
                    slot,
                    way,
                    line_match,
                    line_geometry.as_ref(),
                    self.id_scheme.way(way.id),
                )?;
            }
            if decision.inserts_polygon() {
                // A way inserted as both line and polygon reuses the same
                // encoded id; deletes sweep both rows at once.
                rows += self.way_row(
                    store,
                    slot,
                    way,
                    polygon_match,
                    polygon_geometry.as_ref(),
                    self.id_scheme.way(way.id),
                )?;
            }
        }
        if rows > 0 {
            cache.add_way_refs(way)?;
        }
        Ok(rows)
    }

    /// Derive polygon rows for a relation from its resolved members,
    /// marking subsumed member ways and refreshing the reverse indices.
    pub fn derive_relation(
        &self,
        cache: &ElementCache,
        store: &FeatureStore,
        slot: Slot,
        relation: &Relation,
        members: &[osmforge_core::ResolvedMember],
    ) -> Result<u64, PipelineError> {
        let matches = self.polygon_matcher.match_relation(relation);
        if matches.is_empty() {
            return Ok(0);
        }
        let assembly =
            match assemble_relation(relation.id, &relation.tags, members, self.snap_tolerance) {
                Ok(assembly) => assembly,
                Err(error) => {
                    debug!("relation {}: {error}", relation.id);
                    return Ok(0);
                }
            };

        let encoded = self.id_scheme.relation(relation.id);
        let mut rows = 0;
        for matched in &matches {
            for polygon in &assembly.polygons {
                let Some(row) = self.row(
                    matched,
                    encoded,
                    &polygon.tags,
                    relation.metadata.as_ref(),
                    Geometry::Polygon(polygon.polygon.clone()),
                ) else {
                    continue;
                };
                self.insert(store, slot, &matched.table, &row)?;
                rows += 1;
            }
            for way_id in &assembly.subsumed_ways {
                cache.mark_way_inserted(*way_id, &matched.table)?;
            }
        }

        cache.add_relation_members(relation.id, members.iter().map(|m| m.way.id))?;
        for member in members {
            cache.add_node_dependents(member.way.id, &member.way.refs)?;
        }
        Ok(rows)
    }

    /// Remove every derived row an element may have left, across all
    /// output tables including generalized shadows.
    pub fn delete_rows(
        &self,
        store: &FeatureStore,
        slot: Slot,
        kind: ElementKind,
        id: i64,
    ) -> Result<(), PipelineError> {
        let encoded = self.id_scheme.encode(kind, id);
        for table in self.mapping.table_names() {
            store.delete(slot, &table, encoded)?;
        }
        Ok(())
    }

    fn way_row(
        &self,
        store: &FeatureStore,
        slot: Slot,
        way: &Way,
        matched: Option<&Match>,
        geometry: Option<&Geometry<f64>>,
        encoded: i64,
    ) -> Result<u64, PipelineError> {
        let (Some(matched), Some(geometry)) = (matched, geometry) else {
            return Ok(0);
        };
        let Some(row) = self.row(
            matched,
            encoded,
            &way.tags,
            way.metadata.as_ref(),
            geometry.clone(),
        ) else {
            return Ok(0);
        };
        self.insert(store, slot, &matched.table, &row)?;
        Ok(1)
    }

    fn row(
        &self,
        matched: &Match,
        encoded: i64,
        tags: &Tags,
        metadata: Option<&Metadata>,
        geometry: Geometry<f64>,
    ) -> Option<FeatureRow> {
        let table = self.mapping.tables.get(&matched.table)?;
        let columns = build_columns(
            table,
            &RowContext {
                tags,
                matched,
                metadata,
                capture_metadata: self.mapping.capture_metadata,
            },
        );
        Some(FeatureRow {
            id: encoded,
            tags: tags.clone(),
            matched_key: matched.key.clone(),
            matched_value: matched.value.clone(),
            columns,
            geometry,
        })
    }

    /// Insert a row, shadowing it into any generalized tables fed by the
    /// destination. Shadowing at write time keeps generalized tables
    /// current through updates without a separate derivation pass.
    fn insert(
        &self,
        store: &FeatureStore,
        slot: Slot,
        table: &str,
        row: &FeatureRow,
    ) -> Result<(), PipelineError> {
        store.insert(slot, table, row)?;
        for (name, generalized) in &self.mapping.generalized_tables {
            if generalized.source == table {
                let mut shadow = row.clone();
                shadow.geometry = simplified(&row.geometry, generalized.tolerance);
                store.insert(slot, name, &shadow)?;
            }
        }
        Ok(())
    }
}

fn find_match<'a>(matches: &'a [Match], table: &str) -> Option<&'a Match> {
    matches.iter().find(|m| m.table == table)
}

/// Distinct destination tables across both match lists, line tables first.
fn match_tables<'a>(line: &'a [Match], polygon: &'a [Match]) -> Vec<&'a str> {
    let mut tables: Vec<&str> = Vec::new();
    for matched in line.iter().chain(polygon) {
        if !tables.contains(&matched.table.as_str()) {
            tables.push(&matched.table);
        }
    }
    tables
}

fn simplified(geometry: &Geometry<f64>, tolerance: f64) -> Geometry<f64> {
    match geometry {
        Geometry::LineString(line) => Geometry::LineString(line.simplify(tolerance)),
        Geometry::Polygon(polygon) => Geometry::Polygon(polygon.simplify(tolerance)),
        Geometry::MultiLineString(lines) => Geometry::MultiLineString(lines.simplify(tolerance)),
        Geometry::MultiPolygon(polygons) => Geometry::MultiPolygon(polygons.simplify(tolerance)),
        other => other.clone(),
    }
}
