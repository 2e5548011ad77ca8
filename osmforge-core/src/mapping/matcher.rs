//! Tag matching: which tables does an element belong to?

use crate::{Node, Relation, Tags, Way};

use super::{Filters, GeometryKind, Mapping, MappingEntry, Table, ANY_VALUE, DEFAULT_RELATION_TYPES};

/// One successful table match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Destination table name.
    pub table: String,
    /// Key of the mapping entry that matched.
    pub key: String,
    /// The element's value for that key.
    pub value: String,
}

#[derive(Debug, Clone)]
struct MatchTable {
    name: String,
    entries: Vec<MappingEntry>,
    filters: Filters,
    relation_types: Vec<String>,
}

/// Evaluates the mapping for one geometry kind.
///
/// Built once per import or update run and then shared read-only; matching
/// is a pure function of the element's tags.
#[derive(Debug, Clone)]
pub struct TagMatcher {
    geometry: GeometryKind,
    tables: Vec<MatchTable>,
}

impl TagMatcher {
    pub(super) fn for_kind(mapping: &Mapping, geometry: GeometryKind) -> Self {
        let tables = mapping
            .tables
            .iter()
            .filter(|(_, table)| table.geometry == geometry)
            .map(|(name, table)| MatchTable {
                name: name.to_owned(),
                entries: table.mapping.clone(),
                filters: table.filters.clone(),
                relation_types: relation_types(table),
            })
            .collect();
        Self { geometry, tables }
    }

    /// Match a node. Tagless nodes never match.
    #[must_use]
    pub fn match_node(&self, node: &Node) -> Vec<Match> {
        if node.tags.is_empty() {
            return Vec::new();
        }
        self.match_tags(&node.tags)
    }

    /// Match a way, honouring the `area` tag on closed ways.
    ///
    /// A line matcher skips closed ways tagged `area=yes`; a polygon
    /// matcher only considers closed ways and skips `area=no`.
    #[must_use]
    pub fn match_way(&self, way: &Way) -> Vec<Match> {
        let area = way.tags.get("area").map(String::as_str);
        match self.geometry {
            GeometryKind::Polygon => {
                if !way.is_closed() || area == Some("no") {
                    return Vec::new();
                }
            }
            GeometryKind::LineString => {
                if way.is_closed() && area == Some("yes") {
                    return Vec::new();
                }
            }
            GeometryKind::Point => return Vec::new(),
        }
        self.match_tags(&way.tags)
    }

    /// Match a relation against polygon tables whose `relation_types`
    /// accept the relation's `type` tag.
    #[must_use]
    pub fn match_relation(&self, relation: &Relation) -> Vec<Match> {
        if self.geometry != GeometryKind::Polygon {
            return Vec::new();
        }
        let Some(rel_type) = relation.tags.get("type") else {
            return Vec::new();
        };
        self.match_tags(&relation.tags)
            .into_iter()
            .filter(|m| {
                self.tables
                    .iter()
                    .find(|t| t.name == m.table)
                    .is_some_and(|t| t.relation_types.iter().any(|ty| ty == rel_type))
            })
            .collect()
    }

    /// Match bare tags; the earliest entry of each table wins.
    #[must_use]
    pub fn match_tags(&self, tags: &Tags) -> Vec<Match> {
        let mut matches = Vec::new();
        for table in &self.tables {
            let Some(entry) = table
                .entries
                .iter()
                .find(|entry| entry_matches(entry, tags))
            else {
                continue;
            };
            if !filters_pass(&table.filters, tags) {
                continue;
            }
            let value = tags.get(&entry.key).cloned().unwrap_or_default();
            matches.push(Match {
                table: table.name.clone(),
                key: entry.key.clone(),
                value,
            });
        }
        matches
    }
}

fn relation_types(table: &Table) -> Vec<String> {
    table.relation_types.clone().unwrap_or_else(|| {
        DEFAULT_RELATION_TYPES
            .iter()
            .map(|t| (*t).to_owned())
            .collect()
    })
}

fn entry_matches(entry: &MappingEntry, tags: &Tags) -> bool {
    let Some(value) = tags.get(&entry.key) else {
        return false;
    };
    entry.values.iter().any(|v| v == ANY_VALUE || v == value)
}

fn filters_pass(filters: &Filters, tags: &Tags) -> bool {
    for (key, values) in &filters.require {
        let Some(value) = tags.get(key) else {
            return false;
        };
        if !values.iter().any(|v| v == ANY_VALUE || v == value) {
            return false;
        }
    }
    for (key, values) in &filters.reject {
        if let Some(value) = tags.get(key) {
            if values.iter().any(|v| v == ANY_VALUE || v == value) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::super::test_mapping;
    use super::*;
    use crate::element::tags_from;
    use rstest::rstest;

    fn closed_way(tags: Tags) -> Way {
        Way {
            id: 9,
            refs: vec![1, 2, 3, 1],
            tags,
            metadata: None,
        }
    }

    #[rstest]
    fn closed_way_matches_both_line_and_polygon_tables() {
        let mapping = test_mapping::sample();
        let way = closed_way(tags_from([("highway", "pedestrian")]));
        let lines = mapping.line_matcher().match_way(&way);
        let polygons = mapping.polygon_matcher().match_way(&way);
        assert_eq!(lines.len(), 1, "expected a roads match");
        assert_eq!(lines[0].table, "roads");
        assert_eq!(polygons.len(), 1, "expected a landusages match");
        assert_eq!(polygons[0].table, "landusages");
    }

    #[rstest]
    #[case("yes", 0, 1)]
    #[case("no", 1, 0)]
    fn area_tag_forces_one_geometry(
        #[case] area: &str,
        #[case] lines: usize,
        #[case] polygons: usize,
    ) {
        let mapping = test_mapping::sample();
        let way = closed_way(tags_from([("highway", "pedestrian"), ("area", area)]));
        assert_eq!(mapping.line_matcher().match_way(&way).len(), lines);
        assert_eq!(mapping.polygon_matcher().match_way(&way).len(), polygons);
    }

    #[rstest]
    fn open_way_never_matches_polygon_tables() {
        let mapping = test_mapping::sample();
        let way = Way {
            id: 9,
            refs: vec![1, 2, 3, 4],
            tags: tags_from([("landuse", "forest")]),
            metadata: None,
        };
        assert!(mapping.polygon_matcher().match_way(&way).is_empty());
    }

    #[rstest]
    fn unsupported_relation_type_matches_nothing() {
        let mapping = test_mapping::sample();
        let relation = Relation {
            id: 5,
            members: Vec::new(),
            tags: tags_from([("type", "route"), ("landuse", "forest")]),
            metadata: None,
        };
        assert!(mapping.polygon_matcher().match_relation(&relation).is_empty());

        let multipolygon = Relation {
            tags: tags_from([("type", "multipolygon"), ("landuse", "forest")]),
            ..relation
        };
        assert_eq!(
            mapping.polygon_matcher().match_relation(&multipolygon).len(),
            1,
            "expected landusages match for multipolygon"
        );
    }

    #[rstest]
    fn earliest_entry_supplies_key_and_value() {
        let mapping = test_mapping::sample();
        let way = closed_way(tags_from([("landuse", "forest"), ("leisure", "park")]));
        let matches = mapping.polygon_matcher().match_way(&way);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].key, "landuse");
        assert_eq!(matches[0].value, "forest");
    }
}
