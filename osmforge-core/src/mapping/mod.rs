//! Declarative tag-to-table mapping.
//!
//! The mapping document is supplied externally (JSON) and consumed
//! read-only: it names the output tables, the tag conditions that route an
//! element into them, the derived columns, and the generalized tables that
//! shadow a source table with simplified geometry.
//!
//! Evaluation lives in [`matcher`]; row assembly in [`columns`]; the
//! cache-write tag filters in [`filter`].

mod columns;
mod filter;
mod matcher;

pub use columns::{build_columns, ColumnValue, RowContext};
pub use filter::{RelationTagFilter, TagFilter};
pub use matcher::{Match, TagMatcher};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Relation types assembled as polygons when a table declares none.
pub const DEFAULT_RELATION_TYPES: [&str; 3] = ["multipolygon", "boundary", "land_area"];

/// Matches any value of a key in a mapping entry.
pub const ANY_VALUE: &str = "__any__";

/// Geometry kind a table stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    /// Node-derived point rows.
    Point,
    /// Way-derived line rows.
    LineString,
    /// Closed-way or relation-derived polygon rows.
    Polygon,
}

/// One ordered tag condition: a key and the values routed to the table.
///
/// Entry order is significant: when several entries of one table match an
/// element, the earliest entry supplies the reported key/value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Tag key to test.
    pub key: String,
    /// Accepted values; [`ANY_VALUE`] accepts every value.
    pub values: Vec<String>,
}

/// Derived column kinds, mirroring what the store can persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Copy of a tag value as text.
    String,
    /// Tag value parsed as a boolean (`yes`/`true`/`1`).
    Bool,
    /// Tag value parsed as an integer; NULL when unparsable.
    Integer,
    /// The key of the mapping entry that matched.
    MappingKey,
    /// The value of the mapping entry that matched.
    MappingValue,
    /// 1-based rank of the tag value in `args.values`, 0 when absent.
    Enumerate,
    /// Reserved metadata field: element version.
    Version,
    /// Reserved metadata field: changeset id.
    Changeset,
    /// Reserved metadata field: edit timestamp.
    Timestamp,
    /// Reserved metadata field: editor name.
    User,
    /// Reserved metadata field: editor id.
    Uid,
}

/// Arguments for column kinds that need them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnArgs {
    /// Ordered value list for [`ColumnKind::Enumerate`].
    #[serde(default)]
    pub values: Vec<String>,
}

/// One derived output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name in the output table.
    pub name: String,
    /// Tag key read by tag-sourced kinds.
    #[serde(default)]
    pub key: Option<String>,
    /// How the value is derived.
    #[serde(rename = "type")]
    pub kind: ColumnKind,
    /// Extra arguments, e.g. the enumeration value list.
    #[serde(default)]
    pub args: ColumnArgs,
}

/// Require/reject tag filters applied after the mapping entries match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    /// The element must carry one of these values for each key
    /// ([`ANY_VALUE`] accepts any value of the key).
    #[serde(default)]
    pub require: BTreeMap<String, Vec<String>>,
    /// The element must not carry any of these values.
    #[serde(default)]
    pub reject: BTreeMap<String, Vec<String>>,
}

/// One output table declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Geometry kind of the rows.
    #[serde(rename = "type")]
    pub geometry: GeometryKind,
    /// Ordered tag conditions routing elements here.
    pub mapping: Vec<MappingEntry>,
    /// Derived columns beyond id and geometry.
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Post-match filters.
    #[serde(default)]
    pub filters: Filters,
    /// Relation types accepted for polygon assembly; defaults to
    /// [`DEFAULT_RELATION_TYPES`].
    #[serde(default)]
    pub relation_types: Option<Vec<String>>,
}

/// A generalized table: simplified shadow of a source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralizedTable {
    /// Name of the source table.
    pub source: String,
    /// Douglas-Peucker tolerance in projected units.
    pub tolerance: f64,
}

/// Output tables in the order the document declares them.
///
/// Declaration order is meaningful: matchers visit tables in document
/// order, which is what breaks ties between overlapping mappings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSet(Vec<(String, Table)>);

impl TableSet {
    /// Look a table up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Table> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Whether a table with this name is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Named table declarations, in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.0.iter().map(|(n, t)| (n.as_str(), t))
    }

    /// Table names, in document order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    /// Table declarations without their names.
    pub fn values(&self) -> impl Iterator<Item = &Table> {
        self.0.iter().map(|(_, t)| t)
    }
}

impl Serialize for TableSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(n, t)| (n, t)))
    }
}

impl<'de> Deserialize<'de> for TableSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl<'de> serde::de::Visitor<'de> for Visitor {
            type Value = TableSet;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of table declarations")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(
                self,
                mut map: A,
            ) -> Result<Self::Value, A::Error> {
                let mut tables: Vec<(String, Table)> = Vec::new();
                while let Some((name, table)) = map.next_entry::<String, Table>()? {
                    if tables.iter().any(|(n, _)| *n == name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate table declaration {name}"
                        )));
                    }
                    tables.push((name, table));
                }
                Ok(TableSet(tables))
            }
        }

        deserializer.deserialize_map(Visitor)
    }
}

/// The whole mapping document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    /// Output tables, in declaration order.
    pub tables: TableSet,
    /// Generalized tables by name.
    #[serde(default)]
    pub generalized_tables: BTreeMap<String, GeneralizedTable>,
    /// Mangle way and relation ids into one shared id space.
    #[serde(default)]
    pub use_single_id_space: bool,
    /// Capture element metadata into reserved columns.
    #[serde(default)]
    pub capture_metadata: bool,
}

/// Errors raised while loading or validating a mapping document.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The document was not valid JSON for the mapping schema.
    #[error("failed to decode mapping document")]
    Decode(#[from] serde_json::Error),
    /// A generalized table names a source that is not declared.
    #[error("generalized table {name} references unknown source table {source_table}")]
    UnknownSource {
        /// Generalized table name.
        name: String,
        /// The missing source table.
        source_table: String,
    },
    /// An enumerate column lacks its value list.
    #[error("enumerate column {column} in table {table} declares no values")]
    EmptyEnumeration {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
}

impl Mapping {
    /// Decode and validate a mapping document from JSON text.
    pub fn from_json(text: &str) -> Result<Self, MappingError> {
        let mapping: Self = serde_json::from_str(text)?;
        mapping.validate()?;
        Ok(mapping)
    }

    fn validate(&self) -> Result<(), MappingError> {
        for (name, generalized) in &self.generalized_tables {
            if !self.tables.contains(&generalized.source) {
                return Err(MappingError::UnknownSource {
                    name: name.clone(),
                    source_table: generalized.source.clone(),
                });
            }
        }
        for (table_name, table) in self.tables.iter() {
            for column in &table.columns {
                if column.kind == ColumnKind::Enumerate && column.args.values.is_empty() {
                    return Err(MappingError::EmptyEnumeration {
                        table: table_name.to_owned(),
                        column: column.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Matcher for node-derived point rows.
    #[must_use]
    pub fn point_matcher(&self) -> TagMatcher {
        TagMatcher::for_kind(self, GeometryKind::Point)
    }

    /// Matcher for way-derived line rows.
    #[must_use]
    pub fn line_matcher(&self) -> TagMatcher {
        TagMatcher::for_kind(self, GeometryKind::LineString)
    }

    /// Matcher for polygon rows from closed ways and relations.
    #[must_use]
    pub fn polygon_matcher(&self) -> TagMatcher {
        TagMatcher::for_kind(self, GeometryKind::Polygon)
    }

    /// Relation types any polygon table accepts.
    #[must_use]
    pub fn supported_relation_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for table in self.tables.values() {
            if table.geometry != GeometryKind::Polygon {
                continue;
            }
            let declared = table.relation_types.clone().unwrap_or_else(|| {
                DEFAULT_RELATION_TYPES.iter().map(|t| (*t).to_owned()).collect()
            });
            for t in declared {
                if !types.contains(&t) {
                    types.push(t);
                }
            }
        }
        if types.is_empty() {
            types = DEFAULT_RELATION_TYPES.iter().map(|t| (*t).to_owned()).collect();
        }
        types
    }

    /// All output table names: mapped tables in declaration order, then
    /// generalized tables.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.tables
            .names()
            .map(str::to_owned)
            .chain(self.generalized_tables.keys().cloned())
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod test_mapping {
    use super::*;

    /// A small mapping with a dual line/polygon pair of tables and one
    /// generalized shadow, reused across the crate's tests.
    pub fn sample() -> Mapping {
        Mapping::from_json(
            r#"{
                "tables": {
                    "places": {
                        "type": "point",
                        "mapping": [{"key": "place", "values": ["__any__"]}],
                        "columns": [
                            {"name": "name", "key": "name", "type": "string"},
                            {"name": "kind", "type": "mapping_value"}
                        ]
                    },
                    "roads": {
                        "type": "linestring",
                        "mapping": [{"key": "highway", "values": ["__any__"]}],
                        "columns": [
                            {"name": "name", "key": "name", "type": "string"},
                            {"name": "class", "type": "mapping_value"},
                            {"name": "rank", "key": "highway", "type": "enumerate",
                             "args": {"values": ["track", "secondary", "primary", "motorway"]}}
                        ]
                    },
                    "landusages": {
                        "type": "polygon",
                        "mapping": [
                            {"key": "landuse", "values": ["__any__"]},
                            {"key": "highway", "values": ["pedestrian"]},
                            {"key": "leisure", "values": ["park", "pitch"]}
                        ],
                        "columns": [
                            {"name": "name", "key": "name", "type": "string"},
                            {"name": "kind", "type": "mapping_value"}
                        ]
                    }
                },
                "generalized_tables": {
                    "roads_gen": {"source": "roads", "tolerance": 0.0001}
                },
                "use_single_id_space": true
            }"#,
        )
        .expect("sample mapping decodes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_mapping_lists_all_tables() {
        let mapping = test_mapping::sample();
        let names = mapping.table_names();
        assert_eq!(names, ["places", "roads", "landusages", "roads_gen"]);
    }

    #[test]
    fn tables_keep_document_order() {
        let mapping = Mapping::from_json(
            r#"{"tables": {
                "z_roads": {"type": "linestring", "mapping": [{"key": "highway", "values": ["__any__"]}]},
                "a_paths": {"type": "linestring", "mapping": [{"key": "highway", "values": ["path"]}]}
            }}"#,
        )
        .expect("mapping decodes");
        assert_eq!(
            mapping.table_names(),
            ["z_roads", "a_paths"],
            "declaration order survives decoding"
        );
    }

    #[test]
    fn unknown_generalized_source_is_rejected() {
        let err = Mapping::from_json(
            r#"{"tables": {}, "generalized_tables": {"g": {"source": "missing", "tolerance": 1.0}}}"#,
        )
        .expect_err("validation should fail");
        assert!(matches!(err, MappingError::UnknownSource { .. }));
        assert_eq!(
            err.to_string(),
            "generalized table g references unknown source table missing"
        );
    }

    #[test]
    fn enumerate_without_values_is_rejected() {
        let err = Mapping::from_json(
            r#"{"tables": {"t": {
                "type": "point",
                "mapping": [{"key": "place", "values": ["city"]}],
                "columns": [{"name": "rank", "key": "place", "type": "enumerate"}]
            }}}"#,
        )
        .expect_err("validation should fail");
        assert!(matches!(err, MappingError::EmptyEnumeration { .. }));
    }
}
