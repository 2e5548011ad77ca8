//! Feature rows as they travel into the store.

use geo::Geometry;

use osmforge_core::mapping::ColumnValue;
use osmforge_core::Tags;

/// One derived feature bound for an output table.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    /// Encoded element id (see `osmforge_core::IdScheme`).
    pub id: i64,
    /// Tag snapshot persisted alongside the derived columns.
    pub tags: Tags,
    /// Mapping key that selected the table.
    pub matched_key: String,
    /// Mapping value that selected the table.
    pub matched_value: String,
    /// Derived columns in table declaration order.
    pub columns: Vec<(String, ColumnValue)>,
    /// Geometry, serialized to WKT on insert.
    pub geometry: Geometry<f64>,
}

/// A feature read back out of the store, geometry still as WKT text.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFeature {
    /// Encoded element id.
    pub id: i64,
    /// Tag snapshot.
    pub tags: Tags,
    /// Mapping key that selected the table.
    pub matched_key: String,
    /// Mapping value that selected the table.
    pub matched_value: String,
    /// Geometry text.
    pub geometry_wkt: String,
}
