//! Derived column assembly for feature rows.

use crate::{Metadata, Tags};

use super::{Column, ColumnKind, Match, Table};

/// A derived column value, store-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// SQL NULL.
    Null,
    /// Integer column.
    Integer(i64),
    /// Boolean column.
    Bool(bool),
    /// Text column.
    Text(String),
}

/// Everything a column needs to derive its value for one row.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    /// The element's tag snapshot.
    pub tags: &'a Tags,
    /// The mapping entry that routed the element here.
    pub matched: &'a Match,
    /// Source metadata, if the stream carried it.
    pub metadata: Option<&'a Metadata>,
    /// Whether reserved metadata columns are populated at all.
    pub capture_metadata: bool,
}

/// Derive all declared columns of `table` for one row, in declaration
/// order. Id and geometry columns are composed by the store, not here.
#[must_use]
pub fn build_columns(table: &Table, ctx: &RowContext<'_>) -> Vec<(String, ColumnValue)> {
    table
        .columns
        .iter()
        .map(|column| (column.name.clone(), column_value(column, ctx)))
        .collect()
}

fn column_value(column: &Column, ctx: &RowContext<'_>) -> ColumnValue {
    let tag = |key: &Option<String>| -> Option<&str> {
        key.as_ref().and_then(|k| ctx.tags.get(k)).map(String::as_str)
    };
    match &column.kind {
        ColumnKind::String => ColumnValue::Text(tag(&column.key).unwrap_or_default().to_owned()),
        ColumnKind::Bool => ColumnValue::Bool(matches!(
            tag(&column.key),
            Some("yes" | "true" | "1")
        )),
        ColumnKind::Integer => tag(&column.key)
            .and_then(|v| v.parse::<i64>().ok())
            .map_or(ColumnValue::Null, ColumnValue::Integer),
        ColumnKind::MappingKey => ColumnValue::Text(ctx.matched.key.clone()),
        ColumnKind::MappingValue => ColumnValue::Text(ctx.matched.value.clone()),
        ColumnKind::Enumerate => {
            let rank = tag(&column.key)
                .and_then(|v| column.args.values.iter().position(|c| c == v))
                .map_or(0, |idx| idx + 1);
            ColumnValue::Integer(i64::try_from(rank).unwrap_or(0))
        }
        ColumnKind::Version => metadata_int(ctx, |m| m.version),
        ColumnKind::Changeset => metadata_int(ctx, |m| m.changeset),
        ColumnKind::Uid => metadata_int(ctx, |m| m.uid),
        ColumnKind::Timestamp => metadata_text(ctx, |m| m.timestamp.clone()),
        ColumnKind::User => metadata_text(ctx, |m| m.user.clone()),
    }
}

// Reserved metadata columns are empty when capture is disabled. They are
// never backfilled from look-alike tags, so a genuine `osm_user` tag (or a
// hand-set `created_by`) stays a tag and nothing more.
fn metadata_int(ctx: &RowContext<'_>, get: impl Fn(&Metadata) -> Option<i64>) -> ColumnValue {
    if !ctx.capture_metadata {
        return ColumnValue::Text(String::new());
    }
    ctx.metadata
        .and_then(get)
        .map_or(ColumnValue::Null, ColumnValue::Integer)
}

fn metadata_text(ctx: &RowContext<'_>, get: impl Fn(&Metadata) -> Option<String>) -> ColumnValue {
    if !ctx.capture_metadata {
        return ColumnValue::Text(String::new());
    }
    ctx.metadata
        .and_then(|m| get(m))
        .map_or(ColumnValue::Text(String::new()), ColumnValue::Text)
}
