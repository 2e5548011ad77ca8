//! SQLite-backed output tables for derived features.

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use wkt::ToWkt;

use osmforge_core::mapping::{ColumnKind, Mapping, Table};
use osmforge_core::Tags;

use crate::{FeatureRow, StoreError, StoredFeature};

/// File name of the feature database inside a working directory.
const STORE_FILE: &str = "features.sqlite";

/// Table-name prefixes that stand in for deployment schemas.
///
/// Production tables carry the bare mapping name; the other slots are
/// prefixed. Rotating a slot is a rename, so deployment is atomic within
/// one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Freshly imported tables, not yet serving reads.
    Import,
    /// The live tables.
    Production,
    /// The previous production generation, kept for revert.
    Backup,
}

impl Slot {
    /// Qualified table name for `table` in this slot.
    #[must_use]
    pub fn qualify(self, table: &str) -> String {
        match self {
            Self::Import => format!("import_{table}"),
            Self::Production => table.to_owned(),
            Self::Backup => format!("backup_{table}"),
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Import => "import",
            Self::Production => "production",
            Self::Backup => "backup",
        })
    }
}

/// The disk-backed feature store for one working directory.
#[derive(Debug)]
pub struct FeatureStore {
    pub(crate) conn: Connection,
    path: Utf8PathBuf,
}

impl FeatureStore {
    /// Path of the feature database inside `dir`.
    #[must_use]
    pub fn database_path(dir: &Utf8Path) -> Utf8PathBuf {
        dir.join(STORE_FILE)
    }

    /// Open (or create) the feature database in a working directory.
    pub fn open(dir: &Utf8Path) -> Result<Self, StoreError> {
        osmforge_fs::ensure_dir(dir).map_err(|source| StoreError::CreateDirectory {
            path: dir.to_owned(),
            source,
        })?;
        let path = Self::database_path(dir);
        let conn = Connection::open(path.as_std_path()).map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn, path })
    }

    /// Location of the backing database file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// (Re)create every output table of the mapping in the import slot.
    /// Prior import-slot tables are dropped; production and backup slots
    /// are untouched.
    pub fn create_import_tables(&self, mapping: &Mapping) -> Result<(), StoreError> {
        for (name, table) in mapping_tables(mapping) {
            let qualified = Slot::Import.qualify(&name);
            self.conn
                .execute_batch(&format!("DROP TABLE IF EXISTS \"{qualified}\""))
                .map_err(|source| StoreError::Schema {
                    table: qualified.clone(),
                    source,
                })?;
            self.conn
                .execute_batch(&table_ddl(&qualified, table))
                .map_err(|source| StoreError::Schema {
                    table: qualified,
                    source,
                })?;
        }
        Ok(())
    }

    /// Begin a batch; inserts and deletes inside the closure commit
    /// together or not at all. The error type only needs to absorb
    /// [`StoreError`], so callers can thread their own error through.
    pub fn with_batch<T, E>(&mut self, f: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(StoreError::from)?;
        match f(self) {
            Ok(value) => {
                self.conn
                    .execute_batch("COMMIT")
                    .map_err(StoreError::from)?;
                Ok(value)
            }
            Err(error) => {
                // Preserve the original error even if rollback also fails.
                let _rollback = self.conn.execute_batch("ROLLBACK");
                Err(error)
            }
        }
    }

    /// Insert one derived feature into `table` in `slot`.
    pub fn insert(&self, slot: Slot, table: &str, row: &FeatureRow) -> Result<(), StoreError> {
        let tags_json = serde_json::to_string(&row.tags)
            .map_err(|source| StoreError::EncodeTags { id: row.id, source })?;
        let mut names = vec![
            "osm_id".to_owned(),
            "tags".to_owned(),
            "matched_key".to_owned(),
            "matched_value".to_owned(),
            "geometry".to_owned(),
        ];
        let mut values = vec![
            Value::Integer(row.id),
            Value::Text(tags_json),
            Value::Text(row.matched_key.clone()),
            Value::Text(row.matched_value.clone()),
            Value::Text(row.geometry.wkt_string()),
        ];
        for (name, value) in &row.columns {
            names.push(name.clone());
            values.push(column_param(value));
        }
        let quoted: Vec<String> = names.iter().map(|n| format!("\"{n}\"")).collect();
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            slot.qualify(table),
            quoted.join(", "),
            placeholders.join(", ")
        );
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    /// Delete every row for an encoded element id from `table` in `slot`.
    /// Returns the number of rows removed (an element can leave several
    /// polygons in one table).
    pub fn delete(&self, slot: Slot, table: &str, id: i64) -> Result<usize, StoreError> {
        let sql = format!(
            "DELETE FROM \"{}\" WHERE osm_id = ?1",
            slot.qualify(table)
        );
        Ok(self.conn.execute(&sql, params![id])?)
    }

    /// All rows of `table` in `slot`, ordered by id.
    pub fn features(&self, slot: Slot, table: &str) -> Result<Vec<StoredFeature>, StoreError> {
        let sql = format!(
            "SELECT osm_id, tags, matched_key, matched_value, geometry \
             FROM \"{}\" ORDER BY osm_id",
            slot.qualify(table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut features = Vec::new();
        for row in rows {
            let (id, tags_json, matched_key, matched_value, geometry_wkt) = row?;
            let tags: Tags = serde_json::from_str(&tags_json)
                .map_err(|source| StoreError::DecodeTags { id, source })?;
            features.push(StoredFeature {
                id,
                tags,
                matched_key,
                matched_value,
                geometry_wkt,
            });
        }
        Ok(features)
    }

    /// Number of rows in `table` in `slot`.
    pub fn row_count(&self, slot: Slot, table: &str) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", slot.qualify(table));
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// A derived column's value for one feature, rendered as text.
    /// `Ok(None)` when no row carries the id.
    pub fn column_text(
        &self,
        slot: Slot,
        table: &str,
        id: i64,
        column: &str,
    ) -> Result<Option<String>, StoreError> {
        let sql = format!(
            "SELECT CAST(\"{column}\" AS TEXT) FROM \"{}\" WHERE osm_id = ?1",
            slot.qualify(table)
        );
        Ok(self
            .conn
            .query_row(&sql, params![id], |row| row.get(0))
            .optional()?)
    }

    /// Whether `table` exists in `slot`.
    pub fn table_exists(&self, slot: Slot, table: &str) -> Result<bool, StoreError> {
        Ok(table_present(&self.conn, &slot.qualify(table))?)
    }
}

pub(crate) fn table_present(conn: &Connection, qualified: &str) -> Result<bool, rusqlite::Error> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![qualified],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Every output table paired with the column layout it uses. Generalized
/// tables borrow their source table's columns.
fn mapping_tables(mapping: &Mapping) -> Vec<(String, &Table)> {
    let mut tables: Vec<(String, &Table)> = mapping
        .tables
        .iter()
        .map(|(name, table)| (name.to_owned(), table))
        .collect();
    for (name, generalized) in &mapping.generalized_tables {
        if let Some(source) = mapping.tables.get(&generalized.source) {
            tables.push((name.clone(), source));
        }
    }
    tables
}

fn table_ddl(qualified: &str, table: &Table) -> String {
    let mut sql = format!(
        "CREATE TABLE \"{qualified}\" (\n    \
         osm_id        INTEGER NOT NULL,\n    \
         tags          TEXT NOT NULL,\n    \
         matched_key   TEXT NOT NULL,\n    \
         matched_value TEXT NOT NULL,\n    \
         geometry      TEXT NOT NULL"
    );
    for column in &table.columns {
        sql.push_str(",\n    \"");
        sql.push_str(&column.name);
        sql.push_str("\" ");
        sql.push_str(sql_type(&column.kind));
    }
    sql.push_str("\n);\n");
    sql.push_str(&format!(
        "CREATE INDEX \"{qualified}_osm_id_idx\" ON \"{qualified}\" (osm_id);"
    ));
    sql
}

// Advisory only: SQLite stores whatever arrives, and metadata columns hold
// an empty string when capture is disabled.
fn sql_type(kind: &ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Bool
        | ColumnKind::Integer
        | ColumnKind::Enumerate
        | ColumnKind::Version
        | ColumnKind::Changeset
        | ColumnKind::Uid => "INTEGER",
        ColumnKind::String
        | ColumnKind::MappingKey
        | ColumnKind::MappingValue
        | ColumnKind::Timestamp
        | ColumnKind::User => "TEXT",
    }
}

fn column_param(value: &osmforge_core::mapping::ColumnValue) -> Value {
    use osmforge_core::mapping::ColumnValue;
    match value {
        ColumnValue::Null => Value::Null,
        ColumnValue::Integer(i) => Value::Integer(*i),
        ColumnValue::Bool(b) => Value::Integer(i64::from(*b)),
        ColumnValue::Text(s) => Value::Text(s.clone()),
    }
}
