//! SQLite-backed element storage and reverse-dependency indices.

use camino::{Utf8Path, Utf8PathBuf};
use geo::Coord;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

use osmforge_core::{
    ElementId, ElementKind, Node, Relation, ResolvedMember, ResolvedWay, Way,
};

use crate::CacheError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS coords (
        id  INTEGER PRIMARY KEY,
        lon REAL NOT NULL,
        lat REAL NOT NULL
    );
    CREATE TABLE IF NOT EXISTS nodes (
        id      INTEGER PRIMARY KEY,
        payload BLOB NOT NULL
    );
    CREATE TABLE IF NOT EXISTS ways (
        id      INTEGER PRIMARY KEY,
        payload BLOB NOT NULL
    );
    CREATE TABLE IF NOT EXISTS relations (
        id      INTEGER PRIMARY KEY,
        payload BLOB NOT NULL
    );
    CREATE TABLE IF NOT EXISTS node_dependents (
        node_id INTEGER NOT NULL,
        way_id  INTEGER NOT NULL,
        PRIMARY KEY (node_id, way_id)
    );
    CREATE TABLE IF NOT EXISTS way_dependents (
        way_id      INTEGER NOT NULL,
        relation_id INTEGER NOT NULL,
        PRIMARY KEY (way_id, relation_id)
    );
    CREATE TABLE IF NOT EXISTS inserted_ways (
        way_id     INTEGER NOT NULL,
        table_name TEXT NOT NULL,
        PRIMARY KEY (way_id, table_name)
    );
";

/// File name of the cache database inside a working directory.
const CACHE_FILE: &str = "elements.sqlite";

/// The disk-backed element cache for one working directory.
///
/// Writes are idempotent: re-putting an id overwrites. Lookups of ids
/// that were never written, or were deleted, return `Ok(None)`.
#[derive(Debug)]
pub struct ElementCache {
    conn: Connection,
    path: Utf8PathBuf,
}

impl ElementCache {
    /// Path of the cache database inside `dir`.
    #[must_use]
    pub fn database_path(dir: &Utf8Path) -> Utf8PathBuf {
        dir.join(CACHE_FILE)
    }

    /// Open (or create) the cache for a working directory.
    pub fn open(dir: &Utf8Path) -> Result<Self, CacheError> {
        osmforge_fs::ensure_dir(dir).map_err(|source| CacheError::CreateDirectory {
            path: dir.to_owned(),
            source,
        })?;
        let path = Self::database_path(dir);
        let conn = Connection::open(path.as_std_path()).map_err(|source| CacheError::Open {
            path: path.clone(),
            source,
        })?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
            .map_err(|source| CacheError::Schema { source })?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|source| CacheError::Schema { source })?;
        conn.execute_batch(SCHEMA)
            .map_err(|source| CacheError::Schema { source })?;
        Ok(Self { conn, path })
    }

    /// Open the cache for a full import, discarding any previous cache in
    /// the same working directory first. An import never inherits stale
    /// elements.
    pub fn create_fresh(dir: &Utf8Path) -> Result<Self, CacheError> {
        let path = Self::database_path(dir);
        if osmforge_fs::file_exists(&path) {
            debug!("discarding previous element cache at {path}");
            osmforge_fs::remove_file_if_exists(&path)
                .map_err(|source| CacheError::Discard { path: path.clone(), source })?;
        }
        Self::open(dir)
    }

    /// Location of the backing database file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Begin a batch; writes inside the closure commit together or not at
    /// all. The error type only needs to absorb [`CacheError`], so callers
    /// can thread their own error through.
    pub fn with_batch<T, E>(&mut self, f: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<CacheError>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(CacheError::from)?;
        match f(self) {
            Ok(value) => {
                self.conn
                    .execute_batch("COMMIT")
                    .map_err(CacheError::from)?;
                Ok(value)
            }
            Err(err) => {
                // Preserve the original error even if rollback also fails.
                let _rollback = self.conn.execute_batch("ROLLBACK");
                Err(err)
            }
        }
    }

    // --- nodes -----------------------------------------------------------

    /// Store a node. The coordinate is always cached; the tagged payload
    /// only when tags remain after filtering, so pure coordinate nodes
    /// stay cheap.
    pub fn put_node(&self, node: &Node) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO coords (id, lon, lat) VALUES (?1, ?2, ?3)",
            params![node.id, node.lon, node.lat],
        )?;
        if node.tags.is_empty() {
            // Overwrite semantics: a re-put without tags demotes the node
            // to a bare coordinate.
            self.conn
                .execute("DELETE FROM nodes WHERE id = ?1", params![node.id])?;
        } else {
            let payload = encode(ElementKind::Node, node.id, node)?;
            self.conn.execute(
                "INSERT OR REPLACE INTO nodes (id, payload) VALUES (?1, ?2)",
                params![node.id, payload],
            )?;
        }
        Ok(())
    }

    /// Fetch a tagged node. `Ok(None)` when the id is unknown or holds a
    /// coordinate only.
    pub fn get_node(&self, id: ElementId) -> Result<Option<Node>, CacheError> {
        self.get_payload("nodes", ElementKind::Node, id)
    }

    /// Fetch a coordinate, whether or not the node carries tags.
    pub fn get_coord(&self, id: ElementId) -> Result<Option<Coord<f64>>, CacheError> {
        let coord = self
            .conn
            .query_row(
                "SELECT lon, lat FROM coords WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Coord {
                        x: row.get(0)?,
                        y: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(coord)
    }

    /// Delete a node's tagged payload but keep its coordinate.
    pub fn delete_node(&self, id: ElementId) -> Result<(), CacheError> {
        self.conn
            .execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Delete a node entirely, coordinate included.
    pub fn delete_coord(&self, id: ElementId) -> Result<(), CacheError> {
        self.conn
            .execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        self.conn
            .execute("DELETE FROM coords WHERE id = ?1", params![id])?;
        Ok(())
    }

    // --- ways ------------------------------------------------------------

    /// Store a way.
    pub fn put_way(&self, way: &Way) -> Result<(), CacheError> {
        let payload = encode(ElementKind::Way, way.id, way)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO ways (id, payload) VALUES (?1, ?2)",
            params![way.id, payload],
        )?;
        Ok(())
    }

    /// Fetch a way.
    pub fn get_way(&self, id: ElementId) -> Result<Option<Way>, CacheError> {
        self.get_payload("ways", ElementKind::Way, id)
    }

    /// Delete a way and remove it from the node→way index for every node
    /// it referenced.
    pub fn delete_way(&self, id: ElementId) -> Result<(), CacheError> {
        self.conn
            .execute("DELETE FROM ways WHERE id = ?1", params![id])?;
        self.conn.execute(
            "DELETE FROM node_dependents WHERE way_id = ?1",
            params![id],
        )?;
        self.conn
            .execute("DELETE FROM inserted_ways WHERE way_id = ?1", params![id])?;
        Ok(())
    }

    // --- relations -------------------------------------------------------

    /// Store a relation.
    pub fn put_relation(&self, relation: &Relation) -> Result<(), CacheError> {
        let payload = encode(ElementKind::Relation, relation.id, relation)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO relations (id, payload) VALUES (?1, ?2)",
            params![relation.id, payload],
        )?;
        Ok(())
    }

    /// Fetch a relation.
    pub fn get_relation(&self, id: ElementId) -> Result<Option<Relation>, CacheError> {
        self.get_payload("relations", ElementKind::Relation, id)
    }

    /// Delete a relation and remove it from the way→relation index for
    /// every way member.
    pub fn delete_relation(&self, id: ElementId) -> Result<(), CacheError> {
        self.conn
            .execute("DELETE FROM relations WHERE id = ?1", params![id])?;
        self.conn.execute(
            "DELETE FROM way_dependents WHERE relation_id = ?1",
            params![id],
        )?;
        Ok(())
    }

    // --- reverse-dependency indices --------------------------------------

    /// Record that `way` references each of its nodes.
    pub fn add_way_refs(&self, way: &Way) -> Result<(), CacheError> {
        self.add_node_dependents(way.id, &way.refs)
    }

    /// Record that the way with `way_id` references each node in `refs`.
    pub fn add_node_dependents(
        &self,
        way_id: ElementId,
        refs: &[ElementId],
    ) -> Result<(), CacheError> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR IGNORE INTO node_dependents (node_id, way_id) VALUES (?1, ?2)",
        )?;
        for node_id in refs {
            stmt.execute(params![node_id, way_id])?;
        }
        Ok(())
    }

    /// Record that `relation_id` references each way in `member_ways`.
    pub fn add_relation_members(
        &self,
        relation_id: ElementId,
        member_ways: impl IntoIterator<Item = ElementId>,
    ) -> Result<(), CacheError> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR IGNORE INTO way_dependents (way_id, relation_id) VALUES (?1, ?2)",
        )?;
        for way_id in member_ways {
            stmt.execute(params![way_id, relation_id])?;
        }
        Ok(())
    }

    /// Drop one way→relation index entry.
    pub fn remove_relation_member(
        &self,
        way_id: ElementId,
        relation_id: ElementId,
    ) -> Result<(), CacheError> {
        self.conn.execute(
            "DELETE FROM way_dependents WHERE way_id = ?1 AND relation_id = ?2",
            params![way_id, relation_id],
        )?;
        Ok(())
    }

    /// Ways referencing a node.
    pub fn dependent_ways(&self, node_id: ElementId) -> Result<Vec<ElementId>, CacheError> {
        self.collect_ids(
            "SELECT way_id FROM node_dependents WHERE node_id = ?1 ORDER BY way_id",
            node_id,
        )
    }

    /// Relations referencing a way.
    pub fn dependent_relations(&self, way_id: ElementId) -> Result<Vec<ElementId>, CacheError> {
        self.collect_ids(
            "SELECT relation_id FROM way_dependents WHERE way_id = ?1 ORDER BY relation_id",
            way_id,
        )
    }

    /// Parents of an element through the reverse indices: ways for a node,
    /// relations for a way. Relations have no parents.
    pub fn dependents(
        &self,
        kind: ElementKind,
        id: ElementId,
    ) -> Result<Vec<ElementId>, CacheError> {
        match kind {
            ElementKind::Node => self.dependent_ways(id),
            ElementKind::Way => self.dependent_relations(id),
            ElementKind::Relation => Ok(Vec::new()),
        }
    }

    // --- inserted-ways dedup set -----------------------------------------

    /// Mark a way as already inserted into `table` via a relation.
    pub fn mark_way_inserted(&self, way_id: ElementId, table: &str) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO inserted_ways (way_id, table_name) VALUES (?1, ?2)",
            params![way_id, table],
        )?;
        Ok(())
    }

    /// Whether a relation already produced this way's feature in `table`.
    pub fn is_way_inserted(&self, way_id: ElementId, table: &str) -> Result<bool, CacheError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM inserted_ways WHERE way_id = ?1 AND table_name = ?2",
                params![way_id, table],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Forget all relation-insertion marks for a way.
    pub fn clear_way_inserted(&self, way_id: ElementId) -> Result<(), CacheError> {
        self.conn
            .execute("DELETE FROM inserted_ways WHERE way_id = ?1", params![way_id])?;
        Ok(())
    }

    // --- full fetch ------------------------------------------------------

    /// Resolve a way's refs to coordinates. `Ok(None)` when any referenced
    /// coordinate is missing from the cache.
    pub fn resolve_way(&self, way: &Way) -> Result<Option<ResolvedWay>, CacheError> {
        let mut coords = Vec::with_capacity(way.refs.len());
        for node_id in &way.refs {
            match self.get_coord(*node_id)? {
                Some(coord) => coords.push(coord),
                None => return Ok(None),
            }
        }
        Ok(Some(ResolvedWay {
            id: way.id,
            refs: way.refs.clone(),
            tags: way.tags.clone(),
            coords,
        }))
    }

    /// Fetch a way with its coordinates materialized.
    pub fn full_fetch_way(&self, id: ElementId) -> Result<Option<ResolvedWay>, CacheError> {
        match self.get_way(id)? {
            Some(way) => self.resolve_way(&way),
            None => Ok(None),
        }
    }

    /// Fetch a relation's way members with coordinates materialized.
    ///
    /// Members whose way or coordinates are missing are skipped; the
    /// assembler works from the members that did resolve. `Ok(None)` when
    /// the relation itself is unknown.
    pub fn full_fetch_relation(
        &self,
        id: ElementId,
    ) -> Result<Option<(Relation, Vec<ResolvedMember>)>, CacheError> {
        let Some(relation) = self.get_relation(id)? else {
            return Ok(None);
        };
        let mut members = Vec::new();
        for member in relation.way_members() {
            let Some(way) = self.get_way(member.id)? else {
                continue;
            };
            let Some(resolved) = self.resolve_way(&way)? else {
                continue;
            };
            members.push(ResolvedMember {
                role: member.role.clone(),
                way: resolved,
            });
        }
        Ok(Some((relation, members)))
    }

    // --- maintenance ------------------------------------------------------

    /// Empty every cache namespace. A full import starts here.
    pub fn truncate(&self) -> Result<(), CacheError> {
        self.conn.execute_batch(
            "DELETE FROM coords;
             DELETE FROM nodes;
             DELETE FROM ways;
             DELETE FROM relations;
             DELETE FROM node_dependents;
             DELETE FROM way_dependents;
             DELETE FROM inserted_ways;",
        )?;
        Ok(())
    }

    // --- internals --------------------------------------------------------

    fn get_payload<T: DeserializeOwned>(
        &self,
        table: &str,
        kind: ElementKind,
        id: ElementId,
    ) -> Result<Option<T>, CacheError> {
        let sql = format!("SELECT payload FROM {table} WHERE id = ?1");
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row(&sql, params![id], |row| row.get(0))
            .optional()?;
        payload
            .map(|bytes| {
                bincode::deserialize(&bytes)
                    .map_err(|source| CacheError::Decode { kind, id, source })
            })
            .transpose()
    }

    fn collect_ids(&self, sql: &str, id: ElementId) -> Result<Vec<ElementId>, CacheError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![id], |row| row.get(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}

fn encode<T: Serialize>(kind: ElementKind, id: ElementId, value: &T) -> Result<Vec<u8>, CacheError> {
    bincode::serialize(value).map_err(|source| CacheError::Encode { kind, id, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmforge_core::{tags_from, Member, Tags};
    use rstest::{fixture, rstest};

    #[fixture]
    fn cache() -> (tempfile::TempDir, ElementCache) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        let cache = ElementCache::create_fresh(&path).expect("open cache");
        (dir, cache)
    }

    fn node(id: ElementId, lon: f64, lat: f64, tags: Tags) -> Node {
        Node { id, lon, lat, tags, metadata: None }
    }

    fn way(id: ElementId, refs: &[ElementId]) -> Way {
        Way { id, refs: refs.to_vec(), tags: Tags::new(), metadata: None }
    }

    #[rstest]
    fn way_round_trips_its_ref_sequence(cache: (tempfile::TempDir, ElementCache)) {
        let (_dir, cache) = cache;
        let stored = Way {
            tags: tags_from([("highway", "service")]),
            ..way(81, &[5, 6, 6, 7])
        };
        cache.put_way(&stored).expect("put way");
        let loaded = cache.get_way(81).expect("get way").expect("way present");
        assert_eq!(loaded, stored, "refs and tags survive the round trip");
    }

    #[rstest]
    fn missing_and_tagless_nodes_are_distinguishable(cache: (tempfile::TempDir, ElementCache)) {
        let (_dir, cache) = cache;
        cache
            .put_node(&node(11, 8.1, 53.2, Tags::new()))
            .expect("put coordinate node");

        assert!(cache.get_node(11).expect("lookup").is_none(), "no tagged payload");
        assert!(cache.get_coord(11).expect("lookup").is_some(), "coordinate exists");

        assert!(cache.get_node(12).expect("lookup").is_none());
        assert!(cache.get_coord(12).expect("lookup").is_none(), "never written");
    }

    #[rstest]
    fn re_put_overwrites_instead_of_duplicating(cache: (tempfile::TempDir, ElementCache)) {
        let (_dir, cache) = cache;
        cache.put_way(&way(5, &[1, 2])).expect("first put");
        cache.put_way(&way(5, &[3, 4])).expect("second put");
        let loaded = cache.get_way(5).expect("get").expect("present");
        assert_eq!(loaded.refs, vec![3, 4]);
    }

    #[rstest]
    fn deleting_a_way_clears_its_node_index_entries(cache: (tempfile::TempDir, ElementCache)) {
        let (_dir, cache) = cache;
        let w = way(40, &[1, 2, 3]);
        cache.put_way(&w).expect("put way");
        cache.add_way_refs(&w).expect("index refs");
        assert_eq!(cache.dependent_ways(2).expect("deps"), vec![40]);

        cache.delete_way(40).expect("delete way");
        assert!(cache.dependent_ways(2).expect("deps").is_empty());
        assert!(cache.get_way(40).expect("get").is_none());
    }

    #[rstest]
    fn deleting_a_relation_clears_its_way_index_entries(cache: (tempfile::TempDir, ElementCache)) {
        let (_dir, cache) = cache;
        cache.add_relation_members(90, [7, 8]).expect("index members");
        assert_eq!(cache.dependent_relations(7).expect("deps"), vec![90]);
        cache.delete_relation(90).expect("delete relation");
        assert!(cache.dependent_relations(7).expect("deps").is_empty());
    }

    #[rstest]
    fn full_fetch_resolves_transitive_children(cache: (tempfile::TempDir, ElementCache)) {
        let (_dir, cache) = cache;
        for (id, lon) in [(1, 0.0), (2, 1.0), (3, 2.0)] {
            cache.put_node(&node(id, lon, 0.0, Tags::new())).expect("put node");
        }
        cache.put_way(&way(30, &[1, 2, 3])).expect("put way");
        cache
            .put_relation(&Relation {
                id: 70,
                members: vec![Member {
                    kind: ElementKind::Way,
                    id: 30,
                    role: "outer".to_owned(),
                }],
                tags: tags_from([("type", "multipolygon")]),
                metadata: None,
            })
            .expect("put relation");

        let (_, members) = cache
            .full_fetch_relation(70)
            .expect("fetch")
            .expect("relation present");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].way.coords.len(), 3);
        assert_eq!(members[0].way.coords[2], Coord { x: 2.0, y: 0.0 });
    }

    #[rstest]
    fn unresolvable_way_reports_none(cache: (tempfile::TempDir, ElementCache)) {
        let (_dir, cache) = cache;
        cache.put_node(&node(1, 0.0, 0.0, Tags::new())).expect("put node");
        cache.put_way(&way(31, &[1, 99])).expect("put way");
        assert!(cache.full_fetch_way(31).expect("fetch").is_none());
    }

    #[rstest]
    fn failed_batch_rolls_back_element_writes(cache: (tempfile::TempDir, ElementCache)) {
        let (_dir, mut cache) = cache;
        cache.put_way(&way(5, &[1, 2])).expect("seed way");

        let result: Result<(), CacheError> = cache.with_batch(|c| {
            c.put_way(&way(5, &[8, 9]))?;
            c.put_way(&way(6, &[1, 2]))?;
            Err(CacheError::Schema {
                source: rusqlite::Error::InvalidQuery,
            })
        });
        assert!(result.is_err(), "expected the batch rejected");

        let kept = cache.get_way(5).expect("get").expect("way present");
        assert_eq!(kept.refs, vec![1, 2], "expected the pre-batch state back");
        assert!(cache.get_way(6).expect("get").is_none(), "expected the new way rolled back");
    }

    #[rstest]
    fn fresh_import_discards_previous_cache(cache: (tempfile::TempDir, ElementCache)) {
        let (dir, cache) = cache;
        cache.put_way(&way(1, &[1, 2])).expect("put way");
        drop(cache);

        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8");
        let fresh = ElementCache::create_fresh(&path).expect("reopen fresh");
        assert!(fresh.get_way(1).expect("get").is_none(), "no stale elements survive");
    }
}
