//! Read-only query surface over the cache.
//!
//! Accepts sets of node/way/relation ids and reports, per id, the cached
//! element or "not found", optionally expanded to direct dependents
//! (`deps`) or fully recursively resolved children (`full`). The CLI
//! serializes the report as JSON.

use serde::Serialize;

use osmforge_core::{ElementId, Node, Relation};

use crate::{CacheError, ElementCache};

/// How much context a query materializes per id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expansion {
    /// The element itself only.
    #[default]
    None,
    /// Plus direct dependents from the reverse indices.
    Deps,
    /// Plus all transitively reachable children.
    Full,
}

/// A batch of ids to look up.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    /// Node ids.
    pub nodes: Vec<ElementId>,
    /// Way ids.
    pub ways: Vec<ElementId>,
    /// Relation ids.
    pub relations: Vec<ElementId>,
    /// Expansion applied to every id.
    pub expansion: Expansion,
}

/// Report for one node id.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    /// Queried id.
    pub id: ElementId,
    /// Coordinate, when cached (tagged or not).
    pub coord: Option<(f64, f64)>,
    /// Tagged node payload, when cached.
    pub node: Option<Node>,
    /// Ways referencing this node (with `deps`/`full`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependent_ways: Option<Vec<ElementId>>,
}

impl NodeReport {
    /// `true` when nothing is cached under this id.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.coord.is_none() && self.node.is_none()
    }
}

/// Report for one way id.
#[derive(Debug, Clone, Serialize)]
pub struct WayReport {
    /// Queried id.
    pub id: ElementId,
    /// The cached way, when present.
    pub way: Option<osmforge_core::Way>,
    /// Relations referencing this way (with `deps`/`full`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependent_relations: Option<Vec<ElementId>>,
    /// Per-node reports for the way's refs (with `full`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<NodeReport>>,
}

/// Report for one relation id.
#[derive(Debug, Clone, Serialize)]
pub struct RelationReport {
    /// Queried id.
    pub id: ElementId,
    /// The cached relation, when present.
    pub relation: Option<Relation>,
    /// Per-way reports for way members (with `full`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ways: Option<Vec<WayReport>>,
}

/// Full query result.
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    /// Node lookups, in request order.
    pub nodes: Vec<NodeReport>,
    /// Way lookups, in request order.
    pub ways: Vec<WayReport>,
    /// Relation lookups, in request order.
    pub relations: Vec<RelationReport>,
}

/// Execute a query batch against the cache.
pub fn run_query(
    cache: &ElementCache,
    request: &QueryRequest,
) -> Result<QueryReport, CacheError> {
    let expansion = request.expansion;
    let mut report = QueryReport {
        nodes: Vec::with_capacity(request.nodes.len()),
        ways: Vec::with_capacity(request.ways.len()),
        relations: Vec::with_capacity(request.relations.len()),
    };
    for id in &request.nodes {
        report.nodes.push(node_report(cache, *id, expansion)?);
    }
    for id in &request.ways {
        report.ways.push(way_report(cache, *id, expansion)?);
    }
    for id in &request.relations {
        report.relations.push(relation_report(cache, *id, expansion)?);
    }
    Ok(report)
}

fn node_report(
    cache: &ElementCache,
    id: ElementId,
    expansion: Expansion,
) -> Result<NodeReport, CacheError> {
    let coord = cache.get_coord(id)?.map(|c| (c.x, c.y));
    let node = cache.get_node(id)?;
    let dependent_ways = match expansion {
        Expansion::None => None,
        Expansion::Deps | Expansion::Full => Some(cache.dependent_ways(id)?),
    };
    Ok(NodeReport {
        id,
        coord,
        node,
        dependent_ways,
    })
}

fn way_report(
    cache: &ElementCache,
    id: ElementId,
    expansion: Expansion,
) -> Result<WayReport, CacheError> {
    let way = cache.get_way(id)?;
    let dependent_relations = match expansion {
        Expansion::None => None,
        Expansion::Deps | Expansion::Full => Some(cache.dependent_relations(id)?),
    };
    let nodes = match (&way, expansion) {
        (Some(way), Expansion::Full) => {
            let mut reports = Vec::with_capacity(way.refs.len());
            for node_id in &way.refs {
                reports.push(node_report(cache, *node_id, Expansion::None)?);
            }
            Some(reports)
        }
        _ => None,
    };
    Ok(WayReport {
        id,
        way,
        dependent_relations,
        nodes,
    })
}

fn relation_report(
    cache: &ElementCache,
    id: ElementId,
    expansion: Expansion,
) -> Result<RelationReport, CacheError> {
    let relation = cache.get_relation(id)?;
    let ways = match (&relation, expansion) {
        (Some(relation), Expansion::Full) => {
            let mut reports = Vec::new();
            for member in relation.way_members() {
                reports.push(way_report(cache, member.id, Expansion::Full)?);
            }
            Some(reports)
        }
        _ => None,
    };
    Ok(RelationReport { id, relation, ways })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use osmforge_core::{tags_from, ElementKind, Member, Node, Tags, Way};
    use rstest::{fixture, rstest};

    #[fixture]
    fn populated() -> (tempfile::TempDir, ElementCache) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        let cache = ElementCache::create_fresh(&path).expect("open cache");
        for (id, lon) in [(1, 0.0_f64), (2, 1.0), (3, 2.0)] {
            cache
                .put_node(&Node { id, lon, lat: 0.0, tags: Tags::new(), metadata: None })
                .expect("put node");
        }
        let way = Way { id: 10, refs: vec![1, 2, 3], tags: Tags::new(), metadata: None };
        cache.put_way(&way).expect("put way");
        cache.add_way_refs(&way).expect("index way");
        cache
            .put_relation(&Relation {
                id: 20,
                members: vec![Member { kind: ElementKind::Way, id: 10, role: String::new() }],
                tags: tags_from([("type", "multipolygon")]),
                metadata: None,
            })
            .expect("put relation");
        cache.add_relation_members(20, [10]).expect("index members");
        (dir, cache)
    }

    #[rstest]
    fn missing_ids_report_not_found(populated: (tempfile::TempDir, ElementCache)) {
        let (_dir, cache) = populated;
        let report = run_query(
            &cache,
            &QueryRequest { nodes: vec![99], ..QueryRequest::default() },
        )
        .expect("query");
        assert!(report.nodes[0].is_missing(), "unknown node is reported missing");
    }

    #[rstest]
    fn deps_expansion_reports_reverse_index(populated: (tempfile::TempDir, ElementCache)) {
        let (_dir, cache) = populated;
        let report = run_query(
            &cache,
            &QueryRequest {
                nodes: vec![2],
                ways: vec![10],
                expansion: Expansion::Deps,
                ..QueryRequest::default()
            },
        )
        .expect("query");
        assert_eq!(report.nodes[0].dependent_ways.as_deref(), Some(&[10][..]));
        assert_eq!(report.ways[0].dependent_relations.as_deref(), Some(&[20][..]));
    }

    #[rstest]
    fn full_expansion_recurses_into_children(populated: (tempfile::TempDir, ElementCache)) {
        let (_dir, cache) = populated;
        let report = run_query(
            &cache,
            &QueryRequest {
                relations: vec![20],
                expansion: Expansion::Full,
                ..QueryRequest::default()
            },
        )
        .expect("query");
        let ways = report.relations[0].ways.as_ref().expect("member ways expanded");
        let nodes = ways[0].nodes.as_ref().expect("way nodes expanded");
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[1].coord, Some((1.0, 0.0)));
    }
}
