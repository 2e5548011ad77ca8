//! OSM element model: nodes, ways, relations and their tags.
//!
//! Coordinates are stored as supplied by the source stream and projected
//! on read by the geometry layer; `x = longitude`, `y = latitude`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier shared by nodes, ways, and relations. The three id spaces
/// overlap; [`crate::IdScheme`] disambiguates them in shared output tables.
pub type ElementId = i64;

/// OSM-style key/value tags. A `BTreeMap` keeps iteration deterministic,
/// which the cache payloads and the tests rely on.
pub type Tags = BTreeMap<String, String>;

/// The three OSM element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// A single coordinate, optionally tagged.
    Node,
    /// An ordered sequence of node references.
    Way,
    /// An ordered sequence of typed, role-carrying members.
    Relation,
}

/// Optional element metadata from the source stream.
///
/// Captured into reserved output columns only when the mapping enables
/// metadata capture; never synthesised from tags.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Object version.
    #[serde(default)]
    pub version: Option<i64>,
    /// Changeset that last touched the element.
    #[serde(default)]
    pub changeset: Option<i64>,
    /// ISO-8601 timestamp of the last edit.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Display name of the last editor.
    #[serde(default)]
    pub user: Option<String>,
    /// Numeric id of the last editor.
    #[serde(default)]
    pub uid: Option<i64>,
}

/// A node: one coordinate plus optional tags.
///
/// A node without tags never produces a feature row by itself; it only
/// supports way geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// OSM node id.
    pub id: ElementId,
    /// Longitude.
    pub lon: f64,
    /// Latitude.
    pub lat: f64,
    /// Tags; empty for pure coordinate nodes.
    #[serde(default)]
    pub tags: Tags,
    /// Source metadata, when the stream carries it.
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl Node {
    /// `true` when the node carries no tags and is geometry support only.
    #[must_use]
    pub fn is_coordinate_only(&self) -> bool {
        self.tags.is_empty()
    }
}

/// A way: an ordered sequence of node references plus optional tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Way {
    /// OSM way id.
    pub id: ElementId,
    /// Referenced node ids, in order. Duplicate interior references are
    /// permitted.
    pub refs: Vec<ElementId>,
    /// Tags; empty ways are still cached for relation members.
    #[serde(default)]
    pub tags: Tags,
    /// Source metadata, when the stream carries it.
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl Way {
    /// A way is closed iff its first and last refs are equal and the
    /// sequence has at least four entries.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.refs.len() >= 4 && self.refs.first() == self.refs.last()
    }
}

/// One relation member: kind, id, and declared role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Member element kind.
    pub kind: ElementKind,
    /// Member element id.
    pub id: ElementId,
    /// Declared role; empty defaults to `outer` for multipolygon-style
    /// relations.
    #[serde(default)]
    pub role: String,
}

impl Member {
    /// `true` when the member is declared as a hole boundary.
    #[must_use]
    pub fn is_inner(&self) -> bool {
        self.role == "inner"
    }

    /// `true` when the member is an outer boundary, including the
    /// unspecified-role default.
    #[must_use]
    pub fn is_outer(&self) -> bool {
        !self.is_inner()
    }
}

/// A relation: ordered members plus optional tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// OSM relation id.
    pub id: ElementId,
    /// Members in declared order.
    pub members: Vec<Member>,
    /// Tags; the `type` tag decides whether polygon assembly applies.
    #[serde(default)]
    pub tags: Tags,
    /// Source metadata, when the stream carries it.
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl Relation {
    /// Way members in declared order.
    pub fn way_members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| m.kind == ElementKind::Way)
    }
}

/// A typed element from the source or change stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Element {
    /// A node record.
    Node(Node),
    /// A way record.
    Way(Way),
    /// A relation record.
    Relation(Relation),
}

impl Element {
    /// The element's id within its own kind's id space.
    #[must_use]
    pub fn id(&self) -> ElementId {
        match self {
            Self::Node(n) => n.id,
            Self::Way(w) => w.id,
            Self::Relation(r) => r.id,
        }
    }

    /// The element's kind.
    #[must_use]
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Node(_) => ElementKind::Node,
            Self::Way(_) => ElementKind::Way,
            Self::Relation(_) => ElementKind::Relation,
        }
    }

    /// The element's tags.
    #[must_use]
    pub fn tags(&self) -> &Tags {
        match self {
            Self::Node(n) => &n.tags,
            Self::Way(w) => &w.tags,
            Self::Relation(r) => &r.tags,
        }
    }
}

/// Build a [`Tags`] map from string pairs. Test and fixture helper.
#[must_use]
pub fn tags_from<const N: usize>(pairs: [(&str, &str); N]) -> Tags {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn way(refs: &[ElementId]) -> Way {
        Way {
            id: 1,
            refs: refs.to_vec(),
            tags: Tags::new(),
            metadata: None,
        }
    }

    #[rstest]
    #[case(&[1, 2, 3, 1], true)]
    #[case(&[1, 2, 3, 4], false)]
    #[case(&[1, 2, 1], false)] // too short to bound an area
    #[case(&[1], false)]
    #[case(&[], false)]
    fn closed_way_requires_four_refs_and_matching_ends(
        #[case] refs: &[ElementId],
        #[case] expected: bool,
    ) {
        assert_eq!(way(refs).is_closed(), expected, "refs: {refs:?}");
    }

    #[rstest]
    #[case("inner", false)]
    #[case("outer", true)]
    #[case("", true)]
    #[case("enclave", true)]
    fn unspecified_member_role_defaults_to_outer(#[case] role: &str, #[case] outer: bool) {
        let member = Member {
            kind: ElementKind::Way,
            id: 7,
            role: role.to_owned(),
        };
        assert_eq!(member.is_outer(), outer);
    }

    #[rstest]
    fn tagless_node_is_coordinate_only() {
        let node = Node {
            id: 3,
            lon: 8.0,
            lat: 53.0,
            tags: Tags::new(),
            metadata: None,
        };
        assert!(node.is_coordinate_only());
    }
}
