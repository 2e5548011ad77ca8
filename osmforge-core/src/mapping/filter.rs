//! Tag filtering applied before elements enter the cache.
//!
//! Only keys the mapping can ever evaluate are worth caching; everything
//! else is dropped on write, which also turns mapping-irrelevant nodes
//! into bare coordinates. Relations additionally drop all tags when their
//! `type` is unsupported, so they never produce rows on import or update.

use std::collections::BTreeSet;

use crate::{Relation, Tags};

use super::Mapping;

/// Keeps only tag keys the mapping can evaluate.
#[derive(Debug, Clone)]
pub struct TagFilter {
    keys: BTreeSet<String>,
}

impl TagFilter {
    /// Build the filter from every key the mapping mentions: entry keys,
    /// column keys, filter keys, plus `name`, `type`, and `area`.
    #[must_use]
    pub fn from_mapping(mapping: &Mapping) -> Self {
        let mut keys: BTreeSet<String> =
            ["name", "type", "area"].iter().map(|k| (*k).to_owned()).collect();
        for table in mapping.tables.values() {
            for entry in &table.mapping {
                keys.insert(entry.key.clone());
            }
            for column in &table.columns {
                if let Some(key) = &column.key {
                    keys.insert(key.clone());
                }
            }
            keys.extend(table.filters.require.keys().cloned());
            keys.extend(table.filters.reject.keys().cloned());
        }
        Self { keys }
    }

    /// Drop tags whose key the mapping never evaluates.
    pub fn filter(&self, tags: &mut Tags) {
        tags.retain(|key, _| self.keys.contains(key));
    }
}

/// Relation-specific filter: unsupported relation types lose all tags.
#[derive(Debug, Clone)]
pub struct RelationTagFilter {
    tags: TagFilter,
    supported_types: BTreeSet<String>,
}

impl RelationTagFilter {
    /// Build from the mapping's polygon tables' `relation_types`.
    #[must_use]
    pub fn from_mapping(mapping: &Mapping) -> Self {
        Self {
            tags: TagFilter::from_mapping(mapping),
            supported_types: mapping.supported_relation_types().into_iter().collect(),
        }
    }

    /// Filter a relation's tags in place; clears them entirely when the
    /// relation type is unsupported.
    pub fn filter(&self, relation: &mut Relation) {
        let supported = relation
            .tags
            .get("type")
            .is_some_and(|t| self.supported_types.contains(t));
        if supported {
            self.tags.filter(&mut relation.tags);
        } else {
            relation.tags.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_mapping;
    use super::*;
    use crate::element::tags_from;

    #[test]
    fn irrelevant_keys_are_dropped() {
        let filter = TagFilter::from_mapping(&test_mapping::sample());
        let mut tags = tags_from([
            ("highway", "primary"),
            ("name", "Ring"),
            ("source", "survey"),
            ("note", "fixme"),
        ]);
        filter.filter(&mut tags);
        assert_eq!(tags, tags_from([("highway", "primary"), ("name", "Ring")]));
    }

    #[test]
    fn unsupported_relation_loses_all_tags() {
        let filter = RelationTagFilter::from_mapping(&test_mapping::sample());
        let mut relation = Relation {
            id: 1,
            members: Vec::new(),
            tags: tags_from([("type", "route"), ("landuse", "forest")]),
            metadata: None,
        };
        filter.filter(&mut relation);
        assert!(relation.tags.is_empty(), "route relation keeps no tags");

        let mut multipolygon = Relation {
            id: 2,
            members: Vec::new(),
            tags: tags_from([("type", "multipolygon"), ("landuse", "forest"), ("x", "y")]),
            metadata: None,
        };
        filter.filter(&mut multipolygon);
        assert_eq!(
            multipolygon.tags,
            tags_from([("type", "multipolygon"), ("landuse", "forest")])
        );
    }
}
