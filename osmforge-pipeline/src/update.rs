//! Incremental updates: apply a change stream to the cache and the
//! deployed feature tables.
//!
//! The flow for every change is delete-first: derived rows for the
//! element and everything that depends on it are removed, the cache is
//! mutated, and the affected elements are re-derived once at the end of
//! the batch through the same deriver as full import. All row changes
//! commit in one store transaction.

use std::collections::BTreeSet;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use osmforge_cache::ElementCache;
use osmforge_core::mapping::{Mapping, RelationTagFilter, TagFilter};
use osmforge_core::{Element, ElementId, ElementKind};
use osmforge_store::{FeatureStore, Slot};

use crate::{Deriver, PipelineConfig, PipelineError};

/// What a change record does to its element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// The element is new.
    Create,
    /// The element exists and its tags, coordinates, or members changed.
    Modify,
    /// The element is gone.
    Delete,
}

/// One record of a change stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// What happens to the element.
    pub action: ChangeAction,
    /// The element, in its new state (or last known state for deletes).
    #[serde(flatten)]
    pub element: Element,
}

/// Counters reported by a completed update batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Change records applied.
    pub changes: u64,
    /// Elements re-derived (including dependents of changed elements).
    pub re_derived: u64,
    /// Feature rows written.
    pub features: u64,
}

/// Apply one batch of changes against the tables in `slot`.
///
/// The whole stream is read before anything mutates, so a malformed
/// record aborts the batch with the database untouched.
pub fn run_update(
    cache: &mut ElementCache,
    store: &mut FeatureStore,
    mapping: &Mapping,
    config: &PipelineConfig,
    slot: Slot,
    changes: impl IntoIterator<Item = Result<Change, PipelineError>>,
) -> Result<UpdateSummary, PipelineError> {
    let changes: Vec<Change> = changes.into_iter().collect::<Result<_, _>>()?;
    let deriver = Deriver::new(mapping, config);
    let tag_filter = TagFilter::from_mapping(mapping);
    let relation_filter = RelationTagFilter::from_mapping(mapping);

    // Cache and store transactions are nested so the element mutations
    // and the derived rows land together or not at all.
    let applied = changes.len() as u64;
    let (re_derived, features) = cache.with_batch(|cache| {
        store.with_batch(|batch| {
            let mut state = BatchState::default();
            for change in changes {
                apply_change(cache, batch, slot, &deriver, &tag_filter, &relation_filter, change, &mut state)?;
            }
            // Member ways of deleted or rewritten relations must stand alone
            // again; their rows were already swept above.
            for way_id in state.freed_ways.clone() {
                state.queue(ElementKind::Way, way_id);
            }
            re_derive(cache, batch, slot, &deriver, &state)
        })
    })?;

    info!("applied {applied} changes, re-derived {re_derived} elements, wrote {features} rows");
    Ok(UpdateSummary {
        changes: applied,
        re_derived,
        features,
    })
}

/// Per-batch bookkeeping: which derived rows are already swept and which
/// elements await re-derivation. Both are sets, so overlapping changes in
/// one batch touch each element once.
#[derive(Debug, Default)]
struct BatchState {
    swept: BTreeSet<(ElementKind, ElementId)>,
    pending: BTreeSet<(ElementKind, ElementId)>,
    freed_ways: BTreeSet<ElementId>,
}

impl BatchState {
    fn queue(&mut self, kind: ElementKind, id: ElementId) {
        self.pending.insert((kind, id));
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_change(
    cache: &ElementCache,
    batch: &FeatureStore,
    slot: Slot,
    deriver: &Deriver,
    tag_filter: &TagFilter,
    relation_filter: &RelationTagFilter,
    change: Change,
    state: &mut BatchState,
) -> Result<(), PipelineError> {
    let kind = change.element.kind();
    let id = change.element.id();
    debug!("{:?} {kind:?} {id}", change.action);

    // Dependents must come from the indices as they stand before this
    // change mutates anything; a deleted way no longer knows its parents.
    let mut affected = vec![(kind, id)];
    if kind == ElementKind::Node {
        for way_id in cache.dependent_ways(id)? {
            affected.push((ElementKind::Way, way_id));
            for relation_id in cache.dependent_relations(way_id)? {
                affected.push((ElementKind::Relation, relation_id));
            }
        }
    }
    if kind == ElementKind::Way {
        for relation_id in cache.dependent_relations(id)? {
            affected.push((ElementKind::Relation, relation_id));
        }
    }

    for (affected_kind, affected_id) in &affected {
        if state.swept.insert((*affected_kind, *affected_id)) {
            deriver.delete_rows(batch, slot, *affected_kind, *affected_id)?;
        }
    }

    // A relation that disappears (or is rewritten) releases its member
    // ways from suppression; they re-derive as standalone features.
    if kind == ElementKind::Relation {
        if let Some(old) = cache.get_relation(id)? {
            for member in old.way_members() {
                cache.clear_way_inserted(member.id)?;
                cache.remove_relation_member(member.id, id)?;
                if state.swept.insert((ElementKind::Way, member.id)) {
                    deriver.delete_rows(batch, slot, ElementKind::Way, member.id)?;
                }
                state.freed_ways.insert(member.id);
                // Other relations sharing the member re-derive as well;
                // running before the way, they restore their suppression
                // marks, so a still-subsumed way stays off the tables.
                for relation_id in cache.dependent_relations(member.id)? {
                    if state.swept.insert((ElementKind::Relation, relation_id)) {
                        deriver.delete_rows(batch, slot, ElementKind::Relation, relation_id)?;
                    }
                    state.queue(ElementKind::Relation, relation_id);
                }
            }
        }
    }

    match change.action {
        ChangeAction::Delete => match change.element {
            Element::Node(node) => {
                cache.delete_node(node.id)?;
                cache.delete_coord(node.id)?;
            }
            Element::Way(way) => cache.delete_way(way.id)?,
            Element::Relation(relation) => cache.delete_relation(relation.id)?,
        },
        ChangeAction::Create | ChangeAction::Modify => match change.element {
            Element::Node(mut node) => {
                tag_filter.filter(&mut node.tags);
                // Dropping every tag demotes the node to a bare
                // coordinate: the row goes, the coord stays.
                cache.put_node(&node)?;
            }
            Element::Way(mut way) => {
                tag_filter.filter(&mut way.tags);
                // Old node references leave the reverse index with the old
                // way record; the new ones register on re-derivation.
                cache.delete_way(way.id)?;
                cache.put_way(&way)?;
            }
            Element::Relation(mut relation) => {
                relation_filter.filter(&mut relation);
                if relation.tags.is_empty() {
                    // Unsupported or unmapped type: same treatment as on
                    // full import, the relation is not cached.
                    cache.delete_relation(relation.id)?;
                } else {
                    // The new membership may subsume ways that stood
                    // alone until now; their rows go, and re-derivation
                    // settles who owns the geometry.
                    for member in relation.way_members() {
                        if state.swept.insert((ElementKind::Way, member.id)) {
                            deriver.delete_rows(batch, slot, ElementKind::Way, member.id)?;
                        }
                        state.freed_ways.insert(member.id);
                    }
                    cache.put_relation(&relation)?;
                }
            }
        },
    }

    for (affected_kind, affected_id) in affected {
        state.queue(affected_kind, affected_id);
    }
    Ok(())
}

/// Re-derive every queued element once: relations first so they re-mark
/// their member ways, then ways, then nodes. Elements no longer in the
/// cache simply produce nothing.
fn re_derive(
    cache: &ElementCache,
    batch: &FeatureStore,
    slot: Slot,
    deriver: &Deriver,
    state: &BatchState,
) -> Result<(u64, u64), PipelineError> {
    let mut features = 0u64;
    let mut re_derived = 0u64;
    for kind in [ElementKind::Relation, ElementKind::Way, ElementKind::Node] {
        for (_, id) in state.pending.iter().filter(|(k, _)| *k == kind) {
            re_derived += 1;
            match kind {
                ElementKind::Relation => {
                    if let Some((relation, members)) = cache.full_fetch_relation(*id)? {
                        features += deriver.derive_relation(cache, batch, slot, &relation, &members)?;
                    }
                }
                ElementKind::Way => {
                    if let Some(way) = cache.get_way(*id)? {
                        features += deriver.derive_way(cache, batch, slot, &way)?;
                    }
                }
                ElementKind::Node => {
                    if let Some(node) = cache.get_node(*id)? {
                        features += deriver.derive_node(batch, slot, &node)?;
                    }
                }
            }
        }
    }
    Ok((re_derived, features))
}
