//! # Store Seam
//!
//! The read and write contract every backend implements, plus the
//! deterministic in-memory backend.
//!
//! Reads (`BomRead`) are the only thing resolution depends on. Writes go
//! through `BomStore::apply` as a batch of `Mutation`s: a batch is either
//! applied in full or not at all. Structural integrity (dangling references,
//! duplicate names or links, deleting something still referenced) is checked
//! here; the lifecycle state machine lives in `lifecycle`.
//!
//! All data structures use `BTreeMap` for deterministic ordering.

use crate::types::revision_label;
use crate::{
    BomError, ClassificationCode, Component, ComponentId, LifecycleViolation, Link, LinkId,
    Revision, RevisionId, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// READ TRAIT
// =============================================================================

/// Read access to components, revisions and links.
///
/// All fallible operations return `Result<T, BomError>` to support both
/// in-memory and persistent storage backends uniformly.
pub trait BomRead {
    /// Lookup a component by id.
    fn get_component(&self, id: ComponentId) -> Result<Option<Component>, BomError>;

    /// Lookup a revision by id.
    fn get_revision(&self, id: RevisionId) -> Result<Option<Revision>, BomError>;

    /// All revisions of a component, ascending by (issue timestamp, id).
    fn get_revisions(&self, component: ComponentId) -> Result<Vec<Revision>, BomError>;

    /// Outgoing links of a revision, ascending by link id.
    fn get_links(&self, source: RevisionId) -> Result<Vec<Link>, BomError>;

    /// Lookup a link by id.
    fn get_link(&self, id: LinkId) -> Result<Option<Link>, BomError>;

    /// All components, ascending by id.
    fn components(&self) -> Result<Vec<Component>, BomError>;

    /// Find a component by (name, classification), name compared case-insensitively.
    fn find_component(
        &self,
        name: &str,
        classification: &ClassificationCode,
    ) -> Result<Option<Component>, BomError>;

    /// Links whose target is the given component, ascending by link id.
    fn incoming_links(&self, target: ComponentId) -> Result<Vec<Link>, BomError>;

    /// Record counts.
    fn counts(&self) -> Result<StoreCounts, BomError>;

    /// The next identifier `allocate_id` would hand out.
    fn next_id(&self) -> u64;

    /// The latest revision of a component: greatest (issue timestamp, id).
    fn get_latest_revision(&self, component: ComponentId) -> Result<Option<Revision>, BomError> {
        Ok(self.get_revisions(component)?.pop())
    }

    /// Whether a revision is its component's latest.
    fn is_latest(&self, revision: &Revision) -> Result<bool, BomError> {
        Ok(self
            .get_latest_revision(revision.component)?
            .is_some_and(|latest| latest.id == revision.id))
    }

    /// Display name of a revision, e.g. `Bracket_rev02`.
    fn revision_name(&self, id: RevisionId) -> Result<String, BomError> {
        let revision = self
            .get_revision(id)?
            .ok_or(BomError::RevisionNotFound(id))?;
        let component = self
            .get_component(revision.component)?
            .ok_or(BomError::ComponentNotFound(revision.component))?;
        let number = self
            .get_revisions(revision.component)?
            .iter()
            .position(|r| r.id == id)
            .unwrap_or(0);
        Ok(revision_label(&component.name, number))
    }
}

/// Record counts of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreCounts {
    pub components: usize,
    pub revisions: usize,
    pub links: usize,
}

// =============================================================================
// WRITE TRAIT
// =============================================================================

/// One low-level change inside a write batch.
///
/// `Put*` inserts or replaces by id.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    PutComponent(Component),
    PutRevision(Revision),
    PutLink(Link),
    DeleteComponent(ComponentId),
    DeleteRevision(RevisionId),
    DeleteLink(LinkId),
}

/// Batched write access.
pub trait BomStore: BomRead {
    /// Hand out a fresh identifier. Identifiers are shared by all record kinds.
    fn allocate_id(&mut self) -> u64;

    /// Advance the id counter to at least `next`. Never moves it back.
    fn reserve_ids(&mut self, next: u64);

    /// Apply a batch atomically: either every mutation lands or none does.
    ///
    /// Applying a `Put*` whose id is at or above `next_id` advances the
    /// counter past it, so imported records keep their ids.
    fn apply(&mut self, batch: Vec<Mutation>) -> Result<(), BomError>;
}

/// Case-folded uniqueness key of a component.
pub(crate) fn name_key(name: &str, classification: &ClassificationCode) -> String {
    format!("{}\u{1f}{}", name.trim().to_lowercase(), classification.as_str())
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// The in-memory backend.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    components: BTreeMap<ComponentId, Component>,
    revisions: BTreeMap<RevisionId, Revision>,
    links: BTreeMap<LinkId, Link>,

    /// Component -> revisions ordered by (issued_at, id)
    revisions_by_component: BTreeMap<ComponentId, BTreeSet<(Timestamp, RevisionId)>>,

    /// Source revision -> outgoing links
    links_by_source: BTreeMap<RevisionId, BTreeSet<LinkId>>,

    /// Target component -> incoming links
    links_by_target: BTreeMap<ComponentId, BTreeSet<LinkId>>,

    /// Case-folded (name, classification) -> component
    name_index: BTreeMap<String, ComponentId>,

    /// Next available identifier
    next_id: u64,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All revisions in id order.
    pub fn revisions(&self) -> impl Iterator<Item = &Revision> {
        self.revisions.values()
    }

    /// All links in id order.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    fn bump(&mut self, id: u64) {
        if id >= self.next_id {
            self.next_id = id.saturating_add(1);
        }
    }

    fn apply_one(&mut self, mutation: Mutation) -> Result<(), BomError> {
        match mutation {
            Mutation::PutComponent(component) => self.put_component(component),
            Mutation::PutRevision(revision) => self.put_revision(revision),
            Mutation::PutLink(link) => self.put_link(link),
            Mutation::DeleteComponent(id) => self.delete_component(id),
            Mutation::DeleteRevision(id) => self.delete_revision(id),
            Mutation::DeleteLink(id) => self.delete_link(id),
        }
    }

    fn put_component(&mut self, component: Component) -> Result<(), BomError> {
        let key = name_key(&component.name, &component.classification);
        if let Some(&existing) = self.name_index.get(&key) {
            if existing != component.id {
                return Err(LifecycleViolation::DuplicateComponent {
                    name: component.name,
                    classification: component.classification.0,
                }
                .into());
            }
        }
        if let Some(old) = self.components.get(&component.id) {
            let old_key = name_key(&old.name, &old.classification);
            self.name_index.remove(&old_key);
        }
        self.bump(component.id.0);
        self.name_index.insert(key, component.id);
        self.components.insert(component.id, component);
        Ok(())
    }

    fn put_revision(&mut self, revision: Revision) -> Result<(), BomError> {
        if !self.components.contains_key(&revision.component) {
            return Err(BomError::ComponentNotFound(revision.component));
        }
        if let Some(old) = self.revisions.get(&revision.id) {
            if old.component != revision.component {
                return Err(BomError::InvalidInput(format!(
                    "revision {} cannot move between components",
                    revision.id
                )));
            }
            let old_key = old.order_key();
            if let Some(set) = self.revisions_by_component.get_mut(&old.component) {
                set.remove(&old_key);
            }
        }
        self.bump(revision.id.0);
        self.revisions_by_component
            .entry(revision.component)
            .or_default()
            .insert(revision.order_key());
        self.revisions.insert(revision.id, revision);
        Ok(())
    }

    fn put_link(&mut self, link: Link) -> Result<(), BomError> {
        if !self.revisions.contains_key(&link.source) {
            return Err(BomError::RevisionNotFound(link.source));
        }
        if !self.components.contains_key(&link.target) {
            return Err(BomError::ComponentNotFound(link.target));
        }
        let duplicate = self
            .links_by_source
            .get(&link.source)
            .into_iter()
            .flatten()
            .filter_map(|id| self.links.get(id))
            .any(|other| other.id != link.id && other.target == link.target);
        if duplicate {
            return Err(LifecycleViolation::DuplicateLink {
                revision: link.source,
                target: link.target,
            }
            .into());
        }
        if let Some(old) = self.links.remove(&link.id) {
            self.unindex_link(&old);
        }
        self.bump(link.id.0);
        self.links_by_source
            .entry(link.source)
            .or_default()
            .insert(link.id);
        self.links_by_target
            .entry(link.target)
            .or_default()
            .insert(link.id);
        self.links.insert(link.id, link);
        Ok(())
    }

    fn delete_component(&mut self, id: ComponentId) -> Result<(), BomError> {
        if !self.components.contains_key(&id) {
            return Err(BomError::ComponentNotFound(id));
        }
        if self
            .revisions_by_component
            .get(&id)
            .is_some_and(|set| !set.is_empty())
        {
            return Err(BomError::InvalidInput(format!(
                "component {id} still owns revisions"
            )));
        }
        let incoming = self.links_by_target.get(&id).map_or(0, BTreeSet::len);
        if incoming > 0 {
            return Err(LifecycleViolation::HasIncomingLinks {
                component: id,
                count: incoming,
            }
            .into());
        }
        if let Some(old) = self.components.remove(&id) {
            self.name_index
                .remove(&name_key(&old.name, &old.classification));
        }
        self.revisions_by_component.remove(&id);
        self.links_by_target.remove(&id);
        Ok(())
    }

    fn delete_revision(&mut self, id: RevisionId) -> Result<(), BomError> {
        let outgoing = self.links_by_source.get(&id).map_or(0, BTreeSet::len);
        if outgoing > 0 {
            return Err(LifecycleViolation::HasOutgoingLinks {
                revision: id,
                count: outgoing,
            }
            .into());
        }
        let revision = self
            .revisions
            .remove(&id)
            .ok_or(BomError::RevisionNotFound(id))?;
        if let Some(set) = self.revisions_by_component.get_mut(&revision.component) {
            set.remove(&revision.order_key());
        }
        self.links_by_source.remove(&id);
        Ok(())
    }

    fn delete_link(&mut self, id: LinkId) -> Result<(), BomError> {
        let link = self.links.remove(&id).ok_or(BomError::LinkNotFound(id))?;
        self.unindex_link(&link);
        Ok(())
    }

    fn unindex_link(&mut self, link: &Link) {
        if let Some(set) = self.links_by_source.get_mut(&link.source) {
            set.remove(&link.id);
        }
        if let Some(set) = self.links_by_target.get_mut(&link.target) {
            set.remove(&link.id);
        }
    }

    fn collect_links(&self, ids: Option<&BTreeSet<LinkId>>) -> Vec<Link> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.links.get(id).cloned())
            .collect()
    }
}

impl BomRead for MemoryStore {
    fn get_component(&self, id: ComponentId) -> Result<Option<Component>, BomError> {
        Ok(self.components.get(&id).cloned())
    }

    fn get_revision(&self, id: RevisionId) -> Result<Option<Revision>, BomError> {
        Ok(self.revisions.get(&id).cloned())
    }

    fn get_revisions(&self, component: ComponentId) -> Result<Vec<Revision>, BomError> {
        Ok(self
            .revisions_by_component
            .get(&component)
            .into_iter()
            .flatten()
            .filter_map(|(_, id)| self.revisions.get(id).cloned())
            .collect())
    }

    fn get_links(&self, source: RevisionId) -> Result<Vec<Link>, BomError> {
        Ok(self.collect_links(self.links_by_source.get(&source)))
    }

    fn get_link(&self, id: LinkId) -> Result<Option<Link>, BomError> {
        Ok(self.links.get(&id).cloned())
    }

    fn components(&self) -> Result<Vec<Component>, BomError> {
        Ok(self.components.values().cloned().collect())
    }

    fn find_component(
        &self,
        name: &str,
        classification: &ClassificationCode,
    ) -> Result<Option<Component>, BomError> {
        Ok(self
            .name_index
            .get(&name_key(name, classification))
            .and_then(|id| self.components.get(id))
            .cloned())
    }

    fn incoming_links(&self, target: ComponentId) -> Result<Vec<Link>, BomError> {
        Ok(self.collect_links(self.links_by_target.get(&target)))
    }

    fn counts(&self) -> Result<StoreCounts, BomError> {
        Ok(StoreCounts {
            components: self.components.len(),
            revisions: self.revisions.len(),
            links: self.links.len(),
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id
    }

    fn get_latest_revision(&self, component: ComponentId) -> Result<Option<Revision>, BomError> {
        Ok(self
            .revisions_by_component
            .get(&component)
            .and_then(|set| set.last())
            .and_then(|(_, id)| self.revisions.get(id))
            .cloned())
    }
}

impl BomStore for MemoryStore {
    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    fn reserve_ids(&mut self, next: u64) {
        self.next_id = self.next_id.max(next);
    }

    fn apply(&mut self, batch: Vec<Mutation>) -> Result<(), BomError> {
        // Stage on a copy so a failing mutation leaves `self` untouched.
        let mut staged = self.clone();
        for mutation in batch {
            staged.apply_one(mutation)?;
        }
        *self = staged;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{AttributeVector, ComponentKind, LinkKind, Quantity};

    fn component(id: u64, name: &str) -> Component {
        Component {
            id: ComponentId(id),
            name: name.to_string(),
            classification: ClassificationCode::new("K1"),
            kind: ComponentKind::Article,
            unit: "pcs".to_string(),
            description: None,
        }
    }

    fn revision(id: u64, component: u64, issued: i64) -> Revision {
        Revision {
            id: RevisionId(id),
            component: ComponentId(component),
            attributes: AttributeVector::ZERO,
            issued_at: Timestamp(issued),
            locked_at: None,
        }
    }

    fn link(id: u64, source: u64, target: u64) -> Link {
        Link {
            id: LinkId(id),
            source: RevisionId(source),
            target: ComponentId(target),
            quantity: Quantity::new(1.0).unwrap(),
            classification: ClassificationCode::new("K1"),
            kind: LinkKind::Other,
            description: None,
            issued_at: Timestamp(0),
        }
    }

    fn seeded() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .apply(vec![
                Mutation::PutComponent(component(1, "Frame")),
                Mutation::PutRevision(revision(2, 1, 100)),
                Mutation::PutComponent(component(3, "Bolt")),
                Mutation::PutRevision(revision(4, 3, 100)),
            ])
            .expect("seed");
        store
    }

    #[test]
    fn revisions_are_ordered_by_issue_then_id() {
        let mut store = seeded();
        store
            .apply(vec![
                Mutation::PutRevision(revision(10, 1, 50)),
                Mutation::PutRevision(revision(9, 1, 100)),
            ])
            .expect("insert");

        let ids: Vec<u64> = store
            .get_revisions(ComponentId(1))
            .unwrap()
            .iter()
            .map(|r| r.id.0)
            .collect();
        assert_eq!(ids, vec![10, 2, 9]);
        assert_eq!(
            store.get_latest_revision(ComponentId(1)).unwrap().unwrap().id,
            RevisionId(9)
        );
    }

    #[test]
    fn put_advances_next_id() {
        let store = seeded();
        assert_eq!(store.next_id(), 5);

        let mut store = store;
        assert_eq!(store.allocate_id(), 5);
        assert_eq!(store.allocate_id(), 6);
    }

    #[test]
    fn find_component_ignores_case() {
        let store = seeded();
        let found = store
            .find_component("fRaMe", &ClassificationCode::new("K1"))
            .unwrap();
        assert_eq!(found.map(|c| c.id), Some(ComponentId(1)));

        let other_code = store
            .find_component("Frame", &ClassificationCode::new("K2"))
            .unwrap();
        assert!(other_code.is_none());
    }

    #[test]
    fn duplicate_component_name_rejected() {
        let mut store = seeded();
        let result = store.apply(vec![Mutation::PutComponent(component(20, "FRAME"))]);
        assert!(matches!(
            result,
            Err(BomError::Lifecycle(LifecycleViolation::DuplicateComponent { .. }))
        ));
    }

    #[test]
    fn failed_batch_leaves_store_unchanged() {
        let mut store = seeded();
        let before = store.counts().unwrap();

        let result = store.apply(vec![
            Mutation::PutLink(link(5, 2, 3)),
            Mutation::PutRevision(revision(6, 99, 0)),
        ]);

        assert!(matches!(result, Err(BomError::ComponentNotFound(_))));
        assert_eq!(store.counts().unwrap(), before);
        assert!(store.get_link(LinkId(5)).unwrap().is_none());
    }

    #[test]
    fn duplicate_link_rejected() {
        let mut store = seeded();
        store
            .apply(vec![Mutation::PutLink(link(5, 2, 3))])
            .expect("link");
        let result = store.apply(vec![Mutation::PutLink(link(6, 2, 3))]);
        assert!(matches!(
            result,
            Err(BomError::Lifecycle(LifecycleViolation::DuplicateLink { .. }))
        ));
    }

    #[test]
    fn link_indexes_follow_updates() {
        let mut store = seeded();
        store
            .apply(vec![Mutation::PutLink(link(5, 2, 3))])
            .expect("link");
        assert_eq!(store.get_links(RevisionId(2)).unwrap().len(), 1);
        assert_eq!(store.incoming_links(ComponentId(3)).unwrap().len(), 1);

        store
            .apply(vec![Mutation::DeleteLink(LinkId(5))])
            .expect("delete");
        assert!(store.get_links(RevisionId(2)).unwrap().is_empty());
        assert!(store.incoming_links(ComponentId(3)).unwrap().is_empty());
    }

    #[test]
    fn referenced_records_cannot_be_deleted() {
        let mut store = seeded();
        store
            .apply(vec![Mutation::PutLink(link(5, 2, 3))])
            .expect("link");

        let revision_delete = store.apply(vec![Mutation::DeleteRevision(RevisionId(2))]);
        assert!(matches!(
            revision_delete,
            Err(BomError::Lifecycle(LifecycleViolation::HasOutgoingLinks { count: 1, .. }))
        ));

        let component_delete = store.apply(vec![
            Mutation::DeleteRevision(RevisionId(4)),
            Mutation::DeleteComponent(ComponentId(3)),
        ]);
        assert!(matches!(
            component_delete,
            Err(BomError::Lifecycle(LifecycleViolation::HasIncomingLinks { count: 1, .. }))
        ));
        assert!(store.get_revision(RevisionId(4)).unwrap().is_some());
    }

    #[test]
    fn component_with_revisions_cannot_be_deleted() {
        let mut store = seeded();
        let result = store.apply(vec![Mutation::DeleteComponent(ComponentId(1))]);
        assert!(matches!(result, Err(BomError::InvalidInput(_))));
    }

    #[test]
    fn revision_names_follow_issue_order() {
        let mut store = seeded();
        store
            .apply(vec![Mutation::PutRevision(revision(7, 1, 200))])
            .expect("insert");
        assert_eq!(store.revision_name(RevisionId(2)).unwrap(), "Frame_rev00");
        assert_eq!(store.revision_name(RevisionId(7)).unwrap(), "Frame_rev01");
        assert!(store.is_latest(&revision(7, 1, 200)).unwrap());
    }
}
