//! # redb-backed BOM Storage
//!
//! A disk-backed store using the redb embedded database:
//! - ACID transactions (one write transaction per batch)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Records are postcard-encoded rows keyed by id. Secondary index tables
//! give the orderings the read trait promises: revisions by
//! (component, issue, id), links by source and by target.

use crate::store::name_key;
use crate::{
    BomError, BomRead, BomStore, ClassificationCode, Component, ComponentId, LifecycleViolation,
    Link, LinkId, Mutation, Revision, RevisionId, StoreCounts,
};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, Table, TableDefinition,
    WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Components: ComponentId(u64) -> serialized Component
const COMPONENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("components");

/// Revisions: RevisionId(u64) -> serialized Revision
const REVISIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("revisions");

/// Links: LinkId(u64) -> serialized Link
const LINKS: TableDefinition<u64, &[u8]> = TableDefinition::new("links");

/// Revision order index: (component, issued_at, revision) -> ()
const COMPONENT_REVISIONS: TableDefinition<(u64, i64, u64), ()> =
    TableDefinition::new("component_revisions");

/// Outgoing links: (source revision, link) -> target component
const SOURCE_LINKS: TableDefinition<(u64, u64), u64> = TableDefinition::new("source_links");

/// Incoming links: (target component, link) -> ()
const TARGET_LINKS: TableDefinition<(u64, u64), ()> = TableDefinition::new("target_links");

/// Uniqueness index: case-folded (name, classification) -> component
const COMPONENT_NAMES: TableDefinition<&str, u64> = TableDefinition::new("component_names");

/// Metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_ID_KEY: &str = "next_id";

fn storage_err(e: impl std::fmt::Display) -> BomError {
    BomError::IoError(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, BomError> {
    postcard::to_allocvec(value).map_err(|e| BomError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, BomError> {
    postcard::from_bytes(bytes).map_err(|e| BomError::SerializationError(e.to_string()))
}

/// A disk-backed BOM store using redb.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
    /// Next available identifier. Persisted on every commit.
    next_id: u64,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BomError> {
        let db = Database::create(path.as_ref()).map_err(storage_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(storage_err)?;
            write_txn.open_table(COMPONENTS).map_err(storage_err)?;
            write_txn.open_table(REVISIONS).map_err(storage_err)?;
            write_txn.open_table(LINKS).map_err(storage_err)?;
            write_txn
                .open_table(COMPONENT_REVISIONS)
                .map_err(storage_err)?;
            write_txn.open_table(SOURCE_LINKS).map_err(storage_err)?;
            write_txn.open_table(TARGET_LINKS).map_err(storage_err)?;
            write_txn.open_table(COMPONENT_NAMES).map_err(storage_err)?;
            write_txn.open_table(METADATA).map_err(storage_err)?;
            write_txn.commit().map_err(storage_err)?;
        }

        let next_id = {
            let read_txn = db.begin_read().map_err(storage_err)?;
            let table = read_txn.open_table(METADATA).map_err(storage_err)?;
            table
                .get(NEXT_ID_KEY)
                .map_err(storage_err)?
                .map(|v| v.value())
                .unwrap_or(0)
        };

        Ok(Self { db, next_id })
    }

    fn read_row<T: DeserializeOwned>(
        &self,
        table: TableDefinition<'static, u64, &'static [u8]>,
        id: u64,
    ) -> Result<Option<T>, BomError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(table).map_err(storage_err)?;
        let Some(guard) = table.get(&id).map_err(storage_err)? else {
            return Ok(None);
        };
        decode(guard.value()).map(Some)
    }

    /// Load links by id from an index range of (key, link) pairs.
    fn read_links<V: redb::Value + 'static>(
        &self,
        index: TableDefinition<'static, (u64, u64), V>,
        key: u64,
    ) -> Result<Vec<Link>, BomError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let index = read_txn.open_table(index).map_err(storage_err)?;
        let links = read_txn.open_table(LINKS).map_err(storage_err)?;

        let mut result = Vec::new();
        for entry in index
            .range((key, 0)..=(key, u64::MAX))
            .map_err(storage_err)?
        {
            let (k, _) = entry.map_err(storage_err)?;
            let link_id = k.value().1;
            if let Some(guard) = links.get(&link_id).map_err(storage_err)? {
                result.push(decode(guard.value())?);
            }
        }
        Ok(result)
    }
}

// =============================================================================
// WRITE PATH
// =============================================================================

/// All tables of one write transaction.
struct Tables<'txn> {
    components: Table<'txn, u64, &'static [u8]>,
    revisions: Table<'txn, u64, &'static [u8]>,
    links: Table<'txn, u64, &'static [u8]>,
    component_revisions: Table<'txn, (u64, i64, u64), ()>,
    source_links: Table<'txn, (u64, u64), u64>,
    target_links: Table<'txn, (u64, u64), ()>,
    names: Table<'txn, &'static str, u64>,
}

impl<'txn> Tables<'txn> {
    fn open(txn: &'txn WriteTransaction) -> Result<Self, BomError> {
        Ok(Self {
            components: txn.open_table(COMPONENTS).map_err(storage_err)?,
            revisions: txn.open_table(REVISIONS).map_err(storage_err)?,
            links: txn.open_table(LINKS).map_err(storage_err)?,
            component_revisions: txn.open_table(COMPONENT_REVISIONS).map_err(storage_err)?,
            source_links: txn.open_table(SOURCE_LINKS).map_err(storage_err)?,
            target_links: txn.open_table(TARGET_LINKS).map_err(storage_err)?,
            names: txn.open_table(COMPONENT_NAMES).map_err(storage_err)?,
        })
    }

    fn apply(&mut self, mutation: &Mutation, next_id: &mut u64) -> Result<(), BomError> {
        match mutation {
            Mutation::PutComponent(component) => {
                bump(next_id, component.id.0);
                self.put_component(component)
            }
            Mutation::PutRevision(revision) => {
                bump(next_id, revision.id.0);
                self.put_revision(revision)
            }
            Mutation::PutLink(link) => {
                bump(next_id, link.id.0);
                self.put_link(link)
            }
            Mutation::DeleteComponent(id) => self.delete_component(*id),
            Mutation::DeleteRevision(id) => self.delete_revision(*id),
            Mutation::DeleteLink(id) => self.delete_link(*id),
        }
    }

    fn component(&self, id: u64) -> Result<Option<Component>, BomError> {
        match self.components.get(&id).map_err(storage_err)? {
            Some(guard) => decode(guard.value()).map(Some),
            None => Ok(None),
        }
    }

    fn put_component(&mut self, component: &Component) -> Result<(), BomError> {
        let key = name_key(&component.name, &component.classification);
        let existing = self
            .names
            .get(key.as_str())
            .map_err(storage_err)?
            .map(|v| v.value());
        if let Some(existing) = existing {
            if existing != component.id.0 {
                return Err(LifecycleViolation::DuplicateComponent {
                    name: component.name.clone(),
                    classification: component.classification.0.clone(),
                }
                .into());
            }
        }
        if let Some(old) = self.component(component.id.0)? {
            let old_key = name_key(&old.name, &old.classification);
            self.names.remove(old_key.as_str()).map_err(storage_err)?;
        }

        let bytes = encode(component)?;
        self.components
            .insert(&component.id.0, bytes.as_slice())
            .map_err(storage_err)?;
        self.names
            .insert(key.as_str(), &component.id.0)
            .map_err(storage_err)?;
        Ok(())
    }

    fn put_revision(&mut self, revision: &Revision) -> Result<(), BomError> {
        if self.component(revision.component.0)?.is_none() {
            return Err(BomError::ComponentNotFound(revision.component));
        }
        let old: Option<Revision> = match self.revisions.get(&revision.id.0).map_err(storage_err)? {
            Some(guard) => Some(decode(guard.value())?),
            None => None,
        };
        if let Some(old) = old {
            if old.component != revision.component {
                return Err(BomError::InvalidInput(format!(
                    "revision {} cannot move between components",
                    revision.id
                )));
            }
            self.component_revisions
                .remove(&(old.component.0, old.issued_at.0, old.id.0))
                .map_err(storage_err)?;
        }

        let bytes = encode(revision)?;
        self.revisions
            .insert(&revision.id.0, bytes.as_slice())
            .map_err(storage_err)?;
        self.component_revisions
            .insert(
                &(revision.component.0, revision.issued_at.0, revision.id.0),
                &(),
            )
            .map_err(storage_err)?;
        Ok(())
    }

    fn put_link(&mut self, link: &Link) -> Result<(), BomError> {
        if self
            .revisions
            .get(&link.source.0)
            .map_err(storage_err)?
            .is_none()
        {
            return Err(BomError::RevisionNotFound(link.source));
        }
        if self.component(link.target.0)?.is_none() {
            return Err(BomError::ComponentNotFound(link.target));
        }

        let source = link.source.0;
        for entry in self
            .source_links
            .range((source, 0)..=(source, u64::MAX))
            .map_err(storage_err)?
        {
            let (key, target) = entry.map_err(storage_err)?;
            if key.value().1 != link.id.0 && target.value() == link.target.0 {
                return Err(LifecycleViolation::DuplicateLink {
                    revision: link.source,
                    target: link.target,
                }
                .into());
            }
        }

        let old: Option<Link> = match self.links.get(&link.id.0).map_err(storage_err)? {
            Some(guard) => Some(decode(guard.value())?),
            None => None,
        };
        if let Some(old) = old {
            self.unindex_link(&old)?;
        }

        let bytes = encode(link)?;
        self.links
            .insert(&link.id.0, bytes.as_slice())
            .map_err(storage_err)?;
        self.source_links
            .insert(&(source, link.id.0), &link.target.0)
            .map_err(storage_err)?;
        self.target_links
            .insert(&(link.target.0, link.id.0), &())
            .map_err(storage_err)?;
        Ok(())
    }

    fn delete_component(&mut self, id: ComponentId) -> Result<(), BomError> {
        let Some(component) = self.component(id.0)? else {
            return Err(BomError::ComponentNotFound(id));
        };
        let revisions = self
            .component_revisions
            .range((id.0, i64::MIN, 0)..=(id.0, i64::MAX, u64::MAX))
            .map_err(storage_err)?
            .count();
        if revisions > 0 {
            return Err(BomError::InvalidInput(format!(
                "component {id} still owns revisions"
            )));
        }
        let incoming = self
            .target_links
            .range((id.0, 0)..=(id.0, u64::MAX))
            .map_err(storage_err)?
            .count();
        if incoming > 0 {
            return Err(LifecycleViolation::HasIncomingLinks {
                component: id,
                count: incoming,
            }
            .into());
        }

        self.components.remove(&id.0).map_err(storage_err)?;
        let key = name_key(&component.name, &component.classification);
        self.names.remove(key.as_str()).map_err(storage_err)?;
        Ok(())
    }

    fn delete_revision(&mut self, id: RevisionId) -> Result<(), BomError> {
        let outgoing = self
            .source_links
            .range((id.0, 0)..=(id.0, u64::MAX))
            .map_err(storage_err)?
            .count();
        if outgoing > 0 {
            return Err(LifecycleViolation::HasOutgoingLinks {
                revision: id,
                count: outgoing,
            }
            .into());
        }

        let removed: Revision = match self.revisions.remove(&id.0).map_err(storage_err)? {
            Some(guard) => decode(guard.value())?,
            None => return Err(BomError::RevisionNotFound(id)),
        };
        self.component_revisions
            .remove(&(removed.component.0, removed.issued_at.0, removed.id.0))
            .map_err(storage_err)?;
        Ok(())
    }

    fn delete_link(&mut self, id: LinkId) -> Result<(), BomError> {
        let removed: Link = match self.links.remove(&id.0).map_err(storage_err)? {
            Some(guard) => decode(guard.value())?,
            None => return Err(BomError::LinkNotFound(id)),
        };
        self.unindex_link(&removed)
    }

    fn unindex_link(&mut self, link: &Link) -> Result<(), BomError> {
        self.source_links
            .remove(&(link.source.0, link.id.0))
            .map_err(storage_err)?;
        self.target_links
            .remove(&(link.target.0, link.id.0))
            .map_err(storage_err)?;
        Ok(())
    }
}

fn bump(next_id: &mut u64, id: u64) {
    if id >= *next_id {
        *next_id = id.saturating_add(1);
    }
}

impl BomStore for RedbStore {
    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    /// Persisted with the next committed batch.
    fn reserve_ids(&mut self, next: u64) {
        self.next_id = self.next_id.max(next);
    }

    /// Apply a batch in a single write transaction.
    ///
    /// On any error the transaction is aborted and nothing is persisted.
    fn apply(&mut self, batch: Vec<Mutation>) -> Result<(), BomError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        let mut next_id = self.next_id;

        let result = Tables::open(&write_txn).and_then(|mut tables| {
            for mutation in &batch {
                tables.apply(mutation, &mut next_id)?;
            }
            Ok(())
        });
        if let Err(e) = result {
            write_txn.abort().map_err(storage_err)?;
            return Err(e);
        }

        {
            let mut meta = write_txn.open_table(METADATA).map_err(storage_err)?;
            meta.insert(NEXT_ID_KEY, &next_id).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;

        // Update in-memory state only after successful commit
        self.next_id = next_id;
        Ok(())
    }
}

// =============================================================================
// READ PATH
// =============================================================================

impl BomRead for RedbStore {
    fn get_component(&self, id: ComponentId) -> Result<Option<Component>, BomError> {
        self.read_row(COMPONENTS, id.0)
    }

    fn get_revision(&self, id: RevisionId) -> Result<Option<Revision>, BomError> {
        self.read_row(REVISIONS, id.0)
    }

    fn get_revisions(&self, component: ComponentId) -> Result<Vec<Revision>, BomError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let index = read_txn
            .open_table(COMPONENT_REVISIONS)
            .map_err(storage_err)?;
        let revisions = read_txn.open_table(REVISIONS).map_err(storage_err)?;

        let mut result = Vec::new();
        for entry in index
            .range((component.0, i64::MIN, 0)..=(component.0, i64::MAX, u64::MAX))
            .map_err(storage_err)?
        {
            let (key, _) = entry.map_err(storage_err)?;
            let (_, _, revision_id) = key.value();
            if let Some(guard) = revisions.get(&revision_id).map_err(storage_err)? {
                result.push(decode(guard.value())?);
            }
        }
        Ok(result)
    }

    fn get_links(&self, source: RevisionId) -> Result<Vec<Link>, BomError> {
        self.read_links(SOURCE_LINKS, source.0)
    }

    fn get_link(&self, id: LinkId) -> Result<Option<Link>, BomError> {
        self.read_row(LINKS, id.0)
    }

    fn components(&self) -> Result<Vec<Component>, BomError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(COMPONENTS).map_err(storage_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(storage_err)? {
            let (_, value) = entry.map_err(storage_err)?;
            result.push(decode(value.value())?);
        }
        Ok(result)
    }

    fn find_component(
        &self,
        name: &str,
        classification: &ClassificationCode,
    ) -> Result<Option<Component>, BomError> {
        let key = name_key(name, classification);
        let id = {
            let read_txn = self.db.begin_read().map_err(storage_err)?;
            let table = read_txn.open_table(COMPONENT_NAMES).map_err(storage_err)?;
            table
                .get(key.as_str())
                .map_err(storage_err)?
                .map(|v| v.value())
        };
        match id {
            Some(id) => self.read_row(COMPONENTS, id),
            None => Ok(None),
        }
    }

    fn incoming_links(&self, target: ComponentId) -> Result<Vec<Link>, BomError> {
        self.read_links(TARGET_LINKS, target.0)
    }

    fn counts(&self) -> Result<StoreCounts, BomError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let components = read_txn.open_table(COMPONENTS).map_err(storage_err)?;
        let revisions = read_txn.open_table(REVISIONS).map_err(storage_err)?;
        let links = read_txn.open_table(LINKS).map_err(storage_err)?;
        Ok(StoreCounts {
            components: components.len().map_err(storage_err)? as usize,
            revisions: revisions.len().map_err(storage_err)? as usize,
            links: links.len().map_err(storage_err)? as usize,
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id
    }

    fn get_latest_revision(&self, component: ComponentId) -> Result<Option<Revision>, BomError> {
        let revision_id = {
            let read_txn = self.db.begin_read().map_err(storage_err)?;
            let index = read_txn
                .open_table(COMPONENT_REVISIONS)
                .map_err(storage_err)?;
            let mut range = index
                .range((component.0, i64::MIN, 0)..=(component.0, i64::MAX, u64::MAX))
                .map_err(storage_err)?;
            match range.next_back() {
                Some(entry) => Some(entry.map_err(storage_err)?.0.value().2),
                None => None,
            }
        };
        match revision_id {
            Some(id) => self.read_row(REVISIONS, id),
            None => Ok(None),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::lifecycle::{LifecycleEngine, NewComponent, NewLink};
    use crate::{LinkKind, Timestamp};
    use tempfile::tempdir;

    fn new_component(store: &mut RedbStore, name: &str, at: i64) -> (ComponentId, RevisionId) {
        let created = LifecycleEngine::create_component(
            store,
            NewComponent {
                name: name.to_string(),
                classification: ClassificationCode::new("K1"),
                ..NewComponent::default()
            },
            Timestamp(at),
        )
        .expect("create");
        (created.component, created.revision)
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bom.redb");

        let (frame, frame_rev, bolt, link) = {
            let mut store = RedbStore::open(&path).expect("open");
            let (frame, frame_rev) = new_component(&mut store, "Frame", 10);
            let (bolt, _) = new_component(&mut store, "Bolt", 10);
            let link = LifecycleEngine::create_link(
                &mut store,
                NewLink {
                    source: frame_rev,
                    target: bolt,
                    quantity: 4.0,
                    classification: None,
                    kind: LinkKind::Assembled,
                    description: None,
                },
                Timestamp(20),
            )
            .expect("link");
            (frame, frame_rev, bolt, link)
        };

        let store = RedbStore::open(&path).expect("reopen");
        assert_eq!(store.get_component(frame).unwrap().unwrap().name, "Frame");
        assert_eq!(store.get_links(frame_rev).unwrap()[0].id, link);
        assert_eq!(store.incoming_links(bolt).unwrap().len(), 1);
        assert_eq!(store.next_id(), link.0 + 1);
        assert_eq!(
            store.counts().unwrap(),
            StoreCounts {
                components: 2,
                revisions: 2,
                links: 1,
            }
        );
    }

    #[test]
    fn revisions_come_back_in_issue_order() {
        let dir = tempdir().expect("tempdir");
        let mut store = RedbStore::open(dir.path().join("bom.redb")).expect("open");
        let (frame, first) = new_component(&mut store, "Frame", 100);
        let second = LifecycleEngine::create_revision(&mut store, frame, Timestamp(200)).unwrap();
        let third = LifecycleEngine::create_revision(&mut store, frame, Timestamp(150)).unwrap();

        let ids: Vec<RevisionId> = store
            .get_revisions(frame)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![first, second, third]);
        assert_eq!(
            store.get_latest_revision(frame).unwrap().map(|r| r.id),
            Some(third)
        );
        assert_eq!(store.revision_name(third).unwrap(), "Frame_rev02");
    }

    #[test]
    fn failed_batch_is_rolled_back() {
        let dir = tempdir().expect("tempdir");
        let mut store = RedbStore::open(dir.path().join("bom.redb")).expect("open");
        let (frame, _) = new_component(&mut store, "Frame", 10);
        let before = store.counts().unwrap();

        let result = store.apply(vec![
            Mutation::DeleteRevision(RevisionId(1)),
            Mutation::DeleteComponent(ComponentId(999)),
        ]);
        assert!(matches!(result, Err(BomError::ComponentNotFound(_))));
        assert_eq!(store.counts().unwrap(), before);
        assert_eq!(store.get_revisions(frame).unwrap().len(), 1);
    }

    #[test]
    fn name_uniqueness_is_case_insensitive() {
        let dir = tempdir().expect("tempdir");
        let mut store = RedbStore::open(dir.path().join("bom.redb")).expect("open");
        new_component(&mut store, "Frame", 10);

        let found = store
            .find_component("FRAME", &ClassificationCode::new("K1"))
            .unwrap();
        assert!(found.is_some());

        let duplicate = LifecycleEngine::create_component(
            &mut store,
            NewComponent {
                name: "frame".to_string(),
                classification: ClassificationCode::new("K1"),
                ..NewComponent::default()
            },
            Timestamp(20),
        );
        assert!(matches!(
            duplicate,
            Err(BomError::Lifecycle(LifecycleViolation::DuplicateComponent { .. }))
        ));
    }

    #[test]
    fn lock_cascade_persists() {
        let dir = tempdir().expect("tempdir");
        let mut store = RedbStore::open(dir.path().join("bom.redb")).expect("open");
        let (_, root) = new_component(&mut store, "Root", 10);
        let (part, part_rev) = new_component(&mut store, "Part", 10);
        LifecycleEngine::create_link(
            &mut store,
            NewLink {
                source: root,
                target: part,
                quantity: 2.0,
                classification: None,
                kind: LinkKind::Welded,
                description: None,
            },
            Timestamp(15),
        )
        .unwrap();

        let outcome = LifecycleEngine::lock(&mut store, root, Timestamp(30)).unwrap();
        assert_eq!(outcome.locked, vec![root, part_rev]);
        assert_eq!(
            store.get_revision(part_rev).unwrap().unwrap().locked_at,
            Some(Timestamp(30))
        );
    }
}
