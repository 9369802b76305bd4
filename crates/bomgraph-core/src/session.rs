//! # Session Module
//!
//! One entry point over either storage backend, used by the CLI and the
//! HTTP API.
//!
//! ## Storage Backends
//!
//! - `InMemory`: a `MemoryStore`. Volatile unless saved as a canonical
//!   snapshot file.
//! - `Persistent`: a `RedbStore` (ACID, one write transaction per batch).
//!
//! Lifecycle wrappers stamp operations with wall-clock time; the engine
//! itself only ever sees explicit timestamps.

use crate::analysis::{Analysis, analyze};
use crate::cycle::{CycleReport, detect_cycle};
use crate::export::{CanonicalBom, canonical_checksum, export_canonical, import_canonical};
use crate::lifecycle::{
    CopyOutcome, CreatedComponent, DeleteOutcome, LifecycleEngine, LinkUpdate, LockOutcome,
    NewComponent, NewLink,
};
use crate::ingest::{IngestSummary, ingest_tsv};
use crate::paths::{PathResult, collect_paths};
use crate::storage::RedbStore;
use crate::traversal::{TraversalResult, traverse};
use crate::walk::TraversalOptions;
use crate::{
    AttributeVector, BomError, BomRead, BomStore, Component, ComponentId, Link, LinkId,
    MemoryStore, Revision, RevisionId, StoreCounts, Timestamp,
};
use std::path::Path;

/// Storage backend for a Session.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory store (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

/// A store plus the traversal limits every read goes through.
///
/// Session does not implement Clone: the redb handle cannot be shared.
#[derive(Debug, Default)]
pub struct Session {
    backend: StorageBackend,
    options: TraversalOptions,
}

impl Session {
    /// Create a new empty session with in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_store(store: MemoryStore) -> Self {
        Self {
            backend: StorageBackend::InMemory(store),
            options: TraversalOptions::default(),
        }
    }

    /// Open or create a redb database at `path`.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, BomError> {
        Ok(Self {
            backend: StorageBackend::Persistent(RedbStore::open(path)?),
            options: TraversalOptions::default(),
        })
    }

    /// Load a canonical snapshot file into memory. A missing file yields an
    /// empty session.
    pub fn from_snapshot_file(path: impl AsRef<Path>) -> Result<Self, BomError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read(path).map_err(|e| BomError::IoError(e.to_string()))?;
        let store = import_canonical(&data)?.to_memory_store()?;
        Ok(Self::with_store(store))
    }

    /// Write the whole store to `path` as a canonical snapshot.
    pub fn save_snapshot_file(&self, path: impl AsRef<Path>) -> Result<(), BomError> {
        let data = self.export()?;
        std::fs::write(path, data).map_err(|e| BomError::IoError(e.to_string()))
    }

    #[must_use]
    pub fn with_options(mut self, options: TraversalOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn options(&self) -> TraversalOptions {
        self.options
    }

    pub fn set_options(&mut self, options: TraversalOptions) {
        self.options = options;
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    #[must_use]
    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    /// The in-memory store, `None` for persistent backends.
    #[must_use]
    pub fn memory_store(&self) -> Option<&MemoryStore> {
        match &self.backend {
            StorageBackend::InMemory(store) => Some(store),
            StorageBackend::Persistent(_) => None,
        }
    }

    /// Read access to whichever backend is active.
    #[must_use]
    pub fn reader(&self) -> &dyn BomRead {
        match &self.backend {
            StorageBackend::InMemory(store) => store,
            StorageBackend::Persistent(store) => store,
        }
    }

    fn writer(&mut self) -> &mut dyn BomStore {
        match &mut self.backend {
            StorageBackend::InMemory(store) => store,
            StorageBackend::Persistent(store) => store,
        }
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    pub fn counts(&self) -> Result<StoreCounts, BomError> {
        self.reader().counts()
    }

    pub fn components(&self) -> Result<Vec<Component>, BomError> {
        self.reader().components()
    }

    pub fn component(&self, id: ComponentId) -> Result<Component, BomError> {
        self.reader()
            .get_component(id)?
            .ok_or(BomError::ComponentNotFound(id))
    }

    pub fn revisions(&self, component: ComponentId) -> Result<Vec<Revision>, BomError> {
        self.component(component)?;
        self.reader().get_revisions(component)
    }

    pub fn revision(&self, id: RevisionId) -> Result<Revision, BomError> {
        self.reader()
            .get_revision(id)?
            .ok_or(BomError::RevisionNotFound(id))
    }

    pub fn links(&self, source: RevisionId) -> Result<Vec<Link>, BomError> {
        self.revision(source)?;
        self.reader().get_links(source)
    }

    // =========================================================================
    // ANALYSIS
    // =========================================================================

    pub fn traverse(&self, start: RevisionId) -> Result<TraversalResult, BomError> {
        traverse(self.reader(), start, &self.options)
    }

    /// Paths over the edges a traversal from `start` resolves.
    pub fn paths(&self, start: RevisionId) -> Result<PathResult, BomError> {
        let traversal = self.traverse(start)?;
        collect_paths(self.reader(), start, &traversal.edges)
    }

    pub fn analyze(&self, start: RevisionId) -> Result<Analysis, BomError> {
        analyze(self.reader(), start, &self.options)
    }

    pub fn detect_cycle(&self, start: RevisionId) -> Result<CycleReport, BomError> {
        detect_cycle(self.reader(), start)
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    pub fn create_component(&mut self, spec: NewComponent) -> Result<CreatedComponent, BomError> {
        LifecycleEngine::create_component(self.writer(), spec, Timestamp::now())
    }

    pub fn create_revision(&mut self, component: ComponentId) -> Result<RevisionId, BomError> {
        LifecycleEngine::create_revision(self.writer(), component, Timestamp::now())
    }

    pub fn copy_component(&mut self, component: ComponentId) -> Result<CreatedComponent, BomError> {
        LifecycleEngine::copy_component(self.writer(), component, Timestamp::now())
    }

    /// Create components, attributes and links from tab-separated lines.
    pub fn ingest_tsv(&mut self, text: &str) -> Result<IngestSummary, BomError> {
        ingest_tsv(self.writer(), text, Timestamp::now())
    }

    pub fn copy_revision(&mut self, revision: RevisionId) -> Result<CopyOutcome, BomError> {
        LifecycleEngine::copy_revision(self.writer(), revision, Timestamp::now())
    }

    pub fn update_attributes(
        &mut self,
        revision: RevisionId,
        attributes: AttributeVector,
    ) -> Result<(), BomError> {
        LifecycleEngine::update_attributes(self.writer(), revision, attributes)
    }

    pub fn lock(&mut self, revision: RevisionId) -> Result<LockOutcome, BomError> {
        LifecycleEngine::lock(self.writer(), revision, Timestamp::now())
    }

    /// Always fails: locks are permanent.
    pub fn unlock(&self, revision: RevisionId) -> Result<(), BomError> {
        match &self.backend {
            StorageBackend::InMemory(store) => LifecycleEngine::unlock(store, revision),
            StorageBackend::Persistent(store) => LifecycleEngine::unlock(store, revision),
        }
    }

    pub fn create_link(&mut self, spec: NewLink) -> Result<LinkId, BomError> {
        LifecycleEngine::create_link(self.writer(), spec, Timestamp::now())
    }

    pub fn update_link(&mut self, link: LinkId, update: LinkUpdate) -> Result<Link, BomError> {
        LifecycleEngine::update_link(self.writer(), link, update)
    }

    pub fn delete_link(&mut self, link: LinkId) -> Result<(), BomError> {
        LifecycleEngine::delete_link(self.writer(), link)
    }

    pub fn delete_revision(&mut self, revision: RevisionId) -> Result<DeleteOutcome, BomError> {
        LifecycleEngine::delete_revision(self.writer(), revision)
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    /// Canonical snapshot bytes of the whole store.
    pub fn export(&self) -> Result<Vec<u8>, BomError> {
        export_canonical(self.reader())
    }

    pub fn checksum(&self) -> Result<u64, BomError> {
        canonical_checksum(self.reader())
    }

    #[cfg(feature = "crypto-hash")]
    pub fn crypto_hash(&self) -> Result<String, BomError> {
        crate::export::canonical_crypto_hash(self.reader())
    }

    /// Load a canonical snapshot into this session. The store must be empty.
    pub fn import(&mut self, data: &[u8]) -> Result<StoreCounts, BomError> {
        if self.counts()? != StoreCounts::default() {
            return Err(BomError::InvalidInput(
                "import requires an empty store".to_string(),
            ));
        }
        let bom: CanonicalBom = import_canonical(data)?;
        bom.load_into(self.writer())?;
        self.counts()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{ClassificationCode, LifecycleViolation, LinkKind};

    fn part(session: &mut Session, name: &str) -> CreatedComponent {
        session
            .create_component(NewComponent {
                name: name.to_string(),
                classification: ClassificationCode::new("P"),
                ..NewComponent::default()
            })
            .expect("create component")
    }

    fn link(session: &mut Session, source: RevisionId, target: ComponentId, qty: f64) -> LinkId {
        session
            .create_link(NewLink {
                source,
                target,
                quantity: qty,
                classification: None,
                kind: LinkKind::Assembled,
                description: None,
            })
            .expect("create link")
    }

    #[test]
    fn lifecycle_through_memory_session() {
        let mut session = Session::new();
        let frame = part(&mut session, "Frame");
        let bolt = part(&mut session, "Bolt");
        link(&mut session, frame.revision, bolt.component, 4.0);

        let mut attrs = AttributeVector::ZERO;
        attrs.mass = 0.5;
        session.update_attributes(bolt.revision, attrs).expect("attrs");

        let result = session.traverse(frame.revision).expect("traverse");
        assert_eq!(result.root_attributes().mass, 2.0);

        let outcome = session.lock(frame.revision).expect("lock");
        assert_eq!(outcome.locked, vec![frame.revision, bolt.revision]);
        assert!(matches!(
            session.unlock(frame.revision),
            Err(BomError::Lifecycle(LifecycleViolation::UnlockForbidden(_)))
        ));
    }

    #[test]
    fn export_then_import_into_empty_session() {
        let mut source = Session::new();
        let frame = part(&mut source, "Frame");
        let bolt = part(&mut source, "Bolt");
        link(&mut source, frame.revision, bolt.component, 2.0);
        let data = source.export().expect("export");

        let mut target = Session::new();
        let counts = target.import(&data).expect("import");
        assert_eq!(counts, source.counts().expect("counts"));
        assert_eq!(
            target.checksum().expect("checksum"),
            source.checksum().expect("checksum")
        );

        assert!(matches!(
            target.import(&data),
            Err(BomError::InvalidInput(_))
        ));
    }

    #[test]
    fn snapshot_file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bom.bomx");

        let empty = Session::from_snapshot_file(&path).expect("missing file");
        assert_eq!(empty.counts().expect("counts"), StoreCounts::default());

        let mut session = Session::new();
        part(&mut session, "Frame");
        session.save_snapshot_file(&path).expect("save");

        let reloaded = Session::from_snapshot_file(&path).expect("load");
        assert_eq!(reloaded.components().expect("components").len(), 1);
    }

    #[test]
    fn persistent_session_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bom.redb");

        let frame = {
            let mut session = Session::with_redb(&path).expect("open");
            assert!(session.is_persistent());
            assert!(session.memory_store().is_none());
            part(&mut session, "Frame")
        };

        let session = Session::with_redb(&path).expect("reopen");
        assert_eq!(session.revision(frame.revision).expect("revision").component, frame.component);
        assert_eq!(session.revisions(frame.component).expect("revisions").len(), 1);
        assert!(session.links(frame.revision).expect("links").is_empty());
    }

    #[test]
    fn options_bound_traversal_depth() {
        let mut session = Session::new().with_options(TraversalOptions::default().with_max_depth(0));
        let frame = part(&mut session, "Frame");
        let bolt = part(&mut session, "Bolt");
        link(&mut session, frame.revision, bolt.component, 1.0);

        let result = session.traverse(frame.revision).expect("traverse");
        assert!(!result.is_complete());
        assert_eq!(session.options().max_depth, 0);

        session.set_options(TraversalOptions::default());
        let analysis = session.analyze(frame.revision).expect("analyze");
        assert!(analysis.is_consistent());
        assert_eq!(session.paths(frame.revision).expect("paths").quantities.len(), 2);
        assert!(!session.detect_cycle(frame.revision).expect("cycle").has_cycle);
    }

    #[test]
    fn ingest_and_copy_component_on_redb() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = Session::with_redb(dir.path().join("bom.redb")).expect("open");

        let text = "Frame\t\tpcs\tASM\t\t4\t\t\t\t\t\t\t\tBolt\t6\n";
        let summary = session.ingest_tsv(text).expect("ingest");
        assert_eq!(summary.created.len(), 1);
        assert_eq!(summary.placeholders.len(), 1);
        assert_eq!(summary.links, 1);

        let frame = summary.created[0];
        let copy = session.copy_component(frame).expect("copy");
        assert_eq!(session.component(copy.component).expect("get").name, "Frame (1)");
        assert!(session.links(copy.revision).expect("links").is_empty());

        let rejected = session.ingest_tsv("Beam\tpcs");
        assert!(matches!(rejected, Err(BomError::ImportRejected { .. })));
        assert_eq!(session.counts().expect("counts").components, 3);
    }
}
