//! Test-only graph builder.
//!
//! Writes straight through `BomStore::apply`, bypassing the lifecycle
//! engine, so tests can build states the engine would refuse (cycles,
//! links from superseded revisions).

use crate::{
    AttributeVector, BomRead, BomStore, ClassificationCode, Component, ComponentId, ComponentKind,
    Link, LinkId, LinkKind, MemoryStore, Mutation, Quantity, Revision, RevisionId, Timestamp,
};

pub(crate) struct Fixture {
    pub store: MemoryStore,
    clock: i64,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
impl Fixture {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            clock: 0,
        }
    }

    /// Advance the clock by 10ms and return the new time.
    pub fn tick(&mut self) -> Timestamp {
        self.clock += 10;
        Timestamp(self.clock)
    }

    /// Component with one revision carrying `mass`.
    pub fn component(&mut self, name: &str, mass: f64) -> (ComponentId, RevisionId) {
        let id = ComponentId(self.store.allocate_id());
        self.store
            .apply(vec![Mutation::PutComponent(Component {
                id,
                name: name.to_string(),
                classification: ClassificationCode::new("K1"),
                kind: ComponentKind::Article,
                unit: "pcs".to_string(),
                description: None,
            })])
            .expect("component");
        let rev = self.revision(id, mass);
        (id, rev)
    }

    /// New revision of `component`, issued now.
    pub fn revision(&mut self, component: ComponentId, mass: f64) -> RevisionId {
        let id = RevisionId(self.store.allocate_id());
        let issued_at = self.tick();
        let mut attributes = AttributeVector::ZERO;
        attributes.mass = mass;
        self.store
            .apply(vec![Mutation::PutRevision(Revision {
                id,
                component,
                attributes,
                issued_at,
                locked_at: None,
            })])
            .expect("revision");
        id
    }

    pub fn link(&mut self, source: RevisionId, target: ComponentId, quantity: f64) -> LinkId {
        let id = LinkId(self.store.allocate_id());
        self.store
            .apply(vec![Mutation::PutLink(Link {
                id,
                source,
                target,
                quantity: Quantity::new(quantity).expect("quantity"),
                classification: ClassificationCode::new("K1"),
                kind: LinkKind::Assembled,
                description: None,
                issued_at: Timestamp(self.clock),
            })])
            .expect("link");
        id
    }

    /// Lock a single revision now, without cascading.
    pub fn lock(&mut self, revision: RevisionId) -> Timestamp {
        let at = self.tick();
        let mut rev = self.rev(revision);
        rev.locked_at = Some(at);
        self.store
            .apply(vec![Mutation::PutRevision(rev)])
            .expect("lock");
        at
    }

    pub fn rev(&self, id: RevisionId) -> Revision {
        self.store.get_revision(id).unwrap().expect("revision exists")
    }
}
