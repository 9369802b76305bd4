//! # Lifecycle Engine
//!
//! Every write to the BOM graph goes through here.
//!
//! A revision is `Draft` while it is its component's latest and unlocked;
//! only a draft may be edited, linked from, unlinked or deleted. Locking is
//! terminal and cascades to everything the revision resolves to at the
//! moment of locking, with the same timestamp.
//!
//! Each operation validates first, then hands the store one batch. Callers
//! provide the timestamp; the engine never reads a clock.

use crate::cycle::{ensure_acyclic_batch, ensure_acyclic_link};
use crate::primitives::{DEFAULT_UNIT, MAX_CODE_LENGTH, MAX_DESCRIPTION_LENGTH, MAX_NAME_LENGTH};
use crate::resolver::LockContext;
use crate::walk::{TraversalOptions, Visitor, Walker};
use crate::{
    AttributeVector, BomError, BomStore, ClassificationCode, Component, ComponentId, ComponentKind,
    LifecycleViolation, Link, LinkId, LinkKind, Mutation, Quantity, Revision, RevisionId,
    Timestamp,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// INPUTS & OUTCOMES
// =============================================================================

/// Fields of a component to create.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewComponent {
    pub name: String,
    pub classification: ClassificationCode,
    pub kind: ComponentKind,
    /// Falls back to `DEFAULT_UNIT`.
    pub unit: Option<String>,
    pub description: Option<String>,
}

/// Fields of a link to create.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLink {
    pub source: RevisionId,
    pub target: ComponentId,
    pub quantity: f64,
    /// Falls back to the target component's classification.
    pub classification: Option<ClassificationCode>,
    pub kind: LinkKind,
    pub description: Option<String>,
}

/// Changes to an existing link. `None` leaves a field as it is.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkUpdate {
    pub quantity: Option<f64>,
    pub kind: Option<LinkKind>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedComponent {
    pub component: ComponentId,
    pub revision: RevisionId,
}

/// Result of a lock: every revision that went from unlocked to locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOutcome {
    pub revision: RevisionId,
    pub locked_at: Timestamp,
    /// Newly locked revisions in walk order, starting with `revision`.
    pub locked: Vec<RevisionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOutcome {
    pub revision: RevisionId,
    pub links: Vec<LinkId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub revision: RevisionId,
    /// The revision was the component's last one, so the component went too.
    pub component_deleted: bool,
}

// =============================================================================
// ENGINE
// =============================================================================

/// The lifecycle state machine over any `BomStore`.
pub struct LifecycleEngine;

impl LifecycleEngine {
    /// Create a component together with its initial all-zero revision.
    pub fn create_component<S: BomStore + ?Sized>(
        store: &mut S,
        spec: NewComponent,
        at: Timestamp,
    ) -> Result<CreatedComponent, BomError> {
        let name = spec.name.trim().to_string();
        if name.is_empty() {
            return Err(LifecycleViolation::EmptyName.into());
        }
        check_length("name", &name, MAX_NAME_LENGTH)?;
        check_length("classification", spec.classification.as_str(), MAX_CODE_LENGTH)?;
        let unit = spec.unit.unwrap_or_else(|| DEFAULT_UNIT.to_string());
        check_length("unit", &unit, MAX_CODE_LENGTH)?;
        if let Some(description) = &spec.description {
            check_length("description", description, MAX_DESCRIPTION_LENGTH)?;
        }

        if store.find_component(&name, &spec.classification)?.is_some() {
            return Err(LifecycleViolation::DuplicateComponent {
                name,
                classification: spec.classification.0,
            }
            .into());
        }

        let component = ComponentId(store.allocate_id());
        let revision = RevisionId(store.allocate_id());
        store.apply(vec![
            Mutation::PutComponent(Component {
                id: component,
                name,
                classification: spec.classification,
                kind: spec.kind,
                unit,
                description: spec.description,
            }),
            Mutation::PutRevision(Revision {
                id: revision,
                component,
                attributes: AttributeVector::ZERO,
                issued_at: at,
                locked_at: None,
            }),
        ])?;

        Ok(CreatedComponent {
            component,
            revision,
        })
    }

    /// Copy a component under the first free name `"<name> (N)"` in its
    /// classification, with a fresh initial revision.
    pub fn copy_component<S: BomStore + ?Sized>(
        store: &mut S,
        component: ComponentId,
        at: Timestamp,
    ) -> Result<CreatedComponent, BomError> {
        let original = store
            .get_component(component)?
            .ok_or(BomError::ComponentNotFound(component))?;

        let mut suffix = 1usize;
        let name = loop {
            let candidate = format!("{} ({suffix})", original.name);
            if store
                .find_component(&candidate, &original.classification)?
                .is_none()
            {
                break candidate;
            }
            suffix += 1;
        };

        Self::create_component(
            store,
            NewComponent {
                name,
                classification: original.classification,
                kind: original.kind,
                unit: Some(original.unit),
                description: original.description,
            },
            at,
        )
    }

    /// Issue a new draft revision carrying the latest revision's attributes.
    ///
    /// The issue timestamp is clamped to the current latest's, so the new
    /// revision is latest immediately.
    pub fn create_revision<S: BomStore + ?Sized>(
        store: &mut S,
        component: ComponentId,
        at: Timestamp,
    ) -> Result<RevisionId, BomError> {
        if store.get_component(component)?.is_none() {
            return Err(BomError::ComponentNotFound(component));
        }
        let latest = store.get_latest_revision(component)?;
        let (attributes, issued_at) = match &latest {
            Some(latest) => (latest.attributes, at.max(latest.issued_at)),
            None => (AttributeVector::ZERO, at),
        };

        let id = RevisionId(store.allocate_id());
        store.apply(vec![Mutation::PutRevision(Revision {
            id,
            component,
            attributes,
            issued_at,
            locked_at: None,
        })])?;
        Ok(id)
    }

    /// Copy the latest revision into a new draft, links included.
    pub fn copy_revision<S: BomStore + ?Sized>(
        store: &mut S,
        revision: RevisionId,
        at: Timestamp,
    ) -> Result<CopyOutcome, BomError> {
        let original = load_revision(store, revision)?;
        if !store.is_latest(&original)? {
            return Err(LifecycleViolation::NotLatestRevision(revision).into());
        }

        let id = RevisionId(store.allocate_id());
        let mut batch = vec![Mutation::PutRevision(Revision {
            id,
            component: original.component,
            attributes: original.attributes,
            issued_at: at.max(original.issued_at),
            locked_at: None,
        })];
        let mut links = Vec::new();
        for link in store.get_links(revision)? {
            let link_id = LinkId(store.allocate_id());
            links.push(link_id);
            batch.push(Mutation::PutLink(Link {
                id: link_id,
                source: id,
                issued_at: at,
                ..link
            }));
        }

        ensure_acyclic_batch(&*store, &batch)?;
        store.apply(batch)?;
        Ok(CopyOutcome { revision: id, links })
    }

    /// Replace the attribute vector of a draft.
    pub fn update_attributes<S: BomStore + ?Sized>(
        store: &mut S,
        revision: RevisionId,
        attributes: AttributeVector,
    ) -> Result<(), BomError> {
        if !attributes.is_finite() {
            return Err(BomError::InvalidInput(
                "attribute values must be finite".to_string(),
            ));
        }
        let mut draft = load_revision(store, revision)?;
        require_draft(store, &draft)?;
        draft.attributes = attributes;
        store.apply(vec![Mutation::PutRevision(draft)])
    }

    /// Lock a draft and everything it currently resolves to.
    ///
    /// The cascade walks the graph under the lock being applied, so the
    /// revisions it locks are exactly those a later read will resolve to.
    /// Already-locked revisions keep their own timestamp.
    pub fn lock<S: BomStore + ?Sized>(
        store: &mut S,
        revision: RevisionId,
        at: Timestamp,
    ) -> Result<LockOutcome, BomError> {
        let root = load_revision(store, revision)?;
        if root.is_locked() {
            return Err(LifecycleViolation::AlreadyLocked(revision).into());
        }
        if !store.is_latest(&root)? {
            return Err(LifecycleViolation::NotLatestRevision(revision).into());
        }
        let locked_at = at.max(root.issued_at);

        let mut collector = Reached::default();
        let context = LockContext::new().with(root.id, locked_at);
        Walker::new(&*store, TraversalOptions::unbounded()).walk(&root, &context, &mut collector)?;

        let mut locked = Vec::new();
        let mut batch = Vec::new();
        for mut reached in collector.revisions {
            if reached.is_locked() {
                continue;
            }
            locked.push(reached.id);
            reached.locked_at = Some(locked_at);
            batch.push(Mutation::PutRevision(reached));
        }
        store.apply(batch)?;

        Ok(LockOutcome {
            revision,
            locked_at,
            locked,
        })
    }

    /// Locks are irreversible: always rejected.
    pub fn unlock<S: BomStore + ?Sized>(store: &S, revision: RevisionId) -> Result<(), BomError> {
        load_revision(store, revision)?;
        Err(LifecycleViolation::UnlockForbidden(revision).into())
    }

    /// Link a draft to a component.
    pub fn create_link<S: BomStore + ?Sized>(
        store: &mut S,
        spec: NewLink,
        at: Timestamp,
    ) -> Result<LinkId, BomError> {
        let source = load_revision(store, spec.source)?;
        require_draft(store, &source)?;
        let target = store
            .get_component(spec.target)?
            .ok_or(BomError::ComponentNotFound(spec.target))?;
        let quantity = Quantity::new(spec.quantity)?;
        if let Some(description) = &spec.description {
            check_length("description", description, MAX_DESCRIPTION_LENGTH)?;
        }

        if source.component == target.id {
            return Err(LifecycleViolation::SelfLink {
                revision: source.id,
                target: target.id,
            }
            .into());
        }
        if store
            .get_links(source.id)?
            .iter()
            .any(|link| link.target == target.id)
        {
            return Err(LifecycleViolation::DuplicateLink {
                revision: source.id,
                target: target.id,
            }
            .into());
        }
        ensure_acyclic_link(&*store, source.id, target.id)?;

        let id = LinkId(store.allocate_id());
        store.apply(vec![Mutation::PutLink(Link {
            id,
            source: source.id,
            target: target.id,
            quantity,
            classification: spec.classification.unwrap_or(target.classification),
            kind: spec.kind,
            description: spec.description,
            issued_at: at,
        })])?;
        Ok(id)
    }

    /// Change quantity, kind or description of a link whose source is a draft.
    pub fn update_link<S: BomStore + ?Sized>(
        store: &mut S,
        link: LinkId,
        update: LinkUpdate,
    ) -> Result<Link, BomError> {
        let mut current = store.get_link(link)?.ok_or(BomError::LinkNotFound(link))?;
        let source = load_revision(store, current.source)?;
        require_draft(store, &source)?;

        if let Some(quantity) = update.quantity {
            current.quantity = Quantity::new(quantity)?;
        }
        if let Some(kind) = update.kind {
            current.kind = kind;
        }
        if let Some(description) = update.description {
            check_length("description", &description, MAX_DESCRIPTION_LENGTH)?;
            current.description = Some(description);
        }
        store.apply(vec![Mutation::PutLink(current.clone())])?;
        Ok(current)
    }

    /// Remove a link whose source is a draft.
    pub fn delete_link<S: BomStore + ?Sized>(store: &mut S, link: LinkId) -> Result<(), BomError> {
        let current = store.get_link(link)?.ok_or(BomError::LinkNotFound(link))?;
        let source = load_revision(store, current.source)?;
        require_draft(store, &source)?;
        store.apply(vec![Mutation::DeleteLink(link)])
    }

    /// Delete a link-free draft.
    ///
    /// Deleting a component's only revision deletes the component, which
    /// requires that nothing links to it. Otherwise the previous revision
    /// becomes latest again.
    pub fn delete_revision<S: BomStore + ?Sized>(
        store: &mut S,
        revision: RevisionId,
    ) -> Result<DeleteOutcome, BomError> {
        let draft = load_revision(store, revision)?;
        require_draft(store, &draft)?;

        let outgoing = store.get_links(revision)?.len();
        if outgoing > 0 {
            return Err(LifecycleViolation::HasOutgoingLinks {
                revision,
                count: outgoing,
            }
            .into());
        }

        let sole = store.get_revisions(draft.component)?.len() == 1;
        if sole {
            let incoming = store.incoming_links(draft.component)?.len();
            if incoming > 0 {
                return Err(LifecycleViolation::HasIncomingLinks {
                    component: draft.component,
                    count: incoming,
                }
                .into());
            }
            store.apply(vec![
                Mutation::DeleteRevision(revision),
                Mutation::DeleteComponent(draft.component),
            ])?;
        } else {
            store.apply(vec![Mutation::DeleteRevision(revision)])?;
        }

        Ok(DeleteOutcome {
            revision,
            component_deleted: sole,
        })
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Every revision a walk entered, in order.
#[derive(Default)]
struct Reached {
    revisions: Vec<Revision>,
}

impl Visitor for Reached {
    fn enter(&mut self, revision: &Revision, _context: &LockContext, _depth: usize) {
        self.revisions.push(revision.clone());
    }
}

fn load_revision<S: BomStore + ?Sized>(store: &S, id: RevisionId) -> Result<Revision, BomError> {
    store.get_revision(id)?.ok_or(BomError::RevisionNotFound(id))
}

fn require_draft<S: BomStore + ?Sized>(store: &S, revision: &Revision) -> Result<(), BomError> {
    if revision.is_locked() {
        return Err(LifecycleViolation::RevisionLocked(revision.id).into());
    }
    if !store.is_latest(revision)? {
        return Err(LifecycleViolation::NotLatestRevision(revision.id).into());
    }
    Ok(())
}

fn check_length(field: &str, value: &str, max: usize) -> Result<(), BomError> {
    if value.len() > max {
        return Err(BomError::InvalidInput(format!(
            "{field} exceeds {max} bytes"
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
