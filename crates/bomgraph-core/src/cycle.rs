//! # Cycle Detector
//!
//! A walk that stops at the first back edge. `would_cycle` and
//! `ensure_acyclic_batch` run the same walk over a read-only overlay holding
//! the proposed records, so nothing is written before it is checked.

use crate::resolver::LockContext;
use crate::store::name_key;
use crate::walk::{TraversalOptions, Visitor, Walker};
use crate::{
    BomError, BomRead, ClassificationCode, Component, ComponentId, LifecycleViolation, Link,
    LinkId, LinkKind, Mutation, Quantity, Revision, RevisionId, StoreCounts,
};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;

/// Result of a cycle check.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CycleReport {
    pub has_cycle: bool,
    /// Revision names along the cycle, first name repeated at the end.
    pub path: Vec<String>,
}

#[derive(Default)]
struct CycleFinder {
    found: Option<Vec<RevisionId>>,
}

impl Visitor for CycleFinder {
    fn cycle(&mut self, stack: &[RevisionId], closing: RevisionId) -> ControlFlow<()> {
        let start = stack.iter().position(|id| *id == closing).unwrap_or(0);
        let mut path = stack[start..].to_vec();
        path.push(closing);
        self.found = Some(path);
        ControlFlow::Break(())
    }
}

/// Walk the resolved graph from `start` and report the first cycle found.
pub fn detect_cycle<S: BomRead + ?Sized>(
    store: &S,
    start: RevisionId,
) -> Result<CycleReport, BomError> {
    let revision = store
        .get_revision(start)?
        .ok_or(BomError::RevisionNotFound(start))?;

    let mut finder = CycleFinder::default();
    Walker::new(store, TraversalOptions::unbounded()).walk(
        &revision,
        &LockContext::new(),
        &mut finder,
    )?;

    let Some(ids) = finder.found else {
        return Ok(CycleReport::default());
    };
    let path = ids
        .into_iter()
        .map(|id| store.revision_name(id))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CycleReport {
        has_cycle: true,
        path,
    })
}

/// Whether linking `source` to `target` would close a cycle.
///
/// Self-reference counts as a cycle.
pub fn would_cycle<S: BomRead + ?Sized>(
    store: &S,
    source: RevisionId,
    target: ComponentId,
) -> Result<bool, BomError> {
    match ensure_acyclic_link(store, source, target) {
        Ok(()) => Ok(false),
        Err(
            BomError::CycleDetected { .. }
            | BomError::Lifecycle(LifecycleViolation::SelfLink { .. }),
        ) => Ok(true),
        Err(e) => Err(e),
    }
}

/// Reject a proposed link that references its own component or closes a cycle.
pub fn ensure_acyclic_link<S: BomRead + ?Sized>(
    store: &S,
    source: RevisionId,
    target: ComponentId,
) -> Result<(), BomError> {
    let revision = store
        .get_revision(source)?
        .ok_or(BomError::RevisionNotFound(source))?;
    if revision.component == target {
        return Err(LifecycleViolation::SelfLink {
            revision: source,
            target,
        }
        .into());
    }

    let overlay = Staged::proposed_link(store, source, target);
    let report = detect_cycle(&overlay, source)?;
    if report.has_cycle {
        return Err(BomError::CycleDetected { path: report.path });
    }
    Ok(())
}

/// Reject a write batch whose links would close a cycle, before it is applied.
///
/// Every cycle the batch closes runs through one of its new links, so the
/// walk starts from each staged link source.
pub fn ensure_acyclic_batch<S: BomRead + ?Sized>(
    store: &S,
    batch: &[Mutation],
) -> Result<(), BomError> {
    let overlay = Staged::new(store, batch);
    let mut sources: Vec<RevisionId> = overlay.links.iter().map(|link| link.source).collect();
    sources.sort();
    sources.dedup();
    for source in sources {
        let report = detect_cycle(&overlay, source)?;
        if report.has_cycle {
            return Err(BomError::CycleDetected { path: report.path });
        }
    }
    Ok(())
}

// =============================================================================
// OVERLAY
// =============================================================================

/// A read-only store view with uncommitted records layered on top.
///
/// Staged records replace stored ones with the same id.
pub(crate) struct Staged<'a, S: ?Sized> {
    store: &'a S,
    components: Vec<Component>,
    revisions: Vec<Revision>,
    links: Vec<Link>,
}

impl<'a, S: BomRead + ?Sized> Staged<'a, S> {
    /// Stage the `Put*` mutations of `batch`. Deletes are ignored.
    pub(crate) fn new(store: &'a S, batch: &[Mutation]) -> Self {
        let mut staged = Self {
            store,
            components: Vec::new(),
            revisions: Vec::new(),
            links: Vec::new(),
        };
        for mutation in batch {
            match mutation {
                Mutation::PutComponent(c) => staged.components.push(c.clone()),
                Mutation::PutRevision(r) => staged.revisions.push(r.clone()),
                Mutation::PutLink(l) => staged.links.push(l.clone()),
                _ => {}
            }
        }
        staged
    }

    fn proposed_link(store: &'a S, source: RevisionId, target: ComponentId) -> Self {
        let link = Link {
            id: LinkId(u64::MAX),
            source,
            target,
            quantity: Quantity::ONE,
            classification: ClassificationCode::default(),
            kind: LinkKind::Other,
            description: None,
            issued_at: crate::Timestamp::default(),
        };
        Self::new(store, &[Mutation::PutLink(link)])
    }

    fn merge_links(&self, stored: Vec<Link>, keep: impl Fn(&Link) -> bool) -> Vec<Link> {
        let mut links: Vec<Link> = stored
            .into_iter()
            .filter(|link| !self.links.iter().any(|s| s.id == link.id))
            .collect();
        links.extend(self.links.iter().filter(|link| keep(*link)).cloned());
        links
    }
}

impl<S: BomRead + ?Sized> BomRead for Staged<'_, S> {
    fn get_component(&self, id: ComponentId) -> Result<Option<Component>, BomError> {
        match self.components.iter().find(|c| c.id == id) {
            Some(component) => Ok(Some(component.clone())),
            None => self.store.get_component(id),
        }
    }

    fn get_revision(&self, id: RevisionId) -> Result<Option<Revision>, BomError> {
        match self.revisions.iter().find(|r| r.id == id) {
            Some(revision) => Ok(Some(revision.clone())),
            None => self.store.get_revision(id),
        }
    }

    fn get_revisions(&self, component: ComponentId) -> Result<Vec<Revision>, BomError> {
        let mut revisions: Vec<Revision> = self
            .store
            .get_revisions(component)?
            .into_iter()
            .filter(|r| !self.revisions.iter().any(|s| s.id == r.id))
            .collect();
        revisions.extend(
            self.revisions
                .iter()
                .filter(|r| r.component == component)
                .cloned(),
        );
        revisions.sort_by_key(Revision::order_key);
        Ok(revisions)
    }

    fn get_links(&self, source: RevisionId) -> Result<Vec<Link>, BomError> {
        let stored = self.store.get_links(source)?;
        Ok(self.merge_links(stored, |link| link.source == source))
    }

    fn get_link(&self, id: LinkId) -> Result<Option<Link>, BomError> {
        match self.links.iter().find(|l| l.id == id) {
            Some(link) => Ok(Some(link.clone())),
            None => self.store.get_link(id),
        }
    }

    fn components(&self) -> Result<Vec<Component>, BomError> {
        let mut components: Vec<Component> = self
            .store
            .components()?
            .into_iter()
            .filter(|c| !self.components.iter().any(|s| s.id == c.id))
            .collect();
        components.extend(self.components.iter().cloned());
        components.sort_by_key(|c| c.id);
        Ok(components)
    }

    fn find_component(
        &self,
        name: &str,
        classification: &ClassificationCode,
    ) -> Result<Option<Component>, BomError> {
        let key = name_key(name, classification);
        match self
            .components
            .iter()
            .find(|c| name_key(&c.name, &c.classification) == key)
        {
            Some(component) => Ok(Some(component.clone())),
            None => self.store.find_component(name, classification),
        }
    }

    fn incoming_links(&self, target: ComponentId) -> Result<Vec<Link>, BomError> {
        let stored = self.store.incoming_links(target)?;
        Ok(self.merge_links(stored, |link| link.target == target))
    }

    fn counts(&self) -> Result<StoreCounts, BomError> {
        let mut counts = self.store.counts()?;
        counts.components += self.components.len();
        counts.revisions += self.revisions.len();
        counts.links += self.links.len();
        Ok(counts)
    }

    fn next_id(&self) -> u64 {
        self.store.next_id()
    }

    fn get_latest_revision(&self, component: ComponentId) -> Result<Option<Revision>, BomError> {
        Ok(self.get_revisions(component)?.pop())
    }
}
