//! # Lock/Versioning Resolver
//!
//! Picks the time-correct revision of a referenced component.
//!
//! A link targets a component, not a revision. Which revision it means
//! depends on the path that reached it: every locked ancestor pins the
//! subtree to what existed when it was locked. The resolver returns the
//! newest revision whose issue timestamp is not after any lock timestamp
//! accumulated along the path.

use crate::{BomError, BomRead, ComponentId, Revision, RevisionId, Timestamp};
use serde::{Deserialize, Serialize};

/// Lock timestamps accumulated along a root-to-node path.
///
/// A pure value: pushing returns a new context, the original is untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LockContext {
    entries: Vec<(RevisionId, Timestamp)>,
}

impl LockContext {
    /// An empty context: resolution yields the latest revision.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context extended with one more (revision, lock timestamp) pair.
    #[must_use]
    pub fn with(&self, revision: RevisionId, locked_at: Timestamp) -> Self {
        let mut entries = self.entries.clone();
        entries.push((revision, locked_at));
        Self { entries }
    }

    /// Context for the children of `revision`: extended if it is locked.
    #[must_use]
    pub fn entered(&self, revision: &Revision) -> Self {
        match revision.locked_at {
            Some(at) => self.with(revision.id, at),
            None => self.clone(),
        }
    }

    /// The (revision, lock timestamp) pairs in path order.
    #[must_use]
    pub fn entries(&self) -> &[(RevisionId, Timestamp)] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The binding constraint: the earliest lock timestamp on the path.
    #[must_use]
    pub fn earliest(&self) -> Option<Timestamp> {
        self.entries.iter().map(|(_, at)| *at).min()
    }

    /// Whether a revision issued at `issued_at` satisfies every lock.
    #[must_use]
    pub fn admits(&self, issued_at: Timestamp) -> bool {
        self.earliest().is_none_or(|limit| issued_at <= limit)
    }
}

/// Select from `revisions` (ascending by (issue, id)) the one the context resolves to.
#[must_use]
pub fn select_revision<'a>(revisions: &'a [Revision], context: &LockContext) -> Option<&'a Revision> {
    revisions.iter().rev().find(|r| context.admits(r.issued_at))
}

/// Resolve the revision of `component` reached under `context`.
///
/// `Ok(None)` is a traversal gap (no revision old enough), not an error.
pub fn resolve_revision<S: BomRead + ?Sized>(
    store: &S,
    component: ComponentId,
    context: &LockContext,
) -> Result<Option<Revision>, BomError> {
    if context.is_empty() {
        return store.get_latest_revision(component);
    }
    let revisions = store.get_revisions(component)?;
    Ok(select_revision(&revisions, context).cloned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{AttributeVector, ComponentId};

    fn rev(id: u64, issued: i64) -> Revision {
        Revision {
            id: RevisionId(id),
            component: ComponentId(1),
            attributes: AttributeVector::ZERO,
            issued_at: Timestamp(issued),
            locked_at: None,
        }
    }

    #[test]
    fn empty_context_selects_latest() {
        let revisions = vec![rev(1, 10), rev(2, 20), rev(3, 30)];
        let selected = select_revision(&revisions, &LockContext::new());
        assert_eq!(selected.map(|r| r.id), Some(RevisionId(3)));
    }

    #[test]
    fn lock_pins_older_revision() {
        let revisions = vec![rev(1, 10), rev(2, 20), rev(3, 30)];
        let ctx = LockContext::new().with(RevisionId(99), Timestamp(25));
        let selected = select_revision(&revisions, &ctx);
        assert_eq!(selected.map(|r| r.id), Some(RevisionId(2)));
    }

    #[test]
    fn issue_equal_to_lock_is_admitted() {
        let revisions = vec![rev(1, 10), rev(2, 20)];
        let ctx = LockContext::new().with(RevisionId(99), Timestamp(20));
        assert_eq!(
            select_revision(&revisions, &ctx).map(|r| r.id),
            Some(RevisionId(2))
        );
    }

    #[test]
    fn earliest_lock_binds() {
        let revisions = vec![rev(1, 10), rev(2, 20), rev(3, 30)];
        let ctx = LockContext::new()
            .with(RevisionId(98), Timestamp(35))
            .with(RevisionId(99), Timestamp(15));
        assert_eq!(ctx.earliest(), Some(Timestamp(15)));
        assert_eq!(
            select_revision(&revisions, &ctx).map(|r| r.id),
            Some(RevisionId(1))
        );
    }

    #[test]
    fn nothing_old_enough_is_a_gap() {
        let revisions = vec![rev(1, 10)];
        let ctx = LockContext::new().with(RevisionId(99), Timestamp(5));
        assert!(select_revision(&revisions, &ctx).is_none());
    }

    #[test]
    fn entered_only_extends_for_locked() {
        let ctx = LockContext::new();
        assert!(ctx.entered(&rev(1, 10)).is_empty());

        let mut locked = rev(2, 10);
        locked.locked_at = Some(Timestamp(12));
        let extended = ctx.entered(&locked);
        assert_eq!(extended.entries(), &[(RevisionId(2), Timestamp(12))]);
        assert!(ctx.is_empty());
    }
}
