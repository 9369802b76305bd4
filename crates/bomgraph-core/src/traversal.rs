//! # Graph Traversal & Top-Down Aggregation
//!
//! A single walk producing the visited set, the resolved edge list, one
//! aggregate per revision and the lock-status tags.
//!
//! Aggregate of a revision = own vector + Σ quantity × child aggregate,
//! summed over every edge (diamonds count once per edge). A revision is
//! expanded once, under the lock context of the first path that reached
//! it; a later arrival under a different binding lock is flagged with a
//! `ContextConflict` warning rather than re-expanded.
//!
//! Gaps, truncation and skipped cycles are data in the result, never errors.

use crate::resolver::LockContext;
use crate::walk::{TraversalOptions, Truncation, Visitor, Walker};
use crate::{
    AttributeVector, BomError, BomRead, ComponentId, Link, LinkId, LockStatus, Revision,
    RevisionId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

// =============================================================================
// RESULT TYPES
// =============================================================================

/// A link whose target had no revision old enough for the path's locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedReference {
    pub source: RevisionId,
    pub link: LinkId,
    pub component: ComponentId,
}

/// Soft conditions met during a traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraversalWarning {
    /// Descent below `revision` stopped at the depth bound.
    DepthExceeded {
        revision: RevisionId,
        max_depth: usize,
    },
    /// Children of `revision` were skipped at the node bound.
    NodeLimitReached { revision: RevisionId, limit: usize },
    /// A back edge was ignored; `path` ends with the revision it closes on.
    CycleSkipped { path: Vec<RevisionId> },
    /// `revision` was reached again under a different binding lock.
    ContextConflict { revision: RevisionId },
}

/// The resolved graph below one revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalResult {
    pub root: RevisionId,
    pub visited: BTreeSet<RevisionId>,
    /// (parent, child) in the order children finished.
    pub edges: Vec<(RevisionId, RevisionId)>,
    pub attributes: BTreeMap<RevisionId, AttributeVector>,
    pub lock_status: BTreeMap<RevisionId, LockStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<UnresolvedReference>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub truncated: BTreeSet<RevisionId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<TraversalWarning>,
}

impl TraversalResult {
    fn empty(root: RevisionId) -> Self {
        Self {
            root,
            visited: BTreeSet::new(),
            edges: Vec::new(),
            attributes: BTreeMap::new(),
            lock_status: BTreeMap::new(),
            unresolved: Vec::new(),
            truncated: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    /// Aggregate of the root revision.
    #[must_use]
    pub fn root_attributes(&self) -> AttributeVector {
        self.attributes
            .get(&self.root)
            .copied()
            .unwrap_or_default()
    }

    /// Whether the traversal covered everything reachable.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.truncated.is_empty() && self.unresolved.is_empty()
    }
}

// =============================================================================
// VISITOR
// =============================================================================

struct TopDown {
    result: TraversalResult,
    options: TraversalOptions,
    /// Running aggregates of revisions still on the stack.
    pending: BTreeMap<RevisionId, AttributeVector>,
    /// Binding lock each revision was first resolved under.
    first_limit: BTreeMap<RevisionId, Option<crate::Timestamp>>,
    conflicted: BTreeSet<RevisionId>,
    nodes: Vec<Revision>,
}

impl Visitor for TopDown {
    fn enter(&mut self, revision: &Revision, context: &LockContext, _depth: usize) {
        self.result.visited.insert(revision.id);
        self.first_limit.insert(revision.id, context.earliest());
        self.pending.insert(revision.id, revision.attributes);
        self.nodes.push(revision.clone());
    }

    fn revisit(&mut self, revision: &Revision, context: &LockContext) {
        let first = self.first_limit.get(&revision.id).copied().flatten();
        if first != context.earliest() && self.conflicted.insert(revision.id) {
            self.result
                .warnings
                .push(TraversalWarning::ContextConflict {
                    revision: revision.id,
                });
        }
    }

    fn edge(&mut self, parent: &Revision, child: &Revision, link: &Link) {
        self.result.edges.push((parent.id, child.id));
        let child_total = self
            .result
            .attributes
            .get(&child.id)
            .copied()
            .unwrap_or_default();
        if let Some(total) = self.pending.get_mut(&parent.id) {
            total.add_scaled(&child_total, link.quantity.value());
        }
    }

    fn leave(&mut self, revision: &Revision) {
        let total = self
            .pending
            .remove(&revision.id)
            .unwrap_or(revision.attributes);
        self.result.attributes.insert(revision.id, total);
    }

    fn cycle(&mut self, stack: &[RevisionId], closing: RevisionId) -> ControlFlow<()> {
        let start = stack.iter().position(|id| *id == closing).unwrap_or(0);
        let mut path = stack[start..].to_vec();
        path.push(closing);
        self.result
            .warnings
            .push(TraversalWarning::CycleSkipped { path });
        ControlFlow::Continue(())
    }

    fn unresolved(&mut self, parent: &Revision, link: &Link) {
        self.result.unresolved.push(UnresolvedReference {
            source: parent.id,
            link: link.id,
            component: link.target,
        });
    }

    fn truncated(&mut self, revision: &Revision, reason: Truncation) {
        if !self.result.truncated.insert(revision.id) {
            return;
        }
        let warning = match reason {
            Truncation::Depth => TraversalWarning::DepthExceeded {
                revision: revision.id,
                max_depth: self.options.max_depth,
            },
            Truncation::NodeLimit => TraversalWarning::NodeLimitReached {
                revision: revision.id,
                limit: self.options.max_nodes,
            },
        };
        self.result.warnings.push(warning);
    }
}

// =============================================================================
// ENTRY POINT
// =============================================================================

/// Traverse the resolved graph below `start` and aggregate top-down.
pub fn traverse<S: BomRead + ?Sized>(
    store: &S,
    start: RevisionId,
    options: &TraversalOptions,
) -> Result<TraversalResult, BomError> {
    let revision = store
        .get_revision(start)?
        .ok_or(BomError::RevisionNotFound(start))?;

    let mut visitor = TopDown {
        result: TraversalResult::empty(start),
        options: *options,
        pending: BTreeMap::new(),
        first_limit: BTreeMap::new(),
        conflicted: BTreeSet::new(),
        nodes: Vec::new(),
    };
    Walker::new(store, *options).walk(&revision, &LockContext::new(), &mut visitor)?;

    let mut latest: BTreeMap<ComponentId, Option<RevisionId>> = BTreeMap::new();
    let mut result = visitor.result;
    for node in &visitor.nodes {
        if !latest.contains_key(&node.component) {
            let id = store.get_latest_revision(node.component)?.map(|r| r.id);
            latest.insert(node.component, id);
        }
        let is_latest = latest.get(&node.component).copied().flatten() == Some(node.id);
        result
            .lock_status
            .insert(node.id, node.lock_status(is_latest));
    }

    Ok(result)
}

// =============================================================================
// TESTS
// =============================================================================
