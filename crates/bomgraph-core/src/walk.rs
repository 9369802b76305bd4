//! # Resolved-Graph Walker
//!
//! One depth-first walk over the *resolved* link graph, shared by the
//! traversal, the cycle detector and the lock cascade.
//!
//! Each link's target component is resolved with the lock context of the
//! path that reached it. The walk uses an explicit stack, so graph depth
//! never turns into call-stack depth. Each revision is entered at most
//! once; an edge into an already finished revision is still reported, an
//! edge back into a revision on the current stack is reported as a cycle.
//!
//! What to do with each event is the `Visitor`'s business.

use crate::primitives::{MAX_TRAVERSAL_DEPTH, MAX_TRAVERSAL_NODES};
use crate::resolver::{LockContext, select_revision};
use crate::{BomError, BomRead, ComponentId, Link, Revision, RevisionId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

// =============================================================================
// OPTIONS
// =============================================================================

/// Bounds of a single walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalOptions {
    /// Revisions at this depth are not expanded. The root is depth 0.
    pub max_depth: usize,
    /// Maximum number of distinct revisions entered.
    pub max_nodes: usize,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            max_depth: MAX_TRAVERSAL_DEPTH,
            max_nodes: MAX_TRAVERSAL_NODES,
        }
    }
}

impl TraversalOptions {
    /// No bounds. Used where a partial walk would be wrong (cycle checks,
    /// lock cascades); termination is still guaranteed by the visited set.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_depth: usize::MAX,
            max_nodes: usize::MAX,
        }
    }

    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub const fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }
}

/// Why descent stopped early at a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    Depth,
    NodeLimit,
}

/// How a walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    Completed,
    /// A visitor hook asked to stop.
    Stopped,
}

// =============================================================================
// VISITOR
// =============================================================================

/// Callbacks of a walk. Every hook defaults to a no-op.
///
/// `context` is always the lock context the revision was *resolved under*,
/// i.e. it does not include the revision's own lock.
pub trait Visitor {
    /// First arrival at a revision.
    fn enter(&mut self, _revision: &Revision, _context: &LockContext, _depth: usize) {}

    /// A finished revision reached again through another path.
    fn revisit(&mut self, _revision: &Revision, _context: &LockContext) {}

    /// `link` from `parent` resolved to `child`, and `child` is finished.
    fn edge(&mut self, _parent: &Revision, _child: &Revision, _link: &Link) {}

    /// Every child of `revision` has been handled.
    fn leave(&mut self, _revision: &Revision) {}

    /// A link from the top of `stack` resolves to `closing`, already on the stack.
    fn cycle(&mut self, _stack: &[RevisionId], _closing: RevisionId) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// No revision of `link.target` satisfies the path's lock context.
    fn unresolved(&mut self, _parent: &Revision, _link: &Link) {}

    /// Descent below `revision` was cut short.
    fn truncated(&mut self, _revision: &Revision, _reason: Truncation) {}
}

// =============================================================================
// WALKER
// =============================================================================

struct Frame {
    revision: Revision,
    /// Context this revision's own links resolve under.
    context: LockContext,
    depth: usize,
    children: Vec<(Link, Option<Revision>)>,
    next: usize,
    /// Child currently being walked, reported as an edge once it finishes.
    pending: Option<(Link, Revision)>,
}

/// Depth-first walker over a store snapshot.
pub struct Walker<'s, S: ?Sized> {
    store: &'s S,
    options: TraversalOptions,
    /// Per-component revision lists, loaded on first use.
    revisions: BTreeMap<ComponentId, Vec<Revision>>,
}

impl<'s, S: BomRead + ?Sized> Walker<'s, S> {
    #[must_use]
    pub fn new(store: &'s S, options: TraversalOptions) -> Self {
        Self {
            store,
            options,
            revisions: BTreeMap::new(),
        }
    }

    /// Walk from `start`, which is resolved under `initial`.
    pub fn walk<V: Visitor + ?Sized>(
        &mut self,
        start: &Revision,
        initial: &LockContext,
        visitor: &mut V,
    ) -> Result<WalkOutcome, BomError> {
        let mut visited: BTreeSet<RevisionId> = BTreeSet::new();
        let mut on_stack: BTreeSet<RevisionId> = BTreeSet::new();
        let mut stack: Vec<Frame> = Vec::new();

        visitor.enter(start, initial, 0);
        visited.insert(start.id);
        on_stack.insert(start.id);
        let root = self.open_frame(start.clone(), initial.entered(start), 0, visitor)?;
        stack.push(root);

        while let Some(frame) = stack.last_mut() {
            if let Some((link, child)) = frame.pending.take() {
                visitor.edge(&frame.revision, &child, &link);
            }

            let Some((link, resolved)) = frame.children.get(frame.next).cloned() else {
                visitor.leave(&frame.revision);
                on_stack.remove(&frame.revision.id);
                stack.pop();
                continue;
            };
            frame.next += 1;

            let Some(child) = resolved else {
                visitor.unresolved(&frame.revision, &link);
                continue;
            };

            if on_stack.contains(&child.id) {
                let path: Vec<RevisionId> = stack.iter().map(|f| f.revision.id).collect();
                if visitor.cycle(&path, child.id).is_break() {
                    return Ok(WalkOutcome::Stopped);
                }
                continue;
            }

            if visited.contains(&child.id) {
                visitor.revisit(&child, &frame.context);
                visitor.edge(&frame.revision, &child, &link);
                continue;
            }

            if visited.len() >= self.options.max_nodes {
                visitor.truncated(&frame.revision, Truncation::NodeLimit);
                continue;
            }

            let depth = frame.depth + 1;
            let resolved_under = frame.context.clone();
            frame.pending = Some((link, child.clone()));

            visitor.enter(&child, &resolved_under, depth);
            visited.insert(child.id);
            on_stack.insert(child.id);
            let context = resolved_under.entered(&child);
            let next = self.open_frame(child, context, depth, visitor)?;
            stack.push(next);
        }

        Ok(WalkOutcome::Completed)
    }

    fn open_frame<V: Visitor + ?Sized>(
        &mut self,
        revision: Revision,
        context: LockContext,
        depth: usize,
        visitor: &mut V,
    ) -> Result<Frame, BomError> {
        let links = self.store.get_links(revision.id)?;
        let children = if depth >= self.options.max_depth {
            if !links.is_empty() {
                visitor.truncated(&revision, Truncation::Depth);
            }
            Vec::new()
        } else {
            let mut children = Vec::with_capacity(links.len());
            for link in links {
                let resolved = self.resolve(link.target, &context)?;
                children.push((link, resolved));
            }
            children
        };

        Ok(Frame {
            revision,
            context,
            depth,
            children,
            next: 0,
            pending: None,
        })
    }

    fn resolve(
        &mut self,
        component: ComponentId,
        context: &LockContext,
    ) -> Result<Option<Revision>, BomError> {
        if !self.revisions.contains_key(&component) {
            let loaded = self.store.get_revisions(component)?;
            self.revisions.insert(component, loaded);
        }
        Ok(self
            .revisions
            .get(&component)
            .and_then(|revisions| select_revision(revisions, context))
            .cloned())
    }
}

// =============================================================================
// TESTS
// =============================================================================
