//! # bomgraph-core
//!
//! The deterministic engine behind bomgraph: a versioned bill-of-materials
//! graph where components own revisions and links point from a revision to
//! a component.
//!
//! Which revision a link resolves to depends on the locks above it: the
//! newest revision issued no later than the earliest lock timestamp on the
//! path, or simply the latest when nothing above is locked. Every read pass
//! (cycle detection, traversal, path collection, lock cascade) shares that
//! resolution through one explicit-stack walker.
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network dependencies
//! - Deterministic: BTreeMap only, results independent of insertion order
//! - Reads never mutate; every lifecycle operation is one store batch
//! - Soft conditions (depth truncation, gaps, conflicts) are data, not logs

// =============================================================================
// MODULES
// =============================================================================

pub mod analysis;
pub mod cycle;
pub mod export;
pub mod ingest;
pub mod lifecycle;
pub mod paths;
pub mod primitives;
pub mod resolver;
pub mod session;
pub mod storage;
pub mod store;
pub mod traversal;
pub mod types;
pub mod units;
pub mod walk;

#[cfg(test)]
mod fixtures;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AttributeField, AttributeVector, BomError, ClassificationCode, Component, ComponentId,
    ComponentKind, LifecycleViolation, Link, LinkId, LinkKind, LockStatus, Quantity, Revision,
    RevisionId, RevisionState, Timestamp, revision_label,
};

// =============================================================================
// RE-EXPORTS: Store seam
// =============================================================================

pub use storage::RedbStore;
pub use store::{BomRead, BomStore, MemoryStore, Mutation, StoreCounts};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use analysis::{Analysis, RevisionLabel, analyze};
pub use cycle::{
    CycleReport, detect_cycle, ensure_acyclic_batch, ensure_acyclic_link, would_cycle,
};
pub use export::{
    CanonicalBom, CanonicalHeader, canonical_checksum, export_canonical, import_canonical,
    verify_canonical,
};
pub use lifecycle::{
    CopyOutcome, CreatedComponent, DeleteOutcome, LifecycleEngine, LinkUpdate, LockOutcome,
    NewComponent, NewLink,
};
pub use ingest::{ComponentRow, IngestSummary, LinkRow, ingest_rows, ingest_tsv, parse_rows};
pub use paths::{
    AggregateMismatch, BottomUp, PathResult, PathStep, calculate_bottom_up, collect_paths,
    collect_paths_capped, edge_quantities, total_quantities, verify_aggregates,
};
pub use resolver::{LockContext, resolve_revision, select_revision};
pub use session::{Session, StorageBackend};
pub use traversal::{TraversalResult, TraversalWarning, UnresolvedReference, traverse};
pub use units::{Humanized, humanize};
pub use walk::{TraversalOptions, Truncation, Visitor, WalkOutcome, Walker};
