//! # Engine Primitives
//!
//! Hardcoded runtime constants for the bomgraph engine.
//!
//! These bound every read (traversal depth, node count, path records) and
//! every input accepted at an API boundary. They are compiled in and
//! immutable at runtime; callers may tighten them through
//! `TraversalOptions`, never loosen the input limits.

// =============================================================================
// TRAVERSAL BOUNDS
// =============================================================================

/// Maximum traversal depth for graph reads.
///
/// - All reads must be computationally bounded.
/// - Descent stops at this depth; the node is recorded as truncated.
pub const MAX_TRAVERSAL_DEPTH: usize = 100;

/// Maximum number of distinct revisions a single traversal may visit.
pub const MAX_TRAVERSAL_NODES: usize = 100_000;

/// Soft cap on the number of path records a path collection may produce.
///
/// Path enumeration is exponential in diamond-heavy graphs. Past this cap
/// the collector stops recording new paths and flags the result truncated.
/// Total quantities are computed separately and stay exact.
pub const MAX_PATH_RECORDS: usize = 50_000;

/// Relative tolerance (with an equal absolute floor) for the
/// top-down / bottom-up aggregate cross-check.
pub const AGGREGATE_TOLERANCE: f64 = 1e-9;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of a component name.
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum length of a classification code or unit label.
pub const MAX_CODE_LENGTH: usize = 64;

/// Maximum length of a free-text description (64KB).
pub const MAX_DESCRIPTION_LENGTH: usize = 65536;

/// Maximum number of lines a tab-separated import may carry.
pub const MAX_IMPORT_LINES: usize = 100_000;

/// Unit of measure applied when a component is created without one.
pub const DEFAULT_UNIT: &str = "pcs";

/// Quantity applied when a link is created without one.
pub const DEFAULT_LINK_QUANTITY: f64 = 1.0;
