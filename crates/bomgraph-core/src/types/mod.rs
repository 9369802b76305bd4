//! # Core Type Definitions
//!
//! This module contains all core types for the bomgraph engine:
//! - Identifiers (`ComponentId`, `RevisionId`, `LinkId`) and `Timestamp`
//! - The fixed attribute vector (`AttributeVector`)
//! - Records (`Component`, `Revision`, `Link`) and their enums
//! - Derived lock display status (`LockStatus`) and lifecycle state
//! - Error types (`BomError`, `LifecycleViolation`)
//!
//! ## Determinism Guarantees
//!
//! - Identifiers implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`
//! - Timestamps are integer milliseconds; ordering never depends on wall-clock parsing
//! - Quantities are validated at construction, so a `Quantity` is always finite and positive

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a component (part, assembly, document, process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub u64);

/// Identifier of a single revision of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionId(pub u64);

/// Identifier of a link between a revision and a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(pub u64);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Point in time, in milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Create a timestamp from epoch milliseconds.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Get the raw epoch milliseconds.
    #[must_use]
    pub const fn millis(self) -> i64 {
        self.0
    }

    /// Current wall-clock time.
    ///
    /// The engine itself never calls this; lifecycle operations take their
    /// timestamp as a parameter. Clocks before the epoch map to zero.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Self(millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Opaque classification code (commission subcode or similar foreign key).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct ClassificationCode(pub String);

impl ClassificationCode {
    /// Create a new classification code.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Get the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// QUANTITY
// =============================================================================

/// Multiplier carried by a link. Always finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Quantity(f64);

impl Quantity {
    /// The unit multiplier.
    pub const ONE: Self = Self(1.0);

    /// Validate and wrap a raw quantity.
    pub fn new(value: f64) -> Result<Self, BomError> {
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(LifecycleViolation::NonPositiveQuantity(value).into())
        }
    }

    /// Get the raw multiplier.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Quantity {
    type Error = BomError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for f64 {
    fn from(q: Quantity) -> Self {
        q.0
    }
}

// =============================================================================
// ATTRIBUTE VECTOR
// =============================================================================

/// One slot of the attribute vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeField {
    Mass,
    Length,
    Area,
    Volume,
    Cost,
    Duration,
    Other,
}

impl AttributeField {
    /// All fields in vector order.
    pub const ALL: [Self; 7] = [
        Self::Mass,
        Self::Length,
        Self::Area,
        Self::Volume,
        Self::Cost,
        Self::Duration,
        Self::Other,
    ];

    /// Lower-case field name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mass => "mass",
            Self::Length => "length",
            Self::Area => "area",
            Self::Volume => "volume",
            Self::Cost => "cost",
            Self::Duration => "duration",
            Self::Other => "other",
        }
    }

    /// Base unit the stored value is expressed in.
    #[must_use]
    pub const fn base_unit(self) -> &'static str {
        match self {
            Self::Mass => "kg",
            Self::Length => "m",
            Self::Area => "m²",
            Self::Volume => "m³",
            Self::Cost => "EUR",
            Self::Duration => "min",
            Self::Other => "",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// The fixed 7-slot numeric record carried by every revision.
///
/// Serialized as a plain `[mass, length, area, volume, cost, duration, other]`
/// array so downstream renderers can consume it positionally.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 7]", into = "[f64; 7]")]
pub struct AttributeVector {
    pub mass: f64,
    pub length: f64,
    pub area: f64,
    pub volume: f64,
    pub cost: f64,
    pub duration: f64,
    pub other: f64,
}

impl AttributeVector {
    /// The all-zero vector.
    pub const ZERO: Self = Self {
        mass: 0.0,
        length: 0.0,
        area: 0.0,
        volume: 0.0,
        cost: 0.0,
        duration: 0.0,
        other: 0.0,
    };

    /// Build a vector from its positional representation.
    #[must_use]
    pub const fn from_array(values: [f64; 7]) -> Self {
        Self {
            mass: values[0],
            length: values[1],
            area: values[2],
            volume: values[3],
            cost: values[4],
            duration: values[5],
            other: values[6],
        }
    }

    /// Positional representation.
    #[must_use]
    pub const fn to_array(&self) -> [f64; 7] {
        [
            self.mass,
            self.length,
            self.area,
            self.volume,
            self.cost,
            self.duration,
            self.other,
        ]
    }

    /// Read one slot.
    #[must_use]
    pub const fn get(&self, field: AttributeField) -> f64 {
        self.to_array()[field.index()]
    }

    /// Write one slot.
    pub fn set(&mut self, field: AttributeField, value: f64) {
        let mut values = self.to_array();
        values[field.index()] = value;
        *self = Self::from_array(values);
    }

    /// `self += factor * other`, slot by slot.
    pub fn add_scaled(&mut self, other: &Self, factor: f64) {
        let mut values = self.to_array();
        for (slot, contribution) in values.iter_mut().zip(other.to_array()) {
            *slot += factor * contribution;
        }
        *self = Self::from_array(values);
    }

    /// Largest absolute slot difference between two vectors.
    #[must_use]
    pub fn max_abs_diff(&self, other: &Self) -> f64 {
        self.to_array()
            .iter()
            .zip(other.to_array())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    /// Slot-wise comparison with a relative tolerance (absolute below 1.0).
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array())
            .all(|(a, b)| (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0))
    }

    /// True if every slot is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl From<[f64; 7]> for AttributeVector {
    fn from(values: [f64; 7]) -> Self {
        Self::from_array(values)
    }
}

impl From<AttributeVector> for [f64; 7] {
    fn from(v: AttributeVector) -> Self {
        v.to_array()
    }
}

// =============================================================================
// COMPONENT
// =============================================================================

/// What kind of thing a component describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    #[default]
    Article,
    TechnicalDocument,
    Package,
    Process,
    Other,
}

impl ComponentKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::TechnicalDocument => "technical_document",
            Self::Package => "package",
            Self::Process => "process",
            Self::Other => "other",
        }
    }
}

impl FromStr for ComponentKind {
    type Err = BomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "article" => Ok(Self::Article),
            "technical_document" | "document" => Ok(Self::TechnicalDocument),
            "package" => Ok(Self::Package),
            "process" => Ok(Self::Process),
            "other" => Ok(Self::Other),
            _ => Err(BomError::InvalidInput(format!("unknown component kind: {s}"))),
        }
    }
}

/// A named, versionable entity.
///
/// `(name, classification)` is unique across the store, compared
/// case-insensitively on the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub name: String,
    pub classification: ClassificationCode,
    pub kind: ComponentKind,
    /// Unit of measure label, e.g. "pcs" or "kg".
    pub unit: String,
    pub description: Option<String>,
}

// =============================================================================
// REVISION
// =============================================================================

/// An immutable-once-superseded snapshot of a component.
///
/// The lock flag and lock timestamp are a single `Option`, so a revision can
/// never be locked without a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub id: RevisionId,
    pub component: ComponentId,
    pub attributes: AttributeVector,
    pub issued_at: Timestamp,
    pub locked_at: Option<Timestamp>,
}

impl Revision {
    /// Whether the stored lock flag is set.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked_at.is_some()
    }

    /// Ordering key that decides which revision is latest.
    #[must_use]
    pub const fn order_key(&self) -> (Timestamp, RevisionId) {
        (self.issued_at, self.id)
    }

    /// Lifecycle state given whether this revision is its component's latest.
    #[must_use]
    pub const fn state(&self, is_latest: bool) -> RevisionState {
        match (self.is_locked(), is_latest) {
            (true, _) => RevisionState::Locked,
            (false, true) => RevisionState::Draft,
            (false, false) => RevisionState::Superseded,
        }
    }

    /// Derived lock display status.
    #[must_use]
    pub const fn lock_status(&self, is_latest: bool) -> LockStatus {
        match (self.is_locked(), is_latest) {
            (false, _) => LockStatus::None,
            (true, true) => LockStatus::Locked,
            (true, false) => LockStatus::LockedSuperseded,
        }
    }
}

/// Display label of a revision: `"{component}_rev{number:02}"`.
#[must_use]
pub fn revision_label(component_name: &str, number: usize) -> String {
    format!("{component_name}_rev{number:02}")
}

/// Lifecycle state of a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionState {
    /// Latest and unlocked: the only mutable state.
    Draft,
    /// Locked (terminal).
    Locked,
    /// Unlocked but no longer latest: frozen by supersession.
    Superseded,
}

/// Derived lock status shown to reporting collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    #[default]
    None,
    Locked,
    LockedSuperseded,
}

// =============================================================================
// LINK
// =============================================================================

/// How a link joins its target into the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Welded,
    Assembled,
    #[default]
    Other,
}

impl FromStr for LinkKind {
    type Err = BomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "welded" => Ok(Self::Welded),
            "assembled" => Ok(Self::Assembled),
            "other" => Ok(Self::Other),
            _ => Err(BomError::InvalidInput(format!("unknown link kind: {s}"))),
        }
    }
}

/// A quantity-weighted edge from a revision to a component.
///
/// The target is a component, not a revision: the concrete target revision
/// is resolved at traversal time from the path's lock context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub source: RevisionId,
    pub target: ComponentId,
    pub quantity: Quantity,
    pub classification: ClassificationCode,
    pub kind: LinkKind,
    pub description: Option<String>,
    pub issued_at: Timestamp,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// A rejected lifecycle transition. Each variant names the invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LifecycleViolation {
    #[error("revision {0} is not the latest revision of its component")]
    NotLatestRevision(RevisionId),

    #[error("revision {0} is locked")]
    RevisionLocked(RevisionId),

    #[error("revision {0} is already locked")]
    AlreadyLocked(RevisionId),

    #[error("revision {0} cannot be unlocked: locks are irreversible")]
    UnlockForbidden(RevisionId),

    #[error("revision {revision} already links component {target}")]
    DuplicateLink {
        revision: RevisionId,
        target: ComponentId,
    },

    #[error("revision {revision} cannot link its own component {target}")]
    SelfLink {
        revision: RevisionId,
        target: ComponentId,
    },

    #[error("link quantity must be positive, got {0}")]
    NonPositiveQuantity(f64),

    #[error("component '{name}' already exists in classification '{classification}'")]
    DuplicateComponent {
        name: String,
        classification: String,
    },

    #[error("component name must not be empty")]
    EmptyName,

    #[error("component {component} is referenced by {count} link(s)")]
    HasIncomingLinks { component: ComponentId, count: usize },

    #[error("revision {revision} still has {count} outgoing link(s)")]
    HasOutgoingLinks { revision: RevisionId, count: usize },
}

/// Errors that can occur in the bomgraph engine.
///
/// - No silent failures: traversal gaps are data, everything else is an error
/// - The engine never panics; all errors are recoverable
#[derive(Debug, Error)]
pub enum BomError {
    /// A link would close (or has closed) a cycle. Carries revision names.
    #[error("cycle detected: {}", .path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    /// A lifecycle invariant rejected the mutation.
    #[error("lifecycle violation: {0}")]
    Lifecycle(#[from] LifecycleViolation),

    #[error("component not found: {0}")]
    ComponentNotFound(ComponentId),

    #[error("revision not found: {0}")]
    RevisionNotFound(RevisionId),

    #[error("link not found: {0}")]
    LinkNotFound(LinkId),

    /// Malformed input at an API boundary.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A bulk import failed validation. One message per offending line.
    #[error("import rejected: {}", .errors.join("; "))]
    ImportRejected { errors: Vec<String> },

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
