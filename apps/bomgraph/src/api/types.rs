//! # API Request/Response Types
//!
//! JSON structures for the HTTP API. Analysis results (`TraversalResult`,
//! `PathResult`, `Analysis`, `CycleReport`) and lifecycle outcomes are served
//! as the core defines them.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bomgraph_core::{
    AttributeVector, BomError, ClassificationCode, Component, ComponentId, ComponentKind,
    LifecycleViolation, LinkId, LinkKind, LinkUpdate, NewComponent, NewLink, RevisionId,
    StoreCounts, TraversalOptions,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Store status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// `"memory"` or `"redb"`.
    pub backend: String,
    pub components: usize,
    pub revisions: usize,
    pub links: usize,
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl StatusResponse {
    pub fn new(backend: &str, counts: StoreCounts, options: TraversalOptions) -> Self {
        Self {
            backend: backend.to_string(),
            components: counts.components,
            revisions: counts.revisions,
            links: counts.links,
            max_depth: options.max_depth,
            max_nodes: options.max_nodes,
        }
    }
}

// =============================================================================
// COMPONENTS
// =============================================================================

/// Component creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateComponentRequest {
    pub name: String,
    pub classification: String,
    #[serde(default)]
    pub kind: Option<ComponentKind>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<CreateComponentRequest> for NewComponent {
    fn from(request: CreateComponentRequest) -> Self {
        Self {
            name: request.name,
            classification: ClassificationCode::new(request.classification),
            kind: request.kind.unwrap_or_default(),
            unit: request.unit,
            description: request.description,
        }
    }
}

/// One row of `GET /components`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSummary {
    #[serde(flatten)]
    pub component: Component,
    pub latest_revision: Option<RevisionId>,
    pub revision_count: usize,
}

/// A newly issued revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionResponse {
    pub component: ComponentId,
    pub revision: RevisionId,
    pub name: String,
}

/// Attribute replacement request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributesRequest {
    /// `[mass, length, area, volume, cost, duration, other]`
    pub attributes: AttributeVector,
}

// =============================================================================
// LINKS
// =============================================================================

/// Link creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLinkRequest {
    pub source: u64,
    pub target: u64,
    pub quantity: f64,
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub kind: Option<LinkKind>,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<CreateLinkRequest> for NewLink {
    fn from(request: CreateLinkRequest) -> Self {
        Self {
            source: RevisionId(request.source),
            target: ComponentId(request.target),
            quantity: request.quantity,
            classification: request.classification.map(ClassificationCode::new),
            kind: request.kind.unwrap_or_default(),
            description: request.description,
        }
    }
}

/// Link update request. Missing fields stay unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateLinkRequest {
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub kind: Option<LinkKind>,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<UpdateLinkRequest> for LinkUpdate {
    fn from(request: UpdateLinkRequest) -> Self {
        Self {
            quantity: request.quantity,
            kind: request.kind,
            description: request.description,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkResponse {
    pub link: LinkId,
}

// =============================================================================
// EXPORT / HASH RESPONSES
// =============================================================================

/// Export response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub data: Option<String>, // Base64 encoded
    pub checksum: Option<u64>,
    pub error: Option<String>,
}

impl ExportResponse {
    pub fn success(data: &[u8], checksum: u64) -> Self {
        Self {
            success: true,
            data: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                data,
            )),
            checksum: Some(checksum),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            checksum: None,
            error: Some(msg.into()),
        }
    }
}

/// Tab-separated BOM lines to ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub data: String,
}

/// BLAKE3 hash of the canonical snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashResponse {
    pub algorithm: String,
    pub hash: String,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error body of every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable category, e.g. `"lifecycle_violation"`.
    pub kind: String,
    pub error: String,
    /// One message per rejected line of a bulk import.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

/// A `BomError` on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub BomError);

impl From<BomError> for ApiError {
    fn from(error: BomError) -> Self {
        Self(error)
    }
}

impl ApiError {
    /// Status code and category of the wrapped error.
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            BomError::ComponentNotFound(_)
            | BomError::RevisionNotFound(_)
            | BomError::LinkNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            BomError::Lifecycle(
                LifecycleViolation::EmptyName | LifecycleViolation::NonPositiveQuantity(_),
            )
            | BomError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            BomError::ImportRejected { .. } => (StatusCode::BAD_REQUEST, "import_rejected"),
            BomError::Lifecycle(_) => (StatusCode::CONFLICT, "lifecycle_violation"),
            BomError::CycleDetected { .. } => (StatusCode::CONFLICT, "cycle_detected"),
            BomError::SerializationError(_) | BomError::IoError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.classify();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, kind, "Request rejected");
        }
        let details = match &self.0 {
            BomError::ImportRejected { errors } => errors.clone(),
            _ => Vec::new(),
        };
        let body = ErrorResponse {
            kind: kind.to_string(),
            error: self.0.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}
