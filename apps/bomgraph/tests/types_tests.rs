//! Unit tests for API request/response types.

#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::StatusCode;
use bomgraph::api::{
    ApiError, CreateComponentRequest, CreateLinkRequest, ExportResponse, HealthResponse,
    UpdateLinkRequest,
};
use bomgraph_core::{
    BomError, ComponentId, ComponentKind, LifecycleViolation, LinkKind, LinkUpdate, NewComponent,
    NewLink, RevisionId,
};

// =============================================================================
// REQUESTS
// =============================================================================

#[test]
fn test_component_request_defaults() {
    let request: CreateComponentRequest =
        serde_json::from_str(r#"{"name":"Frame","classification":"ASM"}"#).unwrap();
    let spec = NewComponent::from(request);

    assert_eq!(spec.name, "Frame");
    assert_eq!(spec.classification.as_str(), "ASM");
    assert_eq!(spec.kind, ComponentKind::Article);
    assert!(spec.unit.is_none());
}

#[test]
fn test_component_request_kind_is_snake_case() {
    let request: CreateComponentRequest = serde_json::from_str(
        r#"{"name":"Drawing","classification":"DOC","kind":"technical_document"}"#,
    )
    .unwrap();
    assert_eq!(request.kind, Some(ComponentKind::TechnicalDocument));
}

#[test]
fn test_link_request_conversion() {
    let request: CreateLinkRequest = serde_json::from_str(
        r#"{"source":7,"target":3,"quantity":2.5,"kind":"assembled"}"#,
    )
    .unwrap();
    let spec = NewLink::from(request);

    assert_eq!(spec.source, RevisionId(7));
    assert_eq!(spec.target, ComponentId(3));
    assert_eq!(spec.quantity, 2.5);
    assert_eq!(spec.kind, LinkKind::Assembled);
    assert!(spec.classification.is_none());
}

#[test]
fn test_link_request_rejects_missing_quantity() {
    let parsed: Result<CreateLinkRequest, _> =
        serde_json::from_str(r#"{"source":7,"target":3}"#);
    assert!(parsed.is_err());
}

#[test]
fn test_update_request_keeps_absent_fields() {
    let request: UpdateLinkRequest = serde_json::from_str(r#"{"quantity":4.0}"#).unwrap();
    let update = LinkUpdate::from(request);

    assert_eq!(update.quantity, Some(4.0));
    assert!(update.kind.is_none());
    assert!(update.description.is_none());
}

// =============================================================================
// RESPONSES
// =============================================================================

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[test]
fn test_export_response_encodes_base64() {
    let response = ExportResponse::success(b"BOMX", 9);
    assert!(response.success);
    assert_eq!(response.data.as_deref(), Some("Qk9NWA=="));
    assert_eq!(response.checksum, Some(9));
    assert!(response.error.is_none());

    let failure = ExportResponse::error("disk full");
    assert!(!failure.success);
    assert!(failure.data.is_none());
}

// =============================================================================
// ERROR CLASSIFICATION
// =============================================================================

#[test]
fn test_error_status_codes() {
    let cases = [
        (
            BomError::RevisionNotFound(RevisionId(1)),
            StatusCode::NOT_FOUND,
            "not_found",
        ),
        (
            BomError::Lifecycle(LifecycleViolation::RevisionLocked(RevisionId(1))),
            StatusCode::CONFLICT,
            "lifecycle_violation",
        ),
        (
            BomError::Lifecycle(LifecycleViolation::NonPositiveQuantity(-1.0)),
            StatusCode::BAD_REQUEST,
            "invalid_input",
        ),
        (
            BomError::CycleDetected {
                path: vec!["A_rev01".to_string(), "A_rev01".to_string()],
            },
            StatusCode::CONFLICT,
            "cycle_detected",
        ),
        (
            BomError::InvalidInput("bad".to_string()),
            StatusCode::BAD_REQUEST,
            "invalid_input",
        ),
        (
            BomError::ImportRejected {
                errors: vec!["Line 1: bad".to_string()],
            },
            StatusCode::BAD_REQUEST,
            "import_rejected",
        ),
        (
            BomError::IoError("disk".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage",
        ),
    ];

    for (error, status, kind) in cases {
        assert_eq!(ApiError(error).classify(), (status, kind));
    }
}
