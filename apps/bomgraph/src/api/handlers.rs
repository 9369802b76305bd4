//! # API Endpoint Handlers
//!
//! Reads take the session read lock and may run concurrently. Lifecycle
//! handlers hold the write lock for the whole validate, check, write
//! section, then persist the snapshot file when the server runs on the file
//! backend.

use super::{
    AppState,
    types::{
        ApiError, AttributesRequest, ComponentSummary, CreateComponentRequest, CreateLinkRequest,
        ExportResponse, HashResponse, HealthResponse, IngestRequest, LinkResponse,
        RevisionResponse, StatusResponse, UpdateLinkRequest,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use bomgraph_core::{
    Analysis, BomError, ComponentId, CopyOutcome, CreatedComponent, CycleReport, DeleteOutcome,
    IngestSummary, Link, LinkId, LockOutcome, PathResult, RevisionId, Session, TraversalResult,
};

type ApiResult<T> = Result<Json<T>, ApiError>;

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Store counts and traversal bounds.
pub async fn status_handler(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let session = state.session.read().await;
    let backend = if session.is_persistent() { "redb" } else { "memory" };
    Ok(Json(StatusResponse::new(
        backend,
        session.counts()?,
        session.options(),
    )))
}

// =============================================================================
// COMPONENTS
// =============================================================================

pub async fn list_components_handler(
    State(state): State<AppState>,
) -> ApiResult<Vec<ComponentSummary>> {
    let session = state.session.read().await;
    let mut summaries = Vec::new();
    for component in session.components()? {
        let revisions = session.revisions(component.id)?;
        summaries.push(ComponentSummary {
            latest_revision: revisions.last().map(|r| r.id),
            revision_count: revisions.len(),
            component,
        });
    }
    Ok(Json(summaries))
}

pub async fn create_component_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateComponentRequest>,
) -> Result<(StatusCode, Json<CreatedComponent>), ApiError> {
    let mut session = state.session.write().await;
    let created = session.create_component(request.into())?;
    state.persist(&session)?;
    tracing::info!(
        component = %created.component,
        revision = %created.revision,
        "Component created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn create_revision_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<(StatusCode, Json<RevisionResponse>), ApiError> {
    let component = ComponentId(id);
    let mut session = state.session.write().await;
    let revision = session.create_revision(component)?;
    state.persist(&session)?;
    let name = session.reader().revision_name(revision)?;
    tracing::info!(component = %component, revision = %revision, "Revision issued");
    Ok((
        StatusCode::CREATED,
        Json(RevisionResponse {
            component,
            revision,
            name,
        }),
    ))
}

pub async fn copy_component_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<(StatusCode, Json<CreatedComponent>), ApiError> {
    let mut session = state.session.write().await;
    let created = session.copy_component(ComponentId(id))?;
    state.persist(&session)?;
    tracing::info!(from = id, component = %created.component, "Component copied");
    Ok((StatusCode::CREATED, Json(created)))
}

/// Bulk-create components and links from tab-separated lines.
pub async fn ingest_handler(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestSummary>), ApiError> {
    let mut session = state.session.write().await;
    let summary = session.ingest_tsv(&request.data)?;
    state.persist(&session)?;
    tracing::info!(
        created = summary.created.len(),
        revised = summary.revised.len(),
        links = summary.links,
        "BOM lines ingested"
    );
    Ok((StatusCode::CREATED, Json(summary)))
}

// =============================================================================
// REVISIONS
// =============================================================================

pub async fn lock_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<LockOutcome> {
    let mut session = state.session.write().await;
    let outcome = session.lock(RevisionId(id))?;
    state.persist(&session)?;
    tracing::info!(
        revision = %outcome.revision,
        locked_at = outcome.locked_at.millis(),
        locked = outcome.locked.len(),
        "Revision locked"
    );
    Ok(Json(outcome))
}

/// Always 409: locks are irreversible.
pub async fn unlock_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let session = state.session.read().await;
    session.unlock(RevisionId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn copy_revision_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<(StatusCode, Json<CopyOutcome>), ApiError> {
    let mut session = state.session.write().await;
    let outcome = session.copy_revision(RevisionId(id))?;
    state.persist(&session)?;
    tracing::info!(
        from = id,
        revision = %outcome.revision,
        links = outcome.links.len(),
        "Revision copied"
    );
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn update_attributes_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<AttributesRequest>,
) -> Result<StatusCode, ApiError> {
    let mut session = state.session.write().await;
    session.update_attributes(RevisionId(id), request.attributes)?;
    state.persist(&session)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_revision_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<DeleteOutcome> {
    let mut session = state.session.write().await;
    let outcome = session.delete_revision(RevisionId(id))?;
    state.persist(&session)?;
    tracing::info!(
        revision = id,
        component_deleted = outcome.component_deleted,
        "Revision deleted"
    );
    Ok(Json(outcome))
}

// =============================================================================
// LINKS
// =============================================================================

pub async fn create_link_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateLinkRequest>,
) -> Result<(StatusCode, Json<LinkResponse>), ApiError> {
    let mut session = state.session.write().await;
    let link = session.create_link(request.into())?;
    state.persist(&session)?;
    tracing::info!(link = %link, "Link created");
    Ok((StatusCode::CREATED, Json(LinkResponse { link })))
}

pub async fn update_link_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<UpdateLinkRequest>,
) -> ApiResult<Link> {
    let mut session = state.session.write().await;
    let link = session.update_link(LinkId(id), request.into())?;
    state.persist(&session)?;
    Ok(Json(link))
}

pub async fn delete_link_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let mut session = state.session.write().await;
    session.delete_link(LinkId(id))?;
    state.persist(&session)?;
    tracing::info!(link = id, "Link deleted");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// ANALYSIS
// =============================================================================

pub async fn traverse_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<TraversalResult> {
    read(&state, |session| session.traverse(RevisionId(id))).await
}

pub async fn paths_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<PathResult> {
    read(&state, |session| session.paths(RevisionId(id))).await
}

pub async fn analysis_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Analysis> {
    let analysis = read(&state, |session| session.analyze(RevisionId(id))).await?;
    if !analysis.is_consistent() {
        tracing::warn!(
            revision = id,
            mismatches = analysis.mismatches.len(),
            "Top-down and bottom-up aggregates disagree"
        );
    }
    Ok(analysis)
}

pub async fn cycle_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<CycleReport> {
    read(&state, |session| session.detect_cycle(RevisionId(id))).await
}

async fn read<T>(
    state: &AppState,
    query: impl FnOnce(&Session) -> Result<T, BomError>,
) -> ApiResult<T> {
    let session = state.session.read().await;
    Ok(Json(query(&session)?))
}

// =============================================================================
// EXPORT / HASH
// =============================================================================

/// Canonical snapshot of the whole store, base64 encoded.
pub async fn export_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    let exported = session
        .export()
        .and_then(|data| Ok((session.checksum()?, data)));

    match exported {
        Ok((checksum, data)) => (
            StatusCode::OK,
            Json(ExportResponse::success(&data, checksum)),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Export failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ExportResponse::error(format!("Export failed: {}", e))),
            )
        }
    }
}

/// BLAKE3 hash of the canonical snapshot.
pub async fn hash_handler(State(state): State<AppState>) -> ApiResult<HashResponse> {
    let session = state.session.read().await;
    Ok(Json(HashResponse {
        algorithm: "blake3".to_string(),
        hash: session.crypto_hash()?,
    }))
}
