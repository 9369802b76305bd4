//! # bomgraph HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health`, `GET /status`
//! - `GET /components`, `POST /components`
//! - `POST /components/{id}/revisions`
//! - `POST /revisions/{id}/lock`, `POST /revisions/{id}/unlock` (always 409)
//! - `POST /revisions/{id}/copy`, `PUT /revisions/{id}/attributes`,
//!   `DELETE /revisions/{id}`
//! - `POST /links`, `PUT /links/{id}`, `DELETE /links/{id}`
//! - `GET /revisions/{id}/traverse`, `/paths`, `/analysis`, `/cycle`
//! - `POST /export` - canonical snapshot (base64) and checksum
//! - `GET /hash` - BLAKE3 hash of the canonical snapshot
//!
//! Errors map to status codes: not found 404, lifecycle violation or cycle
//! 409, invalid input 400, storage 500.

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{ApiKey, api_key_auth_middleware};
pub use middleware::{GlobalRateLimiter, create_rate_limiter, rate_limit_middleware};
pub use types::{
    ApiError, AttributesRequest, ComponentSummary, CreateComponentRequest, CreateLinkRequest,
    ErrorResponse, ExportResponse, HashResponse, HealthResponse, IngestRequest, LinkResponse,
    RevisionResponse, StatusResponse, UpdateLinkRequest,
};

use crate::config::ServerConfig;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post, put},
};
use bomgraph_core::{BomError, Session};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Request body limit.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RwLock<Session>>,
    /// Snapshot file rewritten after every mutation (file backend only).
    pub snapshot_file: Option<Arc<PathBuf>>,
}

impl AppState {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(RwLock::new(session)),
            snapshot_file: None,
        }
    }

    #[must_use]
    pub fn with_snapshot_file(mut self, path: PathBuf) -> Self {
        self.snapshot_file = Some(Arc::new(path));
        self
    }

    /// Write the snapshot file if one is configured. Call with the write
    /// lock still held.
    pub fn persist(&self, session: &Session) -> Result<(), BomError> {
        match &self.snapshot_file {
            Some(path) if !session.is_persistent() => session.save_snapshot_file(path.as_ref()),
            _ => Ok(()),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer.
///
/// - `None`: localhost only
/// - `["*"]`: every origin (development only)
/// - otherwise the listed origins; invalid entries are skipped
fn build_cors_layer(origins: Option<&[String]>) -> CorsLayer {
    match origins {
        Some([only]) if only == "*" => {
            tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(hv) => {
                        tracing::info!("CORS: Allowing origin: {}", origin);
                        Some(hv)
                    }
                    Err(e) => {
                        tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                        None
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                restrict(CorsLayer::new().allow_origin(allowed_origins))
            }
        }
        None => {
            tracing::info!("CORS: No origins configured, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse().ok())
    .collect();

    restrict(CorsLayer::new().allow_origin(origins))
}

fn restrict(layer: CorsLayer) -> CorsLayer {
    layer
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Rate Limiting (if enabled)
/// 5. Authentication (if an API key is configured)
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let cors = build_cors_layer(config.cors_origins.as_deref());

    let rate_limiter = if config.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", config.rate_limit);
        Some(create_rate_limiter(config.rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route(
            "/components",
            get(handlers::list_components_handler).post(handlers::create_component_handler),
        )
        .route(
            "/components/{id}/revisions",
            post(handlers::create_revision_handler),
        )
        .route("/components/{id}/copy", post(handlers::copy_component_handler))
        .route("/import/tsv", post(handlers::ingest_handler))
        .route("/revisions/{id}", axum::routing::delete(handlers::delete_revision_handler))
        .route("/revisions/{id}/lock", post(handlers::lock_handler))
        .route("/revisions/{id}/unlock", post(handlers::unlock_handler))
        .route("/revisions/{id}/copy", post(handlers::copy_revision_handler))
        .route(
            "/revisions/{id}/attributes",
            put(handlers::update_attributes_handler),
        )
        .route("/revisions/{id}/traverse", get(handlers::traverse_handler))
        .route("/revisions/{id}/paths", get(handlers::paths_handler))
        .route("/revisions/{id}/analysis", get(handlers::analysis_handler))
        .route("/revisions/{id}/cycle", get(handlers::cycle_handler))
        .route("/links", post(handlers::create_link_handler))
        .route(
            "/links/{id}",
            put(handlers::update_link_handler).delete(handlers::delete_link_handler),
        )
        .route("/export", post(handlers::export_handler))
        .route("/hash", get(handlers::hash_handler));

    // Authentication is innermost: runs last on the request.
    match &config.api_key {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                ApiKey::new(key),
                api_key_auth_middleware,
            ));
        }
        None => {
            tracing::warn!(
                "API key authentication DISABLED - all endpoints are publicly accessible! \
                 Set BOMGRAPH_API_KEY to enable authentication."
            );
        }
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve `state` on `config.host:config.port` until the process is stopped.
pub async fn run_server(state: AppState, config: &ServerConfig) -> Result<(), BomError> {
    let addr = format!("{}:{}", config.host, config.port);
    let router = create_router(state, config);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BomError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!(address = %addr, "bomgraph HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| BomError::IoError(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
