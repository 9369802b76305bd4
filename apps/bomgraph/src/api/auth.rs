//! # Authentication
//!
//! Optional API key check. When `BOMGRAPH_API_KEY` is set, every request
//! except `GET /health` must carry it:
//!
//! ```text
//! Authorization: Bearer <your-api-key>
//! ```
//!
//! A bare `Authorization: <your-api-key>` is accepted as well.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// The configured key, shared by every request.
#[derive(Clone)]
pub struct ApiKey(Arc<[u8]>);

impl ApiKey {
    pub fn new(key: &str) -> Self {
        Self(Arc::from(key.as_bytes()))
    }

    /// Constant-time comparison. Both sides are padded to the same length
    /// so the comparison time does not depend on where they differ.
    pub fn matches(&self, provided: &str) -> bool {
        let provided = provided.as_bytes();
        let expected = self.0.as_ref();

        let len = provided.len().max(expected.len());
        let mut padded_provided = vec![0u8; len];
        let mut padded_expected = vec![0u8; len];
        padded_provided[..provided.len()].copy_from_slice(provided);
        padded_expected[..expected.len()].copy_from_slice(expected);

        let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
        bytes_match && provided.len() == expected.len()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(..)")
    }
}

/// Reject requests without a matching key with 401.
pub async fn api_key_auth_middleware(
    State(key): State<ApiKey>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(header_value) = header_value else {
        tracing::warn!(
            event = "auth_failure",
            reason = "missing_authorization_header",
            "Missing Authorization header"
        );
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized"));
    };

    let provided = header_value.strip_prefix("Bearer ").unwrap_or(header_value);
    if key.matches(provided) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(
            event = "auth_failure",
            reason = "invalid_api_key",
            "Authentication failed: invalid API key"
        );
        Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
    }
}
