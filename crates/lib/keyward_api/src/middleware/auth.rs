//! Bearer token extraction and access-token verification.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use keyward_core::auth::jwt::AccessClaims;

use crate::AppState;
use crate::error::AppError;

/// Verified access-token claims stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub AccessClaims);

impl AuthenticatedUser {
    /// Audit name recorded in `createdBy` / `updatedBy` when the body omits one.
    pub fn actor(&self) -> &str {
        &self.0.grant.login
    }
}

/// Axum middleware: extracts `Authorization: Bearer <token>`, verifies the
/// access token, and injects `AuthenticatedUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))?;

    let claims = state.tokens.verify_access(token)?;
    request.extensions_mut().insert(AuthenticatedUser(claims));

    Ok(next.run(request).await)
}
