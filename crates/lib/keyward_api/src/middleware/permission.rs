//! Feature-based route authorization.

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use keyward_core::catalog::Catalog;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;

/// Allows the call when no feature lists the route, or when `user` holds
/// at least one of the features that do.
fn authorize(
    catalog: &Catalog,
    method: &str,
    route: &str,
    user: Option<&AuthenticatedUser>,
) -> Result<(), AppError> {
    let Some(required) = catalog.features_for_route(method, route) else {
        return Ok(());
    };
    let user =
        user.ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;
    if required.iter().any(|key| user.0.grant.has_permission(key)) {
        return Ok(());
    }
    debug!(login = %user.actor(), method, route, "route permission denied");
    Err(AppError::Forbidden(
        "You do not have permission to access this resource".into(),
    ))
}

/// Axum middleware: checks the caller's token permissions against the
/// catalog's `api-routes` for the matched method and route template.
///
/// Mount with `route_layer` inside [`require_auth`](super::auth::require_auth)
/// so both [`MatchedPath`] and [`AuthenticatedUser`] are present.
pub async fn require_permission(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(route) = request.extensions().get::<MatchedPath>() {
        authorize(
            &state.catalog,
            request.method().as_str(),
            route.as_str(),
            request.extensions().get::<AuthenticatedUser>(),
        )?;
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use keyward_core::auth::jwt::{AccessClaims, AccessGrant, RegisteredClaims};
    use uuid::Uuid;

    use super::*;

    fn holder(permissions: &[&str]) -> AuthenticatedUser {
        AuthenticatedUser(AccessClaims {
            grant: AccessGrant {
                user_id: Uuid::now_v7(),
                login: "ana".into(),
                email: "ana@acme.test".into(),
                permissions: permissions.iter().map(|p| p.to_string()).collect(),
            },
            registered: RegisteredClaims {
                iss: "keyward".into(),
                aud: "keyward".into(),
                iat: Utc::now().timestamp(),
                exp: Utc::now().timestamp() + 60,
            },
        })
    }

    #[test]
    fn listed_routes_need_a_matching_feature() {
        let catalog = Catalog::embedded().unwrap();
        let reader = holder(&["users:read"]);
        assert!(authorize(&catalog, "GET", "/api/users/{id}", Some(&reader)).is_ok());
        assert!(matches!(
            authorize(&catalog, "DELETE", "/api/users/{id}", Some(&reader)),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn unlisted_routes_are_open_to_any_caller() {
        let catalog = Catalog::embedded().unwrap();
        let nobody = holder(&[]);
        assert!(authorize(&catalog, "GET", "/api/users/my-permissions", Some(&nobody)).is_ok());
        assert!(authorize(&catalog, "GET", "/api/catalog/features", Some(&nobody)).is_ok());
    }

    #[test]
    fn listed_route_without_caller_is_unauthorized() {
        let catalog = Catalog::embedded().unwrap();
        assert!(matches!(
            authorize(&catalog, "GET", "/api/groups", None),
            Err(AppError::Unauthorized(_))
        ));
    }
}
