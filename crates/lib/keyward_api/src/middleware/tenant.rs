//! Tenant resolution from the `X-Schema` header.
//!
//! | Route class        | Paths                                             | Without header        |
//! |--------------------|---------------------------------------------------|-----------------------|
//! | required           | `/api/users/**`, `/api/groups/**`                 | 400                   |
//! | public fallback    | `/api/users/public/**`, `/api/groups/public/**`   | `PUBLIC_TENANT`, else 400 |
//! | optional           | login, refresh, `/api/users/password/**`          | tenant probe          |
//! | none               | everything else                                   | ignored               |
//!
//! A header that is present but malformed is rejected on every route.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use keyward_core::tenant::{TenantError, TenantId};
use tracing::debug;

use crate::AppState;
use crate::error::AppError;

/// Header carrying the tenant identifier.
pub const TENANT_HEADER: &str = "x-schema";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Required,
    PublicFallback,
    Optional,
    None,
}

impl RouteClass {
    pub fn of(path: &str) -> Self {
        let under = |prefix: &str| {
            path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        };
        if under("/api/users/public") || under("/api/groups/public") {
            Self::PublicFallback
        } else if path == "/api/auth/login"
            || path == "/api/auth/refresh"
            || under("/api/users/password")
        {
            Self::Optional
        } else if under("/api/users") || under("/api/groups") {
            Self::Required
        } else {
            Self::None
        }
    }
}

/// Tenant resolved for the current request, if any.
#[derive(Debug, Clone)]
pub struct RequestTenant(pub Option<TenantId>);

fn header_tenant(headers: &HeaderMap) -> Result<Option<TenantId>, TenantError> {
    let Some(value) = headers.get(TENANT_HEADER) else {
        return Ok(None);
    };
    let raw = value
        .to_str()
        .map_err(|_| TenantError::Invalid(String::from_utf8_lossy(value.as_bytes()).into_owned()))?
        .trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let tenant = TenantId::parse(raw)?;
    if tenant.is_reserved() {
        return Err(TenantError::Invalid(raw.to_string()));
    }
    Ok(Some(tenant))
}

/// Resolve the tenant for `path` from `headers`.
pub fn resolve_tenant(
    headers: &HeaderMap,
    path: &str,
    public_tenant: Option<&TenantId>,
) -> Result<Option<TenantId>, TenantError> {
    let from_header = header_tenant(headers)?;
    match RouteClass::of(path) {
        RouteClass::Required => from_header.map(Some).ok_or(TenantError::Missing),
        RouteClass::PublicFallback => from_header
            .or_else(|| public_tenant.cloned())
            .map(Some)
            .ok_or(TenantError::Missing),
        RouteClass::Optional | RouteClass::None => Ok(from_header),
    }
}

/// Axum middleware: resolves the tenant and stores [`RequestTenant`].
pub async fn tenant_context(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let tenant = resolve_tenant(
        request.headers(),
        request.uri().path(),
        state.public_tenant.as_ref(),
    )
    .inspect_err(|e| debug!(path = %request.uri().path(), error = %e, "tenant rejected"))?;
    request.extensions_mut().insert(RequestTenant(tenant));
    Ok(next.run(request).await)
}

/// Extractor for routes that cannot run without a tenant.
#[derive(Debug, Clone)]
pub struct Tenant(pub TenantId);

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<RequestTenant>() {
            Some(RequestTenant(Some(tenant))) => Ok(Self(tenant.clone())),
            _ => Err(TenantError::Missing.into()),
        }
    }
}

/// Extractor for routes that fall back to probing every tenant.
#[derive(Debug, Clone)]
pub struct OptionalTenant(pub Option<TenantId>);

impl<S: Send + Sync> FromRequestParts<S> for OptionalTenant {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<RequestTenant>()
                .and_then(|t| t.0.clone()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(v) = value {
            map.insert(TENANT_HEADER, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn classifies_routes() {
        assert_eq!(RouteClass::of("/api/users"), RouteClass::Required);
        assert_eq!(RouteClass::of("/api/users/abc/groups"), RouteClass::Required);
        assert_eq!(RouteClass::of("/api/groups/search"), RouteClass::Required);
        assert_eq!(RouteClass::of("/api/users/public/clients"), RouteClass::PublicFallback);
        assert_eq!(RouteClass::of("/api/groups/public/code/X"), RouteClass::PublicFallback);
        assert_eq!(RouteClass::of("/api/users/password/reset"), RouteClass::Optional);
        assert_eq!(RouteClass::of("/api/auth/login"), RouteClass::Optional);
        assert_eq!(RouteClass::of("/api/auth/logout"), RouteClass::None);
        assert_eq!(RouteClass::of("/api/usersx"), RouteClass::None);
        assert_eq!(RouteClass::of("/health"), RouteClass::None);
    }

    #[test]
    fn required_routes_need_the_header() {
        assert_eq!(
            resolve_tenant(&headers(None), "/api/users", None),
            Err(TenantError::Missing)
        );
        assert_eq!(
            resolve_tenant(&headers(Some("  ")), "/api/groups", None),
            Err(TenantError::Missing)
        );
        let tenant = resolve_tenant(&headers(Some("acme")), "/api/users", None).unwrap();
        assert_eq!(tenant.unwrap().as_str(), "acme");
    }

    #[test]
    fn malformed_header_is_rejected_everywhere() {
        for path in ["/api/users", "/api/auth/login", "/health"] {
            assert!(matches!(
                resolve_tenant(&headers(Some("acme;drop")), path, None),
                Err(TenantError::Invalid(_))
            ));
        }
        assert!(matches!(
            resolve_tenant(&headers(Some("pg_catalog")), "/api/users", None),
            Err(TenantError::Invalid(_))
        ));
    }

    #[test]
    fn public_routes_fall_back_to_configured_tenant() {
        let store = TenantId::parse("storefront").unwrap();
        let path = "/api/users/public/clients";
        assert_eq!(
            resolve_tenant(&headers(None), path, Some(&store)).unwrap(),
            Some(store.clone())
        );
        assert_eq!(
            resolve_tenant(&headers(Some("acme")), path, Some(&store))
                .unwrap()
                .unwrap()
                .as_str(),
            "acme"
        );
        assert_eq!(resolve_tenant(&headers(None), path, None), Err(TenantError::Missing));
    }

    #[test]
    fn optional_routes_allow_absence() {
        assert_eq!(resolve_tenant(&headers(None), "/api/auth/login", None), Ok(None));
        assert_eq!(
            resolve_tenant(&headers(None), "/api/users/password/reset-request", None),
            Ok(None)
        );
    }
}
