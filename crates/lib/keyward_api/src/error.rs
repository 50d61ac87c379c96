//! Application error types.

use axum::extract::{FromRequest, FromRequestParts};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use keyward_core::auth::{AuthError, FieldIssue};
use keyward_core::tenant::TenantError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        errors: Vec<FieldIssue>,
    },

    #[error("Upstream failure: {0}")]
    BadGateway(String),

    #[error("Internal server error")]
    Internal(String),
}

/// Error body shared by every failing route.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldIssue>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, errors) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, None),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m, None),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, m, None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, None),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m, None),
            AppError::Validation { message, errors } => {
                (StatusCode::UNPROCESSABLE_ENTITY, message, Some(errors))
            }
            AppError::BadGateway(m) => (StatusCode::BAD_GATEWAY, m, None),
            AppError::Internal(detail) => {
                error!(detail = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };
        let body = Json(ErrorResponse {
            status: "error",
            message,
            errors,
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => AppError::Unauthorized("Invalid credentials".into()),
            AuthError::InvalidToken => AppError::Unauthorized("Invalid or expired token".into()),
            AuthError::MissingTenant => AppError::from(TenantError::Missing),
            AuthError::InvalidTenant(m) => AppError::BadRequest(m),
            AuthError::NotFound(m) => AppError::NotFound(m),
            AuthError::Conflict(m) => AppError::Conflict(m),
            AuthError::Validation(errors) => AppError::Validation {
                message: "Validation failed".into(),
                errors,
            },
            AuthError::Notification(e) => {
                warn!(error = %e, "notification dispatch failed");
                AppError::BadGateway("Password setup notification could not be sent".into())
            }
            AuthError::Store(e) => AppError::Internal(e.to_string()),
            AuthError::Internal(m) => AppError::Internal(m),
        }
    }
}

impl From<TenantError> for AppError {
    fn from(e: TenantError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation {
            message: "Invalid request body".into(),
            errors: vec![FieldIssue::new("body", rejection.body_text())],
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation {
            message: "Invalid query parameters".into(),
            errors: vec![FieldIssue::new("query", rejection.body_text())],
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// `Json` whose rejection renders as an [`AppError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// `Query` whose rejection renders as an [`AppError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

/// `Path` whose rejection renders as an [`AppError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn domain_errors_map_to_statuses() {
        let cases = [
            (AuthError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AuthError::InvalidToken, StatusCode::UNAUTHORIZED),
            (AuthError::MissingTenant, StatusCode::BAD_REQUEST),
            (AuthError::NotFound("User not found".into()), StatusCode::NOT_FOUND),
            (AuthError::Conflict("taken".into()), StatusCode::CONFLICT),
            (
                AuthError::validation("password", "too short"),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (AuthError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let (status, body) = body_of(err.into()).await;
            assert_eq!(status, expected);
            assert_eq!(body["status"], "error");
        }
    }

    #[tokio::test]
    async fn forbidden_is_403() {
        let (status, body) = body_of(AppError::Forbidden("no".into())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, serde_json::json!({"status": "error", "message": "no"}));
    }

    #[tokio::test]
    async fn query_extractor_reports_bad_parameters() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        #[derive(serde::Deserialize)]
        struct Paging {
            page: u32,
        }

        async fn handler(AppQuery(paging): AppQuery<Paging>) -> String {
            paging.page.to_string()
        }

        let app = axum::Router::new().route("/", axum::routing::get(handler));
        let ok = app
            .clone()
            .oneshot(Request::builder().uri("/?page=3").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let bad = app
            .oneshot(Request::builder().uri("/?page=x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let bytes = axum::body::to_bytes(bad.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["errors"][0]["field"], "query");
    }

    #[tokio::test]
    async fn validation_carries_field_issues() {
        let (_, body) = body_of(AuthError::validation("password", "too short").into()).await;
        assert_eq!(body["errors"][0]["field"], "password");
        assert_eq!(body["errors"][0]["message"], "too short");
    }

    #[tokio::test]
    async fn internal_detail_is_not_leaked() {
        let err = AuthError::Internal("pool timed out at 10.0.0.7".into());
        let (status, body) = body_of(err.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
        assert!(body.get("errors").is_none());
    }
}
