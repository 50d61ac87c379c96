//! Session request handlers.

use axum::Json;
use axum::extract::State;
use keyward_core::auth::session::{LoginResponse, TokenPair};

use crate::AppState;
use crate::error::{AppJson, AppQuery, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::middleware::tenant::OptionalTenant;
use crate::models::{
    CheckUrlQuery, CheckUrlResponse, LoginRequest, RefreshRequest, StatusResponse,
};

/// `POST /api/auth/login`: authenticate with login or email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    OptionalTenant(tenant): OptionalTenant,
    AppJson(body): AppJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let resp = state
        .sessions
        .login(tenant.as_ref(), &body.login_or_email, &body.password)
        .await?;
    Ok(Json(resp))
}

/// `POST /api/auth/refresh`: exchange a refresh token for a new token pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    OptionalTenant(tenant): OptionalTenant,
    AppJson(body): AppJson<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let pair = state
        .sessions
        .refresh(&body.refresh_token, tenant.as_ref())
        .await?;
    Ok(Json(pair))
}

/// `POST /api/auth/logout`: discard a session.
pub async fn logout_handler(
    State(state): State<AppState>,
    AppJson(body): AppJson<RefreshRequest>,
) -> AppResult<Json<StatusResponse>> {
    state.sessions.logout(&body.refresh_token)?;
    Ok(Json(StatusResponse::success("Logged out successfully")))
}

/// `GET /api/auth/check-url?url=`: whether the caller's menus reach `url`.
pub async fn check_url_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppQuery(query): AppQuery<CheckUrlQuery>,
) -> Json<CheckUrlResponse> {
    Json(CheckUrlResponse {
        has_permission: state
            .catalog
            .can_reach_url(&user.0.grant.permissions, &query.url),
    })
}
