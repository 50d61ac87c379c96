//! Password reset handlers. Both routes are public.

use axum::Json;
use axum::extract::State;
use keyward_core::models::auth::PublicUser;

use crate::AppState;
use crate::error::{AppJson, AppResult};
use crate::middleware::tenant::OptionalTenant;
use crate::models::{RedeemRequest, ResetRequest, StatusResponse};

/// Body returned for every accepted reset request.
pub const RESET_REQUESTED_MESSAGE: &str =
    "If the address belongs to an account, a password reset link has been sent";

/// `POST /api/users/password/reset-request`
pub async fn reset_request_handler(
    State(state): State<AppState>,
    OptionalTenant(tenant): OptionalTenant,
    AppJson(body): AppJson<ResetRequest>,
) -> AppResult<Json<StatusResponse>> {
    state
        .lifecycle
        .request_reset(tenant.as_ref(), &body.email, body.web_url.as_deref())
        .await?;
    Ok(Json(StatusResponse::success(RESET_REQUESTED_MESSAGE)))
}

/// `POST /api/users/password/reset`: set a new password from a token.
pub async fn reset_handler(
    State(state): State<AppState>,
    OptionalTenant(tenant): OptionalTenant,
    AppJson(body): AppJson<RedeemRequest>,
) -> AppResult<Json<PublicUser>> {
    let user = state
        .lifecycle
        .redeem(tenant.as_ref(), &body.token, &body.password)
        .await?;
    Ok(Json(user))
}
