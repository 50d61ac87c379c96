//! User management handlers.
//!
//! All routes except `POST /api/users/public/clients` sit behind
//! `require_auth` and need a tenant header.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use keyward_core::auth::permissions::PermissionBreakdown;
use keyward_core::models::auth::{NewUser, User, UserProfileUpdate};
use keyward_core::users::{MyPermissions, UserFilter};
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppJson, AppPath, AppQuery, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::middleware::tenant::Tenant;
use crate::models::{
    CreateUserRequest, PublicClientRequest, PublicClientResponse, SearchQuery,
    UpdateUserBasicRequest, UpdateUserGroupsRequest, UpdateUserPermissionsRequest, UserListQuery,
    UserSearchResponse,
};

fn actor(explicit: Option<String>, user: &AuthenticatedUser) -> String {
    explicit
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| user.actor().to_string())
}

/// `GET /api/users`
pub async fn list_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    AppQuery(query): AppQuery<UserListQuery>,
) -> AppResult<Json<Vec<User>>> {
    let filter = UserFilter {
        search: query.search,
        group_id: query.group_id,
        feature: query.feature,
    };
    Ok(Json(state.users.list(&tenant, &filter).await?))
}

/// `GET /api/users/search?q=&page=&limit=`
pub async fn search_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    AppQuery(query): AppQuery<SearchQuery>,
) -> AppResult<Json<UserSearchResponse>> {
    let page = state
        .users
        .search(&tenant, &query.q, query.page(), query.limit())
        .await?;
    Ok(Json(page.into()))
}

/// `GET /api/users/{id}`
pub async fn show_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<User>> {
    Ok(Json(state.users.get(&tenant, id).await?))
}

/// `POST /api/users`: without a password, a setup link is mailed.
pub async fn create_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppJson(body): AppJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let input = NewUser {
        full_name: body.full_name,
        login: body.login,
        email: body.email,
        group_ids: body.group_ids,
        allow_features: body.allow_features,
        denied_features: body.denied_features,
        created_by: actor(body.created_by, &user),
    };
    let created = state
        .users
        .create(
            &tenant,
            input,
            body.password.as_deref(),
            body.web_url.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PUT /api/users/{id}/basic`
pub async fn update_basic_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<UpdateUserBasicRequest>,
) -> AppResult<Json<User>> {
    let update = UserProfileUpdate {
        full_name: body.full_name,
        login: body.login,
        email: body.email,
        updated_by: actor(body.updated_by, &user),
    };
    Ok(Json(state.users.update_profile(&tenant, id, update).await?))
}

/// `PUT /api/users/{id}/groups`
pub async fn update_groups_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<UpdateUserGroupsRequest>,
) -> AppResult<Json<User>> {
    let updated_by = actor(body.updated_by, &user);
    let updated = state
        .users
        .update_groups(&tenant, id, &body.group_ids, &updated_by)
        .await?;
    Ok(Json(updated))
}

/// `PUT /api/users/{id}/permissions`
pub async fn update_permissions_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<UpdateUserPermissionsRequest>,
) -> AppResult<Json<User>> {
    let updated_by = actor(body.updated_by, &user);
    let updated = state
        .users
        .update_overrides(
            &tenant,
            id,
            body.allow_features,
            body.denied_features,
            &updated_by,
        )
        .await?;
    Ok(Json(updated))
}

/// `DELETE /api/users/{id}`
pub async fn delete_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<StatusCode> {
    state.users.delete(&tenant, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/users/{id}/permissions`
pub async fn permissions_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<PermissionBreakdown>> {
    Ok(Json(state.users.permissions(&tenant, id).await?))
}

/// `GET /api/users/my-permissions`: recomputed, not read from the token.
pub async fn my_permissions_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<MyPermissions>> {
    let mine = state
        .users
        .my_permissions(&tenant, user.0.grant.user_id)
        .await?;
    Ok(Json(mine))
}

/// `POST /api/users/public/clients`: self-registration into the client group.
pub async fn create_public_client_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    AppJson(body): AppJson<PublicClientRequest>,
) -> AppResult<(StatusCode, Json<PublicClientResponse>)> {
    let (created, group_id) = state
        .users
        .register_client(&tenant, &body.login, &body.password, &body.email)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(PublicClientResponse {
            id: created.id,
            login: created.login,
            email: created.email,
            group_id,
        }),
    ))
}
