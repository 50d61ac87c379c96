//! Access group handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use keyward_core::groups::GroupFilter;
use keyward_core::models::group::{AccessGroup, GroupUpdate, NewGroup};
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppJson, AppPath, AppQuery, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::middleware::tenant::Tenant;
use crate::models::{
    GroupListQuery, GroupMembersResponse, GroupRequest, GroupSearchResponse, GroupWithMembers,
    SearchQuery,
};

/// `GET /api/groups`
pub async fn list_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    AppQuery(query): AppQuery<GroupListQuery>,
) -> AppResult<Json<Vec<AccessGroup>>> {
    let filter = GroupFilter {
        search: query.search,
        feature: query.feature,
    };
    Ok(Json(state.groups.list(&tenant, &filter).await?))
}

/// `GET /api/groups/search?q=&page=&limit=`
pub async fn search_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    AppQuery(query): AppQuery<SearchQuery>,
) -> AppResult<Json<GroupSearchResponse>> {
    let page = state
        .groups
        .search(&tenant, &query.q, query.page(), query.limit())
        .await?;
    Ok(Json(page.into()))
}

/// `GET /api/groups/{id}`
pub async fn show_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<AccessGroup>> {
    Ok(Json(state.groups.get(&tenant, id).await?))
}

/// `POST /api/groups`
pub async fn create_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppJson(body): AppJson<GroupRequest>,
) -> AppResult<(StatusCode, Json<AccessGroup>)> {
    let input = NewGroup {
        name: body.name,
        code: body.code,
        features: body.features,
        created_by: body
            .created_by
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| user.actor().to_string()),
    };
    let group = state.groups.create(&tenant, input).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// `PUT /api/groups/{id}`
pub async fn update_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<GroupRequest>,
) -> AppResult<Json<AccessGroup>> {
    let input = GroupUpdate {
        name: body.name,
        code: body.code,
        features: body.features,
        updated_by: body
            .updated_by
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| user.actor().to_string()),
    };
    Ok(Json(state.groups.update(&tenant, id, input).await?))
}

/// `DELETE /api/groups/{id}`
pub async fn delete_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<StatusCode> {
    state.groups.delete(&tenant, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/groups/public/admin`
pub async fn admin_groups_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
) -> AppResult<Json<Vec<AccessGroup>>> {
    Ok(Json(state.groups.admin_groups(&tenant).await?))
}

/// `GET /api/groups/public/code/{code}`: empty `data` for an unknown code.
pub async fn by_code_handler(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    AppPath(code): AppPath<String>,
) -> AppResult<Json<GroupMembersResponse>> {
    let data = state
        .groups
        .with_members_by_code(&tenant, &code)
        .await?
        .map(|(group, members)| GroupWithMembers {
            id: group.id,
            name: group.name,
            code: group.code,
            users: members.iter().map(|m| m.public()).collect(),
        })
        .into_iter()
        .collect();
    Ok(Json(GroupMembersResponse { data }))
}
