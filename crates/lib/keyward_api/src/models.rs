//! Request and response bodies.
//!
//! Wire names are camelCase. Domain types that are already serializable
//! (`User`, `AccessGroup`, `LoginResponse`, ...) are returned as-is.

use keyward_core::models::Page;
use keyward_core::models::auth::{PublicUser, User};
use keyward_core::models::group::AccessGroup;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_PAGE: usize = 1;
const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(alias = "login", alias = "email")]
    pub login_or_email: String,
    #[serde(alias = "senha")]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Generic `{status:"success", message}` acknowledgement.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub message: String,
}

impl StatusResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckUrlQuery {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckUrlResponse {
    pub has_permission: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Listing and search
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    pub search: Option<String>,
    #[serde(alias = "accessGroup")]
    pub group_id: Option<Uuid>,
    pub feature: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GroupListQuery {
    pub search: Option<String>,
    pub feature: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn page(&self) -> usize {
        self.page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE)
    }

    pub fn limit(&self) -> usize {
        self.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT)
    }
}

#[derive(Debug, Serialize)]
pub struct UserSearchResponse {
    pub users: Vec<User>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

impl From<Page<User>> for UserSearchResponse {
    fn from(page: Page<User>) -> Self {
        Self {
            users: page.items,
            total: page.total,
            page: page.page,
            limit: page.limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupSearchResponse {
    pub groups: Vec<AccessGroup>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

impl From<Page<AccessGroup>> for GroupSearchResponse {
    fn from(page: Page<AccessGroup>) -> Self {
        Self {
            groups: page.items,
            total: page.total,
            page: page.page,
            limit: page.limit,
        }
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub full_name: String,
    pub login: String,
    pub email: String,
    #[serde(default)]
    pub group_ids: Vec<Uuid>,
    pub password: Option<String>,
    #[serde(default)]
    pub allow_features: Vec<String>,
    #[serde(default)]
    pub denied_features: Vec<String>,
    pub created_by: Option<String>,
    /// Overrides the front-end origin used in the setup link.
    pub web_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserBasicRequest {
    pub full_name: String,
    pub login: String,
    pub email: String,
    pub updated_by: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserGroupsRequest {
    pub group_ids: Vec<Uuid>,
    pub updated_by: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserPermissionsRequest {
    #[serde(default)]
    pub allow_features: Vec<String>,
    #[serde(default)]
    pub denied_features: Vec<String>,
    pub updated_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PublicClientRequest {
    pub login: String,
    #[serde(alias = "senha")]
    pub password: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicClientResponse {
    pub id: Uuid,
    pub login: String,
    pub email: String,
    pub group_id: Uuid,
}

// ---------------------------------------------------------------------------
// Password lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    pub email: String,
    pub web_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub token: String,
    #[serde(alias = "senha")]
    pub password: String,
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRequest {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub features: Vec<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GroupWithMembers {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub users: Vec<PublicUser>,
}

#[derive(Debug, Serialize)]
pub struct GroupMembersResponse {
    pub data: Vec<GroupWithMembers>,
}
