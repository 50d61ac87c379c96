//! User and credential models.
//!
//! These are internal domain models; request/response shapes live in
//! `keyward_api::models`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant-scoped user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    /// Unique per tenant, compared case-insensitively.
    pub login: String,
    /// Unique per tenant, compared case-insensitively.
    pub email: String,
    pub group_ids: Vec<Uuid>,
    /// Feature keys granted regardless of group membership.
    pub allow_features: Vec<String>,
    /// Feature keys revoked regardless of group membership or allow list.
    pub denied_features: Vec<String>,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Minimal projection safe to hand back to clients.
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            full_name: self.full_name.clone(),
            login: self.login.clone(),
            email: self.email.clone(),
        }
    }

    /// Case-insensitive match on login or email.
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        self.login.eq_ignore_ascii_case(identifier) || self.email.eq_ignore_ascii_case(identifier)
    }
}

/// User with password hash (for internal auth flows).
///
/// `password_hash` is `None` until the user completes password setup.
#[derive(Debug, Clone)]
pub struct UserWithPassword {
    pub user: User,
    pub password_hash: Option<String>,
}

/// Public user projection returned by login and password redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub full_name: String,
    pub login: String,
    pub email: String,
}

/// Input for creating a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub full_name: String,
    pub login: String,
    pub email: String,
    pub group_ids: Vec<Uuid>,
    pub allow_features: Vec<String>,
    pub denied_features: Vec<String>,
    pub created_by: String,
}

/// Basic-info mutation surface.
#[derive(Debug, Clone)]
pub struct UserProfileUpdate {
    pub full_name: String,
    pub login: String,
    pub email: String,
    pub updated_by: String,
}
