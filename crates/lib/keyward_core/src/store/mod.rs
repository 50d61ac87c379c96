//! Tenant-scoped persistence.
//!
//! Every operation takes a validated [`TenantId`]; implementations resolve
//! it to a schema (PostgreSQL) or a partition (in-memory).

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{User, UserProfileUpdate, UserWithPassword};
use crate::models::group::AccessGroup;
use crate::tenant::TenantId;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Enumerates tenant namespaces present in the backing store.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn list_tenants(&self) -> Result<Vec<TenantId>, StoreError>;
}

/// User rows and their group memberships.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn list_users(&self, tenant: &TenantId) -> Result<Vec<User>, StoreError>;

    async fn find_user(&self, tenant: &TenantId, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_login(
        &self,
        tenant: &TenantId,
        login: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(
        &self,
        tenant: &TenantId,
        email: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Case-insensitive match on login OR email, including the password hash.
    async fn find_credentials(
        &self,
        tenant: &TenantId,
        identifier: &str,
    ) -> Result<Option<UserWithPassword>, StoreError>;

    /// Insert the user, its memberships and optional password hash atomically.
    async fn insert_user(
        &self,
        tenant: &TenantId,
        user: &User,
        password_hash: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Returns `false` when the user does not exist.
    async fn update_user_profile(
        &self,
        tenant: &TenantId,
        id: Uuid,
        update: &UserProfileUpdate,
    ) -> Result<bool, StoreError>;

    /// Replace the membership set atomically. Returns `false` when the user does not exist.
    async fn replace_user_groups(
        &self,
        tenant: &TenantId,
        id: Uuid,
        group_ids: &[Uuid],
        updated_by: &str,
    ) -> Result<bool, StoreError>;

    /// Returns `false` when the user does not exist.
    async fn update_user_overrides(
        &self,
        tenant: &TenantId,
        id: Uuid,
        allow: &[String],
        deny: &[String],
        updated_by: &str,
    ) -> Result<bool, StoreError>;

    /// Overwrite the password hash. Returns `false` when the user does not exist.
    async fn set_password(
        &self,
        tenant: &TenantId,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, StoreError>;

    /// Delete the user and its memberships. Returns `false` when the user does not exist.
    async fn delete_user(&self, tenant: &TenantId, id: Uuid) -> Result<bool, StoreError>;
}

/// Access groups.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn list_groups(&self, tenant: &TenantId) -> Result<Vec<AccessGroup>, StoreError>;

    async fn find_group(
        &self,
        tenant: &TenantId,
        id: Uuid,
    ) -> Result<Option<AccessGroup>, StoreError>;

    /// Case-insensitive lookup by code.
    async fn find_group_by_code(
        &self,
        tenant: &TenantId,
        code: &str,
    ) -> Result<Option<AccessGroup>, StoreError>;

    /// Groups among `ids` that exist. Unknown ids are silently dropped.
    async fn find_groups(
        &self,
        tenant: &TenantId,
        ids: &[Uuid],
    ) -> Result<Vec<AccessGroup>, StoreError>;

    async fn insert_group(&self, tenant: &TenantId, group: &AccessGroup)
    -> Result<(), StoreError>;

    /// Returns `false` when the group does not exist.
    async fn update_group(&self, tenant: &TenantId, group: &AccessGroup)
    -> Result<bool, StoreError>;

    /// Delete the group and its memberships. Returns `false` when the group does not exist.
    async fn delete_group(&self, tenant: &TenantId, id: Uuid) -> Result<bool, StoreError>;

    async fn list_group_members(
        &self,
        tenant: &TenantId,
        group_id: Uuid,
    ) -> Result<Vec<User>, StoreError>;
}

/// Storage collaborators handed to each service.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub groups: Arc<dyn GroupStore>,
    pub tenants: Arc<dyn TenantDirectory>,
}

impl Stores {
    /// Use one backend for every concern.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: UserStore + GroupStore + TenantDirectory + 'static,
    {
        Self {
            users: store.clone(),
            groups: store.clone(),
            tenants: store,
        }
    }
}
