//! In-memory store.
//!
//! Implements every storage trait over a map of tenant partitions and
//! records which tenant each read touched, so tenant probing can be
//! observed in tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{GroupStore, StoreError, TenantDirectory, UserStore};
use crate::models::auth::{User, UserProfileUpdate, UserWithPassword};
use crate::models::group::AccessGroup;
use crate::tenant::TenantId;

#[derive(Default)]
struct Partition {
    users: BTreeMap<Uuid, (User, Option<String>)>,
    groups: BTreeMap<Uuid, AccessGroup>,
}

impl Partition {
    fn user_where(&self, pred: impl Fn(&User) -> bool) -> Option<&(User, Option<String>)> {
        self.users.values().find(|(u, _)| pred(u))
    }

    fn login_or_email_taken(&self, user: &User) -> Option<String> {
        self.users.values().find_map(|(u, _)| {
            if u.id == user.id {
                None
            } else if u.login.eq_ignore_ascii_case(&user.login) {
                Some(format!("login '{}'", user.login))
            } else if u.email.eq_ignore_ascii_case(&user.email) {
                Some(format!("email '{}'", user.email))
            } else {
                None
            }
        })
    }
}

/// Map-backed implementation of [`UserStore`], [`GroupStore`] and [`TenantDirectory`].
#[derive(Default)]
pub struct InMemoryStore {
    partitions: RwLock<BTreeMap<TenantId, Partition>>,
    lookups: Mutex<Vec<TenantId>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty tenant partition (no-op if present).
    pub async fn add_tenant(&self, tenant: &TenantId) {
        self.partitions
            .write()
            .await
            .entry(tenant.clone())
            .or_default();
    }

    /// Tenants touched by reads, in call order.
    pub fn lookups(&self) -> Vec<TenantId> {
        self.lookups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear_lookups(&self) {
        self.lookups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    fn record(&self, tenant: &TenantId) {
        self.lookups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tenant.clone());
    }

    async fn read_user(
        &self,
        tenant: &TenantId,
        pred: impl Fn(&User) -> bool,
    ) -> Option<(User, Option<String>)> {
        self.record(tenant);
        let partitions = self.partitions.read().await;
        partitions
            .get(tenant)
            .and_then(|p| p.user_where(pred))
            .cloned()
    }

    async fn mutate_user(
        &self,
        tenant: &TenantId,
        id: Uuid,
        apply: impl FnOnce(&mut User, &mut Option<String>),
    ) -> Result<bool, StoreError> {
        let mut partitions = self.partitions.write().await;
        let Some(partition) = partitions.get_mut(tenant) else {
            return Ok(false);
        };
        let Some((user, hash)) = partition.users.get(&id) else {
            return Ok(false);
        };
        let mut candidate = user.clone();
        let mut candidate_hash = hash.clone();
        apply(&mut candidate, &mut candidate_hash);
        if let Some(taken) = partition.login_or_email_taken(&candidate) {
            return Err(StoreError::Conflict(taken));
        }
        partition.users.insert(id, (candidate, candidate_hash));
        Ok(true)
    }
}

#[async_trait]
impl TenantDirectory for InMemoryStore {
    async fn list_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        Ok(self.partitions.read().await.keys().cloned().collect())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn list_users(&self, tenant: &TenantId) -> Result<Vec<User>, StoreError> {
        self.record(tenant);
        let partitions = self.partitions.read().await;
        let mut users: Vec<User> = partitions
            .get(tenant)
            .map(|p| p.users.values().map(|(u, _)| u.clone()).collect())
            .unwrap_or_default();
        users.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(users)
    }

    async fn find_user(&self, tenant: &TenantId, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.read_user(tenant, |u| u.id == id).await.map(|(u, _)| u))
    }

    async fn find_user_by_login(
        &self,
        tenant: &TenantId,
        login: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .read_user(tenant, |u| u.login.eq_ignore_ascii_case(login))
            .await
            .map(|(u, _)| u))
    }

    async fn find_user_by_email(
        &self,
        tenant: &TenantId,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .read_user(tenant, |u| u.email.eq_ignore_ascii_case(email))
            .await
            .map(|(u, _)| u))
    }

    async fn find_credentials(
        &self,
        tenant: &TenantId,
        identifier: &str,
    ) -> Result<Option<UserWithPassword>, StoreError> {
        Ok(self
            .read_user(tenant, |u| u.matches_identifier(identifier))
            .await
            .map(|(user, password_hash)| UserWithPassword {
                user,
                password_hash,
            }))
    }

    async fn insert_user(
        &self,
        tenant: &TenantId,
        user: &User,
        password_hash: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().await;
        let partition = partitions.entry(tenant.clone()).or_default();
        if let Some(taken) = partition.login_or_email_taken(user) {
            return Err(StoreError::Conflict(taken));
        }
        partition
            .users
            .insert(user.id, (user.clone(), password_hash.map(str::to_string)));
        Ok(())
    }

    async fn update_user_profile(
        &self,
        tenant: &TenantId,
        id: Uuid,
        update: &UserProfileUpdate,
    ) -> Result<bool, StoreError> {
        self.mutate_user(tenant, id, |user, _| {
            user.full_name = update.full_name.clone();
            user.login = update.login.clone();
            user.email = update.email.clone();
            user.updated_by = update.updated_by.clone();
            user.updated_at = Utc::now();
        })
        .await
    }

    async fn replace_user_groups(
        &self,
        tenant: &TenantId,
        id: Uuid,
        group_ids: &[Uuid],
        updated_by: &str,
    ) -> Result<bool, StoreError> {
        self.mutate_user(tenant, id, |user, _| {
            user.group_ids = group_ids.to_vec();
            user.updated_by = updated_by.to_string();
            user.updated_at = Utc::now();
        })
        .await
    }

    async fn update_user_overrides(
        &self,
        tenant: &TenantId,
        id: Uuid,
        allow: &[String],
        deny: &[String],
        updated_by: &str,
    ) -> Result<bool, StoreError> {
        self.mutate_user(tenant, id, |user, _| {
            user.allow_features = allow.to_vec();
            user.denied_features = deny.to_vec();
            user.updated_by = updated_by.to_string();
            user.updated_at = Utc::now();
        })
        .await
    }

    async fn set_password(
        &self,
        tenant: &TenantId,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        self.mutate_user(tenant, id, |user, hash| {
            *hash = Some(password_hash.to_string());
            user.updated_at = Utc::now();
        })
        .await
    }

    async fn delete_user(&self, tenant: &TenantId, id: Uuid) -> Result<bool, StoreError> {
        let mut partitions = self.partitions.write().await;
        Ok(partitions
            .get_mut(tenant)
            .is_some_and(|p| p.users.remove(&id).is_some()))
    }
}

#[async_trait]
impl GroupStore for InMemoryStore {
    async fn list_groups(&self, tenant: &TenantId) -> Result<Vec<AccessGroup>, StoreError> {
        self.record(tenant);
        let partitions = self.partitions.read().await;
        let mut groups: Vec<AccessGroup> = partitions
            .get(tenant)
            .map(|p| p.groups.values().cloned().collect())
            .unwrap_or_default();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn find_group(
        &self,
        tenant: &TenantId,
        id: Uuid,
    ) -> Result<Option<AccessGroup>, StoreError> {
        self.record(tenant);
        let partitions = self.partitions.read().await;
        Ok(partitions.get(tenant).and_then(|p| p.groups.get(&id)).cloned())
    }

    async fn find_group_by_code(
        &self,
        tenant: &TenantId,
        code: &str,
    ) -> Result<Option<AccessGroup>, StoreError> {
        self.record(tenant);
        let partitions = self.partitions.read().await;
        Ok(partitions.get(tenant).and_then(|p| {
            p.groups
                .values()
                .find(|g| g.code.eq_ignore_ascii_case(code))
                .cloned()
        }))
    }

    async fn find_groups(
        &self,
        tenant: &TenantId,
        ids: &[Uuid],
    ) -> Result<Vec<AccessGroup>, StoreError> {
        self.record(tenant);
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(tenant)
            .map(|p| ids.iter().filter_map(|id| p.groups.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    async fn insert_group(
        &self,
        tenant: &TenantId,
        group: &AccessGroup,
    ) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().await;
        let partition = partitions.entry(tenant.clone()).or_default();
        if partition
            .groups
            .values()
            .any(|g| g.code.eq_ignore_ascii_case(&group.code))
        {
            return Err(StoreError::Conflict(format!("code '{}'", group.code)));
        }
        partition.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn update_group(
        &self,
        tenant: &TenantId,
        group: &AccessGroup,
    ) -> Result<bool, StoreError> {
        let mut partitions = self.partitions.write().await;
        let Some(partition) = partitions.get_mut(tenant) else {
            return Ok(false);
        };
        if !partition.groups.contains_key(&group.id) {
            return Ok(false);
        }
        if partition
            .groups
            .values()
            .any(|g| g.id != group.id && g.code.eq_ignore_ascii_case(&group.code))
        {
            return Err(StoreError::Conflict(format!("code '{}'", group.code)));
        }
        partition.groups.insert(group.id, group.clone());
        Ok(true)
    }

    async fn delete_group(&self, tenant: &TenantId, id: Uuid) -> Result<bool, StoreError> {
        let mut partitions = self.partitions.write().await;
        let Some(partition) = partitions.get_mut(tenant) else {
            return Ok(false);
        };
        if partition.groups.remove(&id).is_none() {
            return Ok(false);
        }
        for (user, _) in partition.users.values_mut() {
            user.group_ids.retain(|g| *g != id);
        }
        Ok(true)
    }

    async fn list_group_members(
        &self,
        tenant: &TenantId,
        group_id: Uuid,
    ) -> Result<Vec<User>, StoreError> {
        self.record(tenant);
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(tenant)
            .map(|p| {
                p.users
                    .values()
                    .filter(|(u, _)| u.group_ids.contains(&group_id))
                    .map(|(u, _)| u.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
