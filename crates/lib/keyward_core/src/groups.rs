//! Access group management.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::auth::{AuthError, FieldIssue};
use crate::catalog::Catalog;
use crate::models::Page;
use crate::models::auth::User;
use crate::models::group::{AccessGroup, GroupUpdate, NewGroup};
use crate::store::Stores;
use crate::tenant::TenantId;

/// Substring marking administrative group codes.
pub const ADMIN_CODE_MARKER: &str = "ADMIN";

#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    /// Case-insensitive substring of name or code.
    pub search: Option<String>,
    pub feature: Option<String>,
}

fn normalized_features(features: Vec<String>) -> Vec<String> {
    features
        .into_iter()
        .map(|f| f.trim().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub struct GroupService {
    stores: Stores,
    catalog: Arc<Catalog>,
}

impl GroupService {
    pub fn new(stores: Stores, catalog: Arc<Catalog>) -> Self {
        Self { stores, catalog }
    }

    pub async fn list(
        &self,
        tenant: &TenantId,
        filter: &GroupFilter,
    ) -> Result<Vec<AccessGroup>, AuthError> {
        let mut groups = self.stores.groups.list_groups(tenant).await?;
        if let Some(needle) = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let needle = needle.to_lowercase();
            groups.retain(|g| {
                g.name.to_lowercase().contains(&needle) || g.code.to_lowercase().contains(&needle)
            });
        }
        if let Some(feature) = filter.feature.as_deref().filter(|f| !f.is_empty()) {
            groups.retain(|g| g.features.iter().any(|f| f == feature));
        }
        Ok(groups)
    }

    pub async fn search(
        &self,
        tenant: &TenantId,
        query: &str,
        page: usize,
        limit: usize,
    ) -> Result<Page<AccessGroup>, AuthError> {
        if query.trim().is_empty() {
            return Ok(Page::empty(page, limit));
        }
        let filter = GroupFilter {
            search: Some(query.to_string()),
            ..GroupFilter::default()
        };
        Ok(Page::slice(self.list(tenant, &filter).await?, page, limit))
    }

    pub async fn get(&self, tenant: &TenantId, id: Uuid) -> Result<AccessGroup, AuthError> {
        self.stores
            .groups
            .find_group(tenant, id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Access group not found".into()))
    }

    pub async fn create(&self, tenant: &TenantId, input: NewGroup) -> Result<AccessGroup, AuthError> {
        let issues = self.issues(&input.name, &input.code, &input.features);
        if !issues.is_empty() {
            return Err(AuthError::Validation(issues));
        }
        let code = input.code.trim().to_string();
        self.ensure_code_free(tenant, &code, None).await?;

        let now = Utc::now();
        let group = AccessGroup {
            id: Uuid::now_v7(),
            name: input.name.trim().to_string(),
            code,
            features: normalized_features(input.features),
            updated_by: input.created_by.clone(),
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        };
        self.stores.groups.insert_group(tenant, &group).await?;
        info!(tenant = %tenant, group_id = %group.id, code = %group.code, "access group created");
        Ok(group)
    }

    pub async fn update(
        &self,
        tenant: &TenantId,
        id: Uuid,
        input: GroupUpdate,
    ) -> Result<AccessGroup, AuthError> {
        let issues = self.issues(&input.name, &input.code, &input.features);
        if !issues.is_empty() {
            return Err(AuthError::Validation(issues));
        }
        let current = self.get(tenant, id).await?;
        let code = input.code.trim().to_string();
        self.ensure_code_free(tenant, &code, Some(id)).await?;

        let group = AccessGroup {
            name: input.name.trim().to_string(),
            code,
            features: normalized_features(input.features),
            updated_by: input.updated_by,
            updated_at: Utc::now(),
            ..current
        };
        if !self.stores.groups.update_group(tenant, &group).await? {
            return Err(AuthError::NotFound("Access group not found".into()));
        }
        Ok(group)
    }

    /// Delete a group; its memberships go with it.
    pub async fn delete(&self, tenant: &TenantId, id: Uuid) -> Result<(), AuthError> {
        if !self.stores.groups.delete_group(tenant, id).await? {
            return Err(AuthError::NotFound("Access group not found".into()));
        }
        info!(tenant = %tenant, group_id = %id, "access group deleted");
        Ok(())
    }

    /// Groups whose code contains [`ADMIN_CODE_MARKER`].
    pub async fn admin_groups(&self, tenant: &TenantId) -> Result<Vec<AccessGroup>, AuthError> {
        let mut groups = self.stores.groups.list_groups(tenant).await?;
        groups.retain(|g| g.code.to_uppercase().contains(ADMIN_CODE_MARKER));
        Ok(groups)
    }

    /// A group with its members, or `None` when the code is unknown.
    pub async fn with_members_by_code(
        &self,
        tenant: &TenantId,
        code: &str,
    ) -> Result<Option<(AccessGroup, Vec<User>)>, AuthError> {
        let Some(group) = self.stores.groups.find_group_by_code(tenant, code.trim()).await? else {
            return Ok(None);
        };
        let members = self.stores.groups.list_group_members(tenant, group.id).await?;
        Ok(Some((group, members)))
    }

    fn issues(&self, name: &str, code: &str, features: &[String]) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        if name.trim().is_empty() {
            issues.push(FieldIssue::new("name", "is required"));
        }
        if code.trim().is_empty() {
            issues.push(FieldIssue::new("code", "is required"));
        }
        let trimmed: Vec<String> = features.iter().map(|f| f.trim().to_string()).collect();
        let unknown = self.catalog.unknown_keys(&trimmed);
        if !unknown.is_empty() {
            issues.push(FieldIssue::new(
                "features",
                format!("unknown feature keys: {}", unknown.join(", ")),
            ));
        }
        issues
    }

    async fn ensure_code_free(
        &self,
        tenant: &TenantId,
        code: &str,
        except: Option<Uuid>,
    ) -> Result<(), AuthError> {
        if let Some(existing) = self.stores.groups.find_group_by_code(tenant, code).await?
            && Some(existing.id) != except
        {
            return Err(AuthError::Conflict(format!(
                "Access group code '{code}' already in use"
            )));
        }
        Ok(())
    }
}
