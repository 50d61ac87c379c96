//! PostgreSQL store, one schema per tenant.
//!
//! Schema names only ever come from [`TenantId::quoted`]; values are
//! always bound as parameters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{GroupStore, StoreError, TenantDirectory, UserStore};
use crate::models::auth::{User, UserProfileUpdate, UserWithPassword};
use crate::models::group::AccessGroup;
use crate::tenant::TenantId;

/// Row shape shared by every user query.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    full_name: String,
    login: String,
    email: String,
    password: Option<String>,
    allow_features: Vec<String>,
    denied_features: Vec<String>,
    created_by: String,
    updated_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    group_ids: Vec<Uuid>,
}

impl UserRow {
    fn into_credentials(self) -> UserWithPassword {
        UserWithPassword {
            password_hash: self.password.clone(),
            user: self.into_user(),
        }
    }

    fn into_user(self) -> User {
        User {
            id: self.id,
            full_name: self.full_name,
            login: self.login,
            email: self.email,
            group_ids: self.group_ids,
            allow_features: self.allow_features,
            denied_features: self.denied_features,
            created_by: self.created_by,
            updated_by: self.updated_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: Uuid,
    name: String,
    code: String,
    features: Vec<String>,
    created_by: String,
    updated_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<GroupRow> for AccessGroup {
    fn from(row: GroupRow) -> Self {
        AccessGroup {
            id: row.id,
            name: row.name,
            code: row.code,
            features: row.features,
            created_by: row.created_by,
            updated_by: row.updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Users joined with their aggregated membership ids.
fn select_users(tenant: &TenantId, condition: &str) -> String {
    let schema = tenant.quoted();
    format!(
        "SELECT u.id, u.full_name, u.login, u.email, u.password, \
                u.allow_features, u.denied_features, u.created_by, u.updated_by, \
                u.created_at, u.updated_at, \
                COALESCE(ARRAY_AGG(m.group_id ORDER BY m.group_id) \
                         FILTER (WHERE m.group_id IS NOT NULL), '{{}}') AS group_ids \
         FROM {schema}.users u \
         LEFT JOIN {schema}.access_group_memberships m ON m.user_id = u.id \
         {condition} \
         GROUP BY u.id \
         ORDER BY u.full_name"
    )
}

fn select_groups(tenant: &TenantId, condition: &str) -> String {
    format!(
        "SELECT id, name, code, features, created_by, updated_by, created_at, updated_at \
         FROM {}.access_groups {condition} ORDER BY name",
        tenant.quoted()
    )
}

/// Map unique violations to [`StoreError::Conflict`].
fn write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err
        && db.is_unique_violation()
    {
        return StoreError::Conflict(db.constraint().unwrap_or("unique").to_string());
    }
    StoreError::Db(err)
}

async fn replace_memberships(
    tx: &mut Transaction<'_, Postgres>,
    tenant: &TenantId,
    user_id: Uuid,
    group_ids: &[Uuid],
) -> Result<(), StoreError> {
    let schema = tenant.quoted();
    sqlx::query(&format!(
        "DELETE FROM {schema}.access_group_memberships WHERE user_id = $1"
    ))
    .bind(user_id)
    .execute(&mut **tx)
    .await?;

    if group_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(&format!(
        "INSERT INTO {schema}.access_group_memberships (user_id, group_id) \
         SELECT $1, g FROM UNNEST($2::uuid[]) AS g \
         ON CONFLICT DO NOTHING"
    ))
    .bind(user_id)
    .bind(group_ids)
    .execute(&mut **tx)
    .await
    .map_err(write_error)?;
    Ok(())
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_user(
        &self,
        tenant: &TenantId,
        condition: &str,
        value: &str,
    ) -> Result<Option<UserRow>, StoreError> {
        let sql = select_users(tenant, condition);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[async_trait]
impl TenantDirectory for PgStore {
    async fn list_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        // Only schemas that actually carry a users table are tenants.
        let names = sqlx::query_scalar::<_, String>(
            "SELECT s.schema_name::text \
             FROM information_schema.schemata s \
             WHERE s.schema_name NOT IN ('information_schema', 'pg_catalog', 'pg_toast', 'public') \
               AND s.schema_name NOT LIKE 'pg\\_%' \
               AND EXISTS (SELECT 1 FROM information_schema.tables t \
                           WHERE t.table_schema = s.schema_name AND t.table_name = 'users') \
             ORDER BY s.schema_name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(names
            .into_iter()
            .filter_map(|name| match TenantId::parse(&name) {
                Ok(tenant) => Some(tenant),
                Err(_) => {
                    debug!(schema = %name, "skipping schema with non-tenant name");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn list_users(&self, tenant: &TenantId) -> Result<Vec<User>, StoreError> {
        let sql = select_users(tenant, "");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }

    async fn find_user(&self, tenant: &TenantId, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = select_users(tenant, "WHERE u.id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(UserRow::into_user))
    }

    async fn find_user_by_login(
        &self,
        tenant: &TenantId,
        login: &str,
    ) -> Result<Option<User>, StoreError> {
        let row = self
            .fetch_user(tenant, "WHERE LOWER(u.login) = LOWER($1)", login)
            .await?;
        Ok(row.map(UserRow::into_user))
    }

    async fn find_user_by_email(
        &self,
        tenant: &TenantId,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        let row = self
            .fetch_user(tenant, "WHERE LOWER(u.email) = LOWER($1)", email)
            .await?;
        Ok(row.map(UserRow::into_user))
    }

    async fn find_credentials(
        &self,
        tenant: &TenantId,
        identifier: &str,
    ) -> Result<Option<UserWithPassword>, StoreError> {
        let row = self
            .fetch_user(
                tenant,
                "WHERE LOWER(u.login) = LOWER($1) OR LOWER(u.email) = LOWER($1)",
                identifier,
            )
            .await?;
        Ok(row.map(UserRow::into_credentials))
    }

    async fn insert_user(
        &self,
        tenant: &TenantId,
        user: &User,
        password_hash: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "INSERT INTO {}.users (id, full_name, login, email, password, allow_features, \
             denied_features, created_by, updated_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            tenant.quoted()
        ))
        .bind(user.id)
        .bind(&user.full_name)
        .bind(&user.login)
        .bind(&user.email)
        .bind(password_hash)
        .bind(&user.allow_features)
        .bind(&user.denied_features)
        .bind(&user.created_by)
        .bind(&user.updated_by)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;

        replace_memberships(&mut tx, tenant, user.id, &user.group_ids).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_user_profile(
        &self,
        tenant: &TenantId,
        id: Uuid,
        update: &UserProfileUpdate,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE {}.users SET full_name = $2, login = $3, email = $4, \
             updated_by = $5, updated_at = NOW() WHERE id = $1",
            tenant.quoted()
        ))
        .bind(id)
        .bind(&update.full_name)
        .bind(&update.login)
        .bind(&update.email)
        .bind(&update.updated_by)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_user_groups(
        &self,
        tenant: &TenantId,
        id: Uuid,
        group_ids: &[Uuid],
        updated_by: &str,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let touched = sqlx::query(&format!(
            "UPDATE {}.users SET updated_by = $2, updated_at = NOW() WHERE id = $1",
            tenant.quoted()
        ))
        .bind(id)
        .bind(updated_by)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if touched == 0 {
            // Dropping the transaction rolls it back.
            return Ok(false);
        }
        replace_memberships(&mut tx, tenant, id, group_ids).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn update_user_overrides(
        &self,
        tenant: &TenantId,
        id: Uuid,
        allow: &[String],
        deny: &[String],
        updated_by: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE {}.users SET allow_features = $2, denied_features = $3, \
             updated_by = $4, updated_at = NOW() WHERE id = $1",
            tenant.quoted()
        ))
        .bind(id)
        .bind(allow)
        .bind(deny)
        .bind(updated_by)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_password(
        &self,
        tenant: &TenantId,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE {}.users SET password = $2, updated_at = NOW() WHERE id = $1",
            tenant.quoted()
        ))
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, tenant: &TenantId, id: Uuid) -> Result<bool, StoreError> {
        let schema = tenant.quoted();
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "DELETE FROM {schema}.access_group_memberships WHERE user_id = $1"
        ))
        .bind(id)
        .execute(&mut *tx)
        .await?;
        let deleted = sqlx::query(&format!("DELETE FROM {schema}.users WHERE id = $1"))
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl GroupStore for PgStore {
    async fn list_groups(&self, tenant: &TenantId) -> Result<Vec<AccessGroup>, StoreError> {
        let sql = select_groups(tenant, "");
        let rows = sqlx::query_as::<_, GroupRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AccessGroup::from).collect())
    }

    async fn find_group(
        &self,
        tenant: &TenantId,
        id: Uuid,
    ) -> Result<Option<AccessGroup>, StoreError> {
        let sql = select_groups(tenant, "WHERE id = $1");
        let row = sqlx::query_as::<_, GroupRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AccessGroup::from))
    }

    async fn find_group_by_code(
        &self,
        tenant: &TenantId,
        code: &str,
    ) -> Result<Option<AccessGroup>, StoreError> {
        let sql = select_groups(tenant, "WHERE LOWER(code) = LOWER($1)");
        let row = sqlx::query_as::<_, GroupRow>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AccessGroup::from))
    }

    async fn find_groups(
        &self,
        tenant: &TenantId,
        ids: &[Uuid],
    ) -> Result<Vec<AccessGroup>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = select_groups(tenant, "WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, GroupRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AccessGroup::from).collect())
    }

    async fn insert_group(
        &self,
        tenant: &TenantId,
        group: &AccessGroup,
    ) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO {}.access_groups (id, name, code, features, created_by, updated_by, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            tenant.quoted()
        ))
        .bind(group.id)
        .bind(&group.name)
        .bind(&group.code)
        .bind(&group.features)
        .bind(&group.created_by)
        .bind(&group.updated_by)
        .bind(group.created_at)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn update_group(
        &self,
        tenant: &TenantId,
        group: &AccessGroup,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE {}.access_groups SET name = $2, code = $3, features = $4, \
             updated_by = $5, updated_at = $6 WHERE id = $1",
            tenant.quoted()
        ))
        .bind(group.id)
        .bind(&group.name)
        .bind(&group.code)
        .bind(&group.features)
        .bind(&group.updated_by)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_group(&self, tenant: &TenantId, id: Uuid) -> Result<bool, StoreError> {
        let schema = tenant.quoted();
        let mut tx = self.pool.begin().await?;
        let detached = sqlx::query(&format!(
            "DELETE FROM {schema}.access_group_memberships WHERE group_id = $1"
        ))
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        let deleted = sqlx::query(&format!("DELETE FROM {schema}.access_groups WHERE id = $1"))
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Ok(false);
        }
        tx.commit().await?;
        if detached > 0 {
            warn!(tenant = %tenant, group_id = %id, detached, "group deleted with members");
        }
        Ok(true)
    }

    async fn list_group_members(
        &self,
        tenant: &TenantId,
        group_id: Uuid,
    ) -> Result<Vec<User>, StoreError> {
        let sql = select_users(
            tenant,
            &format!(
                "WHERE u.id IN (SELECT user_id FROM {}.access_group_memberships WHERE group_id = $1)",
                tenant.quoted()
            ),
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }
}
