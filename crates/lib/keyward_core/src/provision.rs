//! Tenant schema provisioning.
//!
//! Tenants live in dynamically named schemas, so their tables cannot be
//! created by static migrations. `provision_tenant` is idempotent.

use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use crate::store::StoreError;
use crate::tenant::TenantId;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("'{0}' is a reserved namespace")]
    Reserved(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for ProvisionError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(StoreError::Db(err))
    }
}

/// DDL statements that create the tenant's tables.
pub fn tenant_ddl(tenant: &TenantId) -> Vec<String> {
    let schema = tenant.quoted();
    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {schema}"),
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.users (\
                id UUID PRIMARY KEY, \
                full_name TEXT NOT NULL, \
                login TEXT NOT NULL, \
                email TEXT NOT NULL, \
                password TEXT, \
                allow_features TEXT[] NOT NULL DEFAULT '{{}}', \
                denied_features TEXT[] NOT NULL DEFAULT '{{}}', \
                created_by TEXT NOT NULL, \
                updated_by TEXT NOT NULL, \
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW())"
        ),
        format!("CREATE UNIQUE INDEX IF NOT EXISTS users_login_key ON {schema}.users (LOWER(login))"),
        format!("CREATE UNIQUE INDEX IF NOT EXISTS users_email_key ON {schema}.users (LOWER(email))"),
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.access_groups (\
                id UUID PRIMARY KEY, \
                name TEXT NOT NULL, \
                code TEXT NOT NULL, \
                features TEXT[] NOT NULL DEFAULT '{{}}', \
                created_by TEXT NOT NULL, \
                updated_by TEXT NOT NULL, \
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW())"
        ),
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS access_groups_code_key \
             ON {schema}.access_groups (LOWER(code))"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.access_group_memberships (\
                user_id UUID NOT NULL REFERENCES {schema}.users(id) ON DELETE CASCADE, \
                group_id UUID NOT NULL REFERENCES {schema}.access_groups(id) ON DELETE CASCADE, \
                PRIMARY KEY (user_id, group_id))"
        ),
    ]
}

/// Create the tenant schema and tables in one transaction.
pub async fn provision_tenant(pool: &PgPool, tenant: &TenantId) -> Result<(), ProvisionError> {
    if tenant.is_reserved() {
        return Err(ProvisionError::Reserved(tenant.to_string()));
    }
    let mut tx = pool.begin().await?;
    for statement in tenant_ddl(tenant) {
        sqlx::query(&statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    info!(tenant = %tenant, "tenant schema provisioned");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_is_schema_qualified_and_idempotent() {
        let tenant = TenantId::parse("acme_corp").unwrap();
        let ddl = tenant_ddl(&tenant);
        assert_eq!(ddl[0], "CREATE SCHEMA IF NOT EXISTS \"acme_corp\"");
        for statement in &ddl[1..] {
            assert!(statement.contains("\"acme_corp\"."), "{statement}");
            assert!(statement.contains("IF NOT EXISTS"), "{statement}");
        }
        assert!(ddl.iter().any(|s| s.contains("ON DELETE CASCADE")));
        assert!(ddl.iter().any(|s| s.contains("DEFAULT '{}'")));
    }
}
