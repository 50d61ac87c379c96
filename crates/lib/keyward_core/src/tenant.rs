//! Tenant namespaces.
//!
//! A tenant is an isolated set of user/group tables living in its own
//! PostgreSQL schema. `TenantId` is the only way a tenant name reaches
//! storage, so the identifier rule is enforced at construction.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::store::{StoreError, TenantDirectory};

/// Namespaces that belong to the database itself and never hold tenant data.
pub const RESERVED_NAMESPACES: &[&str] = &["information_schema", "pg_catalog", "pg_toast", "public"];

/// Tenant resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenantError {
    #[error("Tenant identifier is required")]
    Missing,

    #[error(
        "Invalid tenant identifier '{0}': use letters, digits and underscore, starting with a letter or underscore"
    )]
    Invalid(String),
}

/// Validated tenant identifier matching `^[a-zA-Z_][a-zA-Z0-9_]*$`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Validate a raw identifier.
    pub fn parse(raw: &str) -> Result<Self, TenantError> {
        let mut chars = raw.chars();
        let valid = match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        };
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(TenantError::Invalid(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted SQL identifier for schema-qualified table names.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Whether the name collides with a database-owned namespace.
    pub fn is_reserved(&self) -> bool {
        RESERVED_NAMESPACES.contains(&self.0.as_str()) || self.0.starts_with("pg_")
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantId {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = TenantError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

/// Find the first tenant for which `lookup` yields a value.
///
/// Tenants are visited one at a time in lexicographic order and the scan
/// stops at the first hit, so at most one lookup is in flight. Cost is
/// linear in the number of tenants.
pub async fn probe_tenants<T, F, Fut>(
    directory: &dyn TenantDirectory,
    mut lookup: F,
) -> Result<Option<(TenantId, T)>, StoreError>
where
    F: FnMut(TenantId) -> Fut,
    Fut: Future<Output = Result<Option<T>, StoreError>>,
{
    let mut tenants = directory.list_tenants().await?;
    tenants.retain(|t| !t.is_reserved());
    tenants.sort();
    tenants.dedup();

    let candidates = tenants.len();
    for (visited, tenant) in tenants.into_iter().enumerate() {
        if let Some(found) = lookup(tenant.clone()).await? {
            debug!(tenant = %tenant, visited = visited + 1, candidates, "tenant probe matched");
            return Ok(Some((tenant, found)));
        }
    }
    debug!(candidates, "tenant probe found no match");
    Ok(None)
}

/// Look up in `known` when a tenant was supplied, otherwise probe.
pub async fn locate_in_tenant<T, F, Fut>(
    directory: &dyn TenantDirectory,
    known: Option<&TenantId>,
    mut lookup: F,
) -> Result<Option<(TenantId, T)>, StoreError>
where
    F: FnMut(TenantId) -> Fut,
    Fut: Future<Output = Result<Option<T>, StoreError>>,
{
    match known {
        Some(tenant) => Ok(lookup(tenant.clone())
            .await?
            .map(|found| (tenant.clone(), found))),
        None => probe_tenants(directory, lookup).await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::UserStore;
    use crate::store::memory::InMemoryStore;
    use crate::test_support::user;

    #[test]
    fn accepts_identifier_shapes() {
        for raw in ["acme_corp", "_internal", "T1", "a"] {
            assert!(TenantId::parse(raw).is_ok(), "{raw} should be valid");
        }
    }

    #[test]
    fn rejects_invalid_identifiers() {
        for raw in ["", "1acme", "acme-corp", "acme corp", "acme\"; DROP", "ação"] {
            assert_eq!(
                TenantId::parse(raw),
                Err(TenantError::Invalid(raw.to_string())),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn quoted_wraps_in_double_quotes() {
        let tenant = TenantId::parse("acme_corp").unwrap();
        assert_eq!(tenant.quoted(), "\"acme_corp\"");
    }

    #[test]
    fn deserialization_enforces_rule() {
        let ok: Result<TenantId, _> = serde_json::from_str("\"beta\"");
        assert!(ok.is_ok());
        let bad: Result<TenantId, _> = serde_json::from_str("\"be-ta\"");
        assert!(bad.is_err());
    }

    #[test]
    fn reserved_namespaces_are_flagged() {
        assert!(TenantId::parse("public").unwrap().is_reserved());
        assert!(TenantId::parse("pg_temp_3").unwrap().is_reserved());
        assert!(!TenantId::parse("acme").unwrap().is_reserved());
    }

    #[tokio::test]
    async fn probe_stops_at_first_matching_tenant() {
        let store = Arc::new(InMemoryStore::new());
        let alpha = TenantId::parse("alpha").unwrap();
        let beta = TenantId::parse("beta").unwrap();
        let gamma = TenantId::parse("gamma").unwrap();
        // Registration order differs from probe order on purpose.
        store.add_tenant(&gamma).await;
        store.add_tenant(&beta).await;
        store.add_tenant(&alpha).await;
        store
            .insert_user(&beta, &user("mlopes", "m@beta.test", vec![]), None)
            .await
            .unwrap();
        store.clear_lookups();

        let users = store.clone();
        let found = probe_tenants(&*store, |tenant| {
            let users = users.clone();
            async move { users.find_user_by_login(&tenant, "MLOPES").await }
        })
        .await
        .unwrap();

        let (tenant, found) = found.expect("user should be found");
        assert_eq!(tenant, beta);
        assert_eq!(found.login, "mlopes");
        assert_eq!(store.lookups(), vec![alpha, beta]);
    }

    #[tokio::test]
    async fn probe_returns_none_when_no_tenant_matches() {
        let store = Arc::new(InMemoryStore::new());
        store.add_tenant(&TenantId::parse("alpha").unwrap()).await;
        store.add_tenant(&TenantId::parse("beta").unwrap()).await;

        let users = store.clone();
        let found = probe_tenants(&*store, |tenant| {
            let users = users.clone();
            async move { users.find_user_by_email(&tenant, "ghost@nowhere.test").await }
        })
        .await
        .unwrap();

        assert!(found.is_none());
        assert_eq!(store.lookups().len(), 2);
    }

    #[tokio::test]
    async fn known_tenant_skips_the_probe() {
        let store = Arc::new(InMemoryStore::new());
        let alpha = TenantId::parse("alpha").unwrap();
        let beta = TenantId::parse("beta").unwrap();
        store.add_tenant(&alpha).await;
        store.add_tenant(&beta).await;

        let users = store.clone();
        let found = locate_in_tenant(&*store, Some(&beta), |tenant| {
            let users = users.clone();
            async move { users.find_user_by_login(&tenant, "nobody").await }
        })
        .await
        .unwrap();

        assert!(found.is_none());
        assert_eq!(store.lookups(), vec![beta]);
    }
}
