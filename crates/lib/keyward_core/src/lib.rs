//! # keyward_core
//!
//! Core domain logic for Keyward: tenants, credentials, tokens,
//! permissions and the services that orchestrate them.

pub mod auth;
pub mod catalog;
pub mod groups;
pub mod models;
pub mod notify;
pub mod provision;
pub mod store;
pub mod tenant;
pub mod users;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use uuid::Uuid;

    use crate::models::auth::User;
    use crate::models::group::AccessGroup;
    use crate::tenant::TenantId;

    pub fn tenant(name: &str) -> TenantId {
        TenantId::parse(name).unwrap()
    }

    pub fn user(login: &str, email: &str, group_ids: Vec<Uuid>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::now_v7(),
            full_name: format!("{login} test"),
            login: login.to_string(),
            email: email.to_string(),
            group_ids,
            allow_features: vec![],
            denied_features: vec![],
            created_by: "tests".into(),
            updated_by: "tests".into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn group(code: &str, features: &[&str]) -> AccessGroup {
        let now = Utc::now();
        AccessGroup {
            id: Uuid::now_v7(),
            name: format!("{code} group"),
            code: code.to_string(),
            features: features.iter().map(|f| f.to_string()).collect(),
            created_by: "tests".into(),
            updated_by: "tests".into(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
