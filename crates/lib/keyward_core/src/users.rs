//! User management.
//!
//! A user is mutated through three separate operations: profile (name,
//! login, email), group membership and allow/deny overrides. None of them
//! touches the fields owned by the others.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::password::PasswordPolicy;
use crate::auth::password_reset::PasswordLifecycleService;
use crate::auth::permissions::{PermissionBreakdown, compute_effective_permissions};
use crate::auth::{AuthError, FieldIssue};
use crate::catalog::Catalog;
use crate::models::Page;
use crate::models::auth::{NewUser, PublicUser, User, UserProfileUpdate};
use crate::models::group::AccessGroup;
use crate::store::Stores;
use crate::tenant::TenantId;

/// Code of the group self-registered clients join.
pub const CLIENT_GROUP_CODE: &str = "CLIENTES";

/// Optional filters for [`UserService::list`].
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive substring of full name, login or email.
    pub search: Option<String>,
    pub group_id: Option<Uuid>,
    /// Only users whose effective permissions include this key.
    pub feature: Option<String>,
}

/// The caller's own permissions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyPermissions {
    pub user: PublicUser,
    pub permissions: Vec<String>,
    pub total: usize,
}

pub(crate) fn profile_issues(full_name: &str, login: &str, email: &str) -> Vec<FieldIssue> {
    let mut issues = Vec::new();
    if full_name.trim().is_empty() {
        issues.push(FieldIssue::new("fullName", "is required"));
    }
    if login.trim().is_empty() {
        issues.push(FieldIssue::new("login", "is required"));
    } else if login.trim().chars().any(char::is_whitespace) {
        issues.push(FieldIssue::new("login", "must not contain spaces"));
    }
    if !is_plausible_email(email.trim()) {
        issues.push(FieldIssue::new("email", "must be a valid e-mail address"));
    }
    issues
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
}

fn matches_search(user: &User, needle: &str) -> bool {
    user.full_name.to_lowercase().contains(needle)
        || user.login.to_lowercase().contains(needle)
        || user.email.to_lowercase().contains(needle)
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    ids.iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub struct UserService {
    stores: Stores,
    catalog: Arc<Catalog>,
    passwords: Arc<PasswordPolicy>,
    lifecycle: Arc<PasswordLifecycleService>,
}

impl UserService {
    pub fn new(
        stores: Stores,
        catalog: Arc<Catalog>,
        passwords: Arc<PasswordPolicy>,
        lifecycle: Arc<PasswordLifecycleService>,
    ) -> Self {
        Self {
            stores,
            catalog,
            passwords,
            lifecycle,
        }
    }

    pub async fn list(&self, tenant: &TenantId, filter: &UserFilter) -> Result<Vec<User>, AuthError> {
        let mut users = self.stores.users.list_users(tenant).await?;

        if let Some(needle) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = needle.to_lowercase();
            users.retain(|u| matches_search(u, &needle));
        }
        if let Some(group_id) = filter.group_id {
            users.retain(|u| u.group_ids.contains(&group_id));
        }
        if let Some(feature) = filter.feature.as_deref().filter(|f| !f.is_empty()) {
            let groups = self.stores.groups.list_groups(tenant).await?;
            users.retain(|u| compute_effective_permissions(u, &groups).contains(feature));
        }
        Ok(users)
    }

    /// Paginated text search. A blank query yields an empty page.
    pub async fn search(
        &self,
        tenant: &TenantId,
        query: &str,
        page: usize,
        limit: usize,
    ) -> Result<Page<User>, AuthError> {
        if query.trim().is_empty() {
            return Ok(Page::empty(page, limit));
        }
        let filter = UserFilter {
            search: Some(query.to_string()),
            ..UserFilter::default()
        };
        let users = self.list(tenant, &filter).await?;
        Ok(Page::slice(users, page, limit))
    }

    pub async fn get(&self, tenant: &TenantId, id: Uuid) -> Result<User, AuthError> {
        self.stores
            .users
            .find_user(tenant, id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".into()))
    }

    /// Create a user.
    ///
    /// With a password the hash is stored together with the user. Without
    /// one, the user is stored first and a setup link is mailed; a failed
    /// dispatch is returned as [`AuthError::Notification`] and the user
    /// remains.
    pub async fn create(
        &self,
        tenant: &TenantId,
        input: NewUser,
        password: Option<&str>,
        web_url: Option<&str>,
    ) -> Result<User, AuthError> {
        let mut issues = profile_issues(&input.full_name, &input.login, &input.email);
        issues.extend(self.override_issues(&input.allow_features, &input.denied_features));
        let password = password.filter(|p| !p.is_empty());
        if let Some(secret) = password
            && let Err(AuthError::Validation(password_issues)) = self.passwords.validate(secret)
        {
            issues.extend(password_issues);
        }
        if !issues.is_empty() {
            return Err(AuthError::Validation(issues));
        }

        let login = input.login.trim().to_string();
        let email = input.email.trim().to_lowercase();
        self.ensure_available(tenant, &login, &email, None).await?;
        let group_ids = dedup(&input.group_ids);
        self.ensure_groups_exist(tenant, &group_ids).await?;

        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(),
            full_name: input.full_name.trim().to_string(),
            login,
            email,
            group_ids,
            allow_features: input.allow_features,
            denied_features: input.denied_features,
            updated_by: input.created_by.clone(),
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        };

        match password {
            Some(secret) => {
                let hash = self.passwords.hash(secret)?;
                self.stores.users.insert_user(tenant, &user, Some(&hash)).await?;
                info!(tenant = %tenant, user_id = %user.id, "user created with password");
            }
            None => {
                self.stores.users.insert_user(tenant, &user, None).await?;
                info!(tenant = %tenant, user_id = %user.id, "user created, sending setup link");
                self.lifecycle.send_setup(tenant, &user, web_url).await?;
            }
        }
        Ok(user)
    }

    /// Self-registration into the client group.
    pub async fn register_client(
        &self,
        tenant: &TenantId,
        login: &str,
        password: &str,
        email: &str,
    ) -> Result<(User, Uuid), AuthError> {
        let group = self
            .stores
            .groups
            .find_group_by_code(tenant, CLIENT_GROUP_CODE)
            .await?
            .ok_or_else(|| AuthError::NotFound("Client group not found".into()))?;
        let input = NewUser {
            full_name: login.trim().to_string(),
            login: login.to_string(),
            email: email.to_string(),
            group_ids: vec![group.id],
            created_by: "system".into(),
            ..NewUser::default()
        };
        if password.is_empty() {
            return Err(AuthError::validation("password", "is required"));
        }
        let user = self.create(tenant, input, Some(password), None).await?;
        Ok((user, group.id))
    }

    pub async fn update_profile(
        &self,
        tenant: &TenantId,
        id: Uuid,
        update: UserProfileUpdate,
    ) -> Result<User, AuthError> {
        let issues = profile_issues(&update.full_name, &update.login, &update.email);
        if !issues.is_empty() {
            return Err(AuthError::Validation(issues));
        }
        let update = UserProfileUpdate {
            full_name: update.full_name.trim().to_string(),
            login: update.login.trim().to_string(),
            email: update.email.trim().to_lowercase(),
            updated_by: update.updated_by,
        };
        self.get(tenant, id).await?;
        self.ensure_available(tenant, &update.login, &update.email, Some(id))
            .await?;
        if !self.stores.users.update_user_profile(tenant, id, &update).await? {
            return Err(AuthError::NotFound("User not found".into()));
        }
        self.get(tenant, id).await
    }

    pub async fn update_groups(
        &self,
        tenant: &TenantId,
        id: Uuid,
        group_ids: &[Uuid],
        updated_by: &str,
    ) -> Result<User, AuthError> {
        let group_ids = dedup(group_ids);
        self.ensure_groups_exist(tenant, &group_ids).await?;
        if !self
            .stores
            .users
            .replace_user_groups(tenant, id, &group_ids, updated_by)
            .await?
        {
            return Err(AuthError::NotFound("User not found".into()));
        }
        self.get(tenant, id).await
    }

    pub async fn update_overrides(
        &self,
        tenant: &TenantId,
        id: Uuid,
        allow: Vec<String>,
        deny: Vec<String>,
        updated_by: &str,
    ) -> Result<User, AuthError> {
        let issues = self.override_issues(&allow, &deny);
        if !issues.is_empty() {
            return Err(AuthError::Validation(issues));
        }
        let allow: Vec<String> = allow.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let deny: Vec<String> = deny.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        if !self
            .stores
            .users
            .update_user_overrides(tenant, id, &allow, &deny, updated_by)
            .await?
        {
            return Err(AuthError::NotFound("User not found".into()));
        }
        self.get(tenant, id).await
    }

    pub async fn delete(&self, tenant: &TenantId, id: Uuid) -> Result<(), AuthError> {
        if !self.stores.users.delete_user(tenant, id).await? {
            return Err(AuthError::NotFound("User not found".into()));
        }
        info!(tenant = %tenant, user_id = %id, "user deleted");
        Ok(())
    }

    pub async fn permissions(
        &self,
        tenant: &TenantId,
        id: Uuid,
    ) -> Result<PermissionBreakdown, AuthError> {
        let user = self.get(tenant, id).await?;
        let groups = self.member_groups(tenant, &user).await?;
        Ok(PermissionBreakdown::new(&user, &groups))
    }

    /// Fresh effective permissions for the authenticated caller.
    pub async fn my_permissions(
        &self,
        tenant: &TenantId,
        user_id: Uuid,
    ) -> Result<MyPermissions, AuthError> {
        let user = self.get(tenant, user_id).await?;
        let groups = self.member_groups(tenant, &user).await?;
        let permissions: Vec<String> = compute_effective_permissions(&user, &groups)
            .into_iter()
            .collect();
        Ok(MyPermissions {
            user: user.public(),
            total: permissions.len(),
            permissions,
        })
    }

    async fn member_groups(
        &self,
        tenant: &TenantId,
        user: &User,
    ) -> Result<Vec<AccessGroup>, AuthError> {
        Ok(self.stores.groups.find_groups(tenant, &user.group_ids).await?)
    }

    fn override_issues(&self, allow: &[String], deny: &[String]) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        for (field, keys) in [("allowFeatures", allow), ("deniedFeatures", deny)] {
            let unknown = self.catalog.unknown_keys(keys);
            if !unknown.is_empty() {
                issues.push(FieldIssue::new(
                    field,
                    format!("unknown feature keys: {}", unknown.join(", ")),
                ));
            }
        }
        issues
    }

    async fn ensure_available(
        &self,
        tenant: &TenantId,
        login: &str,
        email: &str,
        except: Option<Uuid>,
    ) -> Result<(), AuthError> {
        let other = |u: &User| Some(u.id) != except;
        if let Some(existing) = self.stores.users.find_user_by_login(tenant, login).await?
            && other(&existing)
        {
            return Err(AuthError::Conflict("Login already in use".into()));
        }
        if let Some(existing) = self.stores.users.find_user_by_email(tenant, email).await?
            && other(&existing)
        {
            return Err(AuthError::Conflict("E-mail already in use".into()));
        }
        Ok(())
    }

    async fn ensure_groups_exist(&self, tenant: &TenantId, ids: &[Uuid]) -> Result<(), AuthError> {
        if ids.is_empty() {
            return Ok(());
        }
        let found = self.stores.groups.find_groups(tenant, ids).await?;
        if found.len() != ids.len() {
            return Err(AuthError::NotFound(
                "One or more groups were not found".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use jsonwebtoken::Algorithm;

    use super::*;
    use crate::auth::jwt::{TokenCodec, TokenSettings};
    use crate::auth::password::verify_password;
    use crate::auth::password_reset::ResetLinkSettings;
    use crate::notify::{Notifier, RecordingNotifier};
    use crate::store::memory::InMemoryStore;
    use crate::store::{GroupStore, UserStore};
    use crate::test_support::{group, tenant};

    struct Fixture {
        store: Arc<InMemoryStore>,
        notifier: Arc<RecordingNotifier>,
        service: UserService,
        ops: AccessGroup,
        clients: AccessGroup,
    }

    async fn fixture_with(notifier: Arc<RecordingNotifier>) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let acme = tenant("acme");
        let ops = group("OPS", &["users:read", "reports:view"]);
        let clients = group(CLIENT_GROUP_CODE, &["clients:read"]);
        store.insert_group(&acme, &ops).await.unwrap();
        store.insert_group(&acme, &clients).await.unwrap();

        let stores = Stores::shared(store.clone());
        let passwords = Arc::new(PasswordPolicy::new(4));
        let codec = Arc::new(
            TokenCodec::new(TokenSettings {
                issuer: "keyward".into(),
                audience: "keyward".into(),
                algorithm: Algorithm::HS256,
                access_secret: "a".into(),
                refresh_secret: "r".into(),
                password_secret: "p".into(),
            })
            .unwrap(),
        );
        let dyn_notifier: Arc<dyn Notifier> = notifier.clone();
        let lifecycle = Arc::new(PasswordLifecycleService::new(
            stores.clone(),
            codec,
            passwords.clone(),
            dyn_notifier,
            ResetLinkSettings {
                web_url: "http://app.test".into(),
                reset_path: "/account/set-password".into(),
            },
            Duration::hours(2),
        ));
        let service = UserService::new(
            stores,
            Arc::new(Catalog::embedded().unwrap()),
            passwords,
            lifecycle,
        );
        Fixture {
            store,
            notifier,
            service,
            ops,
            clients,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Arc::new(RecordingNotifier::new())).await
    }

    fn new_user(login: &str, group_ids: Vec<Uuid>) -> NewUser {
        NewUser {
            full_name: format!("{login} Silva"),
            login: login.into(),
            email: format!("{login}@ACME.test"),
            group_ids,
            created_by: "admin".into(),
            ..NewUser::default()
        }
    }

    #[tokio::test]
    async fn create_with_password_stores_hash_and_normalizes() {
        let fx = fixture().await;
        let acme = tenant("acme");
        let user = fx
            .service
            .create(&acme, new_user("ana", vec![fx.ops.id]), Some("long-secret"), None)
            .await
            .unwrap();
        assert_eq!(user.email, "ana@acme.test");
        assert_eq!(user.updated_by, "admin");

        let creds = fx.store.find_credentials(&acme, "ana").await.unwrap().unwrap();
        assert!(verify_password("long-secret", creds.password_hash.as_deref().unwrap()));
        assert!(fx.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn create_without_password_mails_setup_link() {
        let fx = fixture().await;
        let acme = tenant("acme");
        let user = fx
            .service
            .create(&acme, new_user("bia", vec![]), None, None)
            .await
            .unwrap();
        let sent = fx.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.recipient.id, user.id);
    }

    #[tokio::test]
    async fn failed_setup_mail_keeps_the_user() {
        let fx = fixture_with(Arc::new(RecordingNotifier::failing(503))).await;
        let acme = tenant("acme");
        let err = fx
            .service
            .create(&acme, new_user("caio", vec![]), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Notification(_)));
        assert!(fx.store.find_user_by_login(&acme, "caio").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn create_rejects_conflicts_unknown_groups_and_features() {
        let fx = fixture().await;
        let acme = tenant("acme");
        fx.service
            .create(&acme, new_user("ana", vec![]), Some("long-secret"), None)
            .await
            .unwrap();

        let err = fx
            .service
            .create(&acme, new_user("ANA", vec![]), Some("long-secret"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));

        let err = fx
            .service
            .create(&acme, new_user("dan", vec![Uuid::now_v7()]), Some("long-secret"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));

        let mut bad = new_user("eva", vec![]);
        bad.denied_features = vec!["not-a-feature".into()];
        let err = fx
            .service
            .create(&acme, bad, Some("short"), None)
            .await
            .unwrap_err();
        match err {
            AuthError::Validation(issues) => {
                let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
                assert_eq!(fields, ["deniedFeatures", "password"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_filters_by_search_group_and_feature() {
        let fx = fixture().await;
        let acme = tenant("acme");
        fx.service
            .create(&acme, new_user("ana", vec![fx.ops.id]), Some("long-secret"), None)
            .await
            .unwrap();
        let mut denied = new_user("bruno", vec![fx.ops.id]);
        denied.denied_features = vec!["reports:view".into()];
        fx.service
            .create(&acme, denied, Some("long-secret"), None)
            .await
            .unwrap();
        fx.service
            .create(&acme, new_user("carla", vec![]), Some("long-secret"), None)
            .await
            .unwrap();

        let by_search = fx
            .service
            .list(
                &acme,
                &UserFilter {
                    search: Some("BRU".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(by_search.len(), 1);

        let by_group = fx
            .service
            .list(
                &acme,
                &UserFilter {
                    group_id: Some(fx.ops.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(by_group.len(), 2);

        let by_feature = fx
            .service
            .list(
                &acme,
                &UserFilter {
                    feature: Some("reports:view".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(by_feature.len(), 1);
        assert_eq!(by_feature[0].login, "ana");

        let page = fx.service.search(&acme, "acme.test", 2, 2).await.unwrap();
        assert_eq!((page.total, page.items.len()), (3, 1));
        assert_eq!(fx.service.search(&acme, "  ", 1, 10).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn mutation_surfaces_are_independent() {
        let fx = fixture().await;
        let acme = tenant("acme");
        let user = fx
            .service
            .create(&acme, new_user("ana", vec![]), Some("long-secret"), None)
            .await
            .unwrap();

        let user = fx
            .service
            .update_groups(&acme, user.id, &[fx.ops.id, fx.ops.id], "admin2")
            .await
            .unwrap();
        assert_eq!(user.group_ids, vec![fx.ops.id]);
        assert_eq!(user.login, "ana");

        let user = fx
            .service
            .update_overrides(&acme, user.id, vec!["billing:manage".into()], vec![], "admin2")
            .await
            .unwrap();
        assert_eq!(user.allow_features, ["billing:manage"]);
        assert_eq!(user.group_ids, vec![fx.ops.id]);

        let user = fx
            .service
            .update_profile(
                &acme,
                user.id,
                UserProfileUpdate {
                    full_name: "Ana Maria".into(),
                    login: "anamaria".into(),
                    email: "anamaria@acme.test".into(),
                    updated_by: "admin3".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(user.login, "anamaria");
        assert_eq!(user.allow_features, ["billing:manage"]);

        let breakdown = fx.service.permissions(&acme, user.id).await.unwrap();
        assert_eq!(
            breakdown.effective,
            ["billing:manage", "reports:view", "users:read"]
        );
        let mine = fx.service.my_permissions(&acme, user.id).await.unwrap();
        assert_eq!(mine.total, 3);
    }

    #[tokio::test]
    async fn profile_update_conflicts_with_other_users_only() {
        let fx = fixture().await;
        let acme = tenant("acme");
        let ana = fx
            .service
            .create(&acme, new_user("ana", vec![]), Some("long-secret"), None)
            .await
            .unwrap();
        fx.service
            .create(&acme, new_user("bia", vec![]), Some("long-secret"), None)
            .await
            .unwrap();

        let keep_own = UserProfileUpdate {
            full_name: "Ana".into(),
            login: "ana".into(),
            email: "ana@acme.test".into(),
            updated_by: "admin".into(),
        };
        assert!(fx.service.update_profile(&acme, ana.id, keep_own.clone()).await.is_ok());

        let steal = UserProfileUpdate {
            login: "bia".into(),
            ..keep_own
        };
        let err = fx.service.update_profile(&acme, ana.id, steal).await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_and_missing_users() {
        let fx = fixture().await;
        let acme = tenant("acme");
        let ana = fx
            .service
            .create(&acme, new_user("ana", vec![]), Some("long-secret"), None)
            .await
            .unwrap();
        fx.service.delete(&acme, ana.id).await.unwrap();
        assert!(matches!(
            fx.service.delete(&acme, ana.id).await,
            Err(AuthError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.get(&acme, ana.id).await,
            Err(AuthError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.update_groups(&acme, ana.id, &[], "x").await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn client_registration_joins_client_group() {
        let fx = fixture().await;
        let acme = tenant("acme");
        let (user, group_id) = fx
            .service
            .register_client(&acme, "cliente1", "long-secret", "C1@Mail.test")
            .await
            .unwrap();
        assert_eq!(group_id, fx.clients.id);
        assert_eq!(user.group_ids, vec![fx.clients.id]);
        assert_eq!(user.created_by, "system");

        let err = fx
            .service
            .register_client(&tenant("empty"), "x", "long-secret", "x@mail.test")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[test]
    fn email_shapes() {
        assert!(is_plausible_email("a@b.co"));
        for bad in ["", "a", "a@", "@b.co", "a@b", "a b@c.d", "a@b@c.d", "a@.b"] {
            assert!(!is_plausible_email(bad), "{bad}");
        }
    }
}
