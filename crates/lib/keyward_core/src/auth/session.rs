//! Login, refresh and logout.
//!
//! Sessions are stateless: nothing is persisted on login and logout only
//! checks that the presented refresh token is one of ours.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::AuthError;
use super::jwt::{AccessGrant, TokenCodec, TokenLifetimes};
use super::password::{PasswordPolicy, verify_password};
use super::permissions::compute_effective_permissions;
use crate::models::auth::{PublicUser, User};
use crate::store::Stores;
use crate::tenant::{TenantId, locate_in_tenant};

/// Freshly minted access + refresh tokens.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: PublicUser,
}

/// Session use cases over injected stores and token codec.
pub struct SessionService {
    stores: Stores,
    tokens: Arc<TokenCodec>,
    passwords: Arc<PasswordPolicy>,
    lifetimes: TokenLifetimes,
}

impl SessionService {
    pub fn new(
        stores: Stores,
        tokens: Arc<TokenCodec>,
        passwords: Arc<PasswordPolicy>,
        lifetimes: TokenLifetimes,
    ) -> Self {
        Self {
            stores,
            tokens,
            passwords,
            lifetimes,
        }
    }

    /// Authenticate by login or email.
    ///
    /// Without a tenant, every tenant is probed for the identifier. All
    /// failure causes collapse into [`AuthError::InvalidCredentials`].
    pub async fn login(
        &self,
        tenant: Option<&TenantId>,
        identifier: &str,
        secret: &str,
    ) -> Result<LoginResponse, AuthError> {
        let identifier = identifier.trim();
        let users = &self.stores.users;
        let found = if identifier.is_empty() {
            None
        } else {
            locate_in_tenant(self.stores.tenants.as_ref(), tenant, move |t| async move {
                users.find_credentials(&t, identifier).await
            })
            .await?
        };

        let Some((tenant, record)) = found else {
            self.passwords.dummy_verify(secret);
            debug!("login rejected: unknown identifier");
            return Err(AuthError::InvalidCredentials);
        };
        let Some(hash) = record.password_hash.as_deref() else {
            self.passwords.dummy_verify(secret);
            debug!(tenant = %tenant, user_id = %record.user.id, "login rejected: password not set");
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(secret, hash) {
            debug!(tenant = %tenant, user_id = %record.user.id, "login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.issue_pair(&tenant, &record.user).await?;
        info!(tenant = %tenant, user_id = %record.user.id, "login succeeded");
        Ok(LoginResponse {
            tokens,
            user: record.user.public(),
        })
    }

    /// Exchange a refresh token for a new pair with freshly computed permissions.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        tenant: Option<&TenantId>,
    ) -> Result<TokenPair, AuthError> {
        let claims = self.tokens.verify_refresh(refresh_token)?;
        let user_id = claims.user_id;
        let Some((tenant, user)) = self.locate_user(tenant, user_id).await? else {
            debug!(user_id = %user_id, "refresh rejected: user no longer exists");
            return Err(AuthError::InvalidToken);
        };
        let pair = self.issue_pair(&tenant, &user).await?;
        info!(tenant = %tenant, user_id = %user_id, "session refreshed");
        Ok(pair)
    }

    /// Validate the refresh token being discarded.
    ///
    /// No revocation record is kept; the client is expected to drop both tokens.
    pub fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let claims = self.tokens.verify_refresh(refresh_token)?;
        info!(user_id = %claims.user_id, "logout");
        Ok(())
    }

    async fn locate_user(
        &self,
        tenant: Option<&TenantId>,
        user_id: Uuid,
    ) -> Result<Option<(TenantId, User)>, AuthError> {
        let users = &self.stores.users;
        let found = locate_in_tenant(self.stores.tenants.as_ref(), tenant, move |t| async move {
            users.find_user(&t, user_id).await
        })
        .await?;
        Ok(found)
    }

    async fn issue_pair(&self, tenant: &TenantId, user: &User) -> Result<TokenPair, AuthError> {
        let groups = self.stores.groups.find_groups(tenant, &user.group_ids).await?;
        let permissions = compute_effective_permissions(user, &groups);
        let grant = AccessGrant::new(user, permissions);
        Ok(TokenPair {
            access_token: self.tokens.issue_access(grant, self.lifetimes.access)?,
            refresh_token: self.tokens.issue_refresh(user.id, self.lifetimes.refresh)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use jsonwebtoken::Algorithm;

    use super::*;
    use crate::auth::jwt::TokenSettings;
    use crate::store::memory::InMemoryStore;
    use crate::store::{GroupStore, UserStore};
    use crate::test_support::{group, tenant, user};

    struct Fixture {
        store: Arc<InMemoryStore>,
        codec: Arc<TokenCodec>,
        service: SessionService,
    }

    fn codec() -> Arc<TokenCodec> {
        Arc::new(
            TokenCodec::new(TokenSettings {
                issuer: "keyward".into(),
                audience: "keyward".into(),
                algorithm: Algorithm::HS256,
                access_secret: "access".into(),
                refresh_secret: "refresh".into(),
                password_secret: "password".into(),
            })
            .unwrap(),
        )
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let codec = codec();
        let policy = Arc::new(PasswordPolicy::new(4));

        let acme = tenant("acme_corp");
        let ops = group("OPS", &["reports", "billing"]);
        store.insert_group(&acme, &ops).await.unwrap();
        let mut mlopes = user("mlopes", "mlopes@acme.test", vec![ops.id]);
        mlopes.denied_features = vec!["billing".into()];
        let hash = policy.hash("s3cret-pass").unwrap();
        store.insert_user(&acme, &mlopes, Some(&hash)).await.unwrap();
        store
            .insert_user(&acme, &user("pending", "pending@acme.test", vec![]), None)
            .await
            .unwrap();
        store.add_tenant(&tenant("zeta")).await;

        let service = SessionService::new(
            Stores::shared(store.clone()),
            codec.clone(),
            policy,
            TokenLifetimes::default(),
        );
        Fixture {
            store,
            codec,
            service,
        }
    }

    #[tokio::test]
    async fn login_issues_pair_with_effective_permissions() {
        let fx = fixture().await;
        let acme = tenant("acme_corp");
        let response = fx
            .service
            .login(Some(&acme), "MLOPES", "s3cret-pass")
            .await
            .unwrap();

        assert_eq!(response.user.login, "mlopes");
        let claims = fx.codec.verify_access(&response.tokens.access_token).unwrap();
        assert_eq!(claims.grant.permissions, ["reports"]);
        let refresh = fx.codec.verify_refresh(&response.tokens.refresh_token).unwrap();
        assert_eq!(refresh.user_id, response.user.id);
    }

    #[tokio::test]
    async fn login_by_email_without_tenant_probes() {
        let fx = fixture().await;
        let response = fx
            .service
            .login(None, "mlopes@acme.test", "s3cret-pass")
            .await
            .unwrap();
        assert_eq!(response.user.email, "mlopes@acme.test");
        assert_eq!(fx.store.lookups().first(), Some(&tenant("acme_corp")));
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let fx = fixture().await;
        let acme = tenant("acme_corp");
        let wrong_secret = fx.service.login(Some(&acme), "mlopes", "nope").await;
        let unknown = fx.service.login(Some(&acme), "ghost", "nope").await;
        let unset = fx.service.login(Some(&acme), "pending", "nope").await;
        let other_tenant = fx
            .service
            .login(Some(&tenant("zeta")), "mlopes", "s3cret-pass")
            .await;

        for result in [wrong_secret, unknown, unset, other_tenant] {
            let err = result.unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
            assert_eq!(err.to_string(), "Invalid credentials");
        }
    }

    #[tokio::test]
    async fn legacy_hash_still_logs_in() {
        let fx = fixture().await;
        let acme = tenant("acme_corp");
        // sha256("password")
        let legacy = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8";
        fx.store
            .insert_user(&acme, &user("old", "old@acme.test", vec![]), Some(legacy))
            .await
            .unwrap();
        assert!(fx.service.login(Some(&acme), "old", "password").await.is_ok());
    }

    #[tokio::test]
    async fn refresh_recomputes_permissions() {
        let fx = fixture().await;
        let acme = tenant("acme_corp");
        let login = fx
            .service
            .login(Some(&acme), "mlopes", "s3cret-pass")
            .await
            .unwrap();

        fx.store
            .update_user_overrides(&acme, login.user.id, &["audit".into()], &[], "admin")
            .await
            .unwrap();

        let pair = fx
            .service
            .refresh(&login.tokens.refresh_token, None)
            .await
            .unwrap();
        let claims = fx.codec.verify_access(&pair.access_token).unwrap();
        assert_eq!(claims.grant.permissions, ["audit", "billing", "reports"]);
    }

    #[tokio::test]
    async fn refresh_with_token_expired_one_second_ago_is_rejected() {
        let fx = fixture().await;
        let acme = tenant("acme_corp");
        let user = fx
            .store
            .find_user_by_login(&acme, "mlopes")
            .await
            .unwrap()
            .unwrap();
        let stale = fx.codec.issue_refresh(user.id, Duration::seconds(-1)).unwrap();

        let err = fx.service.refresh(&stale, Some(&acme)).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn refresh_for_deleted_user_is_rejected() {
        let fx = fixture().await;
        let acme = tenant("acme_corp");
        let login = fx
            .service
            .login(Some(&acme), "mlopes", "s3cret-pass")
            .await
            .unwrap();
        fx.store.delete_user(&acme, login.user.id).await.unwrap();

        let err = fx
            .service
            .refresh(&login.tokens.refresh_token, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn logout_validates_the_token() {
        let fx = fixture().await;
        let token = fx.codec.issue_refresh(Uuid::now_v7(), Duration::days(1)).unwrap();
        assert!(fx.service.logout(&token).is_ok());
        assert!(matches!(
            fx.service.logout("garbage"),
            Err(AuthError::InvalidToken)
        ));
    }
}
