//! Password setup and reset.
//!
//! Setup and reset share one token type and one redemption path: a
//! password-action token is mailed as a link, and redeeming it overwrites
//! whatever hash the account had (possibly none).

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::AuthError;
use super::jwt::TokenCodec;
use super::password::PasswordPolicy;
use crate::models::auth::{PublicUser, User};
use crate::notify::{DispatchRecipient, Notifier, PasswordResetDispatch};
use crate::store::Stores;
use crate::tenant::{TenantId, locate_in_tenant};

/// Where reset links point.
#[derive(Debug, Clone)]
pub struct ResetLinkSettings {
    /// Front-end origin, e.g. `http://localhost:5173`.
    pub web_url: String,
    /// Path of the set-password page, e.g. `/account/set-password`.
    pub reset_path: String,
}

impl ResetLinkSettings {
    /// `{base}{path}?token={token}`, with `base_override` replacing the configured origin.
    pub fn link(&self, base_override: Option<&str>, token: &str) -> Result<String, AuthError> {
        let base = base_override
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(&self.web_url);
        let mut url = Url::parse(base)
            .map_err(|e| AuthError::validation("webUrl", format!("invalid URL: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(AuthError::validation("webUrl", "URL cannot be used as a base"));
        }

        let path = self.reset_path.trim_start_matches('/');
        let joined = format!("{}/{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url.set_query(None);
        url.query_pairs_mut().append_pair("token", token);
        Ok(url.into())
    }
}

/// Issues and redeems password-action tokens.
pub struct PasswordLifecycleService {
    stores: Stores,
    tokens: Arc<TokenCodec>,
    passwords: Arc<PasswordPolicy>,
    notifier: Arc<dyn Notifier>,
    links: ResetLinkSettings,
    ttl: Duration,
}

impl PasswordLifecycleService {
    pub fn new(
        stores: Stores,
        tokens: Arc<TokenCodec>,
        passwords: Arc<PasswordPolicy>,
        notifier: Arc<dyn Notifier>,
        links: ResetLinkSettings,
        ttl: Duration,
    ) -> Self {
        Self {
            stores,
            tokens,
            passwords,
            notifier,
            links,
            ttl,
        }
    }

    /// Mail a setup/reset link to `user`. Notification failures are returned.
    pub async fn send_setup(
        &self,
        tenant: &TenantId,
        user: &User,
        base_override: Option<&str>,
    ) -> Result<(), AuthError> {
        let token = self
            .tokens
            .issue_password_action(user.id, &user.login, self.ttl)?;
        let link = self.links.link(base_override, &token)?;
        let full_name = if user.full_name.trim().is_empty() {
            user.login.clone()
        } else {
            user.full_name.clone()
        };
        let dispatch = PasswordResetDispatch::new(
            DispatchRecipient {
                id: user.id,
                full_name,
                email: user.email.clone(),
                reset_token: token,
            },
            Some(link),
        );
        self.notifier.send_password_reset(tenant, &dispatch).await?;
        info!(tenant = %tenant, user_id = %user.id, "password link sent");
        Ok(())
    }

    /// Send a reset link if `email` belongs to an account.
    ///
    /// The outcome is the same whether or not the account exists, and
    /// dispatch failures are only logged.
    pub async fn request_reset(
        &self,
        tenant: Option<&TenantId>,
        email: &str,
        base_override: Option<&str>,
    ) -> Result<(), AuthError> {
        if let Some(base) = base_override {
            // Reject a bad override even when the address is unknown.
            self.links.link(Some(base), "")?;
        }

        let email = email.trim().to_lowercase();
        let users = &self.stores.users;
        let lookup_email = email.as_str();
        let found = locate_in_tenant(self.stores.tenants.as_ref(), tenant, move |t| async move {
            users.find_user_by_email(&t, lookup_email).await
        })
        .await?;

        let Some((tenant, user)) = found else {
            debug!("password reset requested for unknown address");
            return Ok(());
        };
        if let Err(e) = self.send_setup(&tenant, &user, base_override).await {
            warn!(tenant = %tenant, user_id = %user.id, error = %e, "password reset dispatch failed");
        }
        Ok(())
    }

    /// Set a new password from a password-action token.
    pub async fn redeem(
        &self,
        tenant: Option<&TenantId>,
        token: &str,
        new_secret: &str,
    ) -> Result<PublicUser, AuthError> {
        self.passwords.validate(new_secret)?;
        let claims = self.tokens.verify_password_action(token)?;
        let user_id = claims.sub;

        let users = &self.stores.users;
        let found = locate_in_tenant(self.stores.tenants.as_ref(), tenant, move |t| async move {
            users.find_user(&t, user_id).await
        })
        .await?;
        let Some((tenant, user)) = found else {
            return Err(AuthError::NotFound("User not found".into()));
        };

        let hash = self.passwords.hash(new_secret)?;
        if !self.stores.users.set_password(&tenant, user.id, &hash).await? {
            return Err(AuthError::NotFound("User not found".into()));
        }
        info!(tenant = %tenant, user_id = %user.id, "password set");
        Ok(user.public())
    }
}
