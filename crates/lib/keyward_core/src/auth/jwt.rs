//! JWT issuance and verification for the three token purposes.
//!
//! | Purpose         | Header `typ`            | Claims                                   |
//! |-----------------|-------------------------|------------------------------------------|
//! | access          | `at+jwt`                | `userId, login, email, permissions`      |
//! | refresh         | `refresh+jwt`           | `userId`                                 |
//! | password action | `password-action+jwt`   | `sub, login`                             |
//!
//! Every token also carries `iss`, `aud`, `iat` and `exp`. Each purpose is
//! signed with its own secret; the password-action secret must differ from
//! the session secrets.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::User;

/// Claims present on every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClaims {
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Principal data embedded in an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub user_id: Uuid,
    pub login: String,
    pub email: String,
    /// Effective feature keys, sorted.
    pub permissions: Vec<String>,
}

impl AccessGrant {
    pub fn new(user: &User, permissions: BTreeSet<String>) -> Self {
        Self {
            user_id: user.id,
            login: user.login.clone(),
            email: user.email.clone(),
            permissions: permissions.into_iter().collect(),
        }
    }

    pub fn has_permission(&self, feature: &str) -> bool {
        self.permissions.iter().any(|p| p == feature)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(flatten)]
    pub grant: AccessGrant,
    #[serde(flatten)]
    pub registered: RegisteredClaims,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    #[serde(flatten)]
    pub registered: RegisteredClaims,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordActionClaims {
    pub sub: Uuid,
    pub login: String,
    #[serde(flatten)]
    pub registered: RegisteredClaims,
}

trait Expiring {
    fn expires_at(&self) -> i64;
}

impl Expiring for AccessClaims {
    fn expires_at(&self) -> i64 {
        self.registered.exp
    }
}

impl Expiring for RefreshClaims {
    fn expires_at(&self) -> i64 {
        self.registered.exp
    }
}

impl Expiring for PasswordActionClaims {
    fn expires_at(&self) -> i64 {
        self.registered.exp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Access,
    Refresh,
    PasswordAction,
}

impl TokenPurpose {
    fn typ(self) -> &'static str {
        match self {
            Self::Access => "at+jwt",
            Self::Refresh => "refresh+jwt",
            Self::PasswordAction => "password-action+jwt",
        }
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::PasswordAction => "password-action",
        })
    }
}

/// Why a token was refused. Logged, never returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenRejection {
    #[error("malformed token")]
    Malformed,
    #[error("signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("issuer mismatch")]
    IssuerMismatch,
    #[error("audience mismatch")]
    AudienceMismatch,
    #[error("algorithm mismatch")]
    AlgorithmMismatch,
    #[error("token issued for another purpose")]
    WrongPurpose,
}

impl From<jsonwebtoken::errors::Error> for TokenRejection {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => Self::BadSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidIssuer => Self::IssuerMismatch,
            ErrorKind::InvalidAudience => Self::AudienceMismatch,
            ErrorKind::InvalidAlgorithm => Self::AlgorithmMismatch,
            _ => Self::Malformed,
        }
    }
}

/// Process-wide token parameters.
#[derive(Clone)]
pub struct TokenSettings {
    pub issuer: String,
    pub audience: String,
    pub algorithm: Algorithm,
    pub access_secret: String,
    pub refresh_secret: String,
    pub password_secret: String,
}

impl fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSettings")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Lifetimes for each token purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
    pub password_action: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::hours(12),
            refresh: Duration::days(7),
            password_action: Duration::hours(2),
        }
    }
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signs and verifies access, refresh and password-action tokens.
pub struct TokenCodec {
    issuer: String,
    audience: String,
    algorithm: Algorithm,
    validation: Validation,
    access: KeyPair,
    refresh: KeyPair,
    password: KeyPair,
}

impl TokenCodec {
    pub fn new(settings: TokenSettings) -> Result<Self, AuthError> {
        if !matches!(
            settings.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AuthError::Internal(format!(
                "unsupported JWT algorithm {:?}: only HMAC algorithms are accepted",
                settings.algorithm
            )));
        }
        for (name, secret) in [
            ("access", &settings.access_secret),
            ("refresh", &settings.refresh_secret),
            ("password action", &settings.password_secret),
        ] {
            if secret.is_empty() {
                return Err(AuthError::Internal(format!("{name} token secret is empty")));
            }
        }
        if settings.password_secret == settings.access_secret
            || settings.password_secret == settings.refresh_secret
        {
            return Err(AuthError::Internal(
                "password action secret must differ from the session secrets".into(),
            ));
        }
        if settings.access_secret == settings.refresh_secret {
            warn!("access and refresh tokens share a signing secret");
        }

        let mut validation = Validation::new(settings.algorithm);
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_audience(&[settings.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.leeway = 0;

        Ok(Self {
            access: KeyPair::from_secret(&settings.access_secret),
            refresh: KeyPair::from_secret(&settings.refresh_secret),
            password: KeyPair::from_secret(&settings.password_secret),
            issuer: settings.issuer,
            audience: settings.audience,
            algorithm: settings.algorithm,
            validation,
        })
    }

    fn keys(&self, purpose: TokenPurpose) -> &KeyPair {
        match purpose {
            TokenPurpose::Access => &self.access,
            TokenPurpose::Refresh => &self.refresh,
            TokenPurpose::PasswordAction => &self.password,
        }
    }

    fn registered(&self, ttl: Duration) -> RegisteredClaims {
        let iat = Utc::now().timestamp();
        RegisteredClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat,
            exp: iat + ttl.num_seconds(),
        }
    }

    fn sign<C: Serialize>(&self, purpose: TokenPurpose, claims: &C) -> Result<String, AuthError> {
        let mut header = Header::new(self.algorithm);
        header.typ = Some(purpose.typ().to_string());
        encode(&header, claims, &self.keys(purpose).encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode ({purpose}): {e}")))
    }

    fn decode_as<C>(&self, purpose: TokenPurpose, token: &str) -> Result<C, TokenRejection>
    where
        C: DeserializeOwned + Expiring,
    {
        let data = decode::<C>(token, &self.keys(purpose).decoding, &self.validation)?;
        if data.header.typ.as_deref() != Some(purpose.typ()) {
            return Err(TokenRejection::WrongPurpose);
        }
        // The library accepts `exp == now`; a token is dead at its expiry instant.
        if data.claims.expires_at() <= Utc::now().timestamp() {
            return Err(TokenRejection::Expired);
        }
        Ok(data.claims)
    }

    fn verify<C>(&self, purpose: TokenPurpose, token: &str) -> Result<C, AuthError>
    where
        C: DeserializeOwned + Expiring,
    {
        self.decode_as(purpose, token).map_err(|rejection| {
            debug!(%purpose, reason = %rejection, "token rejected");
            AuthError::InvalidToken
        })
    }

    /// Issue a signed access token carrying the precomputed permissions.
    pub fn issue_access(&self, grant: AccessGrant, ttl: Duration) -> Result<String, AuthError> {
        let claims = AccessClaims {
            grant,
            registered: self.registered(ttl),
        };
        self.sign(TokenPurpose::Access, &claims)
    }

    pub fn issue_refresh(&self, user_id: Uuid, ttl: Duration) -> Result<String, AuthError> {
        let claims = RefreshClaims {
            user_id,
            registered: self.registered(ttl),
        };
        self.sign(TokenPurpose::Refresh, &claims)
    }

    pub fn issue_password_action(
        &self,
        user_id: Uuid,
        login: &str,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let claims = PasswordActionClaims {
            sub: user_id,
            login: login.to_string(),
            registered: self.registered(ttl),
        };
        self.sign(TokenPurpose::PasswordAction, &claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.verify(TokenPurpose::Access, token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        self.verify(TokenPurpose::Refresh, token)
    }

    pub fn verify_password_action(&self, token: &str) -> Result<PasswordActionClaims, AuthError> {
        self.verify(TokenPurpose::PasswordAction, token)
    }
}

/// Resolve a signing secret: `explicit` when non-empty, otherwise a
/// persisted file under the user data directory, generated if absent.
pub fn resolve_secret(explicit: Option<String>, file_name: &str) -> String {
    if let Some(secret) = explicit
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = secret_path(file_name);
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!(path = %parent.display(), error = %e, "cannot create secret directory");
    }
    match std::fs::write(&secret_path, &secret) {
        Ok(()) => info!(path = %secret_path.display(), "generated new signing secret"),
        Err(e) => warn!(
            path = %secret_path.display(),
            error = %e,
            "cannot persist generated secret; tokens will not survive a restart"
        ),
    }
    secret
}

fn secret_path(file_name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("keyward")
        .join(file_name)
}
