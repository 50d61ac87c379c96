//! API server configuration.

use std::path::PathBuf;

use chrono::Duration;
use jsonwebtoken::Algorithm;
use keyward_core::auth::jwt::{TokenLifetimes, TokenSettings, resolve_secret};
use keyward_core::auth::password::DEFAULT_BCRYPT_COST;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: invalid duration '{value}' (expected <n>s, <n>m, <n>h, <n>d or seconds)")]
    InvalidDuration { var: &'static str, value: String },

    #[error("{var}: invalid number '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("JWT_ALG: unsupported algorithm '{0}' (HS256, HS384 or HS512)")]
    InvalidAlgorithm(String),
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:7772").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    pub tokens: TokenSettings,
    pub lifetimes: TokenLifetimes,
    pub bcrypt_cost: u32,
    /// Front-end origin used in password links.
    pub web_url: String,
    pub reset_path: String,
    /// Base URL of the notification service.
    pub notifications_url: String,
    /// Catalog file; the embedded catalog is used when unset.
    pub catalog_path: Option<PathBuf>,
    /// Tenant for public self-service routes when no header is sent.
    pub public_tenant: Option<String>,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                 | Default                                  |
    /// |--------------------------|------------------------------------------|
    /// | `BIND_ADDR`              | `127.0.0.1:7772`                         |
    /// | `DATABASE_URL`           | `postgres://localhost:5432/keyward`      |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file        |
    /// | `JWT_REFRESH_SECRET`     | generated & persisted to file            |
    /// | `PASSWORD_TOKEN_SECRET`  | generated & persisted to file            |
    /// | `JWT_ISS` / `JWT_AUD`    | `keyward`                                |
    /// | `JWT_ALG`                | `HS256`                                  |
    /// | `ACCESS_TOKEN_TTL`       | `12h`                                    |
    /// | `REFRESH_TOKEN_TTL`      | `7d`                                     |
    /// | `PASSWORD_TOKEN_TTL`     | `2h`                                     |
    /// | `BCRYPT_COST`            | `12`                                     |
    /// | `APP_WEB_URL`            | `http://localhost:5173`                  |
    /// | `PASSWORD_RESET_PATH`    | `/account/set-password`                  |
    /// | `NOTIFICATIONS_URL`      | `http://localhost:3336/api`              |
    /// | `CATALOG_PATH`           | embedded catalog                         |
    /// | `PUBLIC_TENANT`          | none                                     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ApiConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let algorithm = match or("JWT_ALG", "HS256").to_uppercase().as_str() {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => return Err(ConfigError::InvalidAlgorithm(other.to_string())),
        };
        let defaults = TokenLifetimes::default();
        let lifetimes = TokenLifetimes {
            access: ttl(&var, "ACCESS_TOKEN_TTL", defaults.access)?,
            refresh: ttl(&var, "REFRESH_TOKEN_TTL", defaults.refresh)?,
            password_action: ttl(&var, "PASSWORD_TOKEN_TTL", defaults.password_action)?,
        };
        let bcrypt_cost = match var("BCRYPT_COST") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidNumber {
                var: "BCRYPT_COST",
                value: raw,
            })?,
            None => DEFAULT_BCRYPT_COST,
        };

        Ok(Self {
            bind_addr: or("BIND_ADDR", "127.0.0.1:7772"),
            database_url: or("DATABASE_URL", "postgres://localhost:5432/keyward"),
            tokens: TokenSettings {
                issuer: or("JWT_ISS", "keyward"),
                audience: or("JWT_AUD", "keyward"),
                algorithm,
                access_secret: resolve_secret(
                    var("JWT_SECRET").or_else(|| var("AUTH_SECRET")),
                    "jwt-secret",
                ),
                refresh_secret: resolve_secret(var("JWT_REFRESH_SECRET"), "jwt-refresh-secret"),
                password_secret: resolve_secret(
                    var("PASSWORD_TOKEN_SECRET"),
                    "password-token-secret",
                ),
            },
            lifetimes,
            bcrypt_cost,
            web_url: or("APP_WEB_URL", "http://localhost:5173"),
            reset_path: or("PASSWORD_RESET_PATH", "/account/set-password"),
            notifications_url: or("NOTIFICATIONS_URL", "http://localhost:3336/api"),
            catalog_path: var("CATALOG_PATH").map(PathBuf::from),
            public_tenant: var("PUBLIC_TENANT"),
        })
    }
}

fn ttl(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match var(name) {
        Some(raw) => parse_ttl(&raw).ok_or(ConfigError::InvalidDuration {
            var: name,
            value: raw,
        }),
        None => Ok(default),
    }
}

/// Parse `<n>s`, `<n>m`, `<n>h`, `<n>d` or a bare number of seconds.
pub fn parse_ttl(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last()? {
        (i, c) if c.is_ascii_alphabetic() => (&raw[..i], c.to_ascii_lowercase()),
        _ => (raw, 's'),
    };
    let n: i64 = digits.trim().parse().ok()?;
    if n < 0 {
        return None;
    }
    match unit {
        's' => Duration::try_seconds(n),
        'm' => Duration::try_minutes(n),
        'h' => Duration::try_hours(n),
        'd' => Duration::try_days(n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let mut env: HashMap<String, String> = [
            ("JWT_SECRET", "access-secret"),
            ("JWT_REFRESH_SECRET", "refresh-secret"),
            ("PASSWORD_TOKEN_SECRET", "password-secret"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        env.extend(vars.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        ApiConfig::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn ttl_formats() {
        assert_eq!(parse_ttl("90"), Some(Duration::seconds(90)));
        assert_eq!(parse_ttl("15m"), Some(Duration::minutes(15)));
        assert_eq!(parse_ttl("12h"), Some(Duration::hours(12)));
        assert_eq!(parse_ttl("7D"), Some(Duration::days(7)));
        assert_eq!(parse_ttl("0s"), Some(Duration::zero()));
        assert_eq!(parse_ttl("soon"), None);
        assert_eq!(parse_ttl("3w"), None);
        assert_eq!(parse_ttl("-5"), None);
        assert_eq!(parse_ttl(""), None);
    }

    #[test]
    fn out_of_range_ttl_is_rejected() {
        assert_eq!(parse_ttl("99999999999999d"), None);
        assert_eq!(parse_ttl("9223372036854775807h"), None);
        assert!(matches!(
            config(&[("REFRESH_TOKEN_TTL", "99999999999999d")]),
            Err(ConfigError::InvalidDuration { var: "REFRESH_TOKEN_TTL", .. })
        ));
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:7772");
        assert_eq!(cfg.tokens.issuer, "keyward");
        assert_eq!(cfg.tokens.algorithm, Algorithm::HS256);
        assert_eq!(cfg.lifetimes, TokenLifetimes::default());
        assert_eq!(cfg.bcrypt_cost, DEFAULT_BCRYPT_COST);
        assert_eq!(cfg.reset_path, "/account/set-password");
        assert!(cfg.catalog_path.is_none());
        assert!(cfg.public_tenant.is_none());
    }

    #[test]
    fn overrides_are_read() {
        let cfg = config(&[
            ("JWT_ALG", "hs512"),
            ("ACCESS_TOKEN_TTL", "30m"),
            ("BCRYPT_COST", "4"),
            ("PUBLIC_TENANT", "storefront"),
            ("CATALOG_PATH", "/etc/keyward/catalog.json"),
        ])
        .unwrap();
        assert_eq!(cfg.tokens.algorithm, Algorithm::HS512);
        assert_eq!(cfg.lifetimes.access, Duration::minutes(30));
        assert_eq!(cfg.bcrypt_cost, 4);
        assert_eq!(cfg.public_tenant.as_deref(), Some("storefront"));
        assert_eq!(
            cfg.catalog_path,
            Some(PathBuf::from("/etc/keyward/catalog.json"))
        );
        assert_eq!(cfg.tokens.access_secret, "access-secret");
    }

    #[test]
    fn auth_secret_is_a_fallback() {
        let env: HashMap<&str, &str> = [
            ("AUTH_SECRET", "legacy"),
            ("JWT_REFRESH_SECRET", "r"),
            ("PASSWORD_TOKEN_SECRET", "p"),
        ]
        .into_iter()
        .collect();
        let cfg = ApiConfig::from_lookup(|n| env.get(n).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.tokens.access_secret, "legacy");
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            config(&[("JWT_ALG", "RS256")]),
            Err(ConfigError::InvalidAlgorithm(_))
        ));
        assert!(matches!(
            config(&[("REFRESH_TOKEN_TTL", "forever")]),
            Err(ConfigError::InvalidDuration { var: "REFRESH_TOKEN_TTL", .. })
        ));
        assert!(matches!(
            config(&[("BCRYPT_COST", "high")]),
            Err(ConfigError::InvalidNumber { .. })
        ));
    }
}
