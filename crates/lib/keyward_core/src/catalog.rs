//! Static feature and menu catalog.
//!
//! Loaded once at startup and shared read-only. Both feature keys and
//! menu keys are grantable permission keys. A feature's `api-routes`
//! (`"METHOD /path/{param}"`) name the protected routes it unlocks.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const EMBEDDED_CATALOG: &str = include_str!("catalog.json");

/// URL every authenticated user may reach.
pub const ALWAYS_REACHABLE_URL: &str = "/dashboard";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read catalog {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate catalog key '{0}'")]
    DuplicateKey(String),

    #[error("feature '{key}': invalid api route '{route}' (expected \"METHOD /path\")")]
    InvalidRoute { key: String, route: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "api-routes", default)]
    pub api_routes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Menu {
    pub key: String,
    #[serde(default)]
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    features: Vec<Feature>,
    #[serde(default)]
    menus: Vec<Menu>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    features: Vec<Feature>,
    menus: Vec<Menu>,
    keys: BTreeSet<String>,
    routes: BTreeMap<String, Vec<String>>,
}

fn route_key(method: &str, path: &str) -> String {
    format!("{} {}", method.to_ascii_uppercase(), path)
}

impl Catalog {
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        let mut keys = BTreeSet::new();
        for key in file
            .features
            .iter()
            .map(|f| &f.key)
            .chain(file.menus.iter().map(|m| &m.key))
        {
            if !keys.insert(key.clone()) {
                return Err(CatalogError::DuplicateKey(key.clone()));
            }
        }
        let mut routes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for feature in &file.features {
            for route in &feature.api_routes {
                let (method, path) = route
                    .trim()
                    .split_once(char::is_whitespace)
                    .map(|(m, p)| (m, p.trim()))
                    .filter(|(m, p)| !m.is_empty() && p.starts_with('/'))
                    .ok_or_else(|| CatalogError::InvalidRoute {
                        key: feature.key.clone(),
                        route: route.clone(),
                    })?;
                routes
                    .entry(route_key(method, path))
                    .or_default()
                    .push(feature.key.clone());
            }
        }
        Ok(Self {
            features: file.features,
            menus: file.menus,
            keys,
            routes,
        })
    }

    /// The catalog compiled into the binary.
    pub fn embedded() -> Result<Self, CatalogError> {
        Self::from_json(EMBEDDED_CATALOG)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn menus(&self) -> &[Menu] {
        &self.menus
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Keys from `requested` that the catalog does not know, deduplicated.
    pub fn unknown_keys<'a>(&self, requested: impl IntoIterator<Item = &'a String>) -> Vec<String> {
        requested
            .into_iter()
            .filter(|k| !self.contains(k))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Feature keys any one of which unlocks `method` on the route template
    /// `path` (e.g. `/api/users/{id}`). `None` when no feature lists the route.
    pub fn features_for_route(&self, method: &str, path: &str) -> Option<&[String]> {
        self.routes.get(&route_key(method, path)).map(Vec::as_slice)
    }

    /// Whether a holder of `permissions` may open `url`.
    ///
    /// Allowed when `url` equals, or is a `/`-descendant of, the URL of a
    /// menu whose key is among `permissions`. Trailing slashes are ignored.
    pub fn can_reach_url(&self, permissions: &[String], url: &str) -> bool {
        let target = normalize(url);
        if target == ALWAYS_REACHABLE_URL {
            return true;
        }
        self.menus
            .iter()
            .filter(|m| permissions.contains(&m.key))
            .map(|m| m.url.trim())
            .filter(|u| !u.is_empty() && *u != "#")
            .map(normalize)
            .any(|allowed| {
                target == allowed
                    || target
                        .strip_prefix(allowed)
                        .is_some_and(|rest| rest.starts_with('/'))
            })
    }
}

fn normalize(url: &str) -> &str {
    let trimmed = url.trim();
    trimmed.strip_suffix('/').unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perms(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn embedded_catalog_loads() {
        let catalog = Catalog::embedded().unwrap();
        assert!(!catalog.features().is_empty());
        assert!(!catalog.menus().is_empty());
        assert!(catalog.contains("users:read"));
        assert!(catalog.contains("menu:users"));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let raw = r#"{"features":[{"key":"a","name":"A"}],"menus":[{"key":"a","name":"A"}]}"#;
        assert!(matches!(
            Catalog::from_json(raw),
            Err(CatalogError::DuplicateKey(k)) if k == "a"
        ));
    }

    #[test]
    fn unknown_keys_are_reported_once() {
        let catalog = Catalog::embedded().unwrap();
        let requested = perms(&["users:read", "nope", "nope", "also-nope"]);
        assert_eq!(catalog.unknown_keys(&requested), ["also-nope", "nope"]);
    }

    #[test]
    fn api_routes_are_indexed_by_method_and_template() {
        let catalog = Catalog::embedded().unwrap();
        assert_eq!(
            catalog.features_for_route("DELETE", "/api/users/{id}"),
            Some(&["users:write".to_string()][..])
        );
        assert_eq!(
            catalog.features_for_route("get", "/api/groups/{id}"),
            Some(&["groups:read".to_string()][..])
        );
        assert_eq!(catalog.features_for_route("POST", "/api/groups/{id}"), None);
        assert_eq!(catalog.features_for_route("GET", "/api/users/my-permissions"), None);
    }

    #[test]
    fn shared_routes_collect_every_feature() {
        let raw = r#"{"features":[
            {"key":"a","name":"A","api-routes":["GET /x"]},
            {"key":"b","name":"B","api-routes":["get  /x"]}
        ]}"#;
        let catalog = Catalog::from_json(raw).unwrap();
        assert_eq!(
            catalog.features_for_route("GET", "/x").unwrap(),
            ["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn malformed_api_routes_are_rejected() {
        let raw = r#"{"features":[{"key":"a","name":"A","api-routes":["/no-method"]}]}"#;
        assert!(matches!(
            Catalog::from_json(raw),
            Err(CatalogError::InvalidRoute { key, .. }) if key == "a"
        ));
    }

    #[test]
    fn dashboard_is_always_reachable() {
        let catalog = Catalog::embedded().unwrap();
        assert!(catalog.can_reach_url(&[], "/dashboard/"));
    }

    #[test]
    fn menu_urls_grant_exact_and_nested_paths() {
        let catalog = Catalog::embedded().unwrap();
        let held = perms(&["menu:users"]);
        assert!(catalog.can_reach_url(&held, "/users"));
        assert!(catalog.can_reach_url(&held, "/users/123/"));
        assert!(!catalog.can_reach_url(&held, "/users-archive"));
        assert!(!catalog.can_reach_url(&held, "/groups"));
    }

    #[test]
    fn placeholder_menu_urls_grant_nothing() {
        let catalog = Catalog::embedded().unwrap();
        let held = perms(&["menu:finance"]);
        assert!(!catalog.can_reach_url(&held, "#"));
        assert!(!catalog.can_reach_url(&held, "/finance"));
    }
}
