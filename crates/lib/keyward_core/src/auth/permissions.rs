//! Effective permission resolution.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::models::auth::User;
use crate::models::group::AccessGroup;

/// Compute the feature keys a user may exercise.
///
/// Union of the features of every group the user belongs to, plus the
/// user's allow list, minus the user's deny list. Deny is applied last
/// and always wins. Groups not referenced by `user.group_ids` are
/// ignored, and referenced ids with no matching group are skipped.
pub fn compute_effective_permissions(user: &User, groups: &[AccessGroup]) -> BTreeSet<String> {
    let mut effective: BTreeSet<String> = groups
        .iter()
        .filter(|g| user.group_ids.contains(&g.id))
        .flat_map(|g| g.features.iter().cloned())
        .collect();
    effective.extend(user.allow_features.iter().cloned());
    for denied in &user.denied_features {
        effective.remove(denied);
    }
    effective
}

/// How a user's effective permissions were assembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionBreakdown {
    pub allow_features: Vec<String>,
    pub denied_features: Vec<String>,
    pub group_features: Vec<String>,
    pub effective: Vec<String>,
}

impl PermissionBreakdown {
    pub fn new(user: &User, groups: &[AccessGroup]) -> Self {
        let group_features: BTreeSet<String> = groups
            .iter()
            .filter(|g| user.group_ids.contains(&g.id))
            .flat_map(|g| g.features.iter().cloned())
            .collect();
        Self {
            allow_features: sorted(&user.allow_features),
            denied_features: sorted(&user.denied_features),
            group_features: group_features.into_iter().collect(),
            effective: compute_effective_permissions(user, groups)
                .into_iter()
                .collect(),
        }
    }
}

fn sorted(keys: &[String]) -> Vec<String> {
    keys.iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
