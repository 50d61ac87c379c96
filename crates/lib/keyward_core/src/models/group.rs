//! Access group models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named bundle of feature keys granted to every member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGroup {
    pub id: Uuid,
    pub name: String,
    /// Unique per tenant, compared case-insensitively.
    pub code: String,
    pub features: Vec<String>,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a group.
#[derive(Debug, Clone, Default)]
pub struct NewGroup {
    pub name: String,
    pub code: String,
    pub features: Vec<String>,
    pub created_by: String,
}

/// Input for updating a group.
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    pub name: String,
    pub code: String,
    pub features: Vec<String>,
    pub updated_by: String,
}
