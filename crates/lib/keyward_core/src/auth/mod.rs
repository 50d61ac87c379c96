//! Authentication and authorization logic.
//!
//! Credential verification, token issuance, permission resolution and the
//! session and password lifecycle services built on top of them.

pub mod jwt;
pub mod password;
pub mod password_reset;
pub mod permissions;
pub mod session;

use serde::Serialize;
use thiserror::Error;

use crate::notify::NotifyError;
use crate::store::StoreError;
use crate::tenant::TenantError;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Domain errors surfaced by every service.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Tenant identifier is required")]
    MissingTenant,

    #[error("{0}")]
    InvalidTenant(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Validation failed")]
    Validation(Vec<FieldIssue>),

    #[error("Notification dispatch failed: {0}")]
    Notification(#[from] NotifyError),

    #[error("Storage error: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Single-field validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldIssue::new(field, message)])
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => Self::Conflict(format!("Already in use: {what}")),
            other => Self::Store(other),
        }
    }
}

impl From<TenantError> for AuthError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::Missing => Self::MissingTenant,
            invalid @ TenantError::Invalid(_) => Self::InvalidTenant(invalid.to_string()),
        }
    }
}
