//! Outbound notification dispatch.
//!
//! Password setup and reset links are delivered by an external
//! communications service: `POST {base}/{tenant}/disparo-automatico`.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::tenant::TenantId;

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid notification endpoint: {0}")]
    Endpoint(String),

    #[error("notification request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification service answered {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Recipient block of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecipient {
    #[serde(rename = "id_cliente")]
    pub id: Uuid,
    #[serde(rename = "nome_completo")]
    pub full_name: String,
    pub email: String,
    #[serde(rename = "token_reset")]
    pub reset_token: String,
}

/// Body of a password setup/reset dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordResetDispatch {
    #[serde(rename = "tipo_envio")]
    pub kind: String,
    #[serde(rename = "cliente")]
    pub recipient: DispatchRecipient,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
}

impl PasswordResetDispatch {
    pub const KIND: &'static str = "reset_senha";

    pub fn new(recipient: DispatchRecipient, web_url: Option<String>) -> Self {
        Self {
            kind: Self::KIND.to_string(),
            recipient,
            web_url,
        }
    }
}

/// Delivers password dispatches.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_password_reset(
        &self,
        tenant: &TenantId,
        dispatch: &PasswordResetDispatch,
    ) -> Result<(), NotifyError>;
}

#[derive(Deserialize)]
struct RejectionBody {
    message: Option<String>,
}

/// HTTP client for the communications service.
pub struct HttpNotifier {
    client: Client,
    base_url: String,
}

impl HttpNotifier {
    pub fn new(base_url: &str) -> Result<Self, NotifyError> {
        let parsed =
            Url::parse(base_url).map_err(|e| NotifyError::Endpoint(format!("{base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(NotifyError::Endpoint(format!("{base_url}: unsupported scheme")));
        }
        let client = Client::builder().timeout(DISPATCH_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, tenant: &TenantId) -> String {
        format!("{}/{}/disparo-automatico", self.base_url, tenant)
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_password_reset(
        &self,
        tenant: &TenantId,
        dispatch: &PasswordResetDispatch,
    ) -> Result<(), NotifyError> {
        let url = self.endpoint(tenant);
        let resp = self.client.post(&url).json(dispatch).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp
                .json::<RejectionBody>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| "password reset e-mail could not be sent".to_string());
            warn!(tenant = %tenant, status, %message, "notification rejected");
            return Err(NotifyError::Rejected { status, message });
        }
        debug!(tenant = %tenant, user_id = %dispatch.recipient.id, "notification dispatched");
        Ok(())
    }
}

/// Keeps dispatches in memory instead of sending them.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(TenantId, PasswordResetDispatch)>>,
    fail_with: Option<u16>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every dispatch is rejected with `status`.
    pub fn failing(status: u16) -> Self {
        Self {
            fail_with: Some(status),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(TenantId, PasswordResetDispatch)> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_password_reset(
        &self,
        tenant: &TenantId,
        dispatch: &PasswordResetDispatch,
    ) -> Result<(), NotifyError> {
        if let Some(status) = self.fail_with {
            return Err(NotifyError::Rejected {
                status,
                message: "recording notifier configured to fail".into(),
            });
        }
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((tenant.clone(), dispatch.clone()));
        Ok(())
    }
}
