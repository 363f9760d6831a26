//! Push notification delivery. Best-effort: a failed push never fails the
//! operation that triggered it; callers log and count the failure.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize)]
pub struct PushNotification {
    pub recipient_ids: Vec<Uuid>,
    pub title: String,
    pub body: String,
    pub data: Value,
}

#[async_trait]
pub trait PushClient: Send + Sync {
    async fn send(&self, notification: &PushNotification) -> AppResult<()>;
}

/// Forwards notifications to the push gateway over HTTP.
pub struct WebhookPush {
    endpoint: String,
    client: reqwest::Client,
}

impl WebhookPush {
    pub fn new(endpoint: String) -> Self {
        // A hung gateway must not pin the delivery task forever
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { endpoint, client }
    }
}

#[async_trait]
impl PushClient for WebhookPush {
    async fn send(&self, notification: &PushNotification) -> AppResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(notification)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("push gateway unreachable: {e}")))?;
        if !response.status().is_success() {
            return Err(AppError::Transport(format!(
                "push gateway returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
