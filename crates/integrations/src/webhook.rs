//! Lead webhook: best-effort POST of captured leads to a downstream
//! marketing endpoint.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use funnel_core::config::RelayConfig;
use funnel_core::RelayError;

/// Body sent to the webhook. Missing fields go out as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub email: String,
    pub zip: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
    /// RFC 3339
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        payload: &WebhookPayload,
    ) -> Result<TransportResponse, RelayError>;
}

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout_ms: u64) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        payload: &WebhookPayload,
    ) -> Result<TransportResponse, RelayError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Could not read error".to_string());
        Ok(TransportResponse { status, body })
    }
}

/// One attempt to deliver a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayDelivery {
    pub id: Uuid,
    pub email: String,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

/// Sends lead payloads to the configured webhook and keeps a record of each
/// attempt. Never retries.
pub struct WebhookRelay {
    url: Option<String>,
    transport: Arc<dyn WebhookTransport>,
    deliveries: DashMap<Uuid, RelayDelivery>,
}

impl WebhookRelay {
    pub fn new(url: Option<String>, transport: Arc<dyn WebhookTransport>) -> Self {
        Self {
            url: url.filter(|u| !u.trim().is_empty()),
            transport,
            deliveries: DashMap::new(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        let transport = HttpTransport::new(config.timeout_ms)?;
        Ok(Self::new(config.webhook_url.clone(), Arc::new(transport)))
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    pub async fn deliver(&self, payload: WebhookPayload) -> Result<RelayDelivery, RelayError> {
        let url = self.url.as_deref().ok_or(RelayError::NotConfigured)?;

        info!(url = %url, email = %payload.email, "Sending lead webhook");
        let result = self.transport.post_json(url, &payload).await;

        let mut delivery = RelayDelivery {
            id: Uuid::new_v4(),
            email: payload.email.clone(),
            response_status: None,
            response_body: None,
            success: false,
            created_at: Utc::now(),
        };

        let outcome = match result {
            Ok(resp) if resp.is_success() => {
                info!(status = resp.status, "Webhook sent successfully");
                delivery.response_status = Some(resp.status);
                delivery.success = true;
                Ok(())
            }
            Ok(resp) => {
                error!(status = resp.status, body = %resp.body, "Webhook failed");
                delivery.response_status = Some(resp.status);
                delivery.response_body = Some(resp.body.clone());
                Err(RelayError::Status {
                    status: resp.status,
                    body: resp.body,
                })
            }
            Err(e) => {
                error!(error = %e, "Error sending webhook");
                delivery.response_body = Some(e.to_string());
                Err(e)
            }
        };

        self.deliveries.insert(delivery.id, delivery.clone());
        outcome.map(|_| delivery)
    }

    /// All attempts, oldest first.
    pub fn deliveries(&self) -> Vec<RelayDelivery> {
        let mut all: Vec<_> = self.deliveries.iter().map(|d| d.value().clone()).collect();
        all.sort_by_key(|d| d.created_at);
        all
    }
}
