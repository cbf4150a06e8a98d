//! Lead intake: validates a submitted lead and forwards it to the webhook.
//!
//! The caller always hears "success" once the email passes the shape
//! check; webhook trouble is logged and swallowed here.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, warn};

use funnel_core::types::{is_valid_email, ContactLead};
use funnel_core::RelayError;

use crate::webhook::{WebhookPayload, WebhookRelay};

/// Incoming lead body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadRequest {
    pub email: Option<String>,
    pub zip: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
}

impl LeadRequest {
    /// Reads fields leniently: anything that is not a non-empty string is
    /// treated as absent.
    pub fn from_value(value: &Value) -> Self {
        let field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            email: field("email"),
            zip: field("zip"),
            name: field("name"),
            phone: field("phone"),
            source: field("source"),
        }
    }
}

impl From<&ContactLead> for LeadRequest {
    fn from(lead: &ContactLead) -> Self {
        Self {
            email: Some(lead.email.clone()),
            zip: Some(lead.postal_code.to_string()),
            name: None,
            phone: None,
            source: Some(lead.source.clone()),
        }
    }
}

/// Status code plus JSON body, ready for whatever HTTP layer hosts this.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadResponse {
    pub status: u16,
    pub body: Value,
}

impl LeadResponse {
    fn received(message: &str) -> Self {
        Self {
            status: 200,
            body: json!({ "success": true, "message": message }),
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

pub struct LeadRelayEndpoint {
    relay: Arc<WebhookRelay>,
}

impl LeadRelayEndpoint {
    pub fn new(relay: Arc<WebhookRelay>) -> Self {
        Self { relay }
    }

    pub fn relay(&self) -> &WebhookRelay {
        &self.relay
    }

    /// Handles a raw request body. A body that is not a JSON object is a
    /// server error; a bad or missing email inside an object is the caller's.
    pub async fn handle_body(&self, body: &[u8]) -> LeadResponse {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) if value.is_object() => self.handle(LeadRequest::from_value(&value)).await,
            Ok(value) => {
                error!(kind = json_kind(&value), "Error processing lead: body is not an object");
                LeadResponse::error(500, "Internal server error")
            }
            Err(e) => {
                error!(error = %e, "Error processing lead");
                LeadResponse::error(500, "Internal server error")
            }
        }
    }

    pub async fn handle(&self, request: LeadRequest) -> LeadResponse {
        let email = match request.email {
            Some(email) if is_valid_email(&email) => email,
            _ => {
                warn!("Rejected lead with invalid email");
                return LeadResponse::error(400, "Invalid email address");
            }
        };

        let payload = WebhookPayload {
            email,
            zip: request.zip,
            name: request.name,
            phone: request.phone,
            source: request.source,
            timestamp: Utc::now().to_rfc3339(),
        };

        match self.relay.deliver(payload).await {
            Ok(_) => LeadResponse::received("Lead received"),
            Err(RelayError::NotConfigured) => {
                error!("Webhook URL is not set, lead not forwarded");
                LeadResponse::received("Lead received (webhook not configured)")
            }
            // Already logged by the relay.
            Err(_) => LeadResponse::received("Lead received"),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
