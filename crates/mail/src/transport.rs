use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use parley_core::config::EmailConfig;

#[derive(Clone, Debug, Error)]
pub enum TransportError {
    #[error("email provider rejected the send ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("email transport failure: {0}")]
    Transport(String),
    #[error("email transport is not configured: {0}")]
    NotConfigured(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailAddress {
    pub email: String,
    pub name: Option<String>,
}

/// One fully addressed outbound email, threading headers included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub from: EmailAddress,
    pub subject: String,
    pub text: String,
    pub reply_to: Option<EmailAddress>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    pub negotiation_id: Option<String>,
    pub brand_id: Option<String>,
    pub campaign_id: Option<String>,
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), TransportError>;
}

/// SendGrid-style v3 mail-send client.
pub struct HttpEmailTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpEmailTransport {
    pub fn from_config(config: &EmailConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|error| TransportError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn headers_payload(email: &OutboundEmail) -> serde_json::Map<String, serde_json::Value> {
        let mut headers = serde_json::Map::new();
        if let Some(message_id) = &email.message_id {
            headers.insert("Message-ID".to_string(), json!(bracketed(message_id)));
        }
        if let Some(in_reply_to) = &email.in_reply_to {
            headers.insert("In-Reply-To".to_string(), json!(bracketed(in_reply_to)));
        }
        if let Some(references) = &email.references {
            if !references.is_empty() {
                headers.insert("References".to_string(), json!(references.clone()));
            }
        }
        if let Some(negotiation_id) = &email.negotiation_id {
            headers.insert("X-Negotiation-ID".to_string(), json!(negotiation_id.clone()));
        }
        if let Some(brand_id) = &email.brand_id {
            headers.insert("X-Brand-ID".to_string(), json!(brand_id.clone()));
        }
        if let Some(campaign_id) = &email.campaign_id {
            headers.insert("X-Campaign-ID".to_string(), json!(campaign_id.clone()));
        }
        headers
    }
}

fn bracketed(message_id: &str) -> String {
    if message_id.starts_with('<') {
        message_id.to_string()
    } else {
        format!("<{message_id}>")
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<(), TransportError> {
        let Some(api_key) = &self.api_key else {
            return Err(TransportError::NotConfigured("email.api_key is not set".to_string()));
        };

        let mut payload = json!({
            "personalizations": [{ "to": [{ "email": email.to }] }],
            "from": email.from,
            "subject": email.subject,
            "content": [{ "type": "text/plain", "value": email.text }],
        });
        if let Some(reply_to) = &email.reply_to {
            payload["reply_to"] = json!(reply_to);
        }
        let headers = Self::headers_payload(email);
        if !headers.is_empty() {
            payload["headers"] = serde_json::Value::Object(headers);
        }

        let response = self
            .client
            .post(format!("{}/mail/send", self.base_url))
            .bearer_auth(api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|error| TransportError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected { status: status.as_u16(), detail });
        }

        info!(
            event_name = "mail.send.accepted",
            to = %email.to,
            from = %email.from.email,
            "outbound email accepted by the provider"
        );
        Ok(())
    }
}

/// Accepts everything and records it; used by tests and local smoke runs.
#[derive(Default)]
pub struct RecordingEmailTransport {
    sent: tokio::sync::Mutex<Vec<OutboundEmail>>,
}

impl RecordingEmailTransport {
    pub async fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl EmailTransport for RecordingEmailTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<(), TransportError> {
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}

/// Always fails; used to exercise the record-after-send-only invariant.
pub struct FailingEmailTransport;

#[async_trait]
impl EmailTransport for FailingEmailTransport {
    async fn send(&self, _email: &OutboundEmail) -> Result<(), TransportError> {
        Err(TransportError::Transport("simulated provider outage".to_string()))
    }
}
