use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use parley_core::config::NotifyConfig;

#[derive(Clone, Debug, Error)]
pub enum NotifyError {
    #[error("notification provider rejected the message ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("notification transport failure: {0}")]
    Transport(String),
    #[error("brand notifications are not configured: {0}")]
    NotConfigured(String),
}

/// Summary of a processed creator reply, pushed to the brand's messaging
/// channel. Delivery is best-effort: the webhook never fails because the
/// brand could not be notified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyNotification {
    pub creator_name: String,
    pub creator_email: String,
    pub campaign_name: String,
    pub campaign_id: String,
    pub reply_excerpt: String,
    pub agent_notes: String,
}

impl ReplyNotification {
    pub fn render(&self, dashboard_base_url: Option<&str>) -> String {
        let mut message = format!(
            "📨 *New Creator Reply Received*\n\n\
             👤 *Creator*: {creator}\n\
             📧 *Email*: {email}\n\
             📢 *Campaign*: {campaign}\n\
             📝 *Reply*:\n{excerpt}\n\n\
             💡 *AI Notes*: {notes}",
            creator = self.creator_name,
            email = self.creator_email,
            campaign = self.campaign_name,
            excerpt = self.reply_excerpt,
            notes = self.agent_notes,
        );
        if let Some(base_url) = dashboard_base_url {
            message.push_str(&format!(
                "\n\n📊 *Track Campaign Progress*:\n{base_url}/campaigns/{}",
                self.campaign_id
            ));
        }
        message
    }

    /// Long replies are cut to keep the notification scannable.
    pub fn excerpt_of(text: &str) -> String {
        if text.is_empty() {
            return "[No content]".to_string();
        }
        text.chars().take(400).collect()
    }
}

#[async_trait]
pub trait BrandNotifier: Send + Sync {
    async fn notify(&self, phone: &str, notification: &ReplyNotification)
        -> Result<(), NotifyError>;
}

/// WhatsApp Business (graph API style) text-message sender.
pub struct HttpBrandNotifier {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    sender_phone_id: Option<String>,
    dashboard_base_url: Option<String>,
}

impl HttpBrandNotifier {
    pub fn from_config(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|error| NotifyError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            sender_phone_id: config.sender_phone_id.clone(),
            dashboard_base_url: config.dashboard_base_url.clone(),
        })
    }
}

#[async_trait]
impl BrandNotifier for HttpBrandNotifier {
    async fn notify(
        &self,
        phone: &str,
        notification: &ReplyNotification,
    ) -> Result<(), NotifyError> {
        let Some(api_key) = &self.api_key else {
            return Err(NotifyError::NotConfigured("notify.api_key is not set".to_string()));
        };
        let Some(sender_phone_id) = &self.sender_phone_id else {
            return Err(NotifyError::NotConfigured(
                "notify.sender_phone_id is not set".to_string(),
            ));
        };

        let payload = json!({
            "messaging_product": "whatsapp",
            "to": phone,
            "type": "text",
            "text": { "body": notification.render(self.dashboard_base_url.as_deref()) },
        });

        let response = self
            .client
            .post(format!("{}/{}/messages", self.base_url, sender_phone_id))
            .bearer_auth(api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|error| NotifyError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(
                event_name = "notify.brand.rejected",
                status = status.as_u16(),
                "brand notification rejected"
            );
            return Err(NotifyError::Rejected { status: status.as_u16(), detail });
        }

        info!(event_name = "notify.brand.sent", to = %phone, "brand notified of creator reply");
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingBrandNotifier {
    notifications: tokio::sync::Mutex<Vec<(String, ReplyNotification)>>,
}

impl RecordingBrandNotifier {
    pub async fn notifications(&self) -> Vec<(String, ReplyNotification)> {
        self.notifications.lock().await.clone()
    }
}

#[async_trait]
impl BrandNotifier for RecordingBrandNotifier {
    async fn notify(
        &self,
        phone: &str,
        notification: &ReplyNotification,
    ) -> Result<(), NotifyError> {
        self.notifications.lock().await.push((phone.to_string(), notification.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ReplyNotification;

    #[test]
    fn rendered_notification_carries_reply_and_notes() {
        let notification = ReplyNotification {
            creator_name: "Jane".to_string(),
            creator_email: "jane@example.com".to_string(),
            campaign_name: "Spring Launch".to_string(),
            campaign_id: "camp-1".to_string(),
            reply_excerpt: "call me at 9876543210".to_string(),
            agent_notes: "creator shared a number".to_string(),
        };

        let message = notification.render(Some("https://dash.example.com"));
        assert!(message.contains("Jane"));
        assert!(message.contains("call me at 9876543210"));
        assert!(message.contains("https://dash.example.com/campaigns/camp-1"));

        let without_link = notification.render(None);
        assert!(!without_link.contains("Track Campaign Progress"));
    }

    #[test]
    fn excerpt_truncates_long_replies_and_handles_empty_ones() {
        assert_eq!(ReplyNotification::excerpt_of(""), "[No content]");
        assert_eq!(ReplyNotification::excerpt_of(&"a".repeat(900)).len(), 400);
    }
}
