use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::negotiation::NegotiationId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommunicationId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outbound,
    Inbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outbound => "outbound",
            Self::Inbound => "inbound",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "outbound" => Some(Self::Outbound),
            "inbound" => Some(Self::Inbound),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationType {
    Email,
    VoiceCall,
}

impl CommunicationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::VoiceCall => "voice_call",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "email" => Some(Self::Email),
            "voice_call" => Some(Self::VoiceCall),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStatus {
    Sent,
    Delivered,
    Replied,
    Failed,
    Completed,
}

impl CommunicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Replied => "replied",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "replied" => Some(Self::Replied),
            "failed" => Some(Self::Failed),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// One immutable entry in a negotiation's transcript. Communications are
/// append-only: the full set ordered by `created_at` (insertion order as the
/// tie-break) is the canonical history fed to the reply classifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Communication {
    pub id: CommunicationId,
    pub negotiation_id: NegotiationId,
    pub direction: Direction,
    pub kind: CommunicationType,
    pub status: CommunicationStatus,
    pub subject: String,
    pub content: String,
    pub message_id: Option<String>,
    pub references: Option<String>,
    pub created_at: DateTime<Utc>,
}
