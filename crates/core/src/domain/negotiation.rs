use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::party::{BrandId, CampaignId, CreatorId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NegotiationId(pub String);

/// Lifecycle state of one brand → creator outreach attempt.
///
/// `RequestPhone`, `InitiateCall` and `Escalate` mirror the classifier's
/// intent for the most recent inbound reply; `Accepted`, `Cancelled` and
/// `Paused` are terminal and stop all outbound traffic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    Initiated,
    EmailSent,
    RequestPhone,
    InitiateCall,
    Accepted,
    Cancelled,
    Escalate,
    Paused,
}

impl NegotiationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::EmailSent => "email_sent",
            Self::RequestPhone => "request_phone",
            Self::InitiateCall => "initiate_call",
            Self::Accepted => "accepted",
            Self::Cancelled => "cancelled",
            Self::Escalate => "escalate",
            Self::Paused => "paused",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "initiated" => Some(Self::Initiated),
            "email_sent" => Some(Self::EmailSent),
            "request_phone" => Some(Self::RequestPhone),
            "initiate_call" => Some(Self::InitiateCall),
            "accepted" => Some(Self::Accepted),
            "cancelled" => Some(Self::Cancelled),
            "escalate" => Some(Self::Escalate),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Cancelled | Self::Paused)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Negotiation {
    pub id: NegotiationId,
    pub campaign_id: CampaignId,
    pub brand_id: BrandId,
    pub creator_id: CreatorId,
    pub status: NegotiationStatus,
    pub escalation_count: u32,
    pub ai_agent_notes: String,
    pub phone_contact_attempted: bool,
    pub voice_call_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
