use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::negotiation::NegotiationId;
use crate::domain::party::{BrandId, CreatorId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceCommunicationId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceAgentId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoiceCallStatus {
    Initiated,
    InProgress,
    Processing,
    Done,
    Failed,
}

impl VoiceCallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::InProgress => "in-progress",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "initiated" => Some(Self::Initiated),
            "in-progress" => Some(Self::InProgress),
            "processing" => Some(Self::Processing),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceTranscriptRole {
    Agent,
    User,
}

impl VoiceTranscriptRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "agent" => Some(Self::Agent),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceTranscriptMessage {
    pub role: VoiceTranscriptRole,
    pub message: String,
    pub offset_secs: u32,
}

/// One outbound call attempt. Created in `Initiated` status by the channel
/// handoff once the call request succeeds; the transcript poller is the only
/// writer afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceCommunication {
    pub id: VoiceCommunicationId,
    pub negotiation_id: NegotiationId,
    pub conversation_id: String,
    pub phone: String,
    pub status: VoiceCallStatus,
    pub transcript: Vec<VoiceTranscriptMessage>,
    pub call_duration_secs: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Provider-side voice agent attached to one negotiation. Upserted in place
/// on every handoff so a negotiation never owns two agents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceAgent {
    pub id: VoiceAgentId,
    pub negotiation_id: NegotiationId,
    pub brand_id: BrandId,
    pub creator_id: CreatorId,
    pub provider_agent_id: String,
    pub knowledge_base_id: String,
    pub knowledge_base_name: String,
    pub phone_number_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
