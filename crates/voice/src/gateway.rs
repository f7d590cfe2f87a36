use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use parley_core::config::VoiceConfig;
use parley_core::domain::voice::{VoiceCallStatus, VoiceTranscriptMessage, VoiceTranscriptRole};

#[derive(Clone, Debug, Error)]
pub enum VoiceError {
    #[error("voice provider rejected the request ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("voice transport failure: {0}")]
    Transport(String),
    #[error("voice gateway is not configured: {0}")]
    NotConfigured(String),
    #[error("voice provider returned an unexpected payload: {0}")]
    InvalidResponse(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KnowledgeBaseRef {
    pub id: String,
    pub name: String,
}

/// Conversational agent definition pushed to the provider on create/update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentSpec {
    pub name: String,
    pub prompt: String,
    pub first_message: String,
    pub knowledge_base: Vec<KnowledgeBaseRef>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallHandle {
    pub conversation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationSnapshot {
    pub status: VoiceCallStatus,
    pub transcript: Vec<VoiceTranscriptMessage>,
    pub call_duration_secs: u32,
}

#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn create_knowledge_base(&self, name: &str, text: &str) -> Result<String, VoiceError>;

    async fn create_agent(&self, spec: &AgentSpec) -> Result<String, VoiceError>;

    async fn update_agent(&self, agent_id: &str, spec: &AgentSpec) -> Result<(), VoiceError>;

    async fn start_outbound_call(
        &self,
        agent_id: &str,
        agent_phone_number_id: &str,
        to_number: &str,
    ) -> Result<CallHandle, VoiceError>;

    async fn fetch_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationSnapshot, VoiceError>;
}

pub struct HttpVoiceGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpVoiceGateway {
    pub fn from_config(config: &VoiceConfig) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .map_err(|error| VoiceError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn api_key(&self) -> Result<&str, VoiceError> {
        self.api_key
            .as_ref()
            .map(ExposeSecret::expose_secret)
            .ok_or_else(|| VoiceError::NotConfigured("voice.api_key is not set".to_string()))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, VoiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(VoiceError::Rejected { status: status.as_u16(), detail })
    }
}

fn agent_payload(spec: &AgentSpec) -> serde_json::Value {
    json!({
        "conversation_config": {
            "agent": {
                "prompt": {
                    "knowledge_base": spec
                        .knowledge_base
                        .iter()
                        .map(|kb| json!({ "id": kb.id, "name": kb.name, "type": "text" }))
                        .collect::<Vec<_>>(),
                    "prompt": spec.prompt,
                },
                "first_message": spec.first_message,
            }
        },
        "name": spec.name,
    })
}

#[derive(Debug, Deserialize)]
struct CreateKnowledgeBaseResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreateAgentResponse {
    agent_id: String,
}

#[derive(Debug, Deserialize)]
struct OutboundCallResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    conversation_id: String,
}

#[derive(Debug, Deserialize)]
struct ConversationResponse {
    status: String,
    #[serde(default)]
    transcript: Vec<ConversationTranscriptEntry>,
    #[serde(default)]
    metadata: ConversationMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationMetadata {
    #[serde(default)]
    call_duration_secs: u32,
}

#[derive(Debug, Deserialize)]
struct ConversationTranscriptEntry {
    role: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    time_in_call_secs: u32,
}

#[async_trait]
impl VoiceGateway for HttpVoiceGateway {
    async fn create_knowledge_base(&self, name: &str, text: &str) -> Result<String, VoiceError> {
        let response = self
            .client
            .post(format!("{}/knowledge-base/text", self.base_url))
            .header("xi-api-key", self.api_key()?)
            .json(&json!({ "name": name, "text": text }))
            .send()
            .await
            .map_err(|error| VoiceError::Transport(error.to_string()))?;

        let payload: CreateKnowledgeBaseResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|error| VoiceError::InvalidResponse(error.to_string()))?;

        info!(event_name = "voice.knowledge_base.created", kb_name = %name, "knowledge base created");
        Ok(payload.id)
    }

    async fn create_agent(&self, spec: &AgentSpec) -> Result<String, VoiceError> {
        let response = self
            .client
            .post(format!("{}/agents/create", self.base_url))
            .header("xi-api-key", self.api_key()?)
            .json(&agent_payload(spec))
            .send()
            .await
            .map_err(|error| VoiceError::Transport(error.to_string()))?;

        let payload: CreateAgentResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|error| VoiceError::InvalidResponse(error.to_string()))?;

        info!(event_name = "voice.agent.created", agent_name = %spec.name, "voice agent created");
        Ok(payload.agent_id)
    }

    async fn update_agent(&self, agent_id: &str, spec: &AgentSpec) -> Result<(), VoiceError> {
        let response = self
            .client
            .patch(format!("{}/agents/{agent_id}", self.base_url))
            .header("xi-api-key", self.api_key()?)
            .json(&agent_payload(spec))
            .send()
            .await
            .map_err(|error| VoiceError::Transport(error.to_string()))?;

        Self::check(response).await?;
        info!(event_name = "voice.agent.updated", agent_id = %agent_id, "voice agent updated");
        Ok(())
    }

    async fn start_outbound_call(
        &self,
        agent_id: &str,
        agent_phone_number_id: &str,
        to_number: &str,
    ) -> Result<CallHandle, VoiceError> {
        let response = self
            .client
            .post(format!("{}/twilio/outbound-call", self.base_url))
            .header("xi-api-key", self.api_key()?)
            .json(&json!({
                "agent_id": agent_id,
                "agent_phone_number_id": agent_phone_number_id,
                "to_number": to_number,
            }))
            .send()
            .await
            .map_err(|error| VoiceError::Transport(error.to_string()))?;

        let payload: OutboundCallResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|error| VoiceError::InvalidResponse(error.to_string()))?;

        if !payload.success || payload.conversation_id.is_empty() {
            return Err(VoiceError::InvalidResponse(format!(
                "call was not accepted: {}",
                payload.message
            )));
        }

        info!(
            event_name = "voice.call.initiated",
            conversation_id = %payload.conversation_id,
            "outbound call initiated"
        );
        Ok(CallHandle { conversation_id: payload.conversation_id })
    }

    async fn fetch_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationSnapshot, VoiceError> {
        let response = self
            .client
            .get(format!("{}/conversations/{conversation_id}", self.base_url))
            .header("xi-api-key", self.api_key()?)
            .send()
            .await
            .map_err(|error| VoiceError::Transport(error.to_string()))?;

        let payload: ConversationResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|error| VoiceError::InvalidResponse(error.to_string()))?;

        let status = VoiceCallStatus::parse(&payload.status).ok_or_else(|| {
            VoiceError::InvalidResponse(format!("unknown conversation status `{}`", payload.status))
        })?;

        let transcript = payload
            .transcript
            .into_iter()
            .map(|entry| {
                let role = VoiceTranscriptRole::parse(&entry.role).ok_or_else(|| {
                    VoiceError::InvalidResponse(format!(
                        "unknown transcript role `{}`",
                        entry.role
                    ))
                })?;
                Ok(VoiceTranscriptMessage {
                    role,
                    message: entry.message,
                    offset_secs: entry.time_in_call_secs,
                })
            })
            .collect::<Result<Vec<_>, VoiceError>>()?;

        Ok(ConversationSnapshot {
            status,
            transcript,
            call_duration_secs: payload.metadata.call_duration_secs,
        })
    }
}
