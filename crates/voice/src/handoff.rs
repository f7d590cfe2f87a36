//! Email → voice channel handoff. Once a phone number is confirmed, the
//! negotiation gets (or keeps) exactly one provider-side voice agent whose
//! knowledge context is rebuilt from everything said so far, and an outbound
//! call is placed. The VoiceCommunication row is written only after the call
//! request has succeeded, keeping the transcript truthful.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use parley_agent::knowledge::knowledge_markdown;
use parley_core::classifier::{EmailMessage, EmailSender};
use parley_core::domain::communication::Direction;
use parley_core::domain::negotiation::NegotiationId;
use parley_core::domain::voice::{
    VoiceAgent, VoiceAgentId, VoiceCallStatus, VoiceCommunication, VoiceCommunicationId,
    VoiceTranscriptMessage,
};
use parley_core::phone::{normalize_phone, PhoneError};
use parley_db::repositories::{
    CommunicationRepository, NegotiationRepository, PartyRepository, VoiceRepository,
};

use crate::gateway::{AgentSpec, KnowledgeBaseRef, VoiceError, VoiceGateway};

const AGENT_PROMPT: &str = "You are a voice-based AI representative acting on behalf of a brand \
    to engage with a content creator. You are professional, concise, and friendly. Your goal is \
    to discuss campaign deliverables, negotiate fair compensation, clarify expectations, and \
    answer any questions the creator may have. You must adapt your responses based on prior \
    communications, campaign details, and the creator's tone or preferences. Always keep the \
    brand's interests in mind while being collaborative.";

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("phone number rejected: {0}")]
    InvalidPhone(#[from] PhoneError),
    #[error("{entity} not found: `{id}`")]
    NotFound { entity: &'static str, id: String },
    #[error("negotiation `{id}` is already {status}; no call placed")]
    Settled { id: String, status: &'static str },
    #[error("voice gateway failure: {0}")]
    Gateway(#[from] VoiceError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("handoff is not configured: {0}")]
    NotConfigured(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandoffOutcome {
    pub voice_agent_id: VoiceAgentId,
    pub conversation_id: String,
    pub voice_communication_id: VoiceCommunicationId,
}

#[async_trait]
pub trait HandoffRunner: Send + Sync {
    async fn run(
        &self,
        negotiation_id: &NegotiationId,
        phone: &str,
    ) -> Result<HandoffOutcome, HandoffError>;
}

pub struct ChannelHandoff {
    negotiations: Arc<dyn NegotiationRepository>,
    parties: Arc<dyn PartyRepository>,
    communications: Arc<dyn CommunicationRepository>,
    voice: Arc<dyn VoiceRepository>,
    gateway: Arc<dyn VoiceGateway>,
    agent_phone_number_id: Option<String>,
}

impl ChannelHandoff {
    pub fn new(
        negotiations: Arc<dyn NegotiationRepository>,
        parties: Arc<dyn PartyRepository>,
        communications: Arc<dyn CommunicationRepository>,
        voice: Arc<dyn VoiceRepository>,
        gateway: Arc<dyn VoiceGateway>,
        agent_phone_number_id: Option<String>,
    ) -> Self {
        Self { negotiations, parties, communications, voice, gateway, agent_phone_number_id }
    }
}

fn persistence(error: parley_db::repositories::RepositoryError) -> HandoffError {
    HandoffError::Persistence(error.to_string())
}

#[async_trait]
impl HandoffRunner for ChannelHandoff {
    async fn run(
        &self,
        negotiation_id: &NegotiationId,
        phone: &str,
    ) -> Result<HandoffOutcome, HandoffError> {
        // Normalization failures abort before any provider traffic.
        let phone = normalize_phone(phone)?;

        let phone_number_id = self.agent_phone_number_id.clone().ok_or_else(|| {
            HandoffError::NotConfigured("voice.agent_phone_number_id is not set".to_string())
        })?;

        let negotiation = self
            .negotiations
            .find_by_id(negotiation_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| HandoffError::NotFound {
                entity: "negotiation",
                id: negotiation_id.0.clone(),
            })?;

        // Terminal status is the only cancellation signal; a settled
        // negotiation never gets a call.
        if negotiation.status.is_terminal() {
            return Err(HandoffError::Settled {
                id: negotiation_id.0.clone(),
                status: negotiation.status.as_str(),
            });
        }

        let brand = self
            .parties
            .find_brand(&negotiation.brand_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| HandoffError::NotFound {
                entity: "brand",
                id: negotiation.brand_id.0.clone(),
            })?;
        let creator = self
            .parties
            .find_creator(&negotiation.creator_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| HandoffError::NotFound {
                entity: "creator",
                id: negotiation.creator_id.0.clone(),
            })?;
        let campaign = self
            .parties
            .find_campaign(&negotiation.campaign_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| HandoffError::NotFound {
                entity: "campaign",
                id: negotiation.campaign_id.0.clone(),
            })?;

        let transcript = self
            .communications
            .list_for_negotiation(negotiation_id)
            .await
            .map_err(persistence)?;
        let emails: Vec<EmailMessage> = transcript
            .iter()
            .map(|comm| EmailMessage {
                sender: match comm.direction {
                    Direction::Inbound => EmailSender::Creator,
                    Direction::Outbound => EmailSender::Brand,
                },
                subject: comm.subject.clone(),
                body: comm.content.clone(),
            })
            .collect();

        let voice_history: Vec<VoiceTranscriptMessage> = self
            .voice
            .list_communications_for_negotiation(negotiation_id)
            .await
            .map_err(persistence)?
            .into_iter()
            .flat_map(|call| call.transcript)
            .collect();

        let kb_markdown = knowledge_markdown(&brand, &campaign, &emails, &voice_history);
        let kb_name = format!("{}-{}-KB", brand.name, creator.display_name);
        let kb_id = self.gateway.create_knowledge_base(&kb_name, &kb_markdown).await?;

        let first_message = format!(
            "Hi! I'm reaching out on behalf of {} regarding our recent campaign conversation. \
             We'd love to continue the discussion and work out the best collaboration. Can we go \
             over the next steps together?",
            brand.name
        );
        let spec = AgentSpec {
            name: format!("{}-{}", brand.name, brand.id.0),
            prompt: AGENT_PROMPT.to_string(),
            first_message,
            knowledge_base: vec![KnowledgeBaseRef { id: kb_id.clone(), name: kb_name.clone() }],
        };

        let now = Utc::now();
        let existing = self
            .voice
            .find_agent_for_negotiation(negotiation_id)
            .await
            .map_err(persistence)?;

        let (voice_agent_id, provider_agent_id) = match existing {
            Some(agent) => {
                // Refresh the knowledge context in place; a negotiation
                // never owns two agents.
                self.gateway.update_agent(&agent.provider_agent_id, &spec).await?;
                let record = VoiceAgent {
                    knowledge_base_id: kb_id.clone(),
                    knowledge_base_name: kb_name.clone(),
                    updated_at: now,
                    ..agent
                };
                let ids = (record.id.clone(), record.provider_agent_id.clone());
                self.voice.upsert_agent(record).await.map_err(persistence)?;
                info!(
                    event_name = "voice.handoff.agent_refreshed",
                    negotiation_id = %negotiation_id.0,
                    "existing voice agent updated for handoff"
                );
                ids
            }
            None => {
                let provider_agent_id = self.gateway.create_agent(&spec).await?;
                let record = VoiceAgent {
                    id: VoiceAgentId(Uuid::new_v4().to_string()),
                    negotiation_id: negotiation_id.clone(),
                    brand_id: brand.id.clone(),
                    creator_id: creator.id.clone(),
                    provider_agent_id: provider_agent_id.clone(),
                    knowledge_base_id: kb_id.clone(),
                    knowledge_base_name: kb_name.clone(),
                    phone_number_id: phone_number_id.clone(),
                    created_at: now,
                    updated_at: now,
                };
                let id = record.id.clone();
                self.voice.upsert_agent(record).await.map_err(persistence)?;
                (id, provider_agent_id)
            }
        };

        let call =
            self.gateway.start_outbound_call(&provider_agent_id, &phone_number_id, &phone).await?;

        let voice_communication = VoiceCommunication {
            id: VoiceCommunicationId(Uuid::new_v4().to_string()),
            negotiation_id: negotiation_id.clone(),
            conversation_id: call.conversation_id.clone(),
            phone: phone.clone(),
            status: VoiceCallStatus::Initiated,
            transcript: Vec::new(),
            call_duration_secs: 0,
            created_at: now,
            updated_at: now,
        };
        let voice_communication_id = voice_communication.id.clone();
        self.voice.save_communication(voice_communication).await.map_err(persistence)?;

        self.negotiations
            .mark_phone_contact_attempted(negotiation_id, now)
            .await
            .map_err(persistence)?;

        info!(
            event_name = "voice.handoff.call_placed",
            negotiation_id = %negotiation_id.0,
            conversation_id = %call.conversation_id,
            "negotiation handed off to the voice channel"
        );

        Ok(HandoffOutcome {
            voice_agent_id,
            conversation_id: call.conversation_id,
            voice_communication_id,
        })
    }
}

/// Test double recording handoff requests.
#[derive(Default)]
pub struct RecordingHandoff {
    requests: tokio::sync::Mutex<Vec<(NegotiationId, String)>>,
}

impl RecordingHandoff {
    pub async fn requests(&self) -> Vec<(NegotiationId, String)> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl HandoffRunner for RecordingHandoff {
    async fn run(
        &self,
        negotiation_id: &NegotiationId,
        phone: &str,
    ) -> Result<HandoffOutcome, HandoffError> {
        self.requests.lock().await.push((negotiation_id.clone(), phone.to_string()));
        Ok(HandoffOutcome {
            voice_agent_id: VoiceAgentId("va-fake".to_string()),
            conversation_id: "conv-fake".to_string(),
            voice_communication_id: VoiceCommunicationId("vc-fake".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Mutex;

    use parley_core::domain::negotiation::{Negotiation, NegotiationId, NegotiationStatus};
    use parley_core::domain::party::{BrandId, CampaignId, CreatorId};
    use parley_db::repositories::{
        InMemoryCommunicationRepository, InMemoryNegotiationRepository, InMemoryPartyRepository,
        InMemoryVoiceRepository, NegotiationRepository, PartyRepository, VoiceRepository,
    };

    use crate::gateway::{AgentSpec, CallHandle, ConversationSnapshot, VoiceError, VoiceGateway};

    use super::{ChannelHandoff, HandoffError, HandoffRunner};

    #[derive(Default)]
    struct FakeGateway {
        fail_call: bool,
        calls: Mutex<Vec<String>>,
        created_agents: Mutex<u32>,
        updated_agents: Mutex<u32>,
    }

    #[async_trait]
    impl VoiceGateway for FakeGateway {
        async fn create_knowledge_base(
            &self,
            _name: &str,
            _text: &str,
        ) -> Result<String, VoiceError> {
            Ok("kb-1".to_string())
        }

        async fn create_agent(&self, _spec: &AgentSpec) -> Result<String, VoiceError> {
            *self.created_agents.lock().await += 1;
            Ok("agent-1".to_string())
        }

        async fn update_agent(
            &self,
            _agent_id: &str,
            _spec: &AgentSpec,
        ) -> Result<(), VoiceError> {
            *self.updated_agents.lock().await += 1;
            Ok(())
        }

        async fn start_outbound_call(
            &self,
            _agent_id: &str,
            _agent_phone_number_id: &str,
            to_number: &str,
        ) -> Result<CallHandle, VoiceError> {
            if self.fail_call {
                return Err(VoiceError::Transport("simulated call failure".to_string()));
            }
            self.calls.lock().await.push(to_number.to_string());
            Ok(CallHandle { conversation_id: "conv-1".to_string() })
        }

        async fn fetch_conversation(
            &self,
            _conversation_id: &str,
        ) -> Result<ConversationSnapshot, VoiceError> {
            Err(VoiceError::Transport("not used".to_string()))
        }
    }

    struct Fixture {
        negotiations: Arc<InMemoryNegotiationRepository>,
        voice: Arc<InMemoryVoiceRepository>,
        gateway: Arc<FakeGateway>,
        handoff: ChannelHandoff,
    }

    async fn fixture(fail_call: bool) -> Fixture {
        let negotiations = Arc::new(InMemoryNegotiationRepository::default());
        let parties = Arc::new(InMemoryPartyRepository::default());
        let communications = Arc::new(InMemoryCommunicationRepository::default());
        let voice = Arc::new(InMemoryVoiceRepository::default());
        let gateway = Arc::new(FakeGateway { fail_call, ..FakeGateway::default() });

        let now = Utc::now();
        parties
            .save_brand(parley_core::domain::party::Brand {
                id: BrandId("brand-1".to_string()),
                name: "Acme".to_string(),
                email: "hello@acme.com".to_string(),
                phone: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("brand");
        parties
            .save_creator(parley_core::domain::party::Creator {
                id: CreatorId("creator-1".to_string()),
                display_name: "Jane".to_string(),
                email: "jane@example.com".to_string(),
                phone: None,
                category: "tech".to_string(),
                instagram_followers: 0,
                youtube_subscribers: 0,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("creator");
        parties
            .save_campaign(parley_core::domain::party::Campaign {
                id: CampaignId("camp-1".to_string()),
                brand_id: BrandId("brand-1".to_string()),
                name: "Spring Launch".to_string(),
                description: String::new(),
                deliverables: String::new(),
                budget_per_creator: rust_decimal::Decimal::ZERO,
                start_date: String::new(),
                end_date: String::new(),
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("campaign");

        negotiations
            .create(Negotiation {
                id: NegotiationId("n-1".to_string()),
                campaign_id: CampaignId("camp-1".to_string()),
                brand_id: BrandId("brand-1".to_string()),
                creator_id: CreatorId("creator-1".to_string()),
                status: NegotiationStatus::InitiateCall,
                escalation_count: 1,
                ai_agent_notes: String::new(),
                phone_contact_attempted: false,
                voice_call_completed: false,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("negotiation");

        let handoff = ChannelHandoff::new(
            negotiations.clone(),
            parties,
            communications,
            voice.clone(),
            gateway.clone(),
            Some("phnum-1".to_string()),
        );

        Fixture { negotiations, voice, gateway, handoff }
    }

    #[tokio::test]
    async fn successful_handoff_records_an_initiated_call() {
        let fixture = fixture(false).await;
        let negotiation_id = NegotiationId("n-1".to_string());

        let outcome =
            fixture.handoff.run(&negotiation_id, "(987) 654-3210").await.expect("handoff");
        assert_eq!(outcome.conversation_id, "conv-1");

        let calls = fixture
            .voice
            .list_communications_for_negotiation(&negotiation_id)
            .await
            .expect("list calls");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].phone, "9876543210");
        assert_eq!(
            calls[0].status,
            parley_core::domain::voice::VoiceCallStatus::Initiated
        );

        let negotiation = fixture
            .negotiations
            .find_by_id(&negotiation_id)
            .await
            .expect("find")
            .expect("exists");
        assert!(negotiation.phone_contact_attempted);
    }

    #[tokio::test]
    async fn second_handoff_updates_the_existing_agent_in_place() {
        let fixture = fixture(false).await;
        let negotiation_id = NegotiationId("n-1".to_string());

        fixture.handoff.run(&negotiation_id, "9876543210").await.expect("first handoff");
        fixture.handoff.run(&negotiation_id, "9876543210").await.expect("second handoff");

        assert_eq!(*fixture.gateway.created_agents.lock().await, 1);
        assert_eq!(*fixture.gateway.updated_agents.lock().await, 1);
    }

    #[tokio::test]
    async fn failed_call_request_writes_no_voice_communication() {
        let fixture = fixture(true).await;
        let negotiation_id = NegotiationId("n-1".to_string());

        let error =
            fixture.handoff.run(&negotiation_id, "9876543210").await.expect_err("call fails");
        assert!(matches!(error, HandoffError::Gateway(_)));

        let calls = fixture
            .voice
            .list_communications_for_negotiation(&negotiation_id)
            .await
            .expect("list calls");
        assert!(calls.is_empty(), "a failed call must leave no record");
    }

    #[tokio::test]
    async fn settled_negotiations_never_get_a_call() {
        let fixture = fixture(false).await;
        let negotiation_id = NegotiationId("n-1".to_string());
        fixture
            .negotiations
            .apply_transition(
                &negotiation_id,
                NegotiationStatus::Cancelled,
                None,
                0,
                Utc::now(),
            )
            .await
            .expect("cancel");

        let error =
            fixture.handoff.run(&negotiation_id, "9876543210").await.expect_err("settled");
        assert!(matches!(error, HandoffError::Settled { .. }));
        assert!(fixture.gateway.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_phone_aborts_before_any_provider_traffic() {
        let fixture = fixture(false).await;
        let negotiation_id = NegotiationId("n-1".to_string());

        let error = fixture.handoff.run(&negotiation_id, "12345").await.expect_err("bad phone");
        assert!(matches!(error, HandoffError::InvalidPhone(_)));
        assert!(fixture.gateway.calls.lock().await.is_empty());
        assert_eq!(*fixture.gateway.created_agents.lock().await, 0);
    }
}
