//! Shared fixtures for handler tests: in-memory repositories, recording
//! transports, and scripted classifier/composer collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use parley_core::classifier::{
    ClassifierContext, ClassifierError, ReplyAnalysis, ReplyClassifier, ReplyIntent,
};
use parley_core::compose::{ComposeError, EmailComposer, EmailDraft};
use parley_core::domain::communication::{
    Communication, CommunicationId, CommunicationStatus, CommunicationType, Direction,
};
use parley_core::domain::negotiation::{Negotiation, NegotiationId, NegotiationStatus};
use parley_core::domain::party::{
    Brand, BrandId, Campaign, CampaignId, Creator, CreatorId,
};
use parley_core::engine::{EscalationPolicy, NegotiationMachine};
use parley_core::thread::ThreadCodec;
use parley_db::repositories::{
    AssignmentRepository, CommunicationRepository, InMemoryAssignmentRepository,
    InMemoryCommunicationRepository, InMemoryFollowUpQueue, InMemoryNegotiationRepository,
    InMemoryPartyRepository, NegotiationRepository, PartyRepository,
};
use parley_mail::{RecordingBrandNotifier, RecordingEmailTransport};
use parley_voice::RecordingHandoff;

use crate::state::AppState;

pub(crate) const SEND_DOMAIN: &str = "mail.example.com";
pub(crate) const PARSE_DOMAIN: &str = "parse.mail.example.com";

pub(crate) struct ScriptedClassifier {
    pub response: Mutex<Result<ReplyAnalysis, ClassifierError>>,
}

impl ScriptedClassifier {
    pub fn replying(intent: ReplyIntent, phone: Option<&str>) -> Self {
        Self {
            response: Mutex::new(Ok(ReplyAnalysis {
                intent,
                notes: "scripted analysis".to_string(),
                phone_number: phone.map(str::to_string),
                call_script: None,
            })),
        }
    }

    pub fn failing(error: ClassifierError) -> Self {
        Self { response: Mutex::new(Err(error)) }
    }
}

#[async_trait]
impl ReplyClassifier for ScriptedClassifier {
    async fn classify(
        &self,
        _ctx: ClassifierContext<'_>,
    ) -> Result<ReplyAnalysis, ClassifierError> {
        self.response.lock().await.clone()
    }
}

pub(crate) struct ScriptedComposer;

#[async_trait]
impl EmailComposer for ScriptedComposer {
    async fn initial_offer(
        &self,
        brand: &Brand,
        _creator: &Creator,
        _campaign: &Campaign,
    ) -> Result<EmailDraft, ComposeError> {
        Ok(EmailDraft {
            subject: format!("Collaboration Opportunity with {}", brand.name),
            body: "We would love to work together.".to_string(),
        })
    }

    async fn follow_up(
        &self,
        _brand: &Brand,
        _creator: &Creator,
        _campaign: &Campaign,
        history: &[parley_core::classifier::EmailMessage],
    ) -> Result<EmailDraft, ComposeError> {
        Ok(EmailDraft {
            subject: history.first().map(|m| m.subject.clone()).unwrap_or_default(),
            body: "Just checking in — could you share your phone number?".to_string(),
        })
    }
}

pub(crate) struct Harness {
    pub state: AppState,
    pub negotiations: Arc<InMemoryNegotiationRepository>,
    pub communications: Arc<InMemoryCommunicationRepository>,
    pub assignments: Arc<InMemoryAssignmentRepository>,
    pub parties: Arc<InMemoryPartyRepository>,
    pub followups: Arc<InMemoryFollowUpQueue>,
    pub transport: Arc<RecordingEmailTransport>,
    pub notifier: Arc<RecordingBrandNotifier>,
    pub handoff: Arc<RecordingHandoff>,
}

impl Harness {
    pub async fn new(classifier: ScriptedClassifier) -> Self {
        Self::with_policy(classifier, EscalationPolicy::ActivityCounter).await
    }

    pub async fn with_policy(classifier: ScriptedClassifier, policy: EscalationPolicy) -> Self {
        let negotiations = Arc::new(InMemoryNegotiationRepository::default());
        let communications = Arc::new(InMemoryCommunicationRepository::default());
        let assignments = Arc::new(InMemoryAssignmentRepository::default());
        let parties = Arc::new(InMemoryPartyRepository::default());
        let followups = Arc::new(InMemoryFollowUpQueue::default());
        let transport = Arc::new(RecordingEmailTransport::default());
        let notifier = Arc::new(RecordingBrandNotifier::default());
        let handoff = Arc::new(RecordingHandoff::default());

        let state = AppState {
            negotiations: negotiations.clone(),
            communications: communications.clone(),
            assignments: assignments.clone(),
            parties: parties.clone(),
            followups: followups.clone(),
            scheduler: followups.clone(),
            classifier: Arc::new(classifier),
            composer: Arc::new(ScriptedComposer),
            transport: transport.clone(),
            notifier: Some(notifier.clone()),
            handoff: handoff.clone(),
            codec: ThreadCodec::new(SEND_DOMAIN, PARSE_DOMAIN),
            machine: Arc::new(NegotiationMachine::new(policy, 3)),
            sender_label: "via Parley".to_string(),
            follow_up_delay: chrono::Duration::seconds(60),
        };

        Self {
            state,
            negotiations,
            communications,
            assignments,
            parties,
            followups,
            transport,
            notifier,
            handoff,
        }
    }

    pub fn brand() -> Brand {
        let now = Utc::now();
        Brand {
            id: BrandId("brand-1".to_string()),
            name: "Acme".to_string(),
            email: "hello@acme.com".to_string(),
            phone: Some("+14155550100".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn creator() -> Creator {
        let now = Utc::now();
        Creator {
            id: CreatorId("creator-1".to_string()),
            display_name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            phone: None,
            category: "tech".to_string(),
            instagram_followers: 120_000,
            youtube_subscribers: 45_000,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn campaign() -> Campaign {
        let now = Utc::now();
        Campaign {
            id: CampaignId("camp-1".to_string()),
            brand_id: BrandId("brand-1".to_string()),
            name: "Spring Launch".to_string(),
            description: "Product launch push".to_string(),
            deliverables: "2 reels, 1 video".to_string(),
            budget_per_creator: Decimal::new(50_000, 0),
            start_date: "2026-03-01".to_string(),
            end_date: "2026-04-01".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Seeds brand/creator/campaign, an assignment covering the campaign,
    /// and one negotiation with its opening email already sent.
    pub async fn seed_active_negotiation(&self, id: &str, status: NegotiationStatus) {
        let now = Utc::now();
        self.parties.save_brand(Self::brand()).await.expect("seed brand");
        self.parties.save_creator(Self::creator()).await.expect("seed creator");
        self.parties.save_campaign(Self::campaign()).await.expect("seed campaign");
        self.assignments
            .assign(
                &BrandId("brand-1".to_string()),
                &CreatorId("creator-1".to_string()),
                &CampaignId("camp-1".to_string()),
                now,
            )
            .await
            .expect("seed assignment");

        self.negotiations
            .create(Negotiation {
                id: NegotiationId(id.to_string()),
                campaign_id: CampaignId("camp-1".to_string()),
                brand_id: BrandId("brand-1".to_string()),
                creator_id: CreatorId("creator-1".to_string()),
                status,
                escalation_count: 0,
                ai_agent_notes: String::new(),
                phone_contact_attempted: false,
                voice_call_completed: false,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("seed negotiation");

        self.communications
            .append(Communication {
                id: CommunicationId(format!("c-opener-{id}")),
                negotiation_id: NegotiationId(id.to_string()),
                direction: Direction::Outbound,
                kind: CommunicationType::Email,
                status: CommunicationStatus::Sent,
                subject: "Collaboration Opportunity with Acme".to_string(),
                content: "We would love to work together.".to_string(),
                message_id: Some("<opener@mail.example.com>".to_string()),
                references: None,
                created_at: now,
            })
            .await
            .expect("seed opening email");
    }

    pub async fn append_inbound_reply(&self, negotiation_id: &str, text: &str) {
        self.communications
            .append(Communication {
                id: CommunicationId(format!("c-reply-{negotiation_id}")),
                negotiation_id: NegotiationId(negotiation_id.to_string()),
                direction: Direction::Inbound,
                kind: CommunicationType::Email,
                status: CommunicationStatus::Replied,
                subject: "Re: Collaboration Opportunity with Acme".to_string(),
                content: text.to_string(),
                message_id: Some(format!("<reply-{negotiation_id}@creator.example.com>")),
                references: None,
                created_at: Utc::now(),
            })
            .await
            .expect("seed inbound reply");
    }

    pub fn reply_to_address(&self, negotiation_id: &str) -> String {
        self.state
            .codec
            .encode_reply_to_address("hello@acme.com", &NegotiationId(negotiation_id.to_string()))
            .expect("encode reply-to")
    }
}
