use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use parley_core::classifier::{EmailMessage, EmailSender, ReplyClassifier};
use parley_core::compose::{EmailComposer, EmailDraft};
use parley_core::domain::communication::{
    Communication, CommunicationId, CommunicationStatus, CommunicationType, Direction,
};
use parley_core::domain::negotiation::Negotiation;
use parley_core::domain::party::{Brand, Campaign, Creator};
use parley_core::engine::NegotiationMachine;
use parley_core::errors::OrchestrationError;
use parley_core::scheduler::FollowUpScheduler;
use parley_core::thread::ThreadCodec;
use parley_db::repositories::{
    AssignmentRepository, CommunicationRepository, FollowUpQueueRepository, NegotiationRepository,
    PartyRepository, RepositoryError,
};
use parley_mail::{BrandNotifier, EmailAddress, EmailTransport, OutboundEmail};
use parley_voice::HandoffRunner;

/// Everything an event handler needs. Every field is a seam: handlers stay
/// testable against in-memory repositories and scripted collaborators.
#[derive(Clone)]
pub struct AppState {
    pub negotiations: Arc<dyn NegotiationRepository>,
    pub communications: Arc<dyn CommunicationRepository>,
    pub assignments: Arc<dyn AssignmentRepository>,
    pub parties: Arc<dyn PartyRepository>,
    pub followups: Arc<dyn FollowUpQueueRepository>,
    pub scheduler: Arc<dyn FollowUpScheduler>,
    pub classifier: Arc<dyn ReplyClassifier>,
    pub composer: Arc<dyn EmailComposer>,
    pub transport: Arc<dyn EmailTransport>,
    pub notifier: Option<Arc<dyn BrandNotifier>>,
    pub handoff: Arc<dyn HandoffRunner>,
    pub codec: ThreadCodec,
    pub machine: Arc<NegotiationMachine>,
    pub sender_label: String,
    pub follow_up_delay: Duration,
}

impl AppState {
    pub fn from_name(&self, brand: &Brand) -> String {
        format!("{} {}", brand.name, self.sender_label)
    }

    /// Sends one thread-correlated email and records it. The Communication
    /// row is only written once the transport accepted the send.
    pub async fn send_thread_email(
        &self,
        negotiation: &Negotiation,
        brand: &Brand,
        campaign: &Campaign,
        creator: &Creator,
        draft: &EmailDraft,
        in_reply_to: Option<&str>,
        references: Option<&str>,
    ) -> Result<Communication, OrchestrationError> {
        let from_email = self.codec.encode_from_address(&brand.email, &negotiation.id)?;
        let reply_to_email = self.codec.encode_reply_to_address(&brand.email, &negotiation.id)?;
        let message_id = self.codec.new_message_id();
        let from_name = self.from_name(brand);

        let email = OutboundEmail {
            to: creator.email.clone(),
            from: EmailAddress { email: from_email, name: Some(from_name.clone()) },
            subject: draft.subject.clone(),
            text: draft.body.clone(),
            reply_to: Some(EmailAddress { email: reply_to_email, name: Some(from_name) }),
            message_id: Some(message_id.clone()),
            in_reply_to: in_reply_to.map(str::to_string),
            references: references.map(str::to_string).filter(|value| !value.is_empty()),
            negotiation_id: Some(negotiation.id.0.clone()),
            brand_id: Some(brand.id.0.clone()),
            campaign_id: Some(campaign.id.0.clone()),
        };

        self.transport
            .send(&email)
            .await
            .map_err(|error| OrchestrationError::Transport(error.to_string()))?;

        let now = Utc::now();
        let communication = Communication {
            id: CommunicationId(Uuid::new_v4().to_string()),
            negotiation_id: negotiation.id.clone(),
            direction: Direction::Outbound,
            kind: CommunicationType::Email,
            status: CommunicationStatus::Sent,
            subject: draft.subject.clone(),
            content: draft.body.clone(),
            message_id: Some(message_id),
            references: email.references.clone(),
            created_at: now,
        };
        self.communications.append(communication.clone()).await?;
        self.negotiations.touch(&negotiation.id, now).await?;

        Ok(communication)
    }
}

pub fn email_history(transcript: &[Communication]) -> Vec<EmailMessage> {
    transcript
        .iter()
        .map(|comm| EmailMessage {
            sender: match comm.direction {
                Direction::Inbound => EmailSender::Creator,
                Direction::Outbound => EmailSender::Brand,
            },
            subject: comm.subject.clone(),
            body: comm.content.clone(),
        })
        .collect()
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        ApiError(OrchestrationError::Persistence(error.to_string()))
    }
}

/// HTTP projection of the shared error taxonomy. Client errors never drive a
/// provider retry; classifier and transport failures do.
#[derive(Debug)]
pub struct ApiError(pub OrchestrationError);

impl From<OrchestrationError> for ApiError {
    fn from(error: OrchestrationError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OrchestrationError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            OrchestrationError::NotFound { .. } => StatusCode::NOT_FOUND,
            OrchestrationError::Mismatch => StatusCode::FORBIDDEN,
            OrchestrationError::Transition(_) => StatusCode::CONFLICT,
            OrchestrationError::Classifier(_)
            | OrchestrationError::Compose(_)
            | OrchestrationError::Transport(_) => StatusCode::BAD_GATEWAY,
            OrchestrationError::Persistence(_) | OrchestrationError::Scheduling(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
