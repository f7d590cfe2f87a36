//! Inbound email webhook: correlate the reply to its negotiation, append it
//! to the transcript, classify intent, transition the state machine, and
//! dispatch the resulting side effects. Each invocation is stateless; all
//! decisions come from freshly read persisted state.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use parley_core::classifier::{ClassifierContext, ReplyAnalysis, ReplyClassifier};
use parley_core::domain::communication::{
    Communication, CommunicationId, CommunicationStatus, CommunicationType, Direction,
};
use parley_core::domain::negotiation::Negotiation;
use parley_core::domain::party::{Brand, Campaign, Creator};
use parley_core::engine::{EngineAction, NegotiationEvent, TransitionOutcome};
use parley_core::errors::OrchestrationError;
use parley_core::phone::normalize_phone;
use parley_core::scheduler::FollowUpScheduler;
use parley_core::thread::{build_references, parse_one_mailbox};
use parley_db::repositories::{
    AssignmentRepository, CommunicationRepository, FollowUpQueueRepository, NegotiationRepository,
    PartyRepository,
};
use parley_mail::{BrandNotifier, ReplyNotification};
use parley_voice::HandoffRunner;

use crate::state::{email_history, ApiError, AppState};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEmailRequest {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub in_reply_to: Option<String>,
    #[serde(default)]
    pub references: Option<String>,
    /// Raw header block, consulted when the explicit fields are absent.
    #[serde(default)]
    pub headers: Option<String>,
}

impl InboundEmailRequest {
    pub fn message_id(&self) -> Option<String> {
        self.field_or_header(&self.message_id, "Message-ID")
    }

    pub fn in_reply_to(&self) -> Option<String> {
        self.field_or_header(&self.in_reply_to, "In-Reply-To")
    }

    pub fn references(&self) -> Option<String> {
        self.field_or_header(&self.references, "References")
    }

    fn field_or_header(&self, explicit: &Option<String>, header: &str) -> Option<String> {
        explicit
            .clone()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.headers.as_deref().and_then(|raw| header_value(raw, header)))
    }
}

/// Extracts one header from a raw RFC 5322 header block, unfolding
/// continuation lines.
fn header_value(raw_headers: &str, name: &str) -> Option<String> {
    let mut value: Option<String> = None;
    for line in raw_headers.lines() {
        if let Some(current) = value.as_mut() {
            if line.starts_with(' ') || line.starts_with('\t') {
                current.push(' ');
                current.push_str(line.trim());
                continue;
            }
            break;
        }
        if let Some((header, rest)) = line.split_once(':') {
            if header.trim().eq_ignore_ascii_case(name) {
                value = Some(rest.trim().to_string());
            }
        }
    }
    value.filter(|value| !value.is_empty())
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct InboundEmailResponse {
    pub status: &'static str,
    pub negotiation_id: String,
    pub intent: String,
}

pub async fn handle_inbound_email(
    State(state): State<AppState>,
    Json(payload): Json<InboundEmailRequest>,
) -> Result<(StatusCode, Json<InboundEmailResponse>), ApiError> {
    let sender = parse_one_mailbox(&payload.from).map_err(OrchestrationError::from)?;
    let negotiation_id = state.codec.decode_recipient(&payload.to).map_err(OrchestrationError::from)?;

    info!(
        event_name = "inbound.email.received",
        negotiation_id = %negotiation_id.0,
        from = %sender.address,
        in_reply_to = payload.in_reply_to().as_deref().unwrap_or(""),
        "inbound email correlated to negotiation"
    );

    let negotiation = state
        .negotiations
        .find_by_id(&negotiation_id)
        .await
        .map_err(OrchestrationError::from)?
        .ok_or_else(|| OrchestrationError::not_found("negotiation", &negotiation_id.0))?;

    let creator = state
        .parties
        .find_creator(&negotiation.creator_id)
        .await
        .map_err(OrchestrationError::from)?
        .ok_or_else(|| OrchestrationError::not_found("creator", &negotiation.creator_id.0))?;
    if !creator.email.eq_ignore_ascii_case(&sender.address) {
        warn!(
            event_name = "inbound.email.creator_mismatch",
            negotiation_id = %negotiation_id.0,
            "sender does not match the negotiation's creator"
        );
        return Err(OrchestrationError::Mismatch.into());
    }

    let brand = state
        .parties
        .find_brand(&negotiation.brand_id)
        .await
        .map_err(OrchestrationError::from)?
        .ok_or_else(|| OrchestrationError::not_found("brand", &negotiation.brand_id.0))?;
    let campaign = state
        .parties
        .find_campaign(&negotiation.campaign_id)
        .await
        .map_err(OrchestrationError::from)?
        .ok_or_else(|| OrchestrationError::not_found("campaign", &negotiation.campaign_id.0))?;

    // Append-only log write. Redelivery of the same provider message id
    // cannot double-append, but processing still continues from the
    // transcript, which now contains the reply exactly once.
    let inbound = Communication {
        id: CommunicationId(Uuid::new_v4().to_string()),
        negotiation_id: negotiation_id.clone(),
        direction: Direction::Inbound,
        kind: CommunicationType::Email,
        status: CommunicationStatus::Replied,
        subject: payload.subject.clone(),
        content: payload.text.clone(),
        message_id: payload.message_id(),
        references: payload.references(),
        created_at: Utc::now(),
    };
    let appended = state
        .communications
        .append_if_new(inbound)
        .await
        .map_err(OrchestrationError::from)?;
    if !appended {
        info!(
            event_name = "inbound.email.duplicate_message_id",
            negotiation_id = %negotiation_id.0,
            "reply already recorded, reprocessing from the existing transcript"
        );
    }

    let transcript = state
        .communications
        .list_for_negotiation(&negotiation_id)
        .await
        .map_err(OrchestrationError::from)?;
    let history = email_history(&transcript);

    // Classifier failures abort here with a retryable status; the
    // negotiation is left untouched and the provider redelivers.
    let analysis = state
        .classifier
        .classify(ClassifierContext {
            transcript: &history,
            negotiation: &negotiation,
            creator: &creator,
            brand: &brand,
        })
        .await
        .map_err(OrchestrationError::from)?;

    let phone = analysis.phone_number.as_deref().and_then(|raw| match normalize_phone(raw) {
        Ok(phone) => Some(phone),
        Err(error) => {
            warn!(
                event_name = "inbound.email.phone_rejected",
                negotiation_id = %negotiation_id.0,
                error = %error,
                "classifier surfaced a phone number that failed normalization"
            );
            None
        }
    });

    let event = NegotiationEvent::InboundReply { intent: analysis.intent, phone };
    let outcome = state.machine.apply(&negotiation, &event).map_err(OrchestrationError::from)?;

    dispatch_reply_effects(
        &state,
        &negotiation,
        &brand,
        &campaign,
        &creator,
        &payload,
        &outcome,
    )
    .await?;

    let now = Utc::now();
    let applied = state
        .negotiations
        .apply_transition(
            &negotiation_id,
            outcome.to,
            Some(&analysis.notes),
            outcome.escalation_increment,
            now,
        )
        .await
        .map_err(OrchestrationError::from)?;
    if !applied {
        info!(
            event_name = "inbound.email.transition_skipped",
            negotiation_id = %negotiation_id.0,
            "negotiation reached a terminal status concurrently; state left as-is"
        );
    }

    if outcome.actions.contains(&EngineAction::NotifyBrand) {
        notify_brand(&state, &brand, &campaign, &creator, &payload.text, &analysis).await;
    }

    info!(
        event_name = "inbound.email.processed",
        negotiation_id = %negotiation_id.0,
        intent = analysis.intent.as_str(),
        from_status = outcome.from.as_str(),
        to_status = outcome.to.as_str(),
        "inbound reply processed"
    );

    Ok((
        StatusCode::OK,
        Json(InboundEmailResponse {
            status: "processed",
            negotiation_id: negotiation_id.0,
            intent: analysis.intent.as_str().to_string(),
        }),
    ))
}

async fn dispatch_reply_effects(
    state: &AppState,
    negotiation: &Negotiation,
    brand: &Brand,
    campaign: &Campaign,
    creator: &Creator,
    payload: &InboundEmailRequest,
    outcome: &TransitionOutcome,
) -> Result<(), ApiError> {
    let now = Utc::now();

    for action in &outcome.actions {
        match action {
            EngineAction::PersistPhone { phone } => {
                let updated = state
                    .assignments
                    .record_phone_discovery(&negotiation.brand_id, &negotiation.creator_id, phone, now)
                    .await
                    .map_err(OrchestrationError::from)?;
                if !updated {
                    warn!(
                        event_name = "inbound.email.no_assignment_for_phone",
                        negotiation_id = %negotiation.id.0,
                        "phone discovered but no assignment ledger entry exists"
                    );
                }
            }
            EngineAction::SendReply => {
                // Escalations and phone requests answer immediately; only
                // the next passive follow-up is delayed.
                let transcript = state
                    .communications
                    .list_for_negotiation(&negotiation.id)
                    .await
                    .map_err(OrchestrationError::from)?;
                let history = email_history(&transcript);
                let draft = state
                    .composer
                    .follow_up(brand, creator, campaign, &history)
                    .await
                    .map_err(OrchestrationError::from)?;

                let message_id = payload.message_id();
                let references =
                    build_references(payload.references().as_deref(), message_id.as_deref());
                state
                    .send_thread_email(
                        negotiation,
                        brand,
                        campaign,
                        creator,
                        &draft,
                        message_id.as_deref(),
                        Some(&references),
                    )
                    .await?;
            }
            EngineAction::TriggerHandoff { phone } => {
                state.handoff.run(&negotiation.id, phone).await.map_err(|error| {
                    OrchestrationError::Transport(format!("voice handoff failed: {error}"))
                })?;
            }
            EngineAction::ScheduleFollowUp => {
                state
                    .scheduler
                    .schedule(&negotiation.id, state.follow_up_delay)
                    .await
                    .map_err(OrchestrationError::from)?;
            }
            EngineAction::StopFollowUps => {
                state
                    .followups
                    .cancel(&negotiation.id, now)
                    .await
                    .map_err(OrchestrationError::from)?;
            }
            EngineAction::NotifyBrand => {}
        }
    }

    Ok(())
}

async fn notify_brand(
    state: &AppState,
    brand: &Brand,
    campaign: &Campaign,
    creator: &Creator,
    reply_text: &str,
    analysis: &ReplyAnalysis,
) {
    let Some(notifier) = &state.notifier else {
        return;
    };
    let Some(phone) = brand.phone.as_deref() else {
        warn!(
            event_name = "inbound.email.brand_unreachable",
            brand_id = %brand.id.0,
            "brand has no phone number for reply notifications"
        );
        return;
    };

    let notification = ReplyNotification {
        creator_name: creator.display_name.clone(),
        creator_email: creator.email.clone(),
        campaign_name: campaign.name.clone(),
        campaign_id: campaign.id.0.clone(),
        reply_excerpt: ReplyNotification::excerpt_of(reply_text),
        agent_notes: analysis.notes.clone(),
    };

    // Best effort: a notification failure never fails the webhook.
    if let Err(error) = notifier.notify(phone, &notification).await {
        warn!(
            event_name = "inbound.email.notify_failed",
            brand_id = %brand.id.0,
            error = %error,
            "brand notification failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::State;
    use axum::Json;

    use parley_core::classifier::{ClassifierError, ReplyIntent};
    use parley_core::domain::negotiation::{NegotiationId, NegotiationStatus};
    use parley_core::domain::party::{BrandId, CreatorId};
    use parley_core::errors::OrchestrationError;
    use parley_core::scheduler::FollowUpScheduler;
    use parley_db::repositories::{
        AssignmentRepository, CommunicationRepository, NegotiationRepository,
    };

    use crate::testing::{Harness, ScriptedClassifier};

    use super::{handle_inbound_email, InboundEmailRequest};

    fn reply_payload(harness: &Harness, negotiation_id: &str, text: &str) -> InboundEmailRequest {
        InboundEmailRequest {
            from: "Jane Doe <jane@example.com>".to_string(),
            to: harness.reply_to_address(negotiation_id),
            subject: "Re: Collaboration Opportunity with Acme".to_string(),
            text: text.to_string(),
            message_id: Some("<reply-1@creator.example.com>".to_string()),
            in_reply_to: Some("opener@mail.example.com".to_string()),
            references: Some("<opener@mail.example.com>".to_string()),
            headers: None,
        }
    }

    #[test]
    fn threading_ids_fall_back_to_the_raw_header_block() {
        let payload = InboundEmailRequest {
            from: "jane@example.com".to_string(),
            to: "acme--n1@parse.mail.example.com".to_string(),
            subject: String::new(),
            text: String::new(),
            message_id: None,
            in_reply_to: None,
            references: None,
            headers: Some(
                "Received: from mx.example.com\n\
                 Message-ID: <raw-id@creator.example.com>\n\
                 References: <a@mail.example.com>\n\
                 \t<b@mail.example.com>\n\
                 In-Reply-To: <b@mail.example.com>\n"
                    .to_string(),
            ),
        };

        assert_eq!(payload.message_id().as_deref(), Some("<raw-id@creator.example.com>"));
        assert_eq!(payload.in_reply_to().as_deref(), Some("<b@mail.example.com>"));
        assert_eq!(
            payload.references().as_deref(),
            Some("<a@mail.example.com> <b@mail.example.com>"),
        );
    }

    #[tokio::test]
    async fn initiate_call_reply_discovers_the_phone_and_hands_off() {
        let harness = Harness::new(ScriptedClassifier::replying(
            ReplyIntent::InitiateCall,
            Some("98765 43210"),
        ))
        .await;
        harness.seed_active_negotiation("n-1", NegotiationStatus::EmailSent).await;

        let payload = reply_payload(&harness, "n-1", "call me at 9876543210");
        let (status, Json(response)) =
            handle_inbound_email(State(harness.state.clone()), Json(payload))
                .await
                .expect("webhook succeeds");

        assert_eq!(status, axum::http::StatusCode::OK);
        assert_eq!(response.intent, "initiate_call");

        let assignment = harness
            .assignments
            .find(&BrandId("brand-1".to_string()), &CreatorId("creator-1".to_string()))
            .await
            .expect("find assignment")
            .expect("assignment exists");
        assert!(assignment.phone_discovered);
        assert_eq!(assignment.phone.as_deref(), Some("9876543210"));

        let handoffs = harness.handoff.requests().await;
        assert_eq!(handoffs.len(), 1);
        assert_eq!(handoffs[0].1, "9876543210");

        let negotiation = harness
            .negotiations
            .find_by_id(&NegotiationId("n-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(negotiation.status, NegotiationStatus::InitiateCall);
        assert_eq!(negotiation.escalation_count, 1);
        assert_eq!(negotiation.ai_agent_notes, "scripted analysis");

        assert_eq!(harness.notifier.notifications().await.len(), 1);
    }

    #[tokio::test]
    async fn request_phone_reply_sends_an_immediate_answer_and_rearms_the_follow_up() {
        let harness =
            Harness::new(ScriptedClassifier::replying(ReplyIntent::RequestPhone, None)).await;
        harness.seed_active_negotiation("n-2", NegotiationStatus::EmailSent).await;

        let payload = reply_payload(&harness, "n-2", "what is this about?");
        handle_inbound_email(State(harness.state.clone()), Json(payload))
            .await
            .expect("webhook succeeds");

        let sent = harness.transport.sent().await;
        assert_eq!(sent.len(), 1, "an escalation reply is sent immediately, not delayed");
        assert_eq!(sent[0].in_reply_to.as_deref(), Some("<reply-1@creator.example.com>"));
        assert_eq!(
            sent[0].references.as_deref(),
            Some("<opener@mail.example.com> <reply-1@creator.example.com>"),
        );

        assert_eq!(harness.followups.pending_count().await, 1);
    }

    #[tokio::test]
    async fn accepted_reply_settles_the_negotiation_and_stops_follow_ups() {
        let harness = Harness::new(ScriptedClassifier::replying(ReplyIntent::Accepted, None)).await;
        harness.seed_active_negotiation("n-3", NegotiationStatus::RequestPhone).await;
        harness
            .state
            .scheduler
            .schedule(&NegotiationId("n-3".to_string()), chrono::Duration::seconds(60))
            .await
            .expect("arm follow-up");

        let payload = reply_payload(&harness, "n-3", "deal, let's do it");
        handle_inbound_email(State(harness.state.clone()), Json(payload))
            .await
            .expect("webhook succeeds");

        let negotiation = harness
            .negotiations
            .find_by_id(&NegotiationId("n-3".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(negotiation.status, NegotiationStatus::Accepted);

        assert_eq!(harness.followups.pending_count().await, 0, "pending follow-up was cancelled");
        assert_eq!(harness.transport.sent_count().await, 0, "acceptance sends nothing");
    }

    #[tokio::test]
    async fn unknown_negotiation_is_a_404_and_writes_nothing() {
        let harness =
            Harness::new(ScriptedClassifier::replying(ReplyIntent::RequestPhone, None)).await;

        let payload = reply_payload(&harness, "missing", "hello?");
        let error = handle_inbound_email(State(harness.state.clone()), Json(payload))
            .await
            .expect_err("unknown negotiation");

        assert!(matches!(error.0, OrchestrationError::NotFound { entity: "negotiation", .. }));
        let transcript = harness
            .communications
            .list_for_negotiation(&NegotiationId("missing".to_string()))
            .await
            .expect("list");
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn sender_that_is_not_the_negotiations_creator_is_rejected() {
        let harness =
            Harness::new(ScriptedClassifier::replying(ReplyIntent::RequestPhone, None)).await;
        harness.seed_active_negotiation("n-4", NegotiationStatus::EmailSent).await;

        let mut payload = reply_payload(&harness, "n-4", "hello");
        payload.from = "impostor@example.com".to_string();

        let error = handle_inbound_email(State(harness.state.clone()), Json(payload))
            .await
            .expect_err("creator mismatch");
        assert!(matches!(error.0, OrchestrationError::Mismatch));

        let transcript = harness
            .communications
            .list_for_negotiation(&NegotiationId("n-4".to_string()))
            .await
            .expect("list");
        assert_eq!(transcript.len(), 1, "only the seeded opener; impostor mail is not recorded");
    }

    #[tokio::test]
    async fn malformed_recipient_fails_closed() {
        let harness =
            Harness::new(ScriptedClassifier::replying(ReplyIntent::RequestPhone, None)).await;

        let mut payload = reply_payload(&harness, "n-5", "hello");
        payload.to = "not-a-negotiation@parse.mail.example.com".to_string();

        let error = handle_inbound_email(State(harness.state.clone()), Json(payload))
            .await
            .expect_err("bad recipient");
        assert!(matches!(error.0, OrchestrationError::InvalidFormat(_)));
    }

    #[tokio::test]
    async fn classifier_failure_surfaces_and_leaves_the_negotiation_unchanged() {
        let harness =
            Harness::new(ScriptedClassifier::failing(ClassifierError::EmptyOutput)).await;
        harness.seed_active_negotiation("n-6", NegotiationStatus::EmailSent).await;

        let payload = reply_payload(&harness, "n-6", "ambiguous reply");
        let error = handle_inbound_email(State(harness.state.clone()), Json(payload))
            .await
            .expect_err("classifier failed");
        assert!(matches!(error.0, OrchestrationError::Classifier(_)));

        let negotiation = harness
            .negotiations
            .find_by_id(&NegotiationId("n-6".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(negotiation.status, NegotiationStatus::EmailSent);
        assert_eq!(negotiation.escalation_count, 0);
        assert_eq!(harness.transport.sent_count().await, 0);
    }

    #[tokio::test]
    async fn redelivered_message_id_does_not_double_append_the_reply() {
        let harness =
            Harness::new(ScriptedClassifier::replying(ReplyIntent::RequestPhone, None)).await;
        harness.seed_active_negotiation("n-7", NegotiationStatus::EmailSent).await;

        let payload = reply_payload(&harness, "n-7", "hello again");
        handle_inbound_email(State(harness.state.clone()), Json(payload.clone()))
            .await
            .expect("first delivery");
        handle_inbound_email(State(harness.state.clone()), Json(payload))
            .await
            .expect("second delivery");

        let transcript = harness
            .communications
            .list_for_negotiation(&NegotiationId("n-7".to_string()))
            .await
            .expect("list");
        let inbound_count = transcript
            .iter()
            .filter(|comm| {
                comm.direction == parley_core::domain::communication::Direction::Inbound
            })
            .count();
        assert_eq!(inbound_count, 1, "the same provider message id lands once");
    }

    #[tokio::test]
    async fn transport_failure_prevents_partial_state_updates() {
        let mut harness =
            Harness::new(ScriptedClassifier::replying(ReplyIntent::RequestPhone, None)).await;
        harness.state.transport = std::sync::Arc::new(parley_mail::FailingEmailTransport);
        harness.seed_active_negotiation("n-9", NegotiationStatus::EmailSent).await;

        let payload = reply_payload(&harness, "n-9", "tell me more");
        let error = handle_inbound_email(State(harness.state.clone()), Json(payload))
            .await
            .expect_err("send fails");
        assert!(matches!(error.0, OrchestrationError::Transport(_)));

        let negotiation = harness
            .negotiations
            .find_by_id(&NegotiationId("n-9".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(negotiation.status, NegotiationStatus::EmailSent, "status is unchanged");
        assert_eq!(negotiation.escalation_count, 0, "escalation is not applied");

        let transcript = harness
            .communications
            .list_for_negotiation(&NegotiationId("n-9".to_string()))
            .await
            .expect("list");
        let outbound = transcript
            .iter()
            .filter(|comm| {
                comm.direction == parley_core::domain::communication::Direction::Outbound
            })
            .count();
        assert_eq!(outbound, 1, "only the seeded opener; the failed send is not recorded");
    }

    #[tokio::test]
    async fn hard_cap_policy_pauses_after_the_configured_number_of_replies() {
        let harness = Harness::with_policy(
            ScriptedClassifier::replying(ReplyIntent::Escalate, None),
            parley_core::engine::EscalationPolicy::HardCap { max_escalations: 1 },
        )
        .await;
        harness.seed_active_negotiation("n-8", NegotiationStatus::EmailSent).await;

        let payload = reply_payload(&harness, "n-8", "hmm");
        handle_inbound_email(State(harness.state.clone()), Json(payload))
            .await
            .expect("webhook succeeds");

        let negotiation = harness
            .negotiations
            .find_by_id(&NegotiationId("n-8".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(negotiation.status, NegotiationStatus::Paused);
        assert_eq!(harness.transport.sent_count().await, 0, "a paused negotiation sends nothing");
    }
}
