//! Scheduled follow-up processing. A firing claims its task row with a
//! compare-and-set, re-reads negotiation and transcript state, and only then
//! decides whether to send. At-least-once delivery, late firings, and
//! duplicate firings all collapse to at most one additional outbound email.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use parley_core::compose::EmailComposer;
use parley_core::domain::negotiation::NegotiationId;
use parley_core::engine::{EngineAction, NegotiationEvent};
use parley_core::errors::OrchestrationError;
use parley_core::scheduler::FollowUpScheduler;
use parley_core::thread::build_references;
use parley_db::repositories::{
    CommunicationRepository, FollowUpQueueRepository, NegotiationRepository, PartyRepository,
};

use crate::state::{email_history, ApiError, AppState};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpRequest {
    pub negotiation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpStatus {
    Sent,
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FollowUpResponse {
    pub status: FollowUpStatus,
    pub reason: Option<String>,
}

impl FollowUpResponse {
    fn sent() -> Self {
        Self { status: FollowUpStatus::Sent, reason: None }
    }

    fn skipped(reason: &str) -> Self {
        Self { status: FollowUpStatus::Skipped, reason: Some(reason.to_string()) }
    }
}

/// External task-queue callback: claims the pending task, then processes it.
pub async fn handle_follow_up(
    State(state): State<AppState>,
    Json(payload): Json<FollowUpRequest>,
) -> Result<(StatusCode, Json<FollowUpResponse>), ApiError> {
    if payload.negotiation_id.trim().is_empty() {
        return Err(OrchestrationError::InvalidFormat("negotiationId required".to_string()).into());
    }
    let negotiation_id = NegotiationId(payload.negotiation_id);

    let claimed = state
        .followups
        .claim_for_negotiation(&negotiation_id, Utc::now())
        .await
        .map_err(OrchestrationError::from)?;
    if !claimed {
        // Duplicate delivery or a stale firing for a cancelled task.
        return Ok((StatusCode::OK, Json(FollowUpResponse::skipped("no pending follow-up task"))));
    }

    let response = process_claimed_follow_up(&state, &negotiation_id).await?;
    Ok((StatusCode::OK, Json(response)))
}

/// Processes a follow-up whose task row is already claimed (by the HTTP
/// callback above or by the polling worker).
pub async fn process_claimed_follow_up(
    state: &AppState,
    negotiation_id: &NegotiationId,
) -> Result<FollowUpResponse, ApiError> {
    match run_claimed(state, negotiation_id).await {
        Ok(response) => {
            state
                .followups
                .mark_done(negotiation_id, Utc::now())
                .await
                .map_err(OrchestrationError::from)?;
            Ok(response)
        }
        Err(error) => {
            // Transient failure after the claim: re-arm the task so the
            // follow-up is retried instead of silently dropped.
            warn!(
                event_name = "followup.retry_rearm",
                negotiation_id = %negotiation_id.0,
                error = %error.0,
                "follow-up processing failed; re-arming the task"
            );
            if let Err(rearm_error) =
                state.scheduler.schedule(negotiation_id, state.follow_up_delay).await
            {
                warn!(
                    event_name = "followup.rearm_failed",
                    negotiation_id = %negotiation_id.0,
                    error = %rearm_error,
                    "could not re-arm the follow-up task"
                );
            }
            Err(error)
        }
    }
}

async fn run_claimed(
    state: &AppState,
    negotiation_id: &NegotiationId,
) -> Result<FollowUpResponse, ApiError> {
    // Never trust captured state: everything is re-read at firing time.
    let negotiation = state
        .negotiations
        .find_by_id(negotiation_id)
        .await
        .map_err(OrchestrationError::from)?
        .ok_or_else(|| OrchestrationError::not_found("negotiation", &negotiation_id.0))?;

    let creator_replied = state
        .communications
        .has_inbound_reply(negotiation_id)
        .await
        .map_err(OrchestrationError::from)?;
    let outbound_count = state
        .communications
        .outbound_email_count(negotiation_id)
        .await
        .map_err(OrchestrationError::from)?;
    let follow_ups_sent = outbound_count.saturating_sub(1);

    let event = NegotiationEvent::ScheduledFollowUp { creator_replied, follow_ups_sent };
    let outcome = state.machine.apply(&negotiation, &event).map_err(OrchestrationError::from)?;

    if outcome.actions.is_empty() {
        let reason = if negotiation.status.is_terminal() {
            "negotiation is settled"
        } else if creator_replied {
            "creator has replied"
        } else {
            "follow-up budget exhausted"
        };
        info!(
            event_name = "followup.skipped",
            negotiation_id = %negotiation_id.0,
            reason,
            "scheduled follow-up is a no-op"
        );
        return Ok(FollowUpResponse::skipped(reason));
    }

    let brand = state
        .parties
        .find_brand(&negotiation.brand_id)
        .await
        .map_err(OrchestrationError::from)?
        .ok_or_else(|| OrchestrationError::not_found("brand", &negotiation.brand_id.0))?;
    let creator = state
        .parties
        .find_creator(&negotiation.creator_id)
        .await
        .map_err(OrchestrationError::from)?
        .ok_or_else(|| OrchestrationError::not_found("creator", &negotiation.creator_id.0))?;
    let campaign = state
        .parties
        .find_campaign(&negotiation.campaign_id)
        .await
        .map_err(OrchestrationError::from)?
        .ok_or_else(|| OrchestrationError::not_found("campaign", &negotiation.campaign_id.0))?;

    let transcript = state
        .communications
        .list_for_negotiation(negotiation_id)
        .await
        .map_err(OrchestrationError::from)?;
    let history = email_history(&transcript);

    let draft = state
        .composer
        .follow_up(&brand, &creator, &campaign, &history)
        .await
        .map_err(OrchestrationError::from)?;

    // Thread the nudge onto the latest outbound message so mail clients
    // keep the conversation grouped.
    let latest_outbound = state
        .communications
        .latest_outbound_email(negotiation_id)
        .await
        .map_err(OrchestrationError::from)?;
    let in_reply_to = latest_outbound.as_ref().and_then(|comm| comm.message_id.clone());
    let references = build_references(
        latest_outbound.as_ref().and_then(|comm| comm.references.as_deref()),
        in_reply_to.as_deref(),
    );

    for action in &outcome.actions {
        match action {
            EngineAction::SendReply => {
                state
                    .send_thread_email(
                        &negotiation,
                        &brand,
                        &campaign,
                        &creator,
                        &draft,
                        in_reply_to.as_deref(),
                        Some(&references),
                    )
                    .await?;
            }
            EngineAction::ScheduleFollowUp => {
                state
                    .scheduler
                    .schedule(negotiation_id, state.follow_up_delay)
                    .await
                    .map_err(OrchestrationError::from)?;
            }
            _ => {}
        }
    }

    info!(
        event_name = "followup.sent",
        negotiation_id = %negotiation_id.0,
        "passive follow-up sent"
    );
    Ok(FollowUpResponse::sent())
}
