//! Initial outreach: for each requested creator, the assignment ledger is
//! consulted first so re-invocation (or duplicate queue delivery) never
//! double-sends an opening offer.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use parley_core::compose::EmailComposer;
use parley_core::domain::negotiation::{Negotiation, NegotiationId, NegotiationStatus};
use parley_core::domain::party::{CampaignId, Creator, CreatorId};
use parley_core::engine::{EngineAction, NegotiationEvent};
use parley_core::errors::OrchestrationError;
use parley_core::scheduler::FollowUpScheduler;
use parley_db::repositories::{AssignmentRepository, NegotiationRepository, PartyRepository};

use crate::state::{ApiError, AppState};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutreachRequest {
    pub campaign_id: String,
    pub creator_ids: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutreachStatus {
    Sent,
    Skipped,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutreachResult {
    pub creator_id: String,
    pub status: OutreachStatus,
    pub detail: String,
    pub negotiation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OutreachResponse {
    pub results: Vec<OutreachResult>,
}

pub async fn handle_outreach(
    State(state): State<AppState>,
    Json(payload): Json<OutreachRequest>,
) -> Result<(StatusCode, Json<OutreachResponse>), ApiError> {
    let campaign_id = CampaignId(payload.campaign_id);
    let campaign = state
        .parties
        .find_campaign(&campaign_id)
        .await
        .map_err(OrchestrationError::from)?
        .ok_or_else(|| OrchestrationError::not_found("campaign", &campaign_id.0))?;
    state
        .parties
        .find_brand(&campaign.brand_id)
        .await
        .map_err(OrchestrationError::from)?
        .ok_or_else(|| OrchestrationError::not_found("brand", &campaign.brand_id.0))?;

    let mut results = Vec::with_capacity(payload.creator_ids.len());
    for raw_creator_id in payload.creator_ids {
        let creator_id = CreatorId(raw_creator_id.clone());

        let creator = match state.parties.find_creator(&creator_id).await {
            Ok(Some(creator)) => creator,
            Ok(None) => {
                results.push(OutreachResult {
                    creator_id: raw_creator_id,
                    status: OutreachStatus::Failed,
                    detail: "creator not found".to_string(),
                    negotiation_id: None,
                });
                continue;
            }
            Err(error) => {
                results.push(OutreachResult {
                    creator_id: raw_creator_id,
                    status: OutreachStatus::Failed,
                    detail: format!("lookup failed: {error}"),
                    negotiation_id: None,
                });
                continue;
            }
        };

        match send_initial_offer(&state, &campaign.brand_id, &campaign_id, &creator).await {
            Ok(Some(negotiation_id)) => {
                results.push(OutreachResult {
                    creator_id: raw_creator_id,
                    status: OutreachStatus::Sent,
                    detail: format!("offer emailed to {}", creator.email),
                    negotiation_id: Some(negotiation_id.0),
                });
            }
            Ok(None) => {
                results.push(OutreachResult {
                    creator_id: raw_creator_id,
                    status: OutreachStatus::Skipped,
                    detail: "creator already assigned to this campaign".to_string(),
                    negotiation_id: None,
                });
            }
            Err(error) => {
                warn!(
                    event_name = "outreach.creator_failed",
                    creator_id = %creator.id.0,
                    error = %error.0,
                    "initial outreach failed for creator"
                );
                results.push(OutreachResult {
                    creator_id: raw_creator_id,
                    status: OutreachStatus::Failed,
                    detail: error.0.to_string(),
                    negotiation_id: None,
                });
            }
        }
    }

    Ok((StatusCode::OK, Json(OutreachResponse { results })))
}

async fn send_initial_offer(
    state: &AppState,
    brand_id: &parley_core::domain::party::BrandId,
    campaign_id: &CampaignId,
    creator: &Creator,
) -> Result<Option<NegotiationId>, ApiError> {
    let already = state
        .assignments
        .is_assigned(brand_id, &creator.id, campaign_id)
        .await
        .map_err(OrchestrationError::from)?;
    if already {
        return Ok(None);
    }

    let now = Utc::now();
    state
        .assignments
        .assign(brand_id, &creator.id, campaign_id, now)
        .await
        .map_err(OrchestrationError::from)?;

    let brand = state
        .parties
        .find_brand(brand_id)
        .await
        .map_err(OrchestrationError::from)?
        .ok_or_else(|| OrchestrationError::not_found("brand", &brand_id.0))?;
    let campaign = state
        .parties
        .find_campaign(campaign_id)
        .await
        .map_err(OrchestrationError::from)?
        .ok_or_else(|| OrchestrationError::not_found("campaign", &campaign_id.0))?;

    let negotiation = Negotiation {
        id: NegotiationId(Uuid::new_v4().to_string()),
        campaign_id: campaign_id.clone(),
        brand_id: brand_id.clone(),
        creator_id: creator.id.clone(),
        status: NegotiationStatus::Initiated,
        escalation_count: 0,
        ai_agent_notes: String::new(),
        phone_contact_attempted: false,
        voice_call_completed: false,
        created_at: now,
        updated_at: now,
    };
    state.negotiations.create(negotiation.clone()).await.map_err(OrchestrationError::from)?;

    let outcome = state
        .machine
        .apply(&negotiation, &NegotiationEvent::InitialSend)
        .map_err(OrchestrationError::from)?;

    let draft = state
        .composer
        .initial_offer(&brand, creator, &campaign)
        .await
        .map_err(OrchestrationError::from)?;

    // The opening email carries no reply headers; it starts the thread.
    state.send_thread_email(&negotiation, &brand, &campaign, creator, &draft, None, None).await?;

    state
        .negotiations
        .apply_transition(&negotiation.id, outcome.to, None, outcome.escalation_increment, Utc::now())
        .await
        .map_err(OrchestrationError::from)?;

    if outcome.actions.contains(&EngineAction::ScheduleFollowUp) {
        state
            .scheduler
            .schedule(&negotiation.id, state.follow_up_delay)
            .await
            .map_err(OrchestrationError::from)?;
    }

    info!(
        event_name = "outreach.offer_sent",
        negotiation_id = %negotiation.id.0,
        creator_id = %creator.id.0,
        "initial offer sent and negotiation opened"
    );

    Ok(Some(negotiation.id))
}
