//! Voice-call endpoints: the trigger that hands a negotiation off to the
//! voice channel once a phone is known, and the task callback that polls a
//! placed call's transcript until the provider settles it.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use parley_core::domain::negotiation::NegotiationId;
use parley_core::domain::voice::VoiceCommunicationId;
use parley_core::errors::OrchestrationError;
use parley_voice::{HandoffError, HandoffRunner, PollError, TranscriptPoller};

use crate::state::{ApiError, AppState};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCallRequest {
    pub negotiation_id: String,
    pub phone: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCallResponse {
    pub message: &'static str,
    pub voice_agent_id: String,
    pub conversation_id: String,
}

pub async fn handle_start_call(
    State(state): State<AppState>,
    Json(payload): Json<StartCallRequest>,
) -> Result<(StatusCode, Json<StartCallResponse>), ApiError> {
    if payload.negotiation_id.trim().is_empty() || payload.phone.trim().is_empty() {
        return Err(OrchestrationError::InvalidFormat(
            "negotiationId and phone are required".to_string(),
        )
        .into());
    }

    let negotiation_id = NegotiationId(payload.negotiation_id);
    let outcome = state
        .handoff
        .run(&negotiation_id, &payload.phone)
        .await
        .map_err(|error| ApiError(map_handoff_error(error)))?;

    Ok((
        StatusCode::OK,
        Json(StartCallResponse {
            message: "call initiated successfully",
            voice_agent_id: outcome.voice_agent_id.0,
            conversation_id: outcome.conversation_id,
        }),
    ))
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollTranscriptionRequest {
    pub voice_communication_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollTranscriptionResponse {
    pub message: &'static str,
    pub status: String,
}

/// Task-queue callback fired after a call was placed; blocks until the
/// conversation settles or the attempt budget runs out.
pub async fn handle_poll_transcription(
    State(poller): State<Arc<TranscriptPoller>>,
    Json(payload): Json<PollTranscriptionRequest>,
) -> Result<(StatusCode, Json<PollTranscriptionResponse>), ApiError> {
    if payload.voice_communication_id.trim().is_empty() {
        return Err(OrchestrationError::InvalidFormat(
            "voiceCommunicationId is required".to_string(),
        )
        .into());
    }

    let id = VoiceCommunicationId(payload.voice_communication_id);
    let status =
        poller.poll_until_settled(&id).await.map_err(|error| ApiError(map_poll_error(error)))?;

    Ok((
        StatusCode::OK,
        Json(PollTranscriptionResponse {
            message: "polling complete",
            status: status.as_str().to_string(),
        }),
    ))
}

fn map_poll_error(error: PollError) -> OrchestrationError {
    match error {
        PollError::NotFound(id) => OrchestrationError::NotFound { entity: "voice communication", id },
        PollError::Gateway(gateway_error) => {
            OrchestrationError::Transport(gateway_error.to_string())
        }
        PollError::Persistence(detail) => OrchestrationError::Persistence(detail),
        PollError::Timeout { conversation_id, attempts } => OrchestrationError::Transport(
            format!("conversation `{conversation_id}` did not settle within {attempts} attempts"),
        ),
    }
}

fn map_handoff_error(error: HandoffError) -> OrchestrationError {
    match error {
        HandoffError::InvalidPhone(phone_error) => {
            OrchestrationError::InvalidFormat(phone_error.to_string())
        }
        HandoffError::NotFound { entity, id } => OrchestrationError::NotFound { entity, id },
        HandoffError::Settled { status, .. } => {
            OrchestrationError::Transition(parley_core::engine::TransitionError::InvalidTransition {
                status,
                event: "voice_handoff",
            })
        }
        HandoffError::Gateway(gateway_error) => {
            OrchestrationError::Transport(gateway_error.to_string())
        }
        HandoffError::Persistence(detail) => OrchestrationError::Persistence(detail),
        HandoffError::NotConfigured(detail) => OrchestrationError::Persistence(detail),
    }
}
