//! Transcript polling: after a call is placed, the conversation is fetched
//! until the provider reports it settled, then the voice communication is
//! filled in and the negotiation flagged as voice-contacted.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use parley_core::domain::voice::{VoiceCallStatus, VoiceCommunicationId};
use parley_db::repositories::{NegotiationRepository, VoiceRepository};

use crate::gateway::{VoiceError, VoiceGateway};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("voice communication not found: `{0}`")]
    NotFound(String),
    #[error("voice gateway failure: {0}")]
    Gateway(#[from] VoiceError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("conversation `{conversation_id}` did not settle within {attempts} attempts")]
    Timeout { conversation_id: String, attempts: u32 },
}

pub struct TranscriptPoller {
    voice: Arc<dyn VoiceRepository>,
    negotiations: Arc<dyn NegotiationRepository>,
    gateway: Arc<dyn VoiceGateway>,
    max_attempts: u32,
    delay: Duration,
}

impl TranscriptPoller {
    pub fn new(
        voice: Arc<dyn VoiceRepository>,
        negotiations: Arc<dyn NegotiationRepository>,
        gateway: Arc<dyn VoiceGateway>,
        max_attempts: u32,
        delay: Duration,
    ) -> Self {
        Self { voice, negotiations, gateway, max_attempts, delay }
    }

    pub async fn poll_until_settled(
        &self,
        id: &VoiceCommunicationId,
    ) -> Result<VoiceCallStatus, PollError> {
        let communication = self
            .voice
            .find_communication(id)
            .await
            .map_err(|error| PollError::Persistence(error.to_string()))?
            .ok_or_else(|| PollError::NotFound(id.0.clone()))?;

        for attempt in 1..=self.max_attempts {
            match self.gateway.fetch_conversation(&communication.conversation_id).await {
                Ok(snapshot) if snapshot.status.is_settled() => {
                    let now = chrono::Utc::now();
                    self.voice
                        .record_call_result(
                            id,
                            snapshot.status,
                            &snapshot.transcript,
                            snapshot.call_duration_secs,
                            now,
                        )
                        .await
                        .map_err(|error| PollError::Persistence(error.to_string()))?;

                    if snapshot.status == VoiceCallStatus::Done {
                        self.negotiations
                            .mark_voice_call_completed(&communication.negotiation_id, now)
                            .await
                            .map_err(|error| PollError::Persistence(error.to_string()))?;
                    }

                    info!(
                        event_name = "voice.poll.settled",
                        voice_communication_id = %id.0,
                        status = snapshot.status.as_str(),
                        "call transcript recorded"
                    );
                    return Ok(snapshot.status);
                }
                Ok(snapshot) => {
                    info!(
                        event_name = "voice.poll.waiting",
                        voice_communication_id = %id.0,
                        attempt,
                        status = snapshot.status.as_str(),
                        "conversation not settled yet"
                    );
                }
                Err(error) => {
                    warn!(
                        event_name = "voice.poll.fetch_failed",
                        voice_communication_id = %id.0,
                        attempt,
                        error = %error,
                        "conversation fetch failed, will retry"
                    );
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.delay).await;
            }
        }

        Err(PollError::Timeout {
            conversation_id: communication.conversation_id,
            attempts: self.max_attempts,
        })
    }
}
