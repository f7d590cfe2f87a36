use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use parley_core::domain::assignment::{AssignmentId, CreatorAssignment};
use parley_core::domain::communication::{
    Communication, CommunicationStatus, CommunicationType, Direction,
};
use parley_core::domain::negotiation::{Negotiation, NegotiationId, NegotiationStatus};
use parley_core::domain::party::{Brand, BrandId, Campaign, CampaignId, Creator, CreatorId};
use parley_core::domain::voice::{
    VoiceAgent, VoiceCallStatus, VoiceCommunication, VoiceCommunicationId, VoiceTranscriptMessage,
};
use parley_core::scheduler::{FollowUpScheduler, SchedulerError};

use super::{
    AssignmentRepository, CommunicationRepository, FollowUpQueueRepository, NegotiationRepository,
    PartyRepository, RepositoryError, VoiceRepository,
};

#[derive(Default)]
pub struct InMemoryNegotiationRepository {
    negotiations: RwLock<HashMap<String, Negotiation>>,
}

#[async_trait::async_trait]
impl NegotiationRepository for InMemoryNegotiationRepository {
    async fn find_by_id(&self, id: &NegotiationId) -> Result<Option<Negotiation>, RepositoryError> {
        let negotiations = self.negotiations.read().await;
        Ok(negotiations.get(&id.0).cloned())
    }

    async fn create(&self, negotiation: Negotiation) -> Result<(), RepositoryError> {
        let mut negotiations = self.negotiations.write().await;
        negotiations.insert(negotiation.id.0.clone(), negotiation);
        Ok(())
    }

    async fn apply_transition(
        &self,
        id: &NegotiationId,
        to: NegotiationStatus,
        notes: Option<&str>,
        escalation_increment: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut negotiations = self.negotiations.write().await;
        let Some(negotiation) = negotiations.get_mut(&id.0) else {
            return Ok(false);
        };
        if negotiation.status.is_terminal() {
            return Ok(false);
        }

        negotiation.status = to;
        if let Some(notes) = notes {
            negotiation.ai_agent_notes = notes.to_string();
        }
        negotiation.escalation_count += escalation_increment;
        negotiation.updated_at = now;
        Ok(true)
    }

    async fn touch(&self, id: &NegotiationId, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut negotiations = self.negotiations.write().await;
        if let Some(negotiation) = negotiations.get_mut(&id.0) {
            negotiation.updated_at = now;
        }
        Ok(())
    }

    async fn mark_phone_contact_attempted(
        &self,
        id: &NegotiationId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut negotiations = self.negotiations.write().await;
        let Some(negotiation) = negotiations.get_mut(&id.0) else {
            return Ok(false);
        };
        negotiation.phone_contact_attempted = true;
        negotiation.updated_at = now;
        Ok(true)
    }

    async fn mark_voice_call_completed(
        &self,
        id: &NegotiationId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut negotiations = self.negotiations.write().await;
        let Some(negotiation) = negotiations.get_mut(&id.0) else {
            return Ok(false);
        };
        negotiation.voice_call_completed = true;
        negotiation.updated_at = now;
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryCommunicationRepository {
    communications: RwLock<Vec<Communication>>,
}

#[async_trait::async_trait]
impl CommunicationRepository for InMemoryCommunicationRepository {
    async fn append(&self, communication: Communication) -> Result<(), RepositoryError> {
        let mut communications = self.communications.write().await;
        communications.push(communication);
        Ok(())
    }

    async fn append_if_new(&self, communication: Communication) -> Result<bool, RepositoryError> {
        let mut communications = self.communications.write().await;
        let duplicate = communication.message_id.as_deref().is_some_and(|message_id| {
            !message_id.is_empty()
                && communications.iter().any(|existing| {
                    existing.negotiation_id == communication.negotiation_id
                        && existing.direction == Direction::Inbound
                        && existing.message_id.as_deref() == Some(message_id)
                })
        });
        if duplicate {
            return Ok(false);
        }
        communications.push(communication);
        Ok(true)
    }

    async fn list_for_negotiation(
        &self,
        id: &NegotiationId,
    ) -> Result<Vec<Communication>, RepositoryError> {
        let communications = self.communications.read().await;
        let mut transcript: Vec<Communication> = communications
            .iter()
            .filter(|comm| comm.negotiation_id == *id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps, matching
        // the SQL tie-break on the autoincrement sequence.
        transcript.sort_by_key(|comm| comm.created_at);
        Ok(transcript)
    }

    async fn has_inbound_reply(&self, id: &NegotiationId) -> Result<bool, RepositoryError> {
        let communications = self.communications.read().await;
        Ok(communications.iter().any(|comm| {
            comm.negotiation_id == *id
                && comm.direction == Direction::Inbound
                && comm.status == CommunicationStatus::Replied
        }))
    }

    async fn outbound_email_count(&self, id: &NegotiationId) -> Result<u32, RepositoryError> {
        let communications = self.communications.read().await;
        let count = communications
            .iter()
            .filter(|comm| {
                comm.negotiation_id == *id
                    && comm.direction == Direction::Outbound
                    && comm.kind == CommunicationType::Email
            })
            .count();
        Ok(count as u32)
    }

    async fn latest_outbound_email(
        &self,
        id: &NegotiationId,
    ) -> Result<Option<Communication>, RepositoryError> {
        let transcript = self.list_for_negotiation(id).await?;
        Ok(transcript
            .into_iter()
            .rev()
            .find(|comm| comm.direction == Direction::Outbound && comm.kind == CommunicationType::Email))
    }
}

#[derive(Default)]
pub struct InMemoryAssignmentRepository {
    assignments: RwLock<HashMap<(String, String), CreatorAssignment>>,
}

#[async_trait::async_trait]
impl AssignmentRepository for InMemoryAssignmentRepository {
    async fn find(
        &self,
        brand_id: &BrandId,
        creator_id: &CreatorId,
    ) -> Result<Option<CreatorAssignment>, RepositoryError> {
        let assignments = self.assignments.read().await;
        Ok(assignments.get(&(brand_id.0.clone(), creator_id.0.clone())).cloned())
    }

    async fn is_assigned(
        &self,
        brand_id: &BrandId,
        creator_id: &CreatorId,
        campaign_id: &CampaignId,
    ) -> Result<bool, RepositoryError> {
        let assignments = self.assignments.read().await;
        Ok(assignments
            .get(&(brand_id.0.clone(), creator_id.0.clone()))
            .is_some_and(|assignment| assignment.covers_campaign(campaign_id)))
    }

    async fn assign(
        &self,
        brand_id: &BrandId,
        creator_id: &CreatorId,
        campaign_id: &CampaignId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut assignments = self.assignments.write().await;
        let entry = assignments
            .entry((brand_id.0.clone(), creator_id.0.clone()))
            .or_insert_with(|| CreatorAssignment {
                id: AssignmentId(Uuid::new_v4().to_string()),
                brand_id: brand_id.clone(),
                creator_id: creator_id.clone(),
                campaign_ids: Vec::new(),
                phone_discovered: false,
                phone: None,
                created_at: now,
                updated_at: now,
            });
        if !entry.covers_campaign(campaign_id) {
            entry.campaign_ids.push(campaign_id.clone());
            entry.updated_at = now;
        }
        Ok(())
    }

    async fn record_phone_discovery(
        &self,
        brand_id: &BrandId,
        creator_id: &CreatorId,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut assignments = self.assignments.write().await;
        let Some(entry) = assignments.get_mut(&(brand_id.0.clone(), creator_id.0.clone())) else {
            return Ok(false);
        };
        entry.phone = Some(phone.to_string());
        entry.phone_discovered = true;
        entry.updated_at = now;
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryPartyRepository {
    brands: RwLock<HashMap<String, Brand>>,
    creators: RwLock<HashMap<String, Creator>>,
    campaigns: RwLock<HashMap<String, Campaign>>,
}

#[async_trait::async_trait]
impl PartyRepository for InMemoryPartyRepository {
    async fn find_brand(&self, id: &BrandId) -> Result<Option<Brand>, RepositoryError> {
        Ok(self.brands.read().await.get(&id.0).cloned())
    }

    async fn save_brand(&self, brand: Brand) -> Result<(), RepositoryError> {
        self.brands.write().await.insert(brand.id.0.clone(), brand);
        Ok(())
    }

    async fn find_creator(&self, id: &CreatorId) -> Result<Option<Creator>, RepositoryError> {
        Ok(self.creators.read().await.get(&id.0).cloned())
    }

    async fn save_creator(&self, creator: Creator) -> Result<(), RepositoryError> {
        self.creators.write().await.insert(creator.id.0.clone(), creator);
        Ok(())
    }

    async fn find_campaign(&self, id: &CampaignId) -> Result<Option<Campaign>, RepositoryError> {
        Ok(self.campaigns.read().await.get(&id.0).cloned())
    }

    async fn save_campaign(&self, campaign: Campaign) -> Result<(), RepositoryError> {
        self.campaigns.write().await.insert(campaign.id.0.clone(), campaign);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryVoiceRepository {
    agents: RwLock<HashMap<String, VoiceAgent>>,
    communications: RwLock<Vec<VoiceCommunication>>,
}

#[async_trait::async_trait]
impl VoiceRepository for InMemoryVoiceRepository {
    async fn find_agent_for_negotiation(
        &self,
        id: &NegotiationId,
    ) -> Result<Option<VoiceAgent>, RepositoryError> {
        Ok(self.agents.read().await.get(&id.0).cloned())
    }

    async fn upsert_agent(&self, agent: VoiceAgent) -> Result<(), RepositoryError> {
        self.agents.write().await.insert(agent.negotiation_id.0.clone(), agent);
        Ok(())
    }

    async fn save_communication(
        &self,
        communication: VoiceCommunication,
    ) -> Result<(), RepositoryError> {
        self.communications.write().await.push(communication);
        Ok(())
    }

    async fn find_communication(
        &self,
        id: &VoiceCommunicationId,
    ) -> Result<Option<VoiceCommunication>, RepositoryError> {
        Ok(self.communications.read().await.iter().find(|comm| comm.id == *id).cloned())
    }

    async fn list_communications_for_negotiation(
        &self,
        id: &NegotiationId,
    ) -> Result<Vec<VoiceCommunication>, RepositoryError> {
        let mut calls: Vec<VoiceCommunication> = self
            .communications
            .read()
            .await
            .iter()
            .filter(|comm| comm.negotiation_id == *id)
            .cloned()
            .collect();
        calls.sort_by_key(|comm| comm.created_at);
        Ok(calls)
    }

    async fn record_call_result(
        &self,
        id: &VoiceCommunicationId,
        status: VoiceCallStatus,
        transcript: &[VoiceTranscriptMessage],
        call_duration_secs: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut communications = self.communications.write().await;
        let Some(communication) = communications.iter_mut().find(|comm| comm.id == *id) else {
            return Ok(false);
        };
        communication.status = status;
        communication.transcript = transcript.to_vec();
        communication.call_duration_secs = call_duration_secs;
        communication.updated_at = now;
        Ok(true)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TaskState {
    Pending,
    Claimed,
    Done,
}

struct FollowUpTask {
    state: TaskState,
    available_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemoryFollowUpQueue {
    tasks: RwLock<HashMap<String, FollowUpTask>>,
}

impl InMemoryFollowUpQueue {
    pub async fn pending_count(&self) -> usize {
        self.tasks
            .read()
            .await
            .values()
            .filter(|task| task.state == TaskState::Pending)
            .count()
    }
}

#[async_trait::async_trait]
impl FollowUpQueueRepository for InMemoryFollowUpQueue {
    async fn upsert_pending(
        &self,
        negotiation_id: &NegotiationId,
        available_at: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.tasks
            .write()
            .await
            .insert(negotiation_id.0.clone(), FollowUpTask { state: TaskState::Pending, available_at });
        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<NegotiationId>, RepositoryError> {
        let mut tasks = self.tasks.write().await;
        let mut claimed = Vec::new();
        for (negotiation_id, task) in tasks.iter_mut() {
            if claimed.len() >= limit as usize {
                break;
            }
            if task.state == TaskState::Pending && task.available_at <= now {
                task.state = TaskState::Claimed;
                claimed.push(NegotiationId(negotiation_id.clone()));
            }
        }
        Ok(claimed)
    }

    async fn claim_for_negotiation(
        &self,
        negotiation_id: &NegotiationId,
        _now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(&negotiation_id.0) else {
            return Ok(false);
        };
        if task.state != TaskState::Pending {
            return Ok(false);
        }
        task.state = TaskState::Claimed;
        Ok(true)
    }

    async fn mark_done(
        &self,
        negotiation_id: &NegotiationId,
        _now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if let Some(task) = self.tasks.write().await.get_mut(&negotiation_id.0) {
            if task.state == TaskState::Claimed {
                task.state = TaskState::Done;
            }
        }
        Ok(())
    }

    async fn cancel(
        &self,
        negotiation_id: &NegotiationId,
        _now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if let Some(task) = self.tasks.write().await.get_mut(&negotiation_id.0) {
            task.state = TaskState::Done;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl FollowUpScheduler for InMemoryFollowUpQueue {
    async fn schedule(
        &self,
        negotiation_id: &NegotiationId,
        delay: Duration,
    ) -> Result<(), SchedulerError> {
        let now = Utc::now();
        self.upsert_pending(negotiation_id, now + delay, now)
            .await
            .map_err(|error| SchedulerError::Enqueue(error.to_string()))
    }
}
