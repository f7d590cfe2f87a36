use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use parley_core::domain::assignment::CreatorAssignment;
use parley_core::domain::communication::Communication;
use parley_core::domain::negotiation::{Negotiation, NegotiationId, NegotiationStatus};
use parley_core::domain::party::{Brand, BrandId, Campaign, CampaignId, Creator, CreatorId};
use parley_core::domain::voice::{
    VoiceAgent, VoiceCallStatus, VoiceCommunication, VoiceCommunicationId, VoiceTranscriptMessage,
};

pub mod assignment;
pub mod communication;
pub mod followup;
pub mod memory;
pub mod negotiation;
pub mod party;
pub mod voice;

pub use assignment::SqlAssignmentRepository;
pub use communication::SqlCommunicationRepository;
pub use followup::SqlFollowUpQueue;
pub use memory::{
    InMemoryAssignmentRepository, InMemoryCommunicationRepository, InMemoryFollowUpQueue,
    InMemoryNegotiationRepository, InMemoryPartyRepository, InMemoryVoiceRepository,
};
pub use negotiation::SqlNegotiationRepository;
pub use party::SqlPartyRepository;
pub use voice::SqlVoiceRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for parley_core::errors::OrchestrationError {
    fn from(error: RepositoryError) -> Self {
        Self::Persistence(error.to_string())
    }
}

#[async_trait]
pub trait NegotiationRepository: Send + Sync {
    async fn find_by_id(&self, id: &NegotiationId) -> Result<Option<Negotiation>, RepositoryError>;

    async fn create(&self, negotiation: Negotiation) -> Result<(), RepositoryError>;

    /// Atomically applies a transition outcome: status, notes, and an
    /// increment-only escalation bump, guarded on the negotiation not having
    /// reached a terminal status concurrently. Returns whether the update
    /// was applied.
    async fn apply_transition(
        &self,
        id: &NegotiationId,
        to: NegotiationStatus,
        notes: Option<&str>,
        escalation_increment: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Bumps `updated_at` only (outbound send recorded, no status change).
    async fn touch(&self, id: &NegotiationId, now: DateTime<Utc>) -> Result<(), RepositoryError>;

    async fn mark_phone_contact_attempted(
        &self,
        id: &NegotiationId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn mark_voice_call_completed(
        &self,
        id: &NegotiationId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait CommunicationRepository: Send + Sync {
    /// Appends an outbound log entry. Communications are immutable once
    /// written.
    async fn append(&self, communication: Communication) -> Result<(), RepositoryError>;

    /// Appends an inbound entry unless one with the same channel-native
    /// message id already exists for the negotiation. Returns whether a row
    /// was written, making webhook redelivery idempotent.
    async fn append_if_new(&self, communication: Communication) -> Result<bool, RepositoryError>;

    /// Full transcript ordered by `created_at` ascending with insertion
    /// order as the tie-break.
    async fn list_for_negotiation(
        &self,
        id: &NegotiationId,
    ) -> Result<Vec<Communication>, RepositoryError>;

    async fn has_inbound_reply(&self, id: &NegotiationId) -> Result<bool, RepositoryError>;

    async fn outbound_email_count(&self, id: &NegotiationId) -> Result<u32, RepositoryError>;

    async fn latest_outbound_email(
        &self,
        id: &NegotiationId,
    ) -> Result<Option<Communication>, RepositoryError>;
}

#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn find(
        &self,
        brand_id: &BrandId,
        creator_id: &CreatorId,
    ) -> Result<Option<CreatorAssignment>, RepositoryError>;

    async fn is_assigned(
        &self,
        brand_id: &BrandId,
        creator_id: &CreatorId,
        campaign_id: &CampaignId,
    ) -> Result<bool, RepositoryError>;

    /// Adds the campaign to the (brand, creator) ledger entry, creating the
    /// entry first when absent. Safe under concurrent calls for the same
    /// key; a campaign id lands in the set at most once.
    async fn assign(
        &self,
        brand_id: &BrandId,
        creator_id: &CreatorId,
        campaign_id: &CampaignId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Records a normalized discovered phone. Returns whether a ledger entry
    /// existed to update.
    async fn record_phone_discovery(
        &self,
        brand_id: &BrandId,
        creator_id: &CreatorId,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait PartyRepository: Send + Sync {
    async fn find_brand(&self, id: &BrandId) -> Result<Option<Brand>, RepositoryError>;
    async fn save_brand(&self, brand: Brand) -> Result<(), RepositoryError>;

    async fn find_creator(&self, id: &CreatorId) -> Result<Option<Creator>, RepositoryError>;
    async fn save_creator(&self, creator: Creator) -> Result<(), RepositoryError>;

    async fn find_campaign(&self, id: &CampaignId) -> Result<Option<Campaign>, RepositoryError>;
    async fn save_campaign(&self, campaign: Campaign) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait VoiceRepository: Send + Sync {
    async fn find_agent_for_negotiation(
        &self,
        id: &NegotiationId,
    ) -> Result<Option<VoiceAgent>, RepositoryError>;

    /// Creates or replaces the one agent a negotiation may own.
    async fn upsert_agent(&self, agent: VoiceAgent) -> Result<(), RepositoryError>;

    async fn save_communication(
        &self,
        communication: VoiceCommunication,
    ) -> Result<(), RepositoryError>;

    async fn find_communication(
        &self,
        id: &VoiceCommunicationId,
    ) -> Result<Option<VoiceCommunication>, RepositoryError>;

    async fn list_communications_for_negotiation(
        &self,
        id: &NegotiationId,
    ) -> Result<Vec<VoiceCommunication>, RepositoryError>;

    /// Fills in the polled call result. The only mutation a voice
    /// communication ever sees.
    async fn record_call_result(
        &self,
        id: &VoiceCommunicationId,
        status: VoiceCallStatus,
        transcript: &[VoiceTranscriptMessage],
        call_duration_secs: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

/// Persistence side of the follow-up scheduler: one task row per
/// negotiation, claimed with a compare-and-set before processing.
#[async_trait]
pub trait FollowUpQueueRepository: Send + Sync {
    /// Arms (or re-arms) the single pending task for a negotiation.
    async fn upsert_pending(
        &self,
        negotiation_id: &NegotiationId,
        available_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Claims every due pending task, transitioning `pending` → `claimed`.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<NegotiationId>, RepositoryError>;

    /// Claims the pending task for one negotiation regardless of due time
    /// (external queue callback path). Returns false when no pending task
    /// exists, which makes duplicate delivery a no-op.
    async fn claim_for_negotiation(
        &self,
        negotiation_id: &NegotiationId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn mark_done(
        &self,
        negotiation_id: &NegotiationId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Drops any pending or claimed task; terminal negotiations schedule
    /// nothing further.
    async fn cancel(
        &self,
        negotiation_id: &NegotiationId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}
