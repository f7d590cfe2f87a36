use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use parley_core::domain::negotiation::NegotiationId;
use parley_core::domain::party::{BrandId, CreatorId};
use parley_core::domain::voice::{
    VoiceAgent, VoiceAgentId, VoiceCallStatus, VoiceCommunication, VoiceCommunicationId,
    VoiceTranscriptMessage,
};

use super::negotiation::{parse_timestamp, parse_u32};
use super::{RepositoryError, VoiceRepository};
use crate::DbPool;

pub struct SqlVoiceRepository {
    pool: DbPool,
}

impl SqlVoiceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl VoiceRepository for SqlVoiceRepository {
    async fn find_agent_for_negotiation(
        &self,
        id: &NegotiationId,
    ) -> Result<Option<VoiceAgent>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, negotiation_id, brand_id, creator_id, provider_agent_id,
                    knowledge_base_id, knowledge_base_name, phone_number_id,
                    created_at, updated_at
             FROM voice_agent WHERE negotiation_id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(agent_from_row).transpose()
    }

    async fn upsert_agent(&self, agent: VoiceAgent) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO voice_agent (
                id, negotiation_id, brand_id, creator_id, provider_agent_id,
                knowledge_base_id, knowledge_base_name, phone_number_id,
                created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(negotiation_id) DO UPDATE SET
                provider_agent_id = excluded.provider_agent_id,
                knowledge_base_id = excluded.knowledge_base_id,
                knowledge_base_name = excluded.knowledge_base_name,
                phone_number_id = excluded.phone_number_id,
                updated_at = excluded.updated_at",
        )
        .bind(&agent.id.0)
        .bind(&agent.negotiation_id.0)
        .bind(&agent.brand_id.0)
        .bind(&agent.creator_id.0)
        .bind(&agent.provider_agent_id)
        .bind(&agent.knowledge_base_id)
        .bind(&agent.knowledge_base_name)
        .bind(&agent.phone_number_id)
        .bind(agent.created_at.to_rfc3339())
        .bind(agent.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_communication(
        &self,
        communication: VoiceCommunication,
    ) -> Result<(), RepositoryError> {
        let transcript_json = serde_json::to_string(&communication.transcript)
            .map_err(|error| RepositoryError::Decode(format!("transcript encode: {error}")))?;

        sqlx::query(
            "INSERT INTO voice_communication (
                id, negotiation_id, conversation_id, phone, status, transcript_json,
                call_duration_secs, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&communication.id.0)
        .bind(&communication.negotiation_id.0)
        .bind(&communication.conversation_id)
        .bind(&communication.phone)
        .bind(communication.status.as_str())
        .bind(transcript_json)
        .bind(i64::from(communication.call_duration_secs))
        .bind(communication.created_at.to_rfc3339())
        .bind(communication.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_communication(
        &self,
        id: &VoiceCommunicationId,
    ) -> Result<Option<VoiceCommunication>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, negotiation_id, conversation_id, phone, status, transcript_json,
                    call_duration_secs, created_at, updated_at
             FROM voice_communication WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(communication_from_row).transpose()
    }

    async fn list_communications_for_negotiation(
        &self,
        id: &NegotiationId,
    ) -> Result<Vec<VoiceCommunication>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, negotiation_id, conversation_id, phone, status, transcript_json,
                    call_duration_secs, created_at, updated_at
             FROM voice_communication
             WHERE negotiation_id = ?
             ORDER BY created_at ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(communication_from_row).collect()
    }

    async fn record_call_result(
        &self,
        id: &VoiceCommunicationId,
        status: VoiceCallStatus,
        transcript: &[VoiceTranscriptMessage],
        call_duration_secs: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let transcript_json = serde_json::to_string(transcript)
            .map_err(|error| RepositoryError::Decode(format!("transcript encode: {error}")))?;

        let result = sqlx::query(
            "UPDATE voice_communication
             SET status = ?, transcript_json = ?, call_duration_secs = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(transcript_json)
        .bind(i64::from(call_duration_secs))
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn agent_from_row(row: SqliteRow) -> Result<VoiceAgent, RepositoryError> {
    Ok(VoiceAgent {
        id: VoiceAgentId(row.try_get("id")?),
        negotiation_id: NegotiationId(row.try_get("negotiation_id")?),
        brand_id: BrandId(row.try_get("brand_id")?),
        creator_id: CreatorId(row.try_get("creator_id")?),
        provider_agent_id: row.try_get("provider_agent_id")?,
        knowledge_base_id: row.try_get("knowledge_base_id")?,
        knowledge_base_name: row.try_get("knowledge_base_name")?,
        phone_number_id: row.try_get("phone_number_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn communication_from_row(row: SqliteRow) -> Result<VoiceCommunication, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = VoiceCallStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown call status `{status_raw}`")))?;

    let transcript_raw = row.try_get::<String, _>("transcript_json")?;
    let transcript: Vec<VoiceTranscriptMessage> = serde_json::from_str(&transcript_raw)
        .map_err(|error| RepositoryError::Decode(format!("transcript decode: {error}")))?;

    Ok(VoiceCommunication {
        id: VoiceCommunicationId(row.try_get("id")?),
        negotiation_id: NegotiationId(row.try_get("negotiation_id")?),
        conversation_id: row.try_get("conversation_id")?,
        phone: row.try_get("phone")?,
        status,
        transcript,
        call_duration_secs: parse_u32("call_duration_secs", row.try_get("call_duration_secs")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
