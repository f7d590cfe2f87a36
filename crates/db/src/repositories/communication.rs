use sqlx::{sqlite::SqliteRow, Row};

use parley_core::domain::communication::{
    Communication, CommunicationId, CommunicationStatus, CommunicationType, Direction,
};
use parley_core::domain::negotiation::NegotiationId;

use super::negotiation::{parse_timestamp, parse_u32};
use super::{CommunicationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCommunicationRepository {
    pool: DbPool,
}

impl SqlCommunicationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(
        &self,
        communication: &Communication,
        ignore_duplicate: bool,
    ) -> Result<bool, RepositoryError> {
        let conflict_clause = if ignore_duplicate { " ON CONFLICT DO NOTHING" } else { "" };
        let result = sqlx::query(&format!(
            "INSERT INTO communication (
                id,
                negotiation_id,
                direction,
                kind,
                status,
                subject,
                content,
                message_id,
                message_references,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?){conflict_clause}"
        ))
        .bind(&communication.id.0)
        .bind(&communication.negotiation_id.0)
        .bind(communication.direction.as_str())
        .bind(communication.kind.as_str())
        .bind(communication.status.as_str())
        .bind(&communication.subject)
        .bind(&communication.content)
        .bind(communication.message_id.as_deref())
        .bind(communication.references.as_deref())
        .bind(communication.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait::async_trait]
impl CommunicationRepository for SqlCommunicationRepository {
    async fn append(&self, communication: Communication) -> Result<(), RepositoryError> {
        self.insert(&communication, false).await?;
        Ok(())
    }

    async fn append_if_new(&self, communication: Communication) -> Result<bool, RepositoryError> {
        self.insert(&communication, true).await
    }

    async fn list_for_negotiation(
        &self,
        id: &NegotiationId,
    ) -> Result<Vec<Communication>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                negotiation_id,
                direction,
                kind,
                status,
                subject,
                content,
                message_id,
                message_references,
                created_at
             FROM communication
             WHERE negotiation_id = ?
             ORDER BY created_at ASC, seq ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(communication_from_row).collect()
    }

    async fn has_inbound_reply(&self, id: &NegotiationId) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM communication
             WHERE negotiation_id = ? AND direction = 'inbound' AND status = 'replied'",
        )
        .bind(&id.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn outbound_email_count(&self, id: &NegotiationId) -> Result<u32, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM communication
             WHERE negotiation_id = ? AND direction = 'outbound' AND kind = 'email'",
        )
        .bind(&id.0)
        .fetch_one(&self.pool)
        .await?;

        parse_u32("outbound_email_count", count)
    }

    async fn latest_outbound_email(
        &self,
        id: &NegotiationId,
    ) -> Result<Option<Communication>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                negotiation_id,
                direction,
                kind,
                status,
                subject,
                content,
                message_id,
                message_references,
                created_at
             FROM communication
             WHERE negotiation_id = ? AND direction = 'outbound' AND kind = 'email'
             ORDER BY created_at DESC, seq DESC
             LIMIT 1",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(communication_from_row).transpose()
    }
}

fn communication_from_row(row: SqliteRow) -> Result<Communication, RepositoryError> {
    let direction_raw = row.try_get::<String, _>("direction")?;
    let direction = Direction::parse(&direction_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown communication direction `{direction_raw}`"))
    })?;

    let kind_raw = row.try_get::<String, _>("kind")?;
    let kind = CommunicationType::parse(&kind_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown communication kind `{kind_raw}`"))
    })?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = CommunicationStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown communication status `{status_raw}`"))
    })?;

    Ok(Communication {
        id: CommunicationId(row.try_get("id")?),
        negotiation_id: NegotiationId(row.try_get("negotiation_id")?),
        direction,
        kind,
        status,
        subject: row.try_get("subject")?,
        content: row.try_get("content")?,
        message_id: row.try_get("message_id")?,
        references: row.try_get("message_references")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
