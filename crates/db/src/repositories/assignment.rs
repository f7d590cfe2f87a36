use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use chrono::{DateTime, Utc};
use parley_core::domain::assignment::{AssignmentId, CreatorAssignment};
use parley_core::domain::party::{BrandId, CampaignId, CreatorId};

use super::negotiation::parse_timestamp;
use super::{AssignmentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAssignmentRepository {
    pool: DbPool,
}

impl SqlAssignmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AssignmentRepository for SqlAssignmentRepository {
    async fn find(
        &self,
        brand_id: &BrandId,
        creator_id: &CreatorId,
    ) -> Result<Option<CreatorAssignment>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, brand_id, creator_id, phone_discovered, phone, created_at, updated_at
             FROM creator_assignment
             WHERE brand_id = ? AND creator_id = ?",
        )
        .bind(&brand_id.0)
        .bind(&creator_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut assignment = assignment_from_row(row)?;

        let campaign_ids: Vec<String> = sqlx::query_scalar(
            "SELECT campaign_id FROM assignment_campaign
             WHERE assignment_id = ?
             ORDER BY added_at ASC, campaign_id ASC",
        )
        .bind(&assignment.id.0)
        .fetch_all(&self.pool)
        .await?;

        assignment.campaign_ids = campaign_ids.into_iter().map(CampaignId).collect();
        Ok(Some(assignment))
    }

    async fn is_assigned(
        &self,
        brand_id: &BrandId,
        creator_id: &CreatorId,
        campaign_id: &CampaignId,
    ) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)
             FROM assignment_campaign ac
             JOIN creator_assignment ca ON ca.id = ac.assignment_id
             WHERE ca.brand_id = ? AND ca.creator_id = ? AND ac.campaign_id = ?",
        )
        .bind(&brand_id.0)
        .bind(&creator_id.0)
        .bind(&campaign_id.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn assign(
        &self,
        brand_id: &BrandId,
        creator_id: &CreatorId,
        campaign_id: &CampaignId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        // Two idempotent inserts instead of read-modify-write: concurrent
        // assigns for the same key cannot lose a campaign membership.
        sqlx::query(
            "INSERT INTO creator_assignment (
                id, brand_id, creator_id, phone_discovered, phone, created_at, updated_at
             ) VALUES (?, ?, ?, 0, NULL, ?, ?)
             ON CONFLICT(brand_id, creator_id) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&brand_id.0)
        .bind(&creator_id.0)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let inserted = sqlx::query(
            "INSERT INTO assignment_campaign (assignment_id, campaign_id, added_at)
             SELECT id, ?, ? FROM creator_assignment WHERE brand_id = ? AND creator_id = ?
             ON CONFLICT(assignment_id, campaign_id) DO NOTHING",
        )
        .bind(&campaign_id.0)
        .bind(now.to_rfc3339())
        .bind(&brand_id.0)
        .bind(&creator_id.0)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            sqlx::query(
                "UPDATE creator_assignment SET updated_at = ? WHERE brand_id = ? AND creator_id = ?",
            )
            .bind(now.to_rfc3339())
            .bind(&brand_id.0)
            .bind(&creator_id.0)
            .execute(&self.pool)
            .await?;
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
        let result = sqlx::query(
            "UPDATE creator_assignment
             SET phone = ?, phone_discovered = 1, updated_at = ?
             WHERE brand_id = ? AND creator_id = ?",
        )
        .bind(phone)
        .bind(now.to_rfc3339())
        .bind(&brand_id.0)
        .bind(&creator_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn assignment_from_row(row: SqliteRow) -> Result<CreatorAssignment, RepositoryError> {
    Ok(CreatorAssignment {
        id: AssignmentId(row.try_get("id")?),
        brand_id: BrandId(row.try_get("brand_id")?),
        creator_id: CreatorId(row.try_get("creator_id")?),
        campaign_ids: Vec::new(),
        phone_discovered: row.try_get::<i64, _>("phone_discovered")? != 0,
        phone: row.try_get("phone")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
