use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use parley_core::domain::negotiation::{Negotiation, NegotiationId, NegotiationStatus};
use parley_core::domain::party::{BrandId, CampaignId, CreatorId};

use super::{NegotiationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlNegotiationRepository {
    pool: DbPool,
}

impl SqlNegotiationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SELECT_NEGOTIATION: &str = "SELECT
        id,
        campaign_id,
        brand_id,
        creator_id,
        status,
        escalation_count,
        ai_agent_notes,
        phone_contact_attempted,
        voice_call_completed,
        created_at,
        updated_at
     FROM negotiation";

#[async_trait::async_trait]
impl NegotiationRepository for SqlNegotiationRepository {
    async fn find_by_id(&self, id: &NegotiationId) -> Result<Option<Negotiation>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_NEGOTIATION} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(negotiation_from_row).transpose()
    }

    async fn create(&self, negotiation: Negotiation) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO negotiation (
                id,
                campaign_id,
                brand_id,
                creator_id,
                status,
                escalation_count,
                ai_agent_notes,
                phone_contact_attempted,
                voice_call_completed,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&negotiation.id.0)
        .bind(&negotiation.campaign_id.0)
        .bind(&negotiation.brand_id.0)
        .bind(&negotiation.creator_id.0)
        .bind(negotiation.status.as_str())
        .bind(i64::from(negotiation.escalation_count))
        .bind(&negotiation.ai_agent_notes)
        .bind(i64::from(negotiation.phone_contact_attempted))
        .bind(i64::from(negotiation.voice_call_completed))
        .bind(negotiation.created_at.to_rfc3339())
        .bind(negotiation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

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
        // Single guarded update: a concurrent event that already drove the
        // negotiation terminal wins, and escalation_count only ever grows.
        let result = sqlx::query(
            "UPDATE negotiation SET
                status = ?,
                ai_agent_notes = COALESCE(?, ai_agent_notes),
                escalation_count = escalation_count + ?,
                updated_at = ?
             WHERE id = ? AND status NOT IN ('accepted', 'cancelled', 'paused')",
        )
        .bind(to.as_str())
        .bind(notes)
        .bind(i64::from(escalation_increment))
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn touch(&self, id: &NegotiationId, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE negotiation SET updated_at = ? WHERE id = ?")
            .bind(now.to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_phone_contact_attempted(
        &self,
        id: &NegotiationId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE negotiation SET phone_contact_attempted = 1, updated_at = ? WHERE id = ?",
        )
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_voice_call_completed(
        &self,
        id: &NegotiationId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE negotiation SET voice_call_completed = 1, updated_at = ? WHERE id = ?",
        )
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn negotiation_from_row(row: SqliteRow) -> Result<Negotiation, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = NegotiationStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown negotiation status `{status_raw}`"))
    })?;

    Ok(Negotiation {
        id: NegotiationId(row.try_get("id")?),
        campaign_id: CampaignId(row.try_get("campaign_id")?),
        brand_id: BrandId(row.try_get("brand_id")?),
        creator_id: CreatorId(row.try_get("creator_id")?),
        status,
        escalation_count: parse_u32("escalation_count", row.try_get("escalation_count")?)?,
        ai_agent_notes: row.try_get("ai_agent_notes")?,
        phone_contact_attempted: row.try_get::<i64, _>("phone_contact_attempted")? != 0,
        voice_call_completed: row.try_get::<i64, _>("voice_call_completed")? != 0,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use parley_core::domain::negotiation::{Negotiation, NegotiationId, NegotiationStatus};
    use parley_core::domain::party::{BrandId, CampaignId, CreatorId};

    use super::SqlNegotiationRepository;
    use crate::repositories::NegotiationRepository;
    use crate::test_support::{seed_parties, setup_pool};

    fn sample_negotiation(id: &str) -> Negotiation {
        let now = Utc::now();
        Negotiation {
            id: NegotiationId(id.to_string()),
            campaign_id: CampaignId("camp-1".to_string()),
            brand_id: BrandId("brand-1".to_string()),
            creator_id: CreatorId("creator-1".to_string()),
            status: NegotiationStatus::Initiated,
            escalation_count: 0,
            ai_agent_notes: String::new(),
            phone_contact_attempted: false,
            voice_call_completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_and_find_round_trip() {
        let pool = setup_pool().await;
        seed_parties(&pool).await;
        let repo = SqlNegotiationRepository::new(pool.clone());

        let negotiation = sample_negotiation("n-round-trip");
        repo.create(negotiation.clone()).await.expect("create");

        let found = repo.find_by_id(&negotiation.id).await.expect("find").expect("exists");
        assert_eq!(found.id, negotiation.id);
        assert_eq!(found.status, NegotiationStatus::Initiated);
        assert_eq!(found.escalation_count, 0);

        pool.close().await;
    }

    #[tokio::test]
    async fn transition_updates_status_notes_and_escalation() {
        let pool = setup_pool().await;
        seed_parties(&pool).await;
        let repo = SqlNegotiationRepository::new(pool.clone());

        let negotiation = sample_negotiation("n-transition");
        repo.create(negotiation.clone()).await.expect("create");

        let later = Utc::now() + Duration::seconds(5);
        let applied = repo
            .apply_transition(
                &negotiation.id,
                NegotiationStatus::RequestPhone,
                Some("asked for a number"),
                1,
                later,
            )
            .await
            .expect("transition");
        assert!(applied);

        let found = repo.find_by_id(&negotiation.id).await.expect("find").expect("exists");
        assert_eq!(found.status, NegotiationStatus::RequestPhone);
        assert_eq!(found.escalation_count, 1);
        assert_eq!(found.ai_agent_notes, "asked for a number");
        assert!(found.updated_at >= found.created_at);

        pool.close().await;
    }

    #[tokio::test]
    async fn transition_is_refused_once_the_negotiation_is_terminal() {
        let pool = setup_pool().await;
        seed_parties(&pool).await;
        let repo = SqlNegotiationRepository::new(pool.clone());

        let negotiation = sample_negotiation("n-terminal");
        repo.create(negotiation.clone()).await.expect("create");

        let now = Utc::now();
        assert!(repo
            .apply_transition(&negotiation.id, NegotiationStatus::Accepted, None, 1, now)
            .await
            .expect("accept"));

        let applied = repo
            .apply_transition(&negotiation.id, NegotiationStatus::Escalate, Some("late"), 1, now)
            .await
            .expect("stale transition");
        assert!(!applied, "terminal negotiations must refuse further transitions");

        let found = repo.find_by_id(&negotiation.id).await.expect("find").expect("exists");
        assert_eq!(found.status, NegotiationStatus::Accepted);
        assert_eq!(found.escalation_count, 1);

        pool.close().await;
    }
}
