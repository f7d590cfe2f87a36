use chrono::{DateTime, Duration, Utc};
use sqlx::Row;

use parley_core::domain::negotiation::NegotiationId;
use parley_core::scheduler::{FollowUpScheduler, SchedulerError};

use super::{FollowUpQueueRepository, RepositoryError};
use crate::DbPool;

/// SQL-backed follow-up queue. One row per negotiation keeps at most one
/// follow-up outstanding; every state change is a guarded single-statement
/// update so concurrent firings cannot double-process a task.
#[derive(Clone)]
pub struct SqlFollowUpQueue {
    pool: DbPool,
}

impl SqlFollowUpQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl FollowUpQueueRepository for SqlFollowUpQueue {
    async fn upsert_pending(
        &self,
        negotiation_id: &NegotiationId,
        available_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO followup_task (
                negotiation_id, state, available_at, claimed_at, completed_at,
                created_at, updated_at
             ) VALUES (?, 'pending', ?, NULL, NULL, ?, ?)
             ON CONFLICT(negotiation_id) DO UPDATE SET
                state = 'pending',
                available_at = excluded.available_at,
                claimed_at = NULL,
                completed_at = NULL,
                updated_at = excluded.updated_at",
        )
        .bind(&negotiation_id.0)
        .bind(available_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<NegotiationId>, RepositoryError> {
        let rows = sqlx::query(
            "UPDATE followup_task
             SET state = 'claimed', claimed_at = ?, updated_at = ?
             WHERE negotiation_id IN (
                SELECT negotiation_id FROM followup_task
                WHERE state = 'pending' AND available_at <= ?
                ORDER BY available_at ASC
                LIMIT ?
             ) AND state = 'pending'
             RETURNING negotiation_id",
        )
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Ok(NegotiationId(row.try_get("negotiation_id")?)))
            .collect()
    }

    async fn claim_for_negotiation(
        &self,
        negotiation_id: &NegotiationId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE followup_task
             SET state = 'claimed', claimed_at = ?, updated_at = ?
             WHERE negotiation_id = ? AND state = 'pending'",
        )
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(&negotiation_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_done(
        &self,
        negotiation_id: &NegotiationId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE followup_task
             SET state = 'done', completed_at = ?, updated_at = ?
             WHERE negotiation_id = ? AND state = 'claimed'",
        )
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(&negotiation_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn cancel(
        &self,
        negotiation_id: &NegotiationId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE followup_task
             SET state = 'done', completed_at = ?, updated_at = ?
             WHERE negotiation_id = ? AND state IN ('pending', 'claimed')",
        )
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(&negotiation_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl FollowUpScheduler for SqlFollowUpQueue {
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
