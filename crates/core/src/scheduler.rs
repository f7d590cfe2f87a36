use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;

use crate::domain::negotiation::NegotiationId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("failed to enqueue follow-up task: {0}")]
    Enqueue(String),
}

/// One-shot delayed callback keyed by negotiation id, at-least-once
/// delivery. Scheduling again for the same negotiation replaces the pending
/// task, so at most one follow-up is ever outstanding. The consumer re-reads
/// negotiation state when the task fires and never trusts captured state.
#[async_trait]
pub trait FollowUpScheduler: Send + Sync {
    async fn schedule(
        &self,
        negotiation_id: &NegotiationId,
        delay: Duration,
    ) -> Result<(), SchedulerError>;
}
