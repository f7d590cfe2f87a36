//! Polling worker for the SQL-backed follow-up queue: claims due tasks on an
//! interval and runs the same processing path as the HTTP task callback.

use std::time::Duration;

use chrono::Utc;
use parley_db::repositories::FollowUpQueueRepository;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::followup::process_claimed_follow_up;
use crate::state::AppState;

const CLAIM_BATCH: u32 = 10;

pub fn spawn_follow_up_worker(state: AppState, poll_interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let due = match state.followups.claim_due(Utc::now(), CLAIM_BATCH).await {
                Ok(due) => due,
                Err(claim_error) => {
                    error!(
                        event_name = "followup.worker.claim_failed",
                        error = %claim_error,
                        "could not claim due follow-up tasks"
                    );
                    continue;
                }
            };

            for negotiation_id in due {
                info!(
                    event_name = "followup.worker.firing",
                    negotiation_id = %negotiation_id.0,
                    "processing due follow-up task"
                );
                if let Err(process_error) =
                    process_claimed_follow_up(&state, &negotiation_id).await
                {
                    error!(
                        event_name = "followup.worker.process_failed",
                        negotiation_id = %negotiation_id.0,
                        error = %process_error.0,
                        "follow-up processing failed"
                    );
                }
            }
        }
    })
}
