use std::sync::Arc;

use axum::{routing::post, Router};
use thiserror::Error;
use tracing::info;

use parley_agent::{HttpLlmClient, LlmEmailComposer, LlmReplyClassifier};
use parley_core::config::{AppConfig, ConfigError, LoadOptions};
use parley_core::engine::NegotiationMachine;
use parley_core::thread::ThreadCodec;
use parley_db::repositories::{
    SqlAssignmentRepository, SqlCommunicationRepository, SqlFollowUpQueue,
    SqlNegotiationRepository, SqlPartyRepository, SqlVoiceRepository,
};
use parley_db::{connect_with_settings, migrations, DbPool};
use parley_mail::{HttpBrandNotifier, HttpEmailTransport};
use parley_voice::{ChannelHandoff, HttpVoiceGateway, TranscriptPoller};

use crate::state::AppState;
use crate::{calls, followup, health, inbound, outreach};

const TRANSCRIPT_POLL_ATTEMPTS: u32 = 10;
const TRANSCRIPT_POLL_DELAY_SECS: u64 = 6;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
    pub poller: Arc<TranscriptPoller>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("integration setup failed: {0}")]
    Integration(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let llm = Arc::new(
        HttpLlmClient::from_config(&config.llm)
            .map_err(|error| BootstrapError::Integration(error.to_string()))?,
    );
    let transport = Arc::new(
        HttpEmailTransport::from_config(&config.email)
            .map_err(|error| BootstrapError::Integration(error.to_string()))?,
    );
    let gateway = Arc::new(
        HttpVoiceGateway::from_config(&config.voice)
            .map_err(|error| BootstrapError::Integration(error.to_string()))?,
    );
    let notifier = if config.notify.enabled {
        Some(Arc::new(
            HttpBrandNotifier::from_config(&config.notify)
                .map_err(|error| BootstrapError::Integration(error.to_string()))?,
        ) as Arc<dyn parley_mail::BrandNotifier>)
    } else {
        None
    };

    let negotiations = Arc::new(SqlNegotiationRepository::new(db_pool.clone()));
    let communications = Arc::new(SqlCommunicationRepository::new(db_pool.clone()));
    let assignments = Arc::new(SqlAssignmentRepository::new(db_pool.clone()));
    let parties = Arc::new(SqlPartyRepository::new(db_pool.clone()));
    let followups = Arc::new(SqlFollowUpQueue::new(db_pool.clone()));
    let voice = Arc::new(SqlVoiceRepository::new(db_pool.clone()));

    let handoff = Arc::new(ChannelHandoff::new(
        negotiations.clone(),
        parties.clone(),
        communications.clone(),
        voice.clone(),
        gateway.clone(),
        config.voice.agent_phone_number_id.clone(),
    ));
    let poller = Arc::new(TranscriptPoller::new(
        voice,
        negotiations.clone(),
        gateway,
        TRANSCRIPT_POLL_ATTEMPTS,
        std::time::Duration::from_secs(TRANSCRIPT_POLL_DELAY_SECS),
    ));

    let state = AppState {
        negotiations,
        communications,
        assignments,
        parties,
        followups: followups.clone(),
        scheduler: followups,
        classifier: Arc::new(LlmReplyClassifier::new(llm.clone())),
        composer: Arc::new(LlmEmailComposer::new(llm)),
        transport,
        notifier,
        handoff,
        codec: ThreadCodec::new(
            config.email.send_domain.clone(),
            config.email.parse_domain.clone(),
        ),
        machine: Arc::new(NegotiationMachine::new(
            config.negotiation.policy(),
            config.scheduler.max_follow_ups,
        )),
        sender_label: config.email.sender_label.clone(),
        follow_up_delay: chrono::Duration::seconds(config.scheduler.follow_up_delay_secs),
    };

    Ok(Application { config, db_pool, state, poller })
}

pub fn api_router(app: &Application) -> Router {
    Router::new()
        .route("/api/v1/inbound-email", post(inbound::handle_inbound_email))
        .route("/api/v1/tasks/follow-up", post(followup::handle_follow_up))
        .route("/api/v1/calls/start", post(calls::handle_start_call))
        .route("/api/v1/outreach", post(outreach::handle_outreach))
        .with_state(app.state.clone())
        .merge(
            Router::new()
                .route(
                    "/api/v1/tasks/poll-transcription",
                    post(calls::handle_poll_transcription),
                )
                .with_state(app.poller.clone()),
        )
        .merge(health::router(app.db_pool.clone()))
}

#[cfg(test)]
mod tests {
    use parley_core::config::{ConfigOverrides, LoadOptions};

    use super::{api_router, bootstrap};

    #[tokio::test]
    async fn bootstrap_brings_up_schema_and_state() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with defaults plus an in-memory database");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('negotiation', 'communication', 'followup_task')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected foundation tables to be available after bootstrap");
        assert_eq!(table_count, 3, "bootstrap should expose the baseline negotiation tables");

        let _router = api_router(&app);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn inbound_route_rejects_a_malformed_recipient_with_400() {
        use axum::body::Body;
        use axum::http::{header, Method, Request, StatusCode};
        use tower::util::ServiceExt;

        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap");

        let router = api_router(&app);
        let payload = serde_json::json!({
            "from": "jane@example.com",
            "to": "not-a-negotiation-address",
            "subject": "Re: hello",
            "text": "hi",
        });

        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/inbound-email")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request builds"),
            )
            .await
            .expect("router responds");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_rejects_a_non_sqlite_database_url() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://localhost/parley".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err(), "non-sqlite urls must fail config validation");
    }
}
