//! Email content synthesis boundary. Content generation is delegated to an
//! external collaborator (an LLM-backed composer in production); the engine
//! only depends on this contract.

use async_trait::async_trait;
use thiserror::Error;

use crate::classifier::EmailMessage;
use crate::domain::party::{Brand, Campaign, Creator};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailDraft {
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("composer provider failure: {0}")]
    Provider(String),
    #[error("composer returned no usable content")]
    EmptyOutput,
}

#[async_trait]
pub trait EmailComposer: Send + Sync {
    /// Drafts the first cold outreach email for a campaign.
    async fn initial_offer(
        &self,
        brand: &Brand,
        creator: &Creator,
        campaign: &Campaign,
    ) -> Result<EmailDraft, ComposeError>;

    /// Drafts the next message in an ongoing thread from the full ordered
    /// history.
    async fn follow_up(
        &self,
        brand: &Brand,
        creator: &Creator,
        campaign: &Campaign,
        history: &[EmailMessage],
    ) -> Result<EmailDraft, ComposeError>;
}
