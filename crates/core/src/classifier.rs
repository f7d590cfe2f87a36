//! Reply-classification boundary. The generative model is consumed, never
//! implemented, here: its loosely-typed JSON output is wrapped into a closed
//! tagged union at this seam, and anything that does not parse into one of
//! the known intents is an error rather than a default action.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::negotiation::Negotiation;
use crate::domain::party::{Brand, Creator};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailSender {
    Brand,
    Creator,
}

impl EmailSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brand => "brand",
            Self::Creator => "creator",
        }
    }
}

/// One email in the negotiation transcript, ordered oldest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub sender: EmailSender,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyIntent {
    RequestPhone,
    InitiateCall,
    Accepted,
    Cancelled,
    Escalate,
}

impl ReplyIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestPhone => "request_phone",
            Self::InitiateCall => "initiate_call",
            Self::Accepted => "accepted",
            Self::Cancelled => "cancelled",
            Self::Escalate => "escalate",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "request_phone" => Some(Self::RequestPhone),
            "initiate_call" => Some(Self::InitiateCall),
            "accepted" => Some(Self::Accepted),
            "cancelled" => Some(Self::Cancelled),
            "escalate" => Some(Self::Escalate),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyAnalysis {
    pub intent: ReplyIntent,
    pub notes: String,
    pub phone_number: Option<String>,
    pub call_script: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("classifier provider failure: {0}")]
    Provider(String),
    #[error("classifier returned empty output")]
    EmptyOutput,
    #[error("classifier output is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("classifier output violates the reply schema: {0}")]
    InvalidSchema(String),
}

pub struct ClassifierContext<'a> {
    pub transcript: &'a [EmailMessage],
    pub negotiation: &'a Negotiation,
    pub creator: &'a Creator,
    pub brand: &'a Brand,
}

#[async_trait]
pub trait ReplyClassifier: Send + Sync {
    async fn classify(&self, ctx: ClassifierContext<'_>) -> Result<ReplyAnalysis, ClassifierError>;
}

#[derive(Debug, Deserialize)]
struct RawReplyAnalysis {
    action: String,
    #[serde(default)]
    notes: String,
    #[serde(default, alias = "phoneNumber")]
    phone_number: Option<String>,
    #[serde(default, alias = "callScript")]
    call_script: Option<String>,
}

/// Strict decode of the model's JSON reply. Empty strings for the optional
/// fields collapse to `None`; an unknown `action` value is a schema error.
pub fn parse_reply_analysis(raw: &str) -> Result<ReplyAnalysis, ClassifierError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ClassifierError::EmptyOutput);
    }

    let parsed: RawReplyAnalysis = serde_json::from_str(trimmed)
        .map_err(|error| ClassifierError::InvalidJson(error.to_string()))?;

    let intent = ReplyIntent::parse(&parsed.action).ok_or_else(|| {
        ClassifierError::InvalidSchema(format!("unknown action `{}`", parsed.action))
    })?;

    Ok(ReplyAnalysis {
        intent,
        notes: parsed.notes,
        phone_number: parsed.phone_number.filter(|value| !value.trim().is_empty()),
        call_script: parsed.call_script.filter(|value| !value.trim().is_empty()),
    })
}
