//! Email-thread correlation: a negotiation is addressable over email without
//! a database round trip on the sending path, and the negotiation id is
//! recovered deterministically from the recipient address on the receiving
//! path.
//!
//! Outbound mail is sent from `<prefix>--<negotiationId>@<send domain>` with
//! the reply-to on a dedicated parse subdomain, so only reply traffic is
//! routed into the inbound webhook.

use regex::Regex;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::negotiation::NegotiationId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ThreadCodecError {
    #[error("empty address")]
    EmptyAddress,
    #[error("group or multi-recipient address is not accepted: `{0}`")]
    GroupAddress(String),
    #[error("malformed mailbox address: `{0}`")]
    MalformedAddress(String),
    #[error("recipient does not match the negotiation address pattern: `{0}`")]
    RecipientPattern(String),
}

/// A single parsed RFC 5322 mailbox (`Name <local@domain>` or bare
/// `local@domain`). Group addresses and address lists are rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mailbox {
    pub address: String,
    pub display_name: Option<String>,
}

pub fn parse_one_mailbox(raw: &str) -> Result<Mailbox, ThreadCodecError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ThreadCodecError::EmptyAddress);
    }

    let (display_name, address) = match (trimmed.rfind('<'), trimmed.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            if !trimmed[close + 1..].trim().is_empty() {
                return Err(ThreadCodecError::GroupAddress(trimmed.to_string()));
            }
            let name = trimmed[..open].trim().trim_matches('"').trim();
            if name.contains('<') || name.contains('>') {
                return Err(ThreadCodecError::GroupAddress(trimmed.to_string()));
            }
            let name = (!name.is_empty()).then(|| name.to_string());
            (name, trimmed[open + 1..close].trim())
        }
        (None, None) => (None, trimmed),
        _ => return Err(ThreadCodecError::MalformedAddress(trimmed.to_string())),
    };

    if address.contains(',') || address.contains(';') || address.contains(':') {
        return Err(ThreadCodecError::GroupAddress(trimmed.to_string()));
    }
    if address.chars().any(char::is_whitespace) {
        return Err(ThreadCodecError::MalformedAddress(trimmed.to_string()));
    }

    let mut parts = address.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && domain.contains('.') => {
            Ok(Mailbox { address: address.to_string(), display_name })
        }
        _ => Err(ThreadCodecError::MalformedAddress(trimmed.to_string())),
    }
}

/// Encodes negotiation identity into outbound addresses and decodes inbound
/// recipients back into a [`NegotiationId`].
#[derive(Clone, Debug)]
pub struct ThreadCodec {
    send_domain: String,
    parse_domain: String,
    recipient_pattern: Regex,
}

impl ThreadCodec {
    pub fn new(send_domain: impl Into<String>, parse_domain: impl Into<String>) -> Self {
        let send_domain = send_domain.into();
        let parse_domain = parse_domain.into();
        let recipient_pattern = Regex::new(&format!(
            "^(.+?)--([A-Za-z0-9_-]+)@{}$",
            regex::escape(&parse_domain)
        ))
        .expect("parse-domain recipient pattern is a valid regex");

        Self { send_domain, parse_domain, recipient_pattern }
    }

    pub fn send_domain(&self) -> &str {
        &self.send_domain
    }

    pub fn parse_domain(&self) -> &str {
        &self.parse_domain
    }

    /// Outbound `From` address: sanitized brand local part joined with the
    /// negotiation id. Collisions across brands sharing a sanitized prefix
    /// are acceptable because the negotiation id is the correlation key.
    pub fn encode_from_address(
        &self,
        brand_email: &str,
        negotiation_id: &NegotiationId,
    ) -> Result<String, ThreadCodecError> {
        let prefix = self.brand_prefix(brand_email)?;
        Ok(format!("{prefix}--{}@{}", negotiation_id.0, self.send_domain))
    }

    /// Same local part as [`Self::encode_from_address`], on the parse
    /// subdomain dedicated to inbound routing.
    pub fn encode_reply_to_address(
        &self,
        brand_email: &str,
        negotiation_id: &NegotiationId,
    ) -> Result<String, ThreadCodecError> {
        let prefix = self.brand_prefix(brand_email)?;
        Ok(format!("{prefix}--{}@{}", negotiation_id.0, self.parse_domain))
    }

    /// Recovers the negotiation id from an inbound `To` value. Fails closed
    /// on group addresses, foreign domains and malformed local parts.
    pub fn decode_recipient(&self, to: &str) -> Result<NegotiationId, ThreadCodecError> {
        let mailbox = parse_one_mailbox(to)?;
        let captures = self
            .recipient_pattern
            .captures(&mailbox.address)
            .ok_or_else(|| ThreadCodecError::RecipientPattern(mailbox.address.clone()))?;

        Ok(NegotiationId(captures[2].to_string()))
    }

    /// Fresh globally unique RFC 5322 `Message-ID`, bracket-wrapped.
    pub fn new_message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.send_domain)
    }

    fn brand_prefix(&self, brand_email: &str) -> Result<String, ThreadCodecError> {
        let local = brand_email
            .split('@')
            .next()
            .filter(|part| !part.is_empty())
            .ok_or_else(|| ThreadCodecError::MalformedAddress(brand_email.to_string()))?;

        let sanitized: String = local.chars().filter(char::is_ascii_alphanumeric).collect();
        if sanitized.is_empty() {
            return Err(ThreadCodecError::MalformedAddress(brand_email.to_string()));
        }
        Ok(sanitized)
    }
}

/// Appends the bracket-wrapped prior message id to a `References` chain.
/// Calling it twice with the same inputs leaves the chain unchanged: the id
/// is not appended again when it is already the chain's tail.
pub fn build_references(previous: Option<&str>, in_reply_to: Option<&str>) -> String {
    let cleaned_previous = previous.map(str::trim).unwrap_or_default();
    let wrapped_reply = in_reply_to
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(|id| format!("<{}>", id.trim_start_matches('<').trim_end_matches('>')));

    match wrapped_reply {
        Some(wrapped) if cleaned_previous.is_empty() => wrapped,
        Some(wrapped) if cleaned_previous.ends_with(&wrapped) => cleaned_previous.to_string(),
        Some(wrapped) => format!("{cleaned_previous} {wrapped}"),
        None => cleaned_previous.to_string(),
    }
}
