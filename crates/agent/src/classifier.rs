//! LLM-backed reply classification. The model's answer is wrapped into the
//! closed intent union at this boundary; anything unparseable is surfaced as
//! a [`ClassifierError`] so the inbound webhook fails and the provider
//! redelivers.

use async_trait::async_trait;
use tracing::debug;

use parley_core::classifier::{
    parse_reply_analysis, ClassifierContext, ClassifierError, EmailMessage, EmailSender,
    ReplyAnalysis, ReplyClassifier,
};

use crate::llm::{ChatMessage, ChatRequest, LlmClient};

pub struct LlmReplyClassifier<C> {
    client: C,
}

impl<C> LlmReplyClassifier<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

fn render_transcript(transcript: &[EmailMessage]) -> String {
    let mut rendered = String::new();
    for message in transcript {
        let speaker = match message.sender {
            EmailSender::Brand => "Brand",
            EmailSender::Creator => "Creator",
        };
        rendered.push_str(&format!(
            "{speaker} — subject: {}\n{}\n\n",
            message.subject, message.body
        ));
    }
    rendered
}

fn classification_prompt(ctx: &ClassifierContext<'_>) -> String {
    format!(
        r#"You're an AI negotiation assistant for the brand "{brand}".
A creator named "{creator}" has been exchanging emails with you regarding campaign "{campaign}".

The full thread so far, oldest first:
"""
{transcript}
"""

Please:
1. Analyze the creator's latest reply and decide the next step.
2. If a phone number is present anywhere in the thread, extract it in E.164 or standard format.
3. Suggest a call script if a call should happen.

Return only valid JSON like this:
{{
  "action": "request_phone" | "initiate_call" | "accepted" | "cancelled" | "escalate",
  "notes": "short explanation",
  "phoneNumber": "9876543210",
  "callScript": "only when action is initiate_call"
}}"#,
        brand = ctx.brand.name,
        creator = ctx.creator.display_name,
        campaign = ctx.negotiation.campaign_id.0,
        transcript = render_transcript(ctx.transcript),
    )
}

#[async_trait]
impl<C> ReplyClassifier for LlmReplyClassifier<C>
where
    C: LlmClient,
{
    async fn classify(&self, ctx: ClassifierContext<'_>) -> Result<ReplyAnalysis, ClassifierError> {
        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(
                    "You are a negotiation agent helping brands collaborate with creators.",
                ),
                ChatMessage::user(classification_prompt(&ctx)),
            ],
            temperature: 0.3,
            max_tokens: Some(512),
        };

        let raw = self
            .client
            .chat(request)
            .await
            .map_err(|error| ClassifierError::Provider(error.to_string()))?;

        debug!(
            event_name = "agent.classifier.raw_output",
            negotiation_id = %ctx.negotiation.id.0,
            "received classifier output"
        );

        parse_reply_analysis(&raw)
    }
}
