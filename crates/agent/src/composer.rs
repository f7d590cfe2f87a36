//! Email drafting. The model is asked for a strict `## Subject` / `## Body`
//! markdown shape; parsing is forgiving about whitespace but nothing else.

use async_trait::async_trait;
use tracing::warn;

use parley_core::classifier::{EmailMessage, EmailSender};
use parley_core::compose::{ComposeError, EmailComposer, EmailDraft};
use parley_core::domain::party::{Brand, Campaign, Creator};

use crate::llm::{ChatMessage, ChatRequest, LlmClient};

const FALLBACK_BODY: &str = "Thank you for your response. Please let us know if you have any \
                             questions or need further information.";

pub struct LlmEmailComposer<C> {
    client: C,
}

impl<C> LlmEmailComposer<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

/// Splits a `## Subject` / `## Body` markdown answer into its two sections.
pub fn parse_subject_body(content: &str) -> (Option<String>, Option<String>) {
    let trimmed = content.trim();
    let Some(subject_start) = trimmed.find("## Subject") else {
        return (None, None);
    };
    let after_subject = &trimmed[subject_start + "## Subject".len()..];

    let (subject_raw, body_raw) = match after_subject.find("## Body") {
        Some(body_start) => {
            (&after_subject[..body_start], Some(&after_subject[body_start + "## Body".len()..]))
        }
        None => (after_subject, None),
    };

    let subject = subject_raw.trim();
    let body = body_raw.map(str::trim).filter(|body| !body.is_empty());
    (
        (!subject.is_empty()).then(|| subject.to_string()),
        body.map(|body| body.to_string()),
    )
}

fn initial_system_prompt(brand: &Brand, creator: &Creator, campaign: &Campaign) -> String {
    format!(
        r#"You are an AI assistant representing the brand "{brand}".
Write a short, warm, human-sounding cold email to the creator "{creator}" about the campaign "{campaign}".

Your goal:
- Compliment the creator's content genuinely.
- Briefly mention the campaign and why they're a good fit.
- Ask for their phone number to connect via voice assistant (no pricing yet).

**Follow this strict Markdown format for your response:**

## Subject
<The email's subject line — keep it short and clear>

## Body
<The email's body — max 150 words. Must be friendly, natural, and professional.>

**Only return the Markdown response. Do NOT include any explanations or commentary.**"#,
        brand = brand.name,
        creator = creator.display_name,
        campaign = campaign.name,
    )
}

fn initial_user_prompt(creator: &Creator, campaign: &Campaign) -> String {
    format!(
        r#"Campaign Overview:
- Name: {name}
- Description: {description}
- Deliverables: {deliverables}
- Budget: {budget}
- Timeline: {start} to {end}

Creator:
- Name: {creator}
- Category: {category}
- Followers: IG: {instagram}, YT: {youtube}

Now write:
1. A subject line (max 10 words)
2. A short email body (150 words max)"#,
        name = campaign.name,
        description = campaign.description,
        deliverables = campaign.deliverables,
        budget = campaign.budget_per_creator,
        start = campaign.start_date,
        end = campaign.end_date,
        creator = creator.display_name,
        category = creator.category,
        instagram = creator.instagram_followers,
        youtube = creator.youtube_subscribers,
    )
}

fn thread_system_prompt(brand: &Brand, creator: &Creator, campaign: &Campaign) -> String {
    format!(
        r#"You are an AI email-negotiation assistant for the brand "{brand}".
Your job is to handle the entire email thread with creator "{creator}" regarding campaign "{campaign}".

Campaign details:
- Description: {description}
- Deliverables: {deliverables}
- Budget: {budget}
- Timeline: {start} to {end}

Creator details:
- Name: {creator}
- Email: {creator_email}
- Primary category: {category}

Brand details:
- Name: {brand}
- Email: {brand_email}
- Phone: {brand_phone}

Your responsibilities:
1. Review the entire negotiation history (the messages in this conversation, in chronological order).
2. If the creator has not yet given a phone number or expressed clear willingness, send a friendly follow-up asking for their phone number for a voice call.
3. If the creator provided their phone number in a previous email, send a polite confirmation and wrap up the thread.
4. If the creator asks for campaign pricing, summarize the budget range and suggest scheduling a call to finalize.
5. If the creator's reply is vague, send a gentle prompt to clarify or share their availability.

**Output format (strictly in Markdown and strictly follow this format):**

## Subject
<The next email's subject line>

## Body
<The next email's body, max 150 words>

**Do NOT** include any explanation beyond the subject and body."#,
        brand = brand.name,
        creator = creator.display_name,
        campaign = campaign.name,
        description = campaign.description,
        deliverables = campaign.deliverables,
        budget = campaign.budget_per_creator,
        start = campaign.start_date,
        end = campaign.end_date,
        creator_email = creator.email,
        category = creator.category,
        brand_email = brand.email,
        brand_phone = brand.phone.as_deref().unwrap_or("[not provided]"),
    )
}

/// The reply keeps the thread's established subject: the first reply's
/// subject when one exists, the opener's otherwise.
fn reply_subject(history: &[EmailMessage]) -> String {
    history
        .get(1)
        .or_else(|| history.first())
        .map(|message| message.subject.clone())
        .unwrap_or_default()
}

#[async_trait]
impl<C> EmailComposer for LlmEmailComposer<C>
where
    C: LlmClient,
{
    async fn initial_offer(
        &self,
        brand: &Brand,
        creator: &Creator,
        campaign: &Campaign,
    ) -> Result<EmailDraft, ComposeError> {
        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(initial_system_prompt(brand, creator, campaign)),
                ChatMessage::user(initial_user_prompt(creator, campaign)),
            ],
            temperature: 0.7,
            max_tokens: None,
        };

        let raw = self
            .client
            .chat(request)
            .await
            .map_err(|error| ComposeError::Provider(error.to_string()))?;

        let cleaned = raw.replace("[Your Name]", &brand.name);
        let (subject, body) = parse_subject_body(&cleaned);

        let body = body.ok_or(ComposeError::EmptyOutput)?;
        let fallback_subject = format!("Collaboration Opportunity with {}", brand.name);
        let subject = match subject {
            Some(subject) if subject.len() < 100 => subject,
            _ => fallback_subject,
        };

        Ok(EmailDraft { subject, body })
    }

    async fn follow_up(
        &self,
        brand: &Brand,
        creator: &Creator,
        campaign: &Campaign,
        history: &[EmailMessage],
    ) -> Result<EmailDraft, ComposeError> {
        let mut messages =
            vec![ChatMessage::system(thread_system_prompt(brand, creator, campaign))];
        for message in history {
            let combined = format!("Subject: {}\n\n{}", message.subject, message.body);
            messages.push(match message.sender {
                EmailSender::Creator => ChatMessage::user(combined),
                EmailSender::Brand => ChatMessage::assistant(combined),
            });
        }

        let raw = self
            .client
            .chat(ChatRequest { messages, temperature: 0.6, max_tokens: None })
            .await
            .map_err(|error| ComposeError::Provider(error.to_string()))?;

        let (subject, body) = parse_subject_body(&raw);

        let combined = format!("{} {}", subject.as_deref().unwrap_or(""), body.as_deref().unwrap_or(""));
        let body = if combined.to_ascii_lowercase().contains("no further emails needed") {
            "No further emails needed.".to_string()
        } else {
            body.unwrap_or_else(|| {
                warn!(
                    event_name = "agent.composer.empty_body",
                    "no body content generated, using fallback"
                );
                FALLBACK_BODY.to_string()
            })
        };

        Ok(EmailDraft { subject: reply_subject(history), body })
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use parley_core::classifier::{EmailMessage, EmailSender};
    use parley_core::compose::EmailComposer;
    use parley_core::domain::party::{
        Brand, BrandId, Campaign, CampaignId, Creator, CreatorId,
    };

    use crate::llm::{ChatRequest, LlmClient};

    use super::{parse_subject_body, LlmEmailComposer};

    struct ScriptedLlm {
        reply: String,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat(&self, _request: ChatRequest) -> Result<String> {
            Ok(self.reply.clone())
        }
    }

    fn fixtures() -> (Brand, Creator, Campaign) {
        let now = Utc::now();
        let brand = Brand {
            id: BrandId("brand-1".to_string()),
            name: "Acme".to_string(),
            email: "hello@acme.com".to_string(),
            phone: None,
            created_at: now,
            updated_at: now,
        };
        let creator = Creator {
            id: CreatorId("creator-1".to_string()),
            display_name: "Jane".to_string(),
            email: "jane@example.com".to_string(),
            phone: None,
            category: "tech".to_string(),
            instagram_followers: 10_000,
            youtube_subscribers: 2_000,
            created_at: now,
            updated_at: now,
        };
        let campaign = Campaign {
            id: CampaignId("camp-1".to_string()),
            brand_id: BrandId("brand-1".to_string()),
            name: "Spring Launch".to_string(),
            description: "Launch push".to_string(),
            deliverables: "2 reels".to_string(),
            budget_per_creator: Decimal::new(50_000, 0),
            start_date: "2026-03-01".to_string(),
            end_date: "2026-04-01".to_string(),
            created_at: now,
            updated_at: now,
        };
        (brand, creator, campaign)
    }

    #[test]
    fn markdown_sections_are_split_into_subject_and_body() {
        let (subject, body) =
            parse_subject_body("## Subject\nQuick hello\n\n## Body\nLong body text here.");
        assert_eq!(subject.as_deref(), Some("Quick hello"));
        assert_eq!(body.as_deref(), Some("Long body text here."));
    }

    #[test]
    fn missing_markers_yield_nothing() {
        assert_eq!(parse_subject_body("just some prose"), (None, None));
    }

    #[tokio::test]
    async fn initial_offer_uses_the_drafted_subject_when_reasonable() {
        let composer = LlmEmailComposer::new(ScriptedLlm {
            reply: "## Subject\nLet's collaborate, Jane!\n\n## Body\nWe love your work."
                .to_string(),
        });
        let (brand, creator, campaign) = fixtures();

        let draft =
            composer.initial_offer(&brand, &creator, &campaign).await.expect("draft succeeds");
        assert_eq!(draft.subject, "Let's collaborate, Jane!");
        assert_eq!(draft.body, "We love your work.");
    }

    #[tokio::test]
    async fn initial_offer_falls_back_when_the_subject_is_oversized() {
        let composer = LlmEmailComposer::new(ScriptedLlm {
            reply: format!("## Subject\n{}\n\n## Body\nHello!", "x".repeat(150)),
        });
        let (brand, creator, campaign) = fixtures();

        let draft =
            composer.initial_offer(&brand, &creator, &campaign).await.expect("draft succeeds");
        assert_eq!(draft.subject, "Collaboration Opportunity with Acme");
    }

    #[tokio::test]
    async fn follow_up_reuses_the_thread_subject_for_reply_grouping() {
        let composer = LlmEmailComposer::new(ScriptedLlm {
            reply: "## Subject\nSomething new\n\n## Body\nCould you share your number?"
                .to_string(),
        });
        let (brand, creator, campaign) = fixtures();
        let history = vec![
            EmailMessage {
                sender: EmailSender::Brand,
                subject: "Collaboration Opportunity with Acme".to_string(),
                body: "Hi Jane!".to_string(),
            },
            EmailMessage {
                sender: EmailSender::Creator,
                subject: "Re: Collaboration Opportunity with Acme".to_string(),
                body: "Tell me more".to_string(),
            },
        ];

        let draft = composer
            .follow_up(&brand, &creator, &campaign, &history)
            .await
            .expect("draft succeeds");
        assert_eq!(draft.subject, "Re: Collaboration Opportunity with Acme");
        assert_eq!(draft.body, "Could you share your number?");
    }

    #[tokio::test]
    async fn follow_up_survives_a_bodyless_answer_with_the_fallback_text() {
        let composer =
            LlmEmailComposer::new(ScriptedLlm { reply: "## Subject\nHello".to_string() });
        let (brand, creator, campaign) = fixtures();
        let history = vec![EmailMessage {
            sender: EmailSender::Brand,
            subject: "Opener".to_string(),
            body: "Hi".to_string(),
        }];

        let draft = composer
            .follow_up(&brand, &creator, &campaign, &history)
            .await
            .expect("draft succeeds");
        assert_eq!(draft.subject, "Opener");
        assert!(draft.body.starts_with("Thank you for your response"));
    }
}
