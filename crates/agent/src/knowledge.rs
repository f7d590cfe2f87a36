//! Deterministic knowledge-context rendering for the voice agent: everything
//! said over email and on previous calls, in one markdown document, so the
//! voice conversation stays accountable to the written thread.

use parley_core::classifier::{EmailMessage, EmailSender};
use parley_core::domain::party::{Brand, Campaign};
use parley_core::domain::voice::{VoiceTranscriptMessage, VoiceTranscriptRole};

pub fn knowledge_markdown(
    brand: &Brand,
    campaign: &Campaign,
    emails: &[EmailMessage],
    voice_history: &[VoiceTranscriptMessage],
) -> String {
    let mut doc = String::new();

    doc.push_str(&format!("# {} — {}\n\n", brand.name, campaign.name));
    doc.push_str("## Campaign\n\n");
    doc.push_str(&format!("- Brand: {} ({})\n", brand.name, brand.email));
    doc.push_str(&format!("- Campaign: {}\n", campaign.name));
    doc.push_str(&format!("- Description: {}\n", campaign.description));
    doc.push_str(&format!("- Deliverables: {}\n", campaign.deliverables));
    doc.push_str(&format!("- Budget per creator: {}\n", campaign.budget_per_creator));
    doc.push_str(&format!("- Timeline: {} to {}\n\n", campaign.start_date, campaign.end_date));

    doc.push_str("## Email thread\n\n");
    if emails.is_empty() {
        doc.push_str("_No emails exchanged yet._\n\n");
    }
    for message in emails {
        let speaker = match message.sender {
            EmailSender::Brand => "Brand",
            EmailSender::Creator => "Creator",
        };
        doc.push_str(&format!("### {speaker}: {}\n\n{}\n\n", message.subject, message.body));
    }

    doc.push_str("## Voice call history\n\n");
    if voice_history.is_empty() {
        doc.push_str("_No calls completed yet._\n");
    }
    for line in voice_history {
        let speaker = match line.role {
            VoiceTranscriptRole::Agent => "Agent",
            VoiceTranscriptRole::User => "Creator",
        };
        doc.push_str(&format!("- [{}s] {speaker}: {}\n", line.offset_secs, line.message));
    }

    doc
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use parley_core::classifier::{EmailMessage, EmailSender};
    use parley_core::domain::party::{Brand, BrandId, Campaign, CampaignId};
    use parley_core::domain::voice::{VoiceTranscriptMessage, VoiceTranscriptRole};

    use super::knowledge_markdown;

    #[test]
    fn renders_campaign_emails_and_calls_in_order() {
        let now = Utc::now();
        let brand = Brand {
            id: BrandId("brand-1".to_string()),
            name: "Acme".to_string(),
            email: "hello@acme.com".to_string(),
            phone: None,
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
        let emails = vec![
            EmailMessage {
                sender: EmailSender::Brand,
                subject: "Hi".to_string(),
                body: "Opening offer".to_string(),
            },
            EmailMessage {
                sender: EmailSender::Creator,
                subject: "Re: Hi".to_string(),
                body: "Sounds interesting".to_string(),
            },
        ];
        let voice = vec![VoiceTranscriptMessage {
            role: VoiceTranscriptRole::User,
            message: "Happy to chat".to_string(),
            offset_secs: 12,
        }];

        let doc = knowledge_markdown(&brand, &campaign, &emails, &voice);

        assert!(doc.contains("# Acme — Spring Launch"));
        assert!(doc.find("Opening offer").expect("brand email present")
            < doc.find("Sounds interesting").expect("creator reply present"));
        assert!(doc.contains("- [12s] Creator: Happy to chat"));
    }

    #[test]
    fn empty_histories_render_placeholders() {
        let now = Utc::now();
        let brand = Brand {
            id: BrandId("brand-1".to_string()),
            name: "Acme".to_string(),
            email: "hello@acme.com".to_string(),
            phone: None,
            created_at: now,
            updated_at: now,
        };
        let campaign = Campaign {
            id: CampaignId("camp-1".to_string()),
            brand_id: BrandId("brand-1".to_string()),
            name: "Spring Launch".to_string(),
            description: String::new(),
            deliverables: String::new(),
            budget_per_creator: Decimal::ZERO,
            start_date: String::new(),
            end_date: String::new(),
            created_at: now,
            updated_at: now,
        };

        let doc = knowledge_markdown(&brand, &campaign, &[], &[]);
        assert!(doc.contains("_No emails exchanged yet._"));
        assert!(doc.contains("_No calls completed yet._"));
    }
}
