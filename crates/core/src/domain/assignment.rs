use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::party::{BrandId, CampaignId, CreatorId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentId(pub String);

/// Outreach dedup ledger, one record per (brand, creator). A campaign id
/// appears in `campaign_ids` at most once; `phone_discovered` implies a
/// normalized, non-empty `phone`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorAssignment {
    pub id: AssignmentId,
    pub brand_id: BrandId,
    pub creator_id: CreatorId,
    pub campaign_ids: Vec<CampaignId>,
    pub phone_discovered: bool,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreatorAssignment {
    pub fn covers_campaign(&self, campaign_id: &CampaignId) -> bool {
        self.campaign_ids.contains(campaign_id)
    }
}
