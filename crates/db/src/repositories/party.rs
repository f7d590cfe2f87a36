use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use parley_core::domain::party::{Brand, BrandId, Campaign, CampaignId, Creator, CreatorId};

use super::negotiation::parse_timestamp;
use super::{PartyRepository, RepositoryError};
use crate::DbPool;

/// Lookup/save access for the collaborator records the orchestrator reads:
/// brands, creators and campaigns.
pub struct SqlPartyRepository {
    pool: DbPool,
}

impl SqlPartyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PartyRepository for SqlPartyRepository {
    async fn find_brand(&self, id: &BrandId) -> Result<Option<Brand>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, email, phone, created_at, updated_at FROM brand WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(brand_from_row).transpose()
    }

    async fn save_brand(&self, brand: Brand) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO brand (id, name, email, phone, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                phone = excluded.phone,
                updated_at = excluded.updated_at",
        )
        .bind(&brand.id.0)
        .bind(&brand.name)
        .bind(&brand.email)
        .bind(brand.phone.as_deref())
        .bind(brand.created_at.to_rfc3339())
        .bind(brand.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_creator(&self, id: &CreatorId) -> Result<Option<Creator>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, display_name, email, phone, category, instagram_followers,
                    youtube_subscribers, created_at, updated_at
             FROM creator WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(creator_from_row).transpose()
    }

    async fn save_creator(&self, creator: Creator) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO creator (
                id, display_name, email, phone, category, instagram_followers,
                youtube_subscribers, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                email = excluded.email,
                phone = excluded.phone,
                category = excluded.category,
                instagram_followers = excluded.instagram_followers,
                youtube_subscribers = excluded.youtube_subscribers,
                updated_at = excluded.updated_at",
        )
        .bind(&creator.id.0)
        .bind(&creator.display_name)
        .bind(&creator.email)
        .bind(creator.phone.as_deref())
        .bind(&creator.category)
        .bind(creator.instagram_followers)
        .bind(creator.youtube_subscribers)
        .bind(creator.created_at.to_rfc3339())
        .bind(creator.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_campaign(&self, id: &CampaignId) -> Result<Option<Campaign>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, brand_id, name, description, deliverables, budget_per_creator,
                    start_date, end_date, created_at, updated_at
             FROM campaign WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(campaign_from_row).transpose()
    }

    async fn save_campaign(&self, campaign: Campaign) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO campaign (
                id, brand_id, name, description, deliverables, budget_per_creator,
                start_date, end_date, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                brand_id = excluded.brand_id,
                name = excluded.name,
                description = excluded.description,
                deliverables = excluded.deliverables,
                budget_per_creator = excluded.budget_per_creator,
                start_date = excluded.start_date,
                end_date = excluded.end_date,
                updated_at = excluded.updated_at",
        )
        .bind(&campaign.id.0)
        .bind(&campaign.brand_id.0)
        .bind(&campaign.name)
        .bind(&campaign.description)
        .bind(&campaign.deliverables)
        .bind(campaign.budget_per_creator.to_string())
        .bind(&campaign.start_date)
        .bind(&campaign.end_date)
        .bind(campaign.created_at.to_rfc3339())
        .bind(campaign.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn brand_from_row(row: SqliteRow) -> Result<Brand, RepositoryError> {
    Ok(Brand {
        id: BrandId(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn creator_from_row(row: SqliteRow) -> Result<Creator, RepositoryError> {
    Ok(Creator {
        id: CreatorId(row.try_get("id")?),
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        category: row.try_get("category")?,
        instagram_followers: row.try_get("instagram_followers")?,
        youtube_subscribers: row.try_get("youtube_subscribers")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn campaign_from_row(row: SqliteRow) -> Result<Campaign, RepositoryError> {
    let budget_raw = row.try_get::<String, _>("budget_per_creator")?;
    let budget_per_creator = Decimal::from_str(&budget_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid campaign budget `{budget_raw}` ({error})"))
    })?;

    Ok(Campaign {
        id: CampaignId(row.try_get("id")?),
        brand_id: BrandId(row.try_get("brand_id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        deliverables: row.try_get("deliverables")?,
        budget_per_creator,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use parley_core::domain::party::CampaignId;

    use super::SqlPartyRepository;
    use crate::repositories::PartyRepository;
    use crate::test_support::{sample_campaign, setup_pool};

    #[tokio::test]
    async fn campaign_budget_round_trips_through_text_storage() {
        let pool = setup_pool().await;
        let repo = SqlPartyRepository::new(pool.clone());

        let campaign = sample_campaign("camp-budget");
        repo.save_brand(crate::test_support::sample_brand("brand-1")).await.expect("brand");
        repo.save_campaign(campaign.clone()).await.expect("campaign");

        let found = repo
            .find_campaign(&CampaignId("camp-budget".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found.budget_per_creator, campaign.budget_per_creator);

        pool.close().await;
    }
}
