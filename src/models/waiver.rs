use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::services::waivers::{self, SignerRelationship};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Waiver {
    pub id: Uuid,
    pub member_id: Uuid,
    pub signer_name: String,
    pub signer_relationship: String, // "self", "parent" or "guardian"
    pub signer_email: Option<String>,
    pub signature_text: String,
    pub member_age_at_signing: i32,
    pub waiver_version: String,
    pub signed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateWaiverData {
    pub member_id: Uuid,
    pub signer_name: String,
    pub signer_relationship: SignerRelationship,
    pub signer_email: Option<String>,
    pub signature_text: String,
    pub member_age_at_signing: i32,
    pub signed_at: DateTime<Utc>,
}

impl Waiver {
    pub fn relationship(&self) -> SignerRelationship {
        self.signer_relationship
            .parse()
            .unwrap_or(SignerRelationship::SelfSigned)
    }

    /// Records a signing event; waivers are never edited afterwards
    pub async fn create(pool: &PgPool, data: CreateWaiverData) -> Result<Self, sqlx::Error> {
        let waiver = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO waivers (
                member_id, signer_name, signer_relationship, signer_email, signature_text,
                member_age_at_signing, waiver_version, signed_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(data.member_id)
        .bind(&data.signer_name)
        .bind(data.signer_relationship.as_str())
        .bind(&data.signer_email)
        .bind(&data.signature_text)
        .bind(data.member_age_at_signing)
        .bind(waivers::CURRENT_WAIVER_VERSION)
        .bind(data.signed_at)
        .bind(waivers::expires_at(data.signed_at))
        .fetch_one(pool)
        .await?;

        Ok(waiver)
    }

    /// The most recently signed waiver for a member
    pub async fn find_latest_for_member(
        pool: &PgPool,
        member_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let waiver = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM waivers
            WHERE member_id = $1
            ORDER BY signed_at DESC
            LIMIT 1
            "#,
        )
        .bind(member_id)
        .fetch_optional(pool)
        .await?;

        Ok(waiver)
    }

    pub async fn list_by_member(pool: &PgPool, member_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let waivers = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM waivers
            WHERE member_id = $1
            ORDER BY signed_at DESC
            "#,
        )
        .bind(member_id)
        .fetch_all(pool)
        .await?;

        Ok(waivers)
    }

    /// Latest waiver per member for every member in a training status
    pub async fn latest_for_training_members(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let waivers = sqlx::query_as::<_, Self>(
            r#"
            SELECT DISTINCT ON (w.member_id) w.*
            FROM waivers w
            JOIN members m ON m.id = w.member_id
            WHERE m.status IN ('active', 'past_due')
            ORDER BY w.member_id, w.signed_at DESC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(waivers)
    }
}
