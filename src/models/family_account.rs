use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FamilyAccount {
    pub id: Uuid,
    pub name: String,
    pub primary_member_id: Option<Uuid>,
    pub monthly_rate: i32, // whole dollars
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FamilyAccount {
    pub async fn create(
        pool: &PgPool,
        name: &str,
        primary_member_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let account = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO family_accounts (name, primary_member_id)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(primary_member_id)
        .fetch_one(pool)
        .await?;

        Ok(account)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let account = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM family_accounts WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(account)
    }

    pub async fn update_rate(pool: &PgPool, id: Uuid, monthly_rate: i32) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE family_accounts
            SET monthly_rate = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(monthly_rate)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn set_stripe_ids(
        pool: &PgPool,
        id: Uuid,
        stripe_customer_id: Option<&str>,
        stripe_subscription_id: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE family_accounts
            SET
                stripe_customer_id = COALESCE($2, stripe_customer_id),
                stripe_subscription_id = COALESCE($3, stripe_subscription_id),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(stripe_customer_id)
        .bind(stripe_subscription_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Sum of monthly billing across active and past-due households and
    /// individual members
    pub async fn monthly_recurring_revenue(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT
                COALESCE((
                    SELECT SUM(f.monthly_rate) FROM family_accounts f
                    WHERE EXISTS (
                        SELECT 1 FROM members m
                        WHERE m.family_account_id = f.id AND m.status IN ('active', 'past_due')
                    )
                ), 0)
                + COALESCE((
                    SELECT SUM(CASE WHEN m.member_type = 'kid' THEN $1 ELSE $2 END)
                    FROM members m
                    WHERE m.family_account_id IS NULL AND m.status IN ('active', 'past_due')
                ), 0)
            "#,
        )
        .bind(crate::services::pricing::KID_MONTHLY_PRICE as i32)
        .bind(crate::services::pricing::ADULT_MONTHLY_PRICE as i32)
        .fetch_one(pool)
        .await
    }
}
