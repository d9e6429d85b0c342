use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MemberBeltHistory {
    pub id: Uuid,
    pub member_id: Uuid,
    pub belt: String,
    pub stripes: i16,
    pub promoted_by: Option<String>,
    pub promoted_at: DateTime<Utc>,
    pub days_since_last: Option<i32>,
    pub classes_since_last: Option<i32>,
    pub notes: Option<String>,
    pub is_current: bool,
}

#[derive(Debug, Clone)]
pub struct RecordPromotionData {
    pub member_id: Uuid,
    pub belt: String,
    pub stripes: i16,
    pub promoted_by: Option<String>,
    pub days_since_last: Option<i32>,
    pub classes_since_last: Option<i32>,
    pub notes: Option<String>,
}

impl MemberBeltHistory {
    /// Appends a rank to the ledger and makes it the member's current rank.
    ///
    /// The previous current row is cleared, the new row inserted and the
    /// member row updated in one transaction.
    pub async fn record_promotion(
        pool: &PgPool,
        data: RecordPromotionData,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE member_belt_history
            SET is_current = FALSE
            WHERE member_id = $1 AND is_current
            "#,
        )
        .bind(data.member_id)
        .execute(&mut *tx)
        .await?;

        let entry = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO member_belt_history (
                member_id, belt, stripes, promoted_by,
                days_since_last, classes_since_last, notes, is_current
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE)
            RETURNING *
            "#,
        )
        .bind(data.member_id)
        .bind(&data.belt)
        .bind(data.stripes)
        .bind(&data.promoted_by)
        .bind(data.days_since_last)
        .bind(data.classes_since_last)
        .bind(&data.notes)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE members
            SET current_belt = $2, current_stripes = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(data.member_id)
        .bind(&data.belt)
        .bind(data.stripes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(entry)
    }

    pub async fn find_current(
        pool: &PgPool,
        member_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let entry = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM member_belt_history
            WHERE member_id = $1 AND is_current
            "#,
        )
        .bind(member_id)
        .fetch_optional(pool)
        .await?;

        Ok(entry)
    }

    pub async fn list_by_member(pool: &PgPool, member_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let entries = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM member_belt_history
            WHERE member_id = $1
            ORDER BY promoted_at DESC
            "#,
        )
        .bind(member_id)
        .fetch_all(pool)
        .await?;

        Ok(entries)
    }
}
