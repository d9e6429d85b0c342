use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckInMethod {
    Pin,
    Qr,
    Admin,
}

impl CheckInMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckInMethod::Pin => "pin",
            CheckInMethod::Qr => "qr",
            CheckInMethod::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckIn {
    pub id: Uuid,
    pub member_id: Uuid,
    pub class_id: Option<Uuid>,
    pub check_in_date: NaiveDate,
    pub checked_in_at: DateTime<Utc>,
    pub method: String, // "pin", "qr" or "admin"
}

/// Check-in joined with member and class names, for listings and export
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckInRecord {
    pub id: Uuid,
    pub member_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub program: String,
    pub class_id: Option<Uuid>,
    pub class_name: Option<String>,
    pub check_in_date: NaiveDate,
    pub checked_in_at: DateTime<Utc>,
    pub method: String,
}

#[derive(Debug, Clone)]
pub struct CreateCheckInData {
    pub member_id: Uuid,
    pub class_id: Option<Uuid>,
    pub check_in_date: NaiveDate,
    pub method: CheckInMethod,
}

impl CheckIn {
    pub async fn create(pool: &PgPool, data: CreateCheckInData) -> Result<Self, sqlx::Error> {
        let check_in = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO check_ins (member_id, class_id, check_in_date, method)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(data.member_id)
        .bind(data.class_id)
        .bind(data.check_in_date)
        .bind(data.method.as_str())
        .fetch_one(pool)
        .await?;

        Ok(check_in)
    }

    /// Whether the member already checked in to this class (or to open mat
    /// when `class_id` is None) on the given date
    pub async fn exists_for(
        pool: &PgPool,
        member_id: Uuid,
        class_id: Option<Uuid>,
        date: NaiveDate,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM check_ins
                WHERE member_id = $1
                  AND class_id IS NOT DISTINCT FROM $2
                  AND check_in_date = $3
            )
            "#,
        )
        .bind(member_id)
        .bind(class_id)
        .bind(date)
        .fetch_one(pool)
        .await
    }

    pub async fn count_for_class_on(
        pool: &PgPool,
        class_id: Uuid,
        date: NaiveDate,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM check_ins
            WHERE class_id = $1 AND check_in_date = $2
            "#,
        )
        .bind(class_id)
        .bind(date)
        .fetch_one(pool)
        .await
    }

    /// Number of classes attended since a point in time
    pub async fn count_for_member_since(
        pool: &PgPool,
        member_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM check_ins
            WHERE member_id = $1 AND checked_in_at >= $2
            "#,
        )
        .bind(member_id)
        .bind(since)
        .fetch_one(pool)
        .await
    }

    pub async fn count_between(
        pool: &PgPool,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM check_ins
            WHERE check_in_date BETWEEN $1 AND $2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(pool)
        .await
    }

    /// Check-ins in a date range (inclusive), newest first
    pub async fn list_records(
        pool: &PgPool,
        from: NaiveDate,
        to: NaiveDate,
        member_id: Option<Uuid>,
    ) -> Result<Vec<CheckInRecord>, sqlx::Error> {
        let records = sqlx::query_as::<_, CheckInRecord>(
            r#"
            SELECT
                c.id, c.member_id, m.first_name, m.last_name, m.program,
                c.class_id, cl.name AS class_name,
                c.check_in_date, c.checked_in_at, c.method
            FROM check_ins c
            JOIN members m ON m.id = c.member_id
            LEFT JOIN classes cl ON cl.id = c.class_id
            WHERE c.check_in_date BETWEEN $1 AND $2
              AND ($3::UUID IS NULL OR c.member_id = $3)
            ORDER BY c.checked_in_at DESC
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(member_id)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }
}
