use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GymClass {
    pub id: Uuid,
    pub name: String,
    pub program: String,
    pub day_of_week: i16, // 0 = Sunday
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub capacity: Option<i32>,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
    pub instructor: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClassData {
    pub name: String,
    pub program: String,
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub capacity: Option<i32>,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
    pub instructor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateClassData {
    pub name: Option<String>,
    pub program: Option<String>,
    pub day_of_week: Option<i16>,
    pub start_time: Option<NaiveTime>,
    pub duration_minutes: Option<i32>,
    pub capacity: Option<i32>,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
    pub instructor: Option<String>,
}

impl GymClass {
    /// Whether a member of this age may attend
    pub fn admits_age(&self, age: i32) -> bool {
        self.min_age.map_or(true, |min| age >= min) && self.max_age.map_or(true, |max| age <= max)
    }

    pub async fn create(pool: &PgPool, data: CreateClassData) -> Result<Self, sqlx::Error> {
        let class = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO classes (
                name, program, day_of_week, start_time, duration_minutes,
                capacity, min_age, max_age, instructor
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(data.name)
        .bind(data.program)
        .bind(data.day_of_week)
        .bind(data.start_time)
        .bind(data.duration_minutes)
        .bind(data.capacity)
        .bind(data.min_age)
        .bind(data.max_age)
        .bind(data.instructor)
        .fetch_one(pool)
        .await?;

        Ok(class)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let class = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM classes WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(class)
    }

    /// Active classes, optionally for a single weekday, in schedule order
    pub async fn list_active(
        pool: &PgPool,
        day_of_week: Option<i16>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let classes = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM classes
            WHERE is_active = TRUE
              AND ($1::SMALLINT IS NULL OR day_of_week = $1)
            ORDER BY day_of_week, start_time
            "#,
        )
        .bind(day_of_week)
        .fetch_all(pool)
        .await?;

        Ok(classes)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateClassData,
    ) -> Result<Option<Self>, sqlx::Error> {
        let class = sqlx::query_as::<_, Self>(
            r#"
            UPDATE classes
            SET
                name = COALESCE($2, name),
                program = COALESCE($3, program),
                day_of_week = COALESCE($4, day_of_week),
                start_time = COALESCE($5, start_time),
                duration_minutes = COALESCE($6, duration_minutes),
                capacity = COALESCE($7, capacity),
                min_age = COALESCE($8, min_age),
                max_age = COALESCE($9, max_age),
                instructor = COALESCE($10, instructor),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.name)
        .bind(data.program)
        .bind(data.day_of_week)
        .bind(data.start_time)
        .bind(data.duration_minutes)
        .bind(data.capacity)
        .bind(data.min_age)
        .bind(data.max_age)
        .bind(data.instructor)
        .fetch_optional(pool)
        .await?;

        Ok(class)
    }

    /// Soft delete; past check-ins keep referencing the class
    pub async fn deactivate(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE classes
            SET is_active = FALSE, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_with_ages(min_age: Option<i32>, max_age: Option<i32>) -> GymClass {
        GymClass {
            id: Uuid::new_v4(),
            name: "Kids Fundamentals".to_string(),
            program: "kids_bjj".to_string(),
            day_of_week: 2,
            start_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            duration_minutes: 45,
            capacity: Some(20),
            min_age,
            max_age,
            instructor: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_admits_age() {
        let class = class_with_ages(Some(6), Some(12));
        assert!(class.admits_age(6));
        assert!(class.admits_age(12));
        assert!(!class.admits_age(5));
        assert!(!class.admits_age(13));

        assert!(class_with_ages(None, None).admits_age(40));
    }
}
