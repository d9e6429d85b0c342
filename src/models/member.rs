use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::{fmt, str::FromStr};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberType {
    Adult,
    Kid,
}

impl MemberType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberType::Adult => "adult",
            MemberType::Kid => "kid",
        }
    }

    pub fn for_age(age: i32) -> Self {
        if age < crate::services::waivers::ADULT_AGE {
            MemberType::Kid
        } else {
            MemberType::Adult
        }
    }
}

impl FromStr for MemberType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "adult" => Ok(MemberType::Adult),
            "kid" => Ok(MemberType::Kid),
            other => Err(format!("Unknown member type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Pending,
    Active,
    PastDue,
    Cancelled,
    Inactive,
}

impl MemberStatus {
    pub const ALL: [MemberStatus; 5] = [
        MemberStatus::Pending,
        MemberStatus::Active,
        MemberStatus::PastDue,
        MemberStatus::Cancelled,
        MemberStatus::Inactive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Pending => "pending",
            MemberStatus::Active => "active",
            MemberStatus::PastDue => "past_due",
            MemberStatus::Cancelled => "cancelled",
            MemberStatus::Inactive => "inactive",
        }
    }

    /// Members are never deleted, only moved between these states
    pub fn can_transition_to(self, next: MemberStatus) -> bool {
        use MemberStatus::*;

        self == next
            || matches!(
                (self, next),
                (Pending, Active)
                    | (Pending, Cancelled)
                    | (Active, PastDue)
                    | (Active, Cancelled)
                    | (Active, Inactive)
                    | (PastDue, Active)
                    | (PastDue, Cancelled)
                    | (PastDue, Inactive)
                    | (Cancelled, Active)
                    | (Inactive, Active)
            )
    }

    pub fn can_check_in(self) -> bool {
        matches!(self, MemberStatus::Active | MemberStatus::PastDue)
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MemberStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown member status: {}", s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub date_of_birth: NaiveDate,
    pub program: String,
    pub member_type: String, // "adult" or "kid"
    pub status: String,      // see MemberStatus
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub family_account_id: Option<Uuid>,
    pub current_belt: String,
    pub current_stripes: i16,
    #[serde(skip_serializing)]
    pub check_in_pin: String,
    #[serde(skip_serializing)]
    pub qr_token: String,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateMemberData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub date_of_birth: NaiveDate,
    pub program: String,
    pub member_type: MemberType,
    pub check_in_pin: String,
    pub qr_token: String,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    /// False for dependents signed up under someone else's email
    pub is_account_holder: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMemberData {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub program: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub notes: Option<String>,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Parsed status; unknown values are treated as inactive
    pub fn status(&self) -> MemberStatus {
        self.status.parse().unwrap_or(MemberStatus::Inactive)
    }

    pub fn member_type(&self) -> MemberType {
        self.member_type.parse().unwrap_or(MemberType::Adult)
    }

    pub fn belt_track(&self) -> crate::services::belts::BeltTrack {
        match self.member_type() {
            MemberType::Adult => crate::services::belts::BeltTrack::Adult,
            MemberType::Kid => crate::services::belts::BeltTrack::Kids,
        }
    }

    /// Creates a new member in `pending` status on a white belt
    pub async fn create(pool: &PgPool, data: CreateMemberData) -> Result<Self, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO members (
                first_name, last_name, email, phone, date_of_birth, program, member_type,
                check_in_pin, qr_token, emergency_contact_name, emergency_contact_phone,
                is_account_holder
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(&data.first_name)
        .bind(&data.last_name)
        .bind(&data.email)
        .bind(&data.phone)
        .bind(data.date_of_birth)
        .bind(&data.program)
        .bind(data.member_type.as_str())
        .bind(&data.check_in_pin)
        .bind(&data.qr_token)
        .bind(&data.emergency_contact_name)
        .bind(&data.emergency_contact_phone)
        .bind(data.is_account_holder)
        .fetch_one(pool)
        .await?;

        Ok(member)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM members WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(member)
    }

    /// Finds a member who registered with this email as the account holder
    pub async fn find_primary_by_email(
        pool: &PgPool,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM members
            WHERE LOWER(email) = LOWER($1) AND is_account_holder
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(member)
    }

    pub async fn find_by_pin(pool: &PgPool, pin: &str) -> Result<Option<Self>, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM members WHERE check_in_pin = $1
            "#,
        )
        .bind(pin)
        .fetch_optional(pool)
        .await?;

        Ok(member)
    }

    pub async fn find_by_qr_token(
        pool: &PgPool,
        qr_token: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM members WHERE qr_token = $1
            "#,
        )
        .bind(qr_token)
        .fetch_optional(pool)
        .await?;

        Ok(member)
    }

    pub async fn pin_exists(pool: &PgPool, pin: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM members WHERE check_in_pin = $1)
            "#,
        )
        .bind(pin)
        .fetch_one(pool)
        .await
    }

    /// Lists members, optionally filtered by status and a name/email search
    pub async fn list(
        pool: &PgPool,
        status: Option<MemberStatus>,
        search: Option<&str>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let pattern = search.map(|q| format!("%{}%", q.trim()));

        let members = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM members
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND (
                $2::TEXT IS NULL
                OR first_name ILIKE $2
                OR last_name ILIKE $2
                OR email ILIKE $2
                OR (first_name || ' ' || last_name) ILIKE $2
              )
            ORDER BY last_name, first_name
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(pattern)
        .fetch_all(pool)
        .await?;

        Ok(members)
    }

    pub async fn list_by_family(
        pool: &PgPool,
        family_account_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let members = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM members
            WHERE family_account_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(family_account_id)
        .fetch_all(pool)
        .await?;

        Ok(members)
    }

    pub async fn list_by_subscription(
        pool: &PgPool,
        subscription_id: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let members = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM members WHERE stripe_subscription_id = $1
            "#,
        )
        .bind(subscription_id)
        .fetch_all(pool)
        .await?;

        Ok(members)
    }

    /// Members whose status allows training, used by the reminder job
    pub async fn list_training(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let members = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM members
            WHERE status IN ('active', 'past_due')
            ORDER BY last_name, first_name
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(members)
    }

    pub async fn count_by_status(
        pool: &PgPool,
        status: MemberStatus,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM members WHERE status = $1
            "#,
        )
        .bind(status.as_str())
        .fetch_one(pool)
        .await
    }

    /// Updates profile fields, leaving unset fields untouched
    pub async fn update_profile(
        pool: &PgPool,
        id: Uuid,
        data: UpdateMemberData,
    ) -> Result<Option<Self>, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            UPDATE members
            SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                program = COALESCE($6, program),
                emergency_contact_name = COALESCE($7, emergency_contact_name),
                emergency_contact_phone = COALESCE($8, emergency_contact_phone),
                notes = COALESCE($9, notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.first_name)
        .bind(data.last_name)
        .bind(data.email)
        .bind(data.phone)
        .bind(data.program)
        .bind(data.emergency_contact_name)
        .bind(data.emergency_contact_phone)
        .bind(data.notes)
        .fetch_optional(pool)
        .await?;

        Ok(member)
    }

    pub async fn set_status(
        pool: &PgPool,
        id: Uuid,
        status: MemberStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE members
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Records payment linkage from a completed checkout and activates
    pub async fn activate_subscription(
        pool: &PgPool,
        id: Uuid,
        stripe_customer_id: Option<&str>,
        stripe_subscription_id: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE members
            SET
                status = 'active',
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

    pub async fn set_family(
        pool: &PgPool,
        id: Uuid,
        family_account_id: Option<Uuid>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE members
            SET family_account_id = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(family_account_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn set_pin(pool: &PgPool, id: Uuid, pin: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE members
            SET check_in_pin = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(pin)
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use MemberStatus::*;

        assert!(Pending.can_transition_to(Active));
        assert!(Active.can_transition_to(PastDue));
        assert!(PastDue.can_transition_to(Active));
        assert!(Cancelled.can_transition_to(Active));
        assert!(Active.can_transition_to(Active));

        assert!(!Pending.can_transition_to(PastDue));
        assert!(!Cancelled.can_transition_to(PastDue));
        assert!(!Inactive.can_transition_to(Pending));
        assert!(!Active.can_transition_to(Pending));
    }

    #[test]
    fn test_status_strings() {
        for status in MemberStatus::ALL {
            assert_eq!(status.as_str().parse::<MemberStatus>(), Ok(status));
        }
        assert!("deleted".parse::<MemberStatus>().is_err());
        assert_eq!(MemberStatus::PastDue.to_string(), "past_due");
    }

    #[test]
    fn test_check_in_allowed_statuses() {
        assert!(MemberStatus::Active.can_check_in());
        assert!(MemberStatus::PastDue.can_check_in());
        assert!(!MemberStatus::Pending.can_check_in());
        assert!(!MemberStatus::Cancelled.can_check_in());
    }

    #[test]
    fn test_member_type_for_age() {
        assert_eq!(MemberType::for_age(9), MemberType::Kid);
        assert_eq!(MemberType::for_age(17), MemberType::Kid);
        assert_eq!(MemberType::for_age(18), MemberType::Adult);
    }
}
