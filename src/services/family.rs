use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    family_account::FamilyAccount,
    member::{Member, MemberStatus, MemberType},
};
use crate::services::pricing::{self, FamilyPrice};

#[derive(thiserror::Error, Debug)]
pub enum FamilyError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Family account not found")]
    AccountNotFound,

    #[error("Member not found")]
    MemberNotFound,

    #[error("Member already belongs to a family account")]
    AlreadyInFamily,

    #[error("Member is not part of this family account")]
    NotInFamily,

    #[error("The primary member cannot be removed from their own family account")]
    CannotRemovePrimary,
}

/// Member types that count toward the household bill; cancelled and
/// inactive members stay linked but are not charged
pub fn billable_types(members: &[Member]) -> Vec<MemberType> {
    members
        .iter()
        .filter(|m| !matches!(m.status(), MemberStatus::Cancelled | MemberStatus::Inactive))
        .map(|m| m.member_type())
        .collect()
}

/// Recomputes and stores the household rate from its current members
pub async fn refresh_rate(
    pool: &PgPool,
    account_id: Uuid,
) -> Result<(Vec<Member>, FamilyPrice), sqlx::Error> {
    let members = Member::list_by_family(pool, account_id).await?;
    let price = pricing::calculate_family_price(&billable_types(&members));

    FamilyAccount::update_rate(pool, account_id, price.monthly_total as i32).await?;

    tracing::info!(
        family_account_id = %account_id,
        members = price.member_count,
        monthly_total = price.monthly_total,
        "Family rate updated"
    );

    Ok((members, price))
}

/// Starts a household with an existing member as the primary account holder
pub async fn create_account(
    pool: &PgPool,
    primary_member_id: Uuid,
    name: Option<String>,
) -> Result<FamilyAccount, FamilyError> {
    let primary = Member::find_by_id(pool, primary_member_id)
        .await?
        .ok_or(FamilyError::MemberNotFound)?;
    if primary.family_account_id.is_some() {
        return Err(FamilyError::AlreadyInFamily);
    }

    let name = name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("{} Family", primary.last_name));
    let account = FamilyAccount::create(pool, name.trim(), primary.id).await?;
    Member::set_family(pool, primary.id, Some(account.id)).await?;
    refresh_rate(pool, account.id).await?;

    FamilyAccount::find_by_id(pool, account.id)
        .await?
        .ok_or(FamilyError::AccountNotFound)
}

pub async fn add_member(
    pool: &PgPool,
    account_id: Uuid,
    member_id: Uuid,
) -> Result<FamilyPrice, FamilyError> {
    FamilyAccount::find_by_id(pool, account_id)
        .await?
        .ok_or(FamilyError::AccountNotFound)?;
    let member = Member::find_by_id(pool, member_id)
        .await?
        .ok_or(FamilyError::MemberNotFound)?;

    match member.family_account_id {
        Some(existing) if existing == account_id => {}
        Some(_) => return Err(FamilyError::AlreadyInFamily),
        None => Member::set_family(pool, member_id, Some(account_id)).await?,
    }

    let (_, price) = refresh_rate(pool, account_id).await?;
    Ok(price)
}

pub async fn remove_member(
    pool: &PgPool,
    account_id: Uuid,
    member_id: Uuid,
) -> Result<FamilyPrice, FamilyError> {
    let account = FamilyAccount::find_by_id(pool, account_id)
        .await?
        .ok_or(FamilyError::AccountNotFound)?;
    let member = Member::find_by_id(pool, member_id)
        .await?
        .ok_or(FamilyError::MemberNotFound)?;

    if member.family_account_id != Some(account_id) {
        return Err(FamilyError::NotInFamily);
    }
    if account.primary_member_id == Some(member_id) {
        return Err(FamilyError::CannotRemovePrimary);
    }

    Member::set_family(pool, member_id, None).await?;

    let (_, price) = refresh_rate(pool, account_id).await?;
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn member(member_type: &str, status: &str) -> Member {
        Member {
            id: Uuid::new_v4(),
            first_name: "Kai".to_string(),
            last_name: "Mendes".to_string(),
            email: "mendes@example.com".to_string(),
            phone: None,
            date_of_birth: NaiveDate::from_ymd_opt(2012, 4, 2).unwrap(),
            program: "kids_bjj".to_string(),
            member_type: member_type.to_string(),
            status: status.to_string(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            family_account_id: None,
            current_belt: "white".to_string(),
            current_stripes: 0,
            check_in_pin: "0000".to_string(),
            qr_token: "token".to_string(),
            emergency_contact_name: None,
            emergency_contact_phone: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_departed_members_not_billed() {
        let members = vec![
            member("adult", "active"),
            member("kid", "past_due"),
            member("kid", "cancelled"),
            member("kid", "inactive"),
            member("kid", "pending"),
        ];

        let types = billable_types(&members);
        assert_eq!(types, vec![MemberType::Adult, MemberType::Kid, MemberType::Kid]);
        assert_eq!(pricing::calculate_family_price(&types).monthly_total, 200);
    }
}
