use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;

use crate::models::{
    belt_history::{MemberBeltHistory, RecordPromotionData},
    check_in::CheckIn,
    member::Member,
};
use crate::services::{
    belts::{self, EligibilityReport, PromotionError, PromotionKind, Requirement},
    email::{self, EmailClient, PromotionEmail},
};

#[derive(thiserror::Error, Debug)]
pub enum PromotionServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    InvalidPromotion(#[from] PromotionError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromotionRequest {
    pub kind: PromotionKind,
    pub belt: Option<String>,
    pub promoted_by: Option<String>,
    pub notes: Option<String>,
}

/// Time and attendance since the member's current rank was awarded
pub struct TimeInRank {
    pub since: DateTime<Utc>,
    pub days: i64,
    pub classes: i64,
}

pub async fn time_in_rank(pool: &PgPool, member: &Member) -> Result<TimeInRank, sqlx::Error> {
    let since = MemberBeltHistory::find_current(pool, member.id)
        .await?
        .map(|entry| entry.promoted_at)
        .unwrap_or(member.created_at);

    let classes = CheckIn::count_for_member_since(pool, member.id, since).await?;
    let days = (Utc::now() - since).num_days().max(0);

    Ok(TimeInRank {
        since,
        days,
        classes,
    })
}

pub async fn eligibility(pool: &PgPool, member: &Member) -> Result<EligibilityReport, sqlx::Error> {
    let time = time_in_rank(pool, member).await?;

    Ok(belts::check_eligibility(
        &member.current_belt,
        member.current_stripes,
        member.belt_track(),
        time.days,
        time.classes,
    ))
}

/// Resolves the rank a promotion lands on without touching the database
pub fn target_rank(
    member: &Member,
    request: &PromotionRequest,
) -> Result<(String, i16), PromotionServiceError> {
    match request.kind {
        PromotionKind::Stripe => Ok((
            member.current_belt.clone(),
            belts::next_stripe(member.current_stripes)?,
        )),
        PromotionKind::Belt => {
            let track = member.belt_track();
            let target = match request.belt.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
                Some(belt) => belt,
                None => belts::next_belt(&member.current_belt, track)
                    .ok_or_else(|| PromotionError::FinalBelt(member.current_belt.clone()))?,
            };
            belts::is_valid_promotion(&member.current_belt, target, track)?;
            Ok((target.to_string(), 0))
        }
    }
}

/// Minimums for the rank a promotion actually lands on
pub fn requirement_for_target(member: &Member, kind: PromotionKind, target_belt: &str) -> Requirement {
    belts::requirement_for(kind, target_belt, member.belt_track())
}

pub fn meets_requirement(requirement: Requirement, days: i64, classes: i64) -> bool {
    days >= requirement.min_days && classes >= requirement.min_classes
}

/// Awards a stripe or the next belt.
///
/// Progression order is enforced; time and attendance minimums are
/// recorded on the ledger entry but left to the instructor's judgement.
#[tracing::instrument(skip(pool, email_client, gym_name, request), fields(member_id = %member.id))]
pub async fn promote(
    pool: &PgPool,
    email_client: Option<&EmailClient>,
    gym_name: &str,
    member: &Member,
    request: PromotionRequest,
) -> Result<MemberBeltHistory, PromotionServiceError> {
    let (belt, stripes) = target_rank(member, &request)?;
    let time = time_in_rank(pool, member).await?;

    let required = requirement_for_target(member, request.kind, &belt);
    if !meets_requirement(required, time.days, time.classes) {
        tracing::warn!(
            days = time.days,
            classes = time.classes,
            required_days = required.min_days,
            required_classes = required.min_classes,
            "Promoting below recommended minimums"
        );
    }

    let entry = MemberBeltHistory::record_promotion(
        pool,
        RecordPromotionData {
            member_id: member.id,
            belt: belt.clone(),
            stripes,
            promoted_by: request.promoted_by.clone(),
            days_since_last: i32::try_from(time.days).ok(),
            classes_since_last: i32::try_from(time.classes).ok(),
            notes: request.notes,
        },
    )
    .await?;

    tracing::info!(belt = %belt, stripes = stripes, "Member promoted");

    let belt_name = belts::display_name(&belt);
    email::send_best_effort(
        email_client,
        &member.email,
        &format!("Congratulations on your promotion, {}!", member.first_name),
        &PromotionEmail {
            gym_name,
            first_name: &member.first_name,
            belt_name: &belt_name,
            stripes,
            promoted_by: request.promoted_by.as_deref(),
        },
    )
    .await;

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn member(belt: &str, stripes: i16, member_type: &str) -> Member {
        Member {
            id: Uuid::new_v4(),
            first_name: "Rafa".to_string(),
            last_name: "Lima".to_string(),
            email: "rafa@example.com".to_string(),
            phone: None,
            date_of_birth: NaiveDate::from_ymd_opt(1995, 5, 5).unwrap(),
            program: "adult_bjj".to_string(),
            member_type: member_type.to_string(),
            status: "active".to_string(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            family_account_id: None,
            current_belt: belt.to_string(),
            current_stripes: stripes,
            check_in_pin: "1234".to_string(),
            qr_token: "token".to_string(),
            emergency_contact_name: None,
            emergency_contact_phone: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn request(kind: PromotionKind, belt: Option<&str>) -> PromotionRequest {
        PromotionRequest {
            kind,
            belt: belt.map(str::to_string),
            promoted_by: Some("Coach".to_string()),
            notes: None,
        }
    }

    #[test]
    fn test_stripe_target() {
        let target = target_rank(&member("blue", 2, "adult"), &request(PromotionKind::Stripe, None)).unwrap();
        assert_eq!(target, ("blue".to_string(), 3));
    }

    #[test]
    fn test_fifth_stripe_rejected() {
        assert!(matches!(
            target_rank(&member("blue", 4, "adult"), &request(PromotionKind::Stripe, None)),
            Err(PromotionServiceError::InvalidPromotion(PromotionError::StripesFull))
        ));
    }

    #[test]
    fn test_belt_target_resets_stripes() {
        let target = target_rank(
            &member("white", 4, "adult"),
            &request(PromotionKind::Belt, Some("blue")),
        )
        .unwrap();
        assert_eq!(target, ("blue".to_string(), 0));
    }

    #[test]
    fn test_belt_skip_rejected() {
        assert!(matches!(
            target_rank(
                &member("white", 4, "adult"),
                &request(PromotionKind::Belt, Some("purple"))
            ),
            Err(PromotionServiceError::InvalidPromotion(PromotionError::SkipsBelt { .. }))
        ));
    }

    #[test]
    fn test_kids_track_used_for_kids() {
        let target = target_rank(
            &member("white", 0, "kid"),
            &request(PromotionKind::Belt, Some("grey-white")),
        )
        .unwrap();
        assert_eq!(target.0, "grey-white");

        assert!(target_rank(
            &member("white", 0, "kid"),
            &request(PromotionKind::Belt, Some("blue"))
        )
        .is_err());
    }

    #[test]
    fn test_belt_promotion_defaults_to_next_belt() {
        let target =
            target_rank(&member("blue", 4, "adult"), &request(PromotionKind::Belt, None)).unwrap();
        assert_eq!(target, ("purple".to_string(), 0));

        assert!(matches!(
            target_rank(&member("black", 0, "adult"), &request(PromotionKind::Belt, None)),
            Err(PromotionServiceError::InvalidPromotion(PromotionError::FinalBelt(_)))
        ));
    }

    #[test]
    fn test_belt_promotion_without_stripes_uses_belt_minimums() {
        let white = member("white", 0, "adult");
        let (belt, _) = target_rank(&white, &request(PromotionKind::Belt, Some("blue"))).unwrap();

        let required = requirement_for_target(&white, PromotionKind::Belt, &belt);
        assert_eq!(required.min_days, 180);
        assert_eq!(required.min_classes, 60);
        assert!(!meets_requirement(required, 70, 25));
        assert!(meets_requirement(required, 180, 60));
    }

    #[test]
    fn test_stripe_promotion_uses_stripe_minimums() {
        let blue = member("blue", 1, "adult");
        let (belt, _) = target_rank(&blue, &request(PromotionKind::Stripe, None)).unwrap();

        let required = requirement_for_target(&blue, PromotionKind::Stripe, &belt);
        assert!(meets_requirement(required, 70, 25));
    }
}
