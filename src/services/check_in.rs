use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::models::{
    check_in::{CheckIn, CheckInMethod, CreateCheckInData},
    gym_class::GymClass,
    member::{Member, MemberStatus},
    waiver::Waiver,
};
use crate::services::{
    belts, credentials, qr_generator,
    waivers::{self, WaiverState, WaiverStatus},
};

#[derive(thiserror::Error, Debug)]
pub enum CheckInError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("A PIN or QR code is required")]
    MissingCredential,

    #[error("PIN must be {} digits", credentials::PIN_LENGTH)]
    MalformedPin,

    #[error("No member found for that PIN or QR code")]
    MemberNotFound,

    #[error("Class not found")]
    ClassNotFound,

    #[error("Membership is {0}; please see the front desk")]
    MembershipInactive(MemberStatus),

    #[error("Waiver is {0}; please sign a new waiver before training")]
    WaiverInvalid(&'static str),

    #[error("This class is for ages {0}")]
    AgeNotAdmitted(String),

    #[error("Already checked in")]
    AlreadyCheckedIn,

    #[error("Class is full")]
    ClassFull,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckInRequest {
    pub pin: Option<String>,
    pub qr_token: Option<String>,
    pub class_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberCard {
    pub member_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub program: String,
    pub status: MemberStatus,
    pub belt: String,
    pub belt_display_name: String,
    pub stripes: i16,
    pub waiver: WaiverStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckInResult {
    pub check_in: CheckIn,
    pub member: MemberCard,
    pub warnings: Vec<String>,
}

fn waiver_state_label(state: WaiverState) -> &'static str {
    match state {
        WaiverState::Missing => "missing",
        WaiverState::Valid => "valid",
        WaiverState::ExpiringSoon => "expiring soon",
        WaiverState::Expired => "expired",
        WaiverState::NeedsAdultWaiver => "signed by a guardian and you are now 18",
    }
}

const DUPLICATE_CHECK_IN_INDEX: &str = "check_ins_member_class_day_idx";

/// Resolves a kiosk credential to a member
pub async fn find_member_by_credential(
    pool: &PgPool,
    pin: Option<&str>,
    qr_token: Option<&str>,
) -> Result<(Member, CheckInMethod), CheckInError> {
    let (member, method) = match (pin, qr_token) {
        (_, Some(qr)) if !qr.trim().is_empty() => (
            Member::find_by_qr_token(pool, qr_generator::parse_check_in_payload(qr)).await?,
            CheckInMethod::Qr,
        ),
        (Some(pin), _) if !pin.trim().is_empty() => {
            let pin = pin.trim();
            if !credentials::is_well_formed_pin(pin) {
                return Err(CheckInError::MalformedPin);
            }
            (Member::find_by_pin(pool, pin).await?, CheckInMethod::Pin)
        }
        _ => return Err(CheckInError::MissingCredential),
    };

    member
        .map(|m| (m, method))
        .ok_or(CheckInError::MemberNotFound)
}

/// Card shown on the kiosk after lookup or check-in
pub async fn member_card(pool: &PgPool, member: &Member) -> Result<MemberCard, sqlx::Error> {
    let latest = Waiver::find_latest_for_member(pool, member.id).await?;
    let waiver = waivers::waiver_status(
        latest.map(|w| (w.signed_at, w.relationship())),
        member.date_of_birth,
        Utc::now(),
    );

    Ok(MemberCard {
        member_id: member.id,
        first_name: member.first_name.clone(),
        last_name: member.last_name.clone(),
        program: member.program.clone(),
        status: member.status(),
        belt: member.current_belt.clone(),
        belt_display_name: belts::display_name(&member.current_belt),
        stripes: member.current_stripes,
        waiver,
    })
}

/// Gate a check-in on membership status and waiver coverage, collecting
/// non-blocking warnings
pub fn admission_warnings(card: &MemberCard) -> Result<Vec<String>, CheckInError> {
    if !card.status.can_check_in() {
        return Err(CheckInError::MembershipInactive(card.status));
    }
    if !card.waiver.allows_training() {
        return Err(CheckInError::WaiverInvalid(waiver_state_label(card.waiver.state)));
    }

    let mut warnings = Vec::new();
    if card.status == MemberStatus::PastDue {
        warnings.push("Payment is past due".to_string());
    }
    if card.waiver.state == WaiverState::ExpiringSoon {
        warnings.push(format!(
            "Waiver expires in {} days",
            card.waiver.days_remaining.unwrap_or(0)
        ));
    }
    Ok(warnings)
}

/// Records an attendance for a member who has already been resolved
pub async fn record_check_in(
    pool: &PgPool,
    member: &Member,
    class_id: Option<Uuid>,
    method: CheckInMethod,
    today: NaiveDate,
) -> Result<CheckInResult, CheckInError> {
    let card = member_card(pool, member).await?;
    let warnings = admission_warnings(&card)?;

    if let Some(class_id) = class_id {
        let class = GymClass::find_by_id(pool, class_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or(CheckInError::ClassNotFound)?;

        let age = waivers::age_on(member.date_of_birth, today);
        if !class.admits_age(age) {
            return Err(CheckInError::AgeNotAdmitted(format_age_range(
                class.min_age,
                class.max_age,
            )));
        }

        if let Some(capacity) = class.capacity {
            let attending = CheckIn::count_for_class_on(pool, class_id, today).await?;
            if attending >= i64::from(capacity) {
                return Err(CheckInError::ClassFull);
            }
        }
    }

    if CheckIn::exists_for(pool, member.id, class_id, today).await? {
        return Err(CheckInError::AlreadyCheckedIn);
    }

    // Concurrent taps can both pass the check above; the index decides
    let check_in = CheckIn::create(
        pool,
        CreateCheckInData {
            member_id: member.id,
            class_id,
            check_in_date: today,
            method,
        },
    )
    .await
    .map_err(|e| {
        if db::is_unique_violation(&e, DUPLICATE_CHECK_IN_INDEX) {
            CheckInError::AlreadyCheckedIn
        } else {
            CheckInError::DatabaseError(e)
        }
    })?;

    tracing::info!(
        member_id = %member.id,
        class_id = ?class_id,
        method = method.as_str(),
        "Member checked in"
    );

    Ok(CheckInResult {
        check_in,
        member: card,
        warnings,
    })
}

/// Kiosk check-in by PIN or QR code
#[tracing::instrument(skip(pool, request), fields(class_id = ?request.class_id))]
pub async fn check_in(pool: &PgPool, request: CheckInRequest) -> Result<CheckInResult, CheckInError> {
    let (member, method) =
        find_member_by_credential(pool, request.pin.as_deref(), request.qr_token.as_deref())
            .await?;

    let result = record_check_in(pool, &member, request.class_id, method, Utc::now().date_naive()).await;

    if let Err(e) = &result {
        tracing::warn!(member_id = %member.id, error = %e, "Check-in rejected");
    }

    result
}

fn format_age_range(min_age: Option<i32>, max_age: Option<i32>) -> String {
    match (min_age, max_age) {
        (Some(min), Some(max)) => format!("{}-{}", min, max),
        (Some(min), None) => format!("{}+", min),
        (None, Some(max)) => format!("{} and under", max),
        (None, None) => "all ages".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn card(status: MemberStatus, state: WaiverState, days_remaining: i64) -> MemberCard {
        let now = Utc::now();
        MemberCard {
            member_id: Uuid::new_v4(),
            first_name: "Ana".to_string(),
            last_name: "Costa".to_string(),
            program: "adult_bjj".to_string(),
            status,
            belt: "blue".to_string(),
            belt_display_name: "Blue Belt".to_string(),
            stripes: 2,
            waiver: WaiverStatus {
                state,
                signed_at: Some(now - Duration::days(365 - days_remaining)),
                expires_at: Some(now + Duration::days(days_remaining)),
                days_remaining: Some(days_remaining),
            },
        }
    }

    #[test]
    fn test_active_member_with_valid_waiver() {
        let warnings = admission_warnings(&card(MemberStatus::Active, WaiverState::Valid, 200)).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_past_due_member_gets_warning() {
        let warnings = admission_warnings(&card(MemberStatus::PastDue, WaiverState::Valid, 200)).unwrap();
        assert_eq!(warnings, vec!["Payment is past due".to_string()]);
    }

    #[test]
    fn test_expiring_waiver_gets_warning() {
        let warnings =
            admission_warnings(&card(MemberStatus::Active, WaiverState::ExpiringSoon, 12)).unwrap();
        assert_eq!(warnings, vec!["Waiver expires in 12 days".to_string()]);
    }

    #[test]
    fn test_inactive_member_rejected() {
        assert!(matches!(
            admission_warnings(&card(MemberStatus::Cancelled, WaiverState::Valid, 200)),
            Err(CheckInError::MembershipInactive(MemberStatus::Cancelled))
        ));
        assert!(matches!(
            admission_warnings(&card(MemberStatus::Pending, WaiverState::Valid, 200)),
            Err(CheckInError::MembershipInactive(MemberStatus::Pending))
        ));
    }

    #[test]
    fn test_expired_waiver_rejected() {
        assert!(matches!(
            admission_warnings(&card(MemberStatus::Active, WaiverState::Expired, 0)),
            Err(CheckInError::WaiverInvalid("expired"))
        ));
        assert!(matches!(
            admission_warnings(&card(MemberStatus::Active, WaiverState::NeedsAdultWaiver, 100)),
            Err(CheckInError::WaiverInvalid(_))
        ));
    }

    #[test]
    fn test_age_range_labels() {
        assert_eq!(format_age_range(Some(4), Some(7)), "4-7");
        assert_eq!(format_age_range(Some(13), None), "13+");
        assert_eq!(format_age_range(None, Some(12)), "12 and under");
    }
}
