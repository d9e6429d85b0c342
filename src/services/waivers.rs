use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const WAIVER_VALIDITY_DAYS: i64 = 365;
pub const EXPIRING_SOON_DAYS: i64 = 30;
pub const ADULT_AGE: i32 = 18;
pub const CURRENT_WAIVER_VERSION: &str = "2024-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerRelationship {
    #[serde(rename = "self")]
    SelfSigned,
    Parent,
    Guardian,
}

impl SignerRelationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignerRelationship::SelfSigned => "self",
            SignerRelationship::Parent => "parent",
            SignerRelationship::Guardian => "guardian",
        }
    }

    pub fn is_guardian(&self) -> bool {
        !matches!(self, SignerRelationship::SelfSigned)
    }
}

impl FromStr for SignerRelationship {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "self" => Ok(SignerRelationship::SelfSigned),
            "parent" => Ok(SignerRelationship::Parent),
            "guardian" => Ok(SignerRelationship::Guardian),
            other => Err(format!("Unknown signer relationship: {}", other)),
        }
    }
}

pub fn expires_at(signed_at: DateTime<Utc>) -> DateTime<Utc> {
    signed_at + Duration::days(WAIVER_VALIDITY_DAYS)
}

pub fn is_waiver_valid(signed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at(signed_at) > now
}

/// Whole days left before expiry, negative once expired
pub fn days_until_expiry(signed_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at(signed_at) - now).num_days()
}

/// Age in completed years on the given date
pub fn age_on(date_of_birth: NaiveDate, on: NaiveDate) -> i32 {
    let mut age = on.year() - date_of_birth.year();
    if (on.month(), on.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    age
}

/// A waiver signed by a parent or guardian stops covering the member once
/// they turn 18
pub fn needs_own_waiver(
    relationship: SignerRelationship,
    date_of_birth: NaiveDate,
    now: DateTime<Utc>,
) -> bool {
    relationship.is_guardian() && age_on(date_of_birth, now.date_naive()) >= ADULT_AGE
}

/// Minors need a parent or guardian to sign; adults sign for themselves
pub fn validate_signer(relationship: SignerRelationship, age_at_signing: i32) -> Result<(), String> {
    match (relationship.is_guardian(), age_at_signing >= ADULT_AGE) {
        (false, false) => Err("Members under 18 need a parent or guardian to sign the waiver".to_string()),
        (true, true) => Err("Members 18 and over must sign their own waiver".to_string()),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaiverState {
    Missing,
    Valid,
    ExpiringSoon,
    Expired,
    NeedsAdultWaiver,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaiverStatus {
    pub state: WaiverState,
    pub signed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
}

impl WaiverStatus {
    /// Whether the member is currently covered
    pub fn allows_training(&self) -> bool {
        matches!(self.state, WaiverState::Valid | WaiverState::ExpiringSoon)
    }
}

/// Classifies the member's most recent waiver
pub fn waiver_status(
    latest: Option<(DateTime<Utc>, SignerRelationship)>,
    date_of_birth: NaiveDate,
    now: DateTime<Utc>,
) -> WaiverStatus {
    let Some((signed_at, relationship)) = latest else {
        return WaiverStatus {
            state: WaiverState::Missing,
            signed_at: None,
            expires_at: None,
            days_remaining: None,
        };
    };

    let days_remaining = days_until_expiry(signed_at, now);
    let state = if !is_waiver_valid(signed_at, now) {
        WaiverState::Expired
    } else if needs_own_waiver(relationship, date_of_birth, now) {
        WaiverState::NeedsAdultWaiver
    } else if days_remaining <= EXPIRING_SOON_DAYS {
        WaiverState::ExpiringSoon
    } else {
        WaiverState::Valid
    };

    WaiverStatus {
        state,
        signed_at: Some(signed_at),
        expires_at: Some(expires_at(signed_at)),
        days_remaining: Some(days_remaining.max(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dob(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_waiver_valid_within_window() {
        let now = Utc::now();
        assert!(is_waiver_valid(now - Duration::days(364), now));
        assert!(!is_waiver_valid(now - Duration::days(366), now));
    }

    #[test]
    fn test_waiver_expires_exactly_at_365_days() {
        let now = Utc::now();
        assert!(!is_waiver_valid(now - Duration::days(365), now));
    }

    #[test]
    fn test_age_on_birthday_boundary() {
        assert_eq!(age_on(dob(2006, 6, 15), dob(2024, 6, 14)), 17);
        assert_eq!(age_on(dob(2006, 6, 15), dob(2024, 6, 15)), 18);
        assert_eq!(age_on(dob(2008, 2, 29), dob(2024, 2, 28)), 15);
    }

    #[test]
    fn test_needs_own_waiver_after_turning_18() {
        let now = Utc::now();
        let eighteen_years_ago = now.date_naive() - Duration::days(18 * 366);
        let ten_years_ago = now.date_naive() - Duration::days(10 * 365);

        assert!(needs_own_waiver(SignerRelationship::Parent, eighteen_years_ago, now));
        assert!(!needs_own_waiver(SignerRelationship::SelfSigned, eighteen_years_ago, now));
        assert!(!needs_own_waiver(SignerRelationship::Guardian, ten_years_ago, now));
    }

    #[test]
    fn test_validate_signer() {
        assert!(validate_signer(SignerRelationship::Parent, 9).is_ok());
        assert!(validate_signer(SignerRelationship::SelfSigned, 30).is_ok());
        assert!(validate_signer(SignerRelationship::SelfSigned, 16).is_err());
        assert!(validate_signer(SignerRelationship::Guardian, 40).is_err());
    }

    #[test]
    fn test_status_missing() {
        let status = waiver_status(None, dob(1990, 1, 1), Utc::now());
        assert_eq!(status.state, WaiverState::Missing);
        assert!(!status.allows_training());
    }

    #[test]
    fn test_status_valid_and_expiring() {
        let now = Utc::now();
        let status = waiver_status(
            Some((now - Duration::days(10), SignerRelationship::SelfSigned)),
            dob(1990, 1, 1),
            now,
        );
        assert_eq!(status.state, WaiverState::Valid);
        assert_eq!(status.days_remaining, Some(355));

        let status = waiver_status(
            Some((now - Duration::days(340), SignerRelationship::SelfSigned)),
            dob(1990, 1, 1),
            now,
        );
        assert_eq!(status.state, WaiverState::ExpiringSoon);
        assert!(status.allows_training());
    }

    #[test]
    fn test_status_expired() {
        let now = Utc::now();
        let status = waiver_status(
            Some((now - Duration::days(400), SignerRelationship::SelfSigned)),
            dob(1990, 1, 1),
            now,
        );
        assert_eq!(status.state, WaiverState::Expired);
        assert_eq!(status.days_remaining, Some(0));
        assert!(!status.allows_training());
    }

    #[test]
    fn test_status_needs_adult_waiver() {
        let now = Utc::now();
        let status = waiver_status(
            Some((now - Duration::days(100), SignerRelationship::Parent)),
            dob(1990, 1, 1),
            now,
        );
        assert_eq!(status.state, WaiverState::NeedsAdultWaiver);
        assert!(!status.allows_training());
    }

    #[test]
    fn test_relationship_round_trip_strings() {
        assert_eq!("self".parse::<SignerRelationship>(), Ok(SignerRelationship::SelfSigned));
        assert_eq!(SignerRelationship::Guardian.as_str(), "guardian");
        assert!("uncle".parse::<SignerRelationship>().is_err());
    }
}
