use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_STRIPES: i16 = 4;

pub const ADULT_BELTS: &[&str] = &["white", "blue", "purple", "brown", "black"];

pub const KIDS_BELTS: &[&str] = &[
    "white",
    "grey-white",
    "grey",
    "grey-black",
    "yellow-white",
    "yellow",
    "yellow-black",
    "orange-white",
    "orange",
    "orange-black",
    "green-white",
    "green",
    "green-black",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeltTrack {
    Adult,
    Kids,
}

impl BeltTrack {
    pub fn belts(self) -> &'static [&'static str] {
        match self {
            BeltTrack::Adult => ADULT_BELTS,
            BeltTrack::Kids => KIDS_BELTS,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromotionError {
    #[error("Unknown belt: {0}")]
    UnknownBelt(String),

    #[error("Promotion from {from} to {to} skips a belt (next belt is {expected})")]
    SkipsBelt {
        from: String,
        to: String,
        expected: String,
    },

    #[error("{to} is not a promotion from {from}")]
    NotAPromotion { from: String, to: String },

    #[error("{0} is the final belt")]
    FinalBelt(String),

    #[error("Already at 4 stripes, promote to the next belt instead")]
    StripesFull,
}

/// Minimum time and attendance since the previous promotion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Requirement {
    pub min_days: i64,
    pub min_classes: i64,
}

const STRIPE_REQUIREMENT: Requirement = Requirement {
    min_days: 60,
    min_classes: 20,
};

const KIDS_BELT_REQUIREMENT: Requirement = Requirement {
    min_days: 120,
    min_classes: 40,
};

const ADULT_BELT_REQUIREMENTS: &[(&str, Requirement)] = &[
    ("blue", Requirement { min_days: 180, min_classes: 60 }),
    ("purple", Requirement { min_days: 540, min_classes: 200 }),
    ("brown", Requirement { min_days: 540, min_classes: 200 }),
    ("black", Requirement { min_days: 365, min_classes: 150 }),
];

#[derive(Debug, Clone, Serialize)]
pub struct BeltInfo {
    pub slug: &'static str,
    pub display_name: String,
    pub rank: usize,
    pub track: BeltTrack,
}

/// Full catalog for both tracks in progression order
pub fn catalog() -> Vec<BeltInfo> {
    [BeltTrack::Adult, BeltTrack::Kids]
        .into_iter()
        .flat_map(|track| {
            track.belts().iter().enumerate().map(move |(rank, &slug)| BeltInfo {
                slug,
                display_name: display_name(slug),
                rank,
                track,
            })
        })
        .collect()
}

/// "grey-white" -> "Grey/White Belt"
pub fn display_name(slug: &str) -> String {
    let words: Vec<String> = slug
        .split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    format!("{} Belt", words.join("/"))
}

pub fn belt_index(belt: &str, track: BeltTrack) -> Option<usize> {
    track.belts().iter().position(|b| *b == belt)
}

pub fn next_belt(current: &str, track: BeltTrack) -> Option<&'static str> {
    let index = belt_index(current, track)?;
    track.belts().get(index + 1).copied()
}

/// A promotion must land on the immediate next belt of the track
pub fn is_valid_promotion(from: &str, to: &str, track: BeltTrack) -> Result<(), PromotionError> {
    let from_index =
        belt_index(from, track).ok_or_else(|| PromotionError::UnknownBelt(from.to_string()))?;
    let to_index =
        belt_index(to, track).ok_or_else(|| PromotionError::UnknownBelt(to.to_string()))?;

    let expected = next_belt(from, track).ok_or_else(|| PromotionError::FinalBelt(from.to_string()))?;

    if to_index <= from_index {
        return Err(PromotionError::NotAPromotion {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    if to != expected {
        return Err(PromotionError::SkipsBelt {
            from: from.to_string(),
            to: to.to_string(),
            expected: expected.to_string(),
        });
    }

    Ok(())
}

pub fn next_stripe(current: i16) -> Result<i16, PromotionError> {
    if current >= MAX_STRIPES {
        return Err(PromotionError::StripesFull);
    }
    Ok(current.max(0) + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionKind {
    Stripe,
    Belt,
}

pub fn requirement_for(kind: PromotionKind, target_belt: &str, track: BeltTrack) -> Requirement {
    match (kind, track) {
        (PromotionKind::Stripe, _) => STRIPE_REQUIREMENT,
        (PromotionKind::Belt, BeltTrack::Kids) => KIDS_BELT_REQUIREMENT,
        (PromotionKind::Belt, BeltTrack::Adult) => ADULT_BELT_REQUIREMENTS
            .iter()
            .find(|(belt, _)| *belt == target_belt)
            .map(|(_, req)| *req)
            .unwrap_or(STRIPE_REQUIREMENT),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EligibilityReport {
    pub kind: PromotionKind,
    pub current_belt: String,
    pub current_stripes: i16,
    pub target_belt: Option<String>,
    pub target_stripes: Option<i16>,
    pub days_since_last: i64,
    pub classes_since_last: i64,
    pub required: Requirement,
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
}

/// Reports whether a member meets the minimums for their next stripe, or
/// for their next belt once stripes are full
pub fn check_eligibility(
    current_belt: &str,
    current_stripes: i16,
    track: BeltTrack,
    days_since_last: i64,
    classes_since_last: i64,
) -> EligibilityReport {
    let (kind, target_belt, target_stripes, blocked_reason) = if current_stripes < MAX_STRIPES {
        (PromotionKind::Stripe, None, Some(current_stripes + 1), None)
    } else {
        match next_belt(current_belt, track) {
            Some(next) => (PromotionKind::Belt, Some(next.to_string()), Some(0), None),
            None => (
                PromotionKind::Belt,
                None,
                None,
                Some(PromotionError::FinalBelt(current_belt.to_string()).to_string()),
            ),
        }
    };

    let required = requirement_for(kind, target_belt.as_deref().unwrap_or(current_belt), track);
    let eligible = blocked_reason.is_none()
        && days_since_last >= required.min_days
        && classes_since_last >= required.min_classes;

    EligibilityReport {
        kind,
        current_belt: current_belt.to_string(),
        current_stripes,
        target_belt,
        target_stripes,
        days_since_last,
        classes_since_last,
        required,
        eligible,
        blocked_reason,
    }
}
