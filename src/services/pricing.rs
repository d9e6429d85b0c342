use serde::{Deserialize, Serialize};

use crate::models::member::MemberType;

/// Individual list price for an adult membership, in dollars per month
pub const ADULT_MONTHLY_PRICE: u32 = 100;
/// Individual list price for a kids membership, in dollars per month
pub const KID_MONTHLY_PRICE: u32 = 75;
/// Flat family rate covering the first two members
pub const FAMILY_BASE_RATE: u32 = 150;
/// Added to the family rate for every member beyond the second
pub const FAMILY_ADDITIONAL_MEMBER_RATE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyPrice {
    pub member_count: usize,
    /// What the household pays per month
    pub monthly_total: u32,
    /// Sum of individual list prices
    pub list_total: u32,
    pub savings: u32,
}

impl FamilyPrice {
    pub fn monthly_total_cents(&self) -> i64 {
        i64::from(self.monthly_total) * 100
    }
}

pub fn list_price(member_type: MemberType) -> u32 {
    match member_type {
        MemberType::Adult => ADULT_MONTHLY_PRICE,
        MemberType::Kid => KID_MONTHLY_PRICE,
    }
}

/// Computes the monthly rate for a household.
///
/// A single member pays their list price, two members pay the flat family
/// rate and each member after that adds a fixed amount.
pub fn calculate_family_price(member_types: &[MemberType]) -> FamilyPrice {
    let member_count = member_types.len();
    let list_total: u32 = member_types.iter().map(|t| list_price(*t)).sum();

    let monthly_total = match member_count {
        0 => 0,
        1 => list_total,
        2 => FAMILY_BASE_RATE,
        n => FAMILY_BASE_RATE + FAMILY_ADDITIONAL_MEMBER_RATE * (n as u32 - 2),
    };

    FamilyPrice {
        member_count,
        monthly_total,
        list_total,
        savings: list_total.saturating_sub(monthly_total),
    }
}
