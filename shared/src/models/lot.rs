//! Lot (batch) models and expiry status derivation

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Days before expiry at which a lot is flagged as near expiry
pub const DEFAULT_NEAR_EXPIRY_DAYS: i64 = 30;

/// A tracked batch of a single item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lot {
    pub id: Uuid,
    pub item_id: Uuid,
    pub lot_number: Option<String>,
    pub manufacture_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    /// Quantity received when the lot was created; never changes
    pub intake_qty: i64,
    pub remaining_qty: i64,
    pub unit_cost: Decimal,
    /// Receipt document whose approval created this lot
    pub source_document_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Lot {
    pub fn issued_qty(&self) -> i64 {
        self.intake_qty - self.remaining_qty
    }

    /// True once anything has been issued from the lot
    pub fn has_issued(&self) -> bool {
        self.remaining_qty < self.intake_qty
    }

    pub fn status(&self, today: NaiveDate, near_expiry_days: i64) -> LotStatus {
        derive_lot_status(self.remaining_qty, self.expiry_date, today, near_expiry_days)
    }
}

/// Parameters for creating a lot on receipt approval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewLot {
    pub item_id: Uuid,
    pub intake_qty: i64,
    pub lot_number: Option<String>,
    pub manufacture_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub unit_cost: Decimal,
    pub source_document_id: Option<Uuid>,
}

/// Derived lot status; never stored
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotStatus {
    Fresh,
    NearExpiry,
    Expired,
    Depleted,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Fresh => "FRESH",
            LotStatus::NearExpiry => "NEAR_EXPIRY",
            LotStatus::Expired => "EXPIRED",
            LotStatus::Depleted => "DEPLETED",
        }
    }
}

impl std::fmt::Display for LotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute a lot's status.
///
/// Depletion wins over expiry: an empty lot is `Depleted` whatever its date.
/// A lot expiring today is still near expiry, not expired.
pub fn derive_lot_status(
    remaining_qty: i64,
    expiry_date: Option<NaiveDate>,
    today: NaiveDate,
    near_expiry_days: i64,
) -> LotStatus {
    if remaining_qty == 0 {
        return LotStatus::Depleted;
    }
    match expiry_date {
        Some(expiry) if expiry < today => LotStatus::Expired,
        Some(expiry) if (expiry - today).num_days() < near_expiry_days => LotStatus::NearExpiry,
        _ => LotStatus::Fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_depleted_takes_precedence() {
        let today = date(2025, 1, 1);
        assert_eq!(
            derive_lot_status(0, Some(date(2020, 1, 1)), today, 30),
            LotStatus::Depleted
        );
        assert_eq!(derive_lot_status(0, None, today, 30), LotStatus::Depleted);
    }

    #[test]
    fn test_expiry_boundaries() {
        let today = date(2025, 1, 1);
        assert_eq!(
            derive_lot_status(5, Some(date(2024, 12, 31)), today, 30),
            LotStatus::Expired
        );
        assert_eq!(derive_lot_status(5, Some(today), today, 30), LotStatus::NearExpiry);
        assert_eq!(
            derive_lot_status(5, Some(date(2025, 1, 30)), today, 30),
            LotStatus::NearExpiry
        );
        assert_eq!(
            derive_lot_status(5, Some(date(2025, 1, 31)), today, 30),
            LotStatus::Fresh
        );
    }

    #[test]
    fn test_no_expiry_is_fresh() {
        assert_eq!(
            derive_lot_status(1, None, date(2025, 1, 1), 30),
            LotStatus::Fresh
        );
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&LotStatus::NearExpiry).unwrap();
        assert_eq!(json, "\"NEAR_EXPIRY\"");
    }
}
