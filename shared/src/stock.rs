//! Stock aggregation over the lot ledger

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::LotLedger;
use crate::models::{Lot, LotStatus};

/// Sum of remaining quantity across lots. Expired lots are included;
/// excluding them is a presentation decision.
pub fn available_qty<'a>(lots: impl IntoIterator<Item = &'a Lot>) -> i64 {
    lots.into_iter().map(|lot| lot.remaining_qty).sum()
}

/// Stock figures for one item with per-lot status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemStock {
    pub item_id: Uuid,
    pub available_qty: i64,
    pub lots: Vec<LotStock>,
}

/// One lot line of an item stock view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LotStock {
    pub lot_id: Uuid,
    pub lot_number: Option<String>,
    pub intake_qty: i64,
    pub remaining_qty: i64,
    pub expiry_date: Option<NaiveDate>,
    pub status: LotStatus,
}

impl ItemStock {
    /// Build the view from an item's lots, in the order given
    pub fn from_lots(item_id: Uuid, lots: &[Lot], today: NaiveDate, near_expiry_days: i64) -> Self {
        Self {
            item_id,
            available_qty: available_qty(lots),
            lots: lots
                .iter()
                .map(|lot| LotStock {
                    lot_id: lot.id,
                    lot_number: lot.lot_number.clone(),
                    intake_qty: lot.intake_qty,
                    remaining_qty: lot.remaining_qty,
                    expiry_date: lot.expiry_date,
                    status: lot.status(today, near_expiry_days),
                })
                .collect(),
        }
    }
}

/// Undepleted lots that are expired, near expiry, or expire within
/// `within_days` of `today`, soonest first
pub fn expiring_lots<'a>(
    lots: impl IntoIterator<Item = &'a Lot>,
    today: NaiveDate,
    near_expiry_days: i64,
    within_days: Option<i64>,
) -> Vec<&'a Lot> {
    let mut flagged: Vec<&Lot> = lots
        .into_iter()
        .filter(|lot| lot.remaining_qty > 0)
        .filter(|lot| {
            let status = lot.status(today, near_expiry_days);
            let in_window = match (within_days, lot.expiry_date) {
                (Some(days), Some(expiry)) => (expiry - today).num_days() <= days,
                _ => false,
            };
            matches!(status, LotStatus::Expired | LotStatus::NearExpiry) || in_window
        })
        .collect();
    flagged.sort_by_key(|lot| (lot.expiry_date, lot.created_at));
    flagged
}

/// Per-item available quantity cache keyed by the ledger version.
///
/// Any ledger mutation bumps the version, so a cached figure is only reused
/// while the ledger is unchanged.
#[derive(Debug, Default)]
pub struct StockAggregator {
    cache: HashMap<Uuid, (u64, i64)>,
}

impl StockAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn available_qty(&mut self, ledger: &LotLedger, item_id: Uuid) -> i64 {
        let version = ledger.version();
        match self.cache.get(&item_id) {
            Some((cached_version, qty)) if *cached_version == version => *qty,
            _ => {
                let qty = ledger.available_qty(item_id);
                self.cache.insert(item_id, (version, qty));
                qty
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewLot;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn receive(ledger: &mut LotLedger, item_id: Uuid, qty: i64, expiry: Option<NaiveDate>) -> Uuid {
        ledger
            .create_lot(
                NewLot {
                    item_id,
                    intake_qty: qty,
                    lot_number: None,
                    manufacture_date: None,
                    expiry_date: expiry,
                    unit_cost: Decimal::ZERO,
                    source_document_id: None,
                },
                Utc::now(),
            )
            .unwrap()
    }

    #[test]
    fn test_aggregator_tracks_ledger_version() {
        let mut ledger = LotLedger::new();
        let mut aggregator = StockAggregator::new();
        let item = Uuid::new_v4();

        assert_eq!(aggregator.available_qty(&ledger, item), 0);
        let lot = receive(&mut ledger, item, 100, None);
        assert_eq!(aggregator.available_qty(&ledger, item), 100);
        ledger.consume(lot, 40).unwrap();
        assert_eq!(aggregator.available_qty(&ledger, item), 60);
    }

    #[test]
    fn test_item_stock_view() {
        let mut ledger = LotLedger::new();
        let item = Uuid::new_v4();
        let today = date(2025, 3, 1);
        receive(&mut ledger, item, 10, Some(date(2025, 1, 1)));
        receive(&mut ledger, item, 5, Some(date(2025, 3, 15)));
        let empty = receive(&mut ledger, item, 3, None);
        ledger.consume(empty, 3).unwrap();

        let lots: Vec<Lot> = ledger.lots_for_item(item).into_iter().cloned().collect();
        let stock = ItemStock::from_lots(item, &lots, today, 30);

        assert_eq!(stock.available_qty, 15);
        let statuses: Vec<LotStatus> = stock.lots.iter().map(|lot| lot.status).collect();
        assert_eq!(
            statuses,
            vec![LotStatus::Expired, LotStatus::NearExpiry, LotStatus::Depleted]
        );
    }

    #[test]
    fn test_expiring_lots_window() {
        let mut ledger = LotLedger::new();
        let item = Uuid::new_v4();
        let today = date(2025, 3, 1);
        let expired = receive(&mut ledger, item, 1, Some(date(2025, 2, 1)));
        let soon = receive(&mut ledger, item, 1, Some(date(2025, 3, 20)));
        let later = receive(&mut ledger, item, 1, Some(date(2025, 5, 1)));
        receive(&mut ledger, item, 1, None);

        let flagged: Vec<Uuid> = expiring_lots(ledger.lots(), today, 30, None)
            .iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(flagged, vec![expired, soon]);

        let wide: Vec<Uuid> = expiring_lots(ledger.lots(), today, 30, Some(90))
            .iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(wide, vec![expired, soon, later]);
    }
}
