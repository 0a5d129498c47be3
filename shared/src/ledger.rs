//! In-memory lot ledger
//!
//! Owns the lots of every item. Intake quantities are immutable; remaining
//! quantities only move through [`LotLedger::consume`]. Mutations can be
//! recorded in a journal so that a multi-lot approval is applied
//! all-or-nothing: [`LotLedger::rollback_journal`] undoes every change made
//! since [`LotLedger::begin_journal`].

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Lot, LotAllocation, LotStatus, NewLot};

/// Errors raised by ledger mutations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Intake quantity must be positive, got {0}")]
    InvalidIntakeQuantity(i64),

    #[error("Consumed quantity must be positive, got {0}")]
    InvalidConsumeQuantity(i64),

    #[error("Expiry date {expiry} is before manufacture date {manufacture}")]
    InvalidDateRange {
        manufacture: NaiveDate,
        expiry: NaiveDate,
    },

    #[error("Lot {0} not found")]
    LotNotFound(Uuid),

    #[error("Lot {lot_id} has {remaining} remaining, cannot consume {requested}")]
    InsufficientLotQuantity {
        lot_id: Uuid,
        requested: i64,
        remaining: i64,
    },

    #[error("Lot {0} has issued quantity and cannot be deleted")]
    LotHasIssuedQuantity(Uuid),
}

/// A lot eligible for issue allocation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocatableLot {
    pub lot_id: Uuid,
    pub remaining_qty: i64,
    pub expiry_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
enum JournalEntry {
    Created(Uuid),
    Consumed { lot_id: Uuid, quantity: i64 },
    Deleted { lot: Lot, position: usize },
}

/// Lots of all items, indexed by item in intake order
#[derive(Debug, Clone, Default)]
pub struct LotLedger {
    lots: HashMap<Uuid, Lot>,
    by_item: HashMap<Uuid, Vec<Uuid>>,
    version: u64,
    journal: Option<Vec<JournalEntry>>,
}

impl LotLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Incremented on every create, consume or delete
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, lot_id: Uuid) -> Option<&Lot> {
        self.lots.get(&lot_id)
    }

    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.values()
    }

    /// Lots of an item in intake order
    pub fn lots_for_item(&self, item_id: Uuid) -> Vec<&Lot> {
        self.by_item
            .get(&item_id)
            .map(|ids| ids.iter().filter_map(|id| self.lots.get(id)).collect())
            .unwrap_or_default()
    }

    /// Create a lot with `remaining_qty == intake_qty`
    pub fn create_lot(&mut self, new_lot: NewLot, created_at: DateTime<Utc>) -> Result<Uuid, LedgerError> {
        check_new_lot(&new_lot)?;

        let lot = Lot {
            id: Uuid::new_v4(),
            item_id: new_lot.item_id,
            lot_number: new_lot.lot_number,
            manufacture_date: new_lot.manufacture_date,
            expiry_date: new_lot.expiry_date,
            intake_qty: new_lot.intake_qty,
            remaining_qty: new_lot.intake_qty,
            unit_cost: new_lot.unit_cost,
            source_document_id: new_lot.source_document_id,
            created_at,
        };
        let lot_id = lot.id;

        self.by_item.entry(lot.item_id).or_default().push(lot_id);
        self.lots.insert(lot_id, lot);
        self.version += 1;
        self.record(JournalEntry::Created(lot_id));

        Ok(lot_id)
    }

    /// Decrease a lot's remaining quantity. Never drives it below zero.
    pub fn consume(&mut self, lot_id: Uuid, quantity: i64) -> Result<(), LedgerError> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidConsumeQuantity(quantity));
        }
        let lot = self
            .lots
            .get_mut(&lot_id)
            .ok_or(LedgerError::LotNotFound(lot_id))?;

        if quantity > lot.remaining_qty {
            return Err(LedgerError::InsufficientLotQuantity {
                lot_id,
                requested: quantity,
                remaining: lot.remaining_qty,
            });
        }

        lot.remaining_qty -= quantity;
        self.version += 1;
        self.record(JournalEntry::Consumed { lot_id, quantity });
        Ok(())
    }

    /// Undepleted lots of an item in allocation order: expiry ascending with
    /// undated lots last, then oldest intake first.
    pub fn list_allocatable(&self, item_id: Uuid) -> Vec<AllocatableLot> {
        let mut lots: Vec<AllocatableLot> = self
            .lots_for_item(item_id)
            .into_iter()
            .filter(|lot| lot.remaining_qty > 0)
            .map(|lot| AllocatableLot {
                lot_id: lot.id,
                remaining_qty: lot.remaining_qty,
                expiry_date: lot.expiry_date,
                created_at: lot.created_at,
            })
            .collect();
        sort_for_allocation(&mut lots);
        lots
    }

    pub fn status(&self, lot_id: Uuid, today: NaiveDate, near_expiry_days: i64) -> Result<LotStatus, LedgerError> {
        self.lots
            .get(&lot_id)
            .map(|lot| lot.status(today, near_expiry_days))
            .ok_or(LedgerError::LotNotFound(lot_id))
    }

    /// Sum of remaining quantity over every lot of the item, expired included
    pub fn available_qty(&self, item_id: Uuid) -> i64 {
        self.lots_for_item(item_id)
            .iter()
            .map(|lot| lot.remaining_qty)
            .sum()
    }

    /// Remove a lot that has never been issued from
    pub fn delete_lot(&mut self, lot_id: Uuid) -> Result<Lot, LedgerError> {
        let lot = self.lots.get(&lot_id).ok_or(LedgerError::LotNotFound(lot_id))?;
        if lot.has_issued() {
            return Err(LedgerError::LotHasIssuedQuantity(lot_id));
        }
        let item_id = lot.item_id;

        let position = self.unlink(item_id, lot_id);
        let lot = self
            .lots
            .remove(&lot_id)
            .ok_or(LedgerError::LotNotFound(lot_id))?;
        self.version += 1;
        self.record(JournalEntry::Deleted {
            lot: lot.clone(),
            position,
        });
        Ok(lot)
    }

    /// Start recording mutations so they can be rolled back
    pub fn begin_journal(&mut self) {
        self.journal.get_or_insert_with(Vec::new);
    }

    /// Keep every mutation recorded since [`begin_journal`](Self::begin_journal)
    pub fn commit_journal(&mut self) {
        self.journal = None;
    }

    /// Undo every mutation recorded since [`begin_journal`](Self::begin_journal)
    pub fn rollback_journal(&mut self) {
        if let Some(journal) = self.journal.take() {
            for entry in journal.into_iter().rev() {
                self.undo(entry);
            }
        }
    }

    fn record(&mut self, entry: JournalEntry) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(entry);
        }
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Created(lot_id) => {
                if let Some(lot) = self.lots.remove(&lot_id) {
                    self.unlink(lot.item_id, lot_id);
                }
            }
            JournalEntry::Consumed { lot_id, quantity } => {
                if let Some(lot) = self.lots.get_mut(&lot_id) {
                    lot.remaining_qty += quantity;
                }
            }
            JournalEntry::Deleted { lot, position } => {
                let ids = self.by_item.entry(lot.item_id).or_default();
                ids.insert(position.min(ids.len()), lot.id);
                self.lots.insert(lot.id, lot);
            }
        }
        self.version += 1;
    }

    fn unlink(&mut self, item_id: Uuid, lot_id: Uuid) -> usize {
        let Some(ids) = self.by_item.get_mut(&item_id) else {
            return 0;
        };
        let position = ids.iter().position(|id| *id == lot_id).unwrap_or(ids.len());
        if position < ids.len() {
            ids.remove(position);
        }
        if ids.is_empty() {
            self.by_item.remove(&item_id);
        }
        position
    }
}

/// Preconditions for creating a lot: positive intake and, when both dates
/// are known, expiry on or after manufacture
pub fn check_new_lot(new_lot: &NewLot) -> Result<(), LedgerError> {
    if new_lot.intake_qty <= 0 {
        return Err(LedgerError::InvalidIntakeQuantity(new_lot.intake_qty));
    }
    if let (Some(manufacture), Some(expiry)) = (new_lot.manufacture_date, new_lot.expiry_date) {
        if expiry < manufacture {
            return Err(LedgerError::InvalidDateRange { manufacture, expiry });
        }
    }
    Ok(())
}

/// Order lots for FIFO-by-expiry allocation
pub fn sort_for_allocation(lots: &mut [AllocatableLot]) {
    lots.sort_by(|a, b| {
        let by_expiry = match (a.expiry_date, b.expiry_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        };
        by_expiry.then(a.created_at.cmp(&b.created_at))
    });
}

/// Split `quantity` across lots already in allocation order, taking as much
/// as possible from each lot before moving to the next.
///
/// Returns the unsatisfied remainder as the error when the lots run out.
pub fn allocate_by_expiry(lots: &[AllocatableLot], quantity: i64) -> Result<Vec<LotAllocation>, i64> {
    let mut outstanding = quantity;
    let mut allocations = Vec::new();

    for lot in lots {
        if outstanding == 0 {
            break;
        }
        let take = outstanding.min(lot.remaining_qty);
        if take > 0 {
            allocations.push(LotAllocation {
                lot_id: lot.lot_id,
                quantity: take,
            });
            outstanding -= take;
        }
    }

    if outstanding > 0 {
        Err(outstanding)
    } else {
        Ok(allocations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn new_lot(item_id: Uuid, qty: i64, expiry: Option<NaiveDate>) -> NewLot {
        NewLot {
            item_id,
            intake_qty: qty,
            lot_number: Some("L".to_string()),
            manufacture_date: None,
            expiry_date: expiry,
            unit_cost: Decimal::ONE,
            source_document_id: None,
        }
    }

    #[test]
    fn test_create_lot_sets_remaining_to_intake() {
        let mut ledger = LotLedger::new();
        let item = Uuid::new_v4();
        let id = ledger.create_lot(new_lot(item, 12, None), at(0)).unwrap();
        let lot = ledger.get(id).unwrap();
        assert_eq!(lot.intake_qty, 12);
        assert_eq!(lot.remaining_qty, 12);
        assert_eq!(ledger.available_qty(item), 12);
        assert_eq!(ledger.version(), 1);
    }

    #[test]
    fn test_create_lot_preconditions() {
        let mut ledger = LotLedger::new();
        let item = Uuid::new_v4();
        assert_eq!(
            ledger.create_lot(new_lot(item, 0, None), at(0)),
            Err(LedgerError::InvalidIntakeQuantity(0))
        );

        let mut bad_dates = new_lot(item, 5, Some(date(2024, 1, 1)));
        bad_dates.manufacture_date = Some(date(2024, 2, 1));
        assert!(matches!(
            ledger.create_lot(bad_dates, at(0)),
            Err(LedgerError::InvalidDateRange { .. })
        ));
        assert_eq!(ledger.available_qty(item), 0);
    }

    #[test]
    fn test_consume_rejects_over_issue() {
        let mut ledger = LotLedger::new();
        let item = Uuid::new_v4();
        let id = ledger.create_lot(new_lot(item, 5, None), at(0)).unwrap();

        assert_eq!(
            ledger.consume(id, 6),
            Err(LedgerError::InsufficientLotQuantity {
                lot_id: id,
                requested: 6,
                remaining: 5
            })
        );
        ledger.consume(id, 5).unwrap();
        assert_eq!(ledger.get(id).unwrap().remaining_qty, 0);

        let unknown = Uuid::new_v4();
        assert_eq!(ledger.consume(unknown, 1), Err(LedgerError::LotNotFound(unknown)));
        assert_eq!(ledger.consume(id, 0), Err(LedgerError::InvalidConsumeQuantity(0)));
    }

    #[test]
    fn test_allocatable_order_expiry_then_fifo() {
        let mut ledger = LotLedger::new();
        let item = Uuid::new_v4();
        let undated = ledger.create_lot(new_lot(item, 5, None), at(0)).unwrap();
        let late = ledger
            .create_lot(new_lot(item, 5, Some(date(2024, 6, 1))), at(1))
            .unwrap();
        let early_second = ledger
            .create_lot(new_lot(item, 5, Some(date(2024, 1, 1))), at(3))
            .unwrap();
        let early_first = ledger
            .create_lot(new_lot(item, 5, Some(date(2024, 1, 1))), at(2))
            .unwrap();
        let depleted = ledger
            .create_lot(new_lot(item, 1, Some(date(2023, 1, 1))), at(4))
            .unwrap();
        ledger.consume(depleted, 1).unwrap();

        let order: Vec<Uuid> = ledger
            .list_allocatable(item)
            .iter()
            .map(|l| l.lot_id)
            .collect();
        assert_eq!(order, vec![early_first, early_second, late, undated]);
    }

    #[test]
    fn test_allocation_order_example() {
        let mut ledger = LotLedger::new();
        let item = Uuid::new_v4();
        let a = ledger
            .create_lot(new_lot(item, 5, Some(date(2024, 1, 1))), at(0))
            .unwrap();
        let b = ledger
            .create_lot(new_lot(item, 5, Some(date(2024, 6, 1))), at(1))
            .unwrap();
        let c = ledger.create_lot(new_lot(item, 5, None), at(2)).unwrap();

        let allocations = allocate_by_expiry(&ledger.list_allocatable(item), 8).unwrap();
        assert_eq!(
            allocations,
            vec![
                LotAllocation { lot_id: a, quantity: 5 },
                LotAllocation { lot_id: b, quantity: 3 },
            ]
        );

        for allocation in &allocations {
            ledger.consume(allocation.lot_id, allocation.quantity).unwrap();
        }

        let remaining: Vec<i64> = [a, b, c]
            .iter()
            .map(|id| ledger.get(*id).unwrap().remaining_qty)
            .collect();
        assert_eq!(remaining, vec![0, 2, 5]);
    }

    #[test]
    fn test_allocate_reports_shortfall() {
        let lots = [AllocatableLot {
            lot_id: Uuid::new_v4(),
            remaining_qty: 3,
            expiry_date: None,
            created_at: at(0),
        }];
        assert_eq!(allocate_by_expiry(&lots, 5), Err(2));
        assert_eq!(allocate_by_expiry(&[], 1), Err(1));
    }

    #[test]
    fn test_journal_rollback_undoes_partial_approval() {
        let mut ledger = LotLedger::new();
        let item = Uuid::new_v4();
        let lot = ledger.create_lot(new_lot(item, 10, None), at(0)).unwrap();
        let version = ledger.version();

        ledger.begin_journal();
        ledger.create_lot(new_lot(item, 7, None), at(1)).unwrap();
        ledger.consume(lot, 4).unwrap();
        let err = ledger.consume(lot, 7).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientLotQuantity { remaining: 6, .. }));
        ledger.rollback_journal();

        assert_eq!(ledger.available_qty(item), 10);
        assert_eq!(ledger.lots_for_item(item).len(), 1);
        assert_eq!(ledger.get(lot).unwrap().remaining_qty, 10);
        assert!(ledger.version() > version);

        // Nothing is journaled once rolled back
        ledger.consume(lot, 1).unwrap();
        ledger.rollback_journal();
        assert_eq!(ledger.available_qty(item), 9);
    }

    #[test]
    fn test_journal_rollback_restores_deleted_lot() {
        let mut ledger = LotLedger::new();
        let item = Uuid::new_v4();
        let first = ledger.create_lot(new_lot(item, 1, None), at(0)).unwrap();
        let second = ledger.create_lot(new_lot(item, 2, None), at(1)).unwrap();

        ledger.begin_journal();
        ledger.delete_lot(first).unwrap();
        ledger.consume(second, 2).unwrap();
        ledger.create_lot(new_lot(item, 9, None), at(2)).unwrap();
        ledger.rollback_journal();

        let ids: Vec<Uuid> = ledger.lots_for_item(item).iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![first, second]);
        assert_eq!(ledger.available_qty(item), 3);
    }

    #[test]
    fn test_delete_lot_forbidden_after_issue() {
        let mut ledger = LotLedger::new();
        let item = Uuid::new_v4();
        let lot = ledger.create_lot(new_lot(item, 4, None), at(0)).unwrap();
        ledger.consume(lot, 1).unwrap();
        assert_eq!(ledger.delete_lot(lot), Err(LedgerError::LotHasIssuedQuantity(lot)));

        let untouched = ledger.create_lot(new_lot(item, 4, None), at(1)).unwrap();
        assert_eq!(ledger.delete_lot(untouched).unwrap().id, untouched);
        assert_eq!(ledger.available_qty(item), 3);
    }

    #[test]
    fn test_expired_lots_count_as_available() {
        let mut ledger = LotLedger::new();
        let item = Uuid::new_v4();
        let lot = ledger
            .create_lot(new_lot(item, 4, Some(date(2020, 1, 1))), at(0))
            .unwrap();
        assert_eq!(ledger.available_qty(item), 4);
        assert_eq!(ledger.status(lot, date(2025, 1, 1), 30), Ok(LotStatus::Expired));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Conservation: intake minus issued always equals available
        #[test]
        fn prop_consume_conserves_quantity(
            intakes in prop::collection::vec(1i64..=50, 1..6),
            requests in prop::collection::vec((0usize..6, 1i64..=60), 0..30)
        ) {
            let mut ledger = LotLedger::new();
            let item = Uuid::new_v4();
            let ids: Vec<Uuid> = intakes
                .iter()
                .enumerate()
                .map(|(i, qty)| ledger.create_lot(new_lot(item, *qty, None), at(i as i64)).unwrap())
                .collect();

            for (index, qty) in requests {
                let lot_id = ids[index % ids.len()];
                let _ = ledger.consume(lot_id, qty);

                let lots = ledger.lots_for_item(item);
                let intake: i64 = lots.iter().map(|l| l.intake_qty).sum();
                let issued: i64 = lots.iter().map(|l| l.issued_qty()).sum();
                prop_assert!(lots.iter().all(|l| l.remaining_qty >= 0 && l.remaining_qty <= l.intake_qty));
                prop_assert_eq!(intake - issued, ledger.available_qty(item));
            }
        }

        /// Allocation never takes more than a lot holds and sums to the request
        #[test]
        fn prop_allocation_respects_lot_balances(
            remaining in prop::collection::vec(1i64..=20, 1..8),
            quantity in 1i64..=200
        ) {
            let lots: Vec<AllocatableLot> = remaining
                .iter()
                .enumerate()
                .map(|(i, qty)| AllocatableLot {
                    lot_id: Uuid::new_v4(),
                    remaining_qty: *qty,
                    expiry_date: None,
                    created_at: at(i as i64),
                })
                .collect();
            let total: i64 = remaining.iter().sum();

            match allocate_by_expiry(&lots, quantity) {
                Ok(allocations) => {
                    prop_assert!(quantity <= total);
                    prop_assert_eq!(allocations.iter().map(|a| a.quantity).sum::<i64>(), quantity);
                    for (allocation, lot) in allocations.iter().zip(lots.iter()) {
                        prop_assert_eq!(allocation.lot_id, lot.lot_id);
                        prop_assert!(allocation.quantity <= lot.remaining_qty);
                    }
                }
                Err(shortfall) => prop_assert_eq!(shortfall, quantity - total),
            }
        }
    }
}
