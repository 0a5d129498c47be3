//! Persistence seam for the warehouse
//!
//! Services talk to an [`InventoryStore`]; approvals run through an
//! [`ApprovalUnit`], a unit of work that holds the ledger-write lock for the
//! items of one document and either commits every effect or none.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use shared::{AllocatableLot, DocumentStatus, Item, Lot, MovementDocument, MovementKind, NewLot, StockSnapshot};
use uuid::Uuid;

use crate::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Document list filter; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentFilter {
    pub kind: Option<MovementKind>,
    pub status: Option<DocumentStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DocumentFilter {
    pub fn matches(&self, document: &MovementDocument) -> bool {
        self.kind.map_or(true, |kind| document.kind == kind)
            && self.status.map_or(true, |status| document.status == status)
            && self.from.map_or(true, |from| document.movement_date >= from)
            && self.to.map_or(true, |to| document.movement_date <= to)
    }
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Check the backing storage is reachable
    async fn ping(&self) -> AppResult<()>;

    // Catalog

    async fn insert_item(&self, item: &Item) -> AppResult<()>;
    async fn get_item(&self, item_id: Uuid) -> AppResult<Option<Item>>;
    async fn find_item_by_code(&self, code: &str) -> AppResult<Option<Item>>;
    /// Items ordered by code
    async fn list_items(&self) -> AppResult<Vec<Item>>;
    async fn update_item(&self, item: &Item) -> AppResult<()>;

    // Lot ledger

    async fn get_lot(&self, lot_id: Uuid) -> AppResult<Option<Lot>>;
    /// Lots of an item in intake order
    async fn lots_for_item(&self, item_id: Uuid) -> AppResult<Vec<Lot>>;
    /// Lots with remaining quantity, across all items
    async fn undepleted_lots(&self) -> AppResult<Vec<Lot>>;
    /// Remove a lot nothing was issued from
    async fn delete_lot(&self, lot_id: Uuid) -> AppResult<()>;
    /// Constraints of the active items among `item_ids` and their available
    /// quantity. Advisory: read without the ledger-write lock.
    async fn stock_snapshot(&self, item_ids: &[Uuid]) -> AppResult<StockSnapshot>;

    // Documents

    /// Next human-readable code for the kind, sequenced per year
    async fn next_document_code(&self, kind: MovementKind, year: i32) -> AppResult<String>;
    async fn insert_document(&self, document: &MovementDocument) -> AppResult<()>;
    async fn get_document(&self, document_id: Uuid) -> AppResult<Option<MovementDocument>>;
    /// Matching documents, newest movement date first
    async fn list_documents(&self, filter: &DocumentFilter) -> AppResult<Vec<MovementDocument>>;
    /// Overwrite a document if its stored status is still `expected`.
    /// Returns false when the status moved underneath the caller.
    async fn update_document(&self, document: &MovementDocument, expected: DocumentStatus) -> AppResult<bool>;
    /// Delete a document if its stored status is still `expected`
    async fn delete_document(&self, document_id: Uuid, expected: DocumentStatus) -> AppResult<bool>;

    // Approval

    async fn begin_approval(&self) -> AppResult<Box<dyn ApprovalUnit>>;
}

/// One approval as a unit of work.
///
/// Dropping the unit without [`commit`](ApprovalUnit::commit) discards every
/// change made through it.
#[async_trait]
pub trait ApprovalUnit: Send {
    /// Load a document and hold it against concurrent transitions
    async fn load_document(&mut self, document_id: Uuid) -> AppResult<Option<MovementDocument>>;

    /// Take the ledger-write lock on `item_ids` (ascending) and read their
    /// stock under it
    async fn lock_items(&mut self, item_ids: &[Uuid]) -> AppResult<StockSnapshot>;

    /// Undepleted lots of an item in allocation order
    async fn allocatable(&mut self, item_id: Uuid) -> AppResult<Vec<AllocatableLot>>;

    async fn create_lot(&mut self, new_lot: &NewLot, created_at: DateTime<Utc>) -> AppResult<Uuid>;

    async fn consume(&mut self, lot_id: Uuid, quantity: i64) -> AppResult<()>;

    async fn save_document(&mut self, document: &MovementDocument) -> AppResult<()>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn document_on(kind: MovementKind, status: DocumentStatus, date: NaiveDate) -> MovementDocument {
        let now = Utc::now();
        MovementDocument {
            id: Uuid::new_v4(),
            code: "PN-2025-0001".to_string(),
            kind,
            warehouse_id: Uuid::new_v4(),
            counterparty_id: None,
            movement_date: date,
            reason: None,
            notes: None,
            status,
            lines: vec![],
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            approved_at: None,
            cancelled_at: None,
        }
    }

    #[test]
    fn test_filter_matches_every_given_field() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let doc = document_on(MovementKind::Receipt, DocumentStatus::Draft, date);

        assert!(DocumentFilter::default().matches(&doc));
        assert!(DocumentFilter {
            kind: Some(MovementKind::Receipt),
            status: Some(DocumentStatus::Draft),
            from: Some(date),
            to: Some(date),
        }
        .matches(&doc));
        assert!(!DocumentFilter {
            kind: Some(MovementKind::Issue),
            ..Default::default()
        }
        .matches(&doc));
        assert!(!DocumentFilter {
            from: date.succ_opt(),
            ..Default::default()
        }
        .matches(&doc));
    }
}
