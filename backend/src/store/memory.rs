//! In-memory store
//!
//! The whole state sits behind one async mutex, which doubles as the global
//! ledger-write lock during approvals. Approval mutations go through the
//! ledger journal and are rolled back when the unit is dropped uncommitted.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    generate_document_code, AllocatableLot, DocumentStatus, Item, Lot, LotLedger, MovementDocument, MovementKind,
    NewLot, StockAggregator, StockSnapshot,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{ApprovalUnit, DocumentFilter, InventoryStore};
use crate::error::{AppError, AppResult};

#[derive(Debug, Default)]
struct MemoryState {
    items: HashMap<Uuid, Item>,
    ledger: LotLedger,
    aggregator: StockAggregator,
    documents: HashMap<Uuid, MovementDocument>,
    sequences: HashMap<(MovementKind, i32), i64>,
}

impl MemoryState {
    fn snapshot(&mut self, item_ids: &[Uuid]) -> StockSnapshot {
        let mut snapshot = StockSnapshot::new();
        for item_id in item_ids {
            let Some(item) = self.items.get(item_id).filter(|item| item.is_active) else {
                continue;
            };
            let constraints = item.constraints();
            let available = self.aggregator.available_qty(&self.ledger, *item_id);
            snapshot.insert(*item_id, constraints, available);
        }
        snapshot
    }
}

/// Store that keeps everything in process memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn insert_item(&self, item: &Item) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.items.values().any(|existing| existing.code == item.code) {
            return Err(AppError::DuplicateEntry("code".to_string()));
        }
        state.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn get_item(&self, item_id: Uuid) -> AppResult<Option<Item>> {
        Ok(self.state.lock().await.items.get(&item_id).cloned())
    }

    async fn find_item_by_code(&self, code: &str) -> AppResult<Option<Item>> {
        let state = self.state.lock().await;
        Ok(state.items.values().find(|item| item.code == code).cloned())
    }

    async fn list_items(&self) -> AppResult<Vec<Item>> {
        let state = self.state.lock().await;
        let mut items: Vec<Item> = state.items.values().cloned().collect();
        items.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(items)
    }

    async fn update_item(&self, item: &Item) -> AppResult<()> {
        let mut state = self.state.lock().await;
        match state.items.get_mut(&item.id) {
            Some(existing) => {
                *existing = item.clone();
                Ok(())
            }
            None => Err(AppError::NotFound("Item".to_string())),
        }
    }

    async fn get_lot(&self, lot_id: Uuid) -> AppResult<Option<Lot>> {
        Ok(self.state.lock().await.ledger.get(lot_id).cloned())
    }

    async fn lots_for_item(&self, item_id: Uuid) -> AppResult<Vec<Lot>> {
        let state = self.state.lock().await;
        Ok(state.ledger.lots_for_item(item_id).into_iter().cloned().collect())
    }

    async fn undepleted_lots(&self) -> AppResult<Vec<Lot>> {
        let state = self.state.lock().await;
        Ok(state
            .ledger
            .lots()
            .filter(|lot| lot.remaining_qty > 0)
            .cloned()
            .collect())
    }

    async fn delete_lot(&self, lot_id: Uuid) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.ledger.delete_lot(lot_id)?;
        Ok(())
    }

    async fn stock_snapshot(&self, item_ids: &[Uuid]) -> AppResult<StockSnapshot> {
        Ok(self.state.lock().await.snapshot(item_ids))
    }

    async fn next_document_code(&self, kind: MovementKind, year: i32) -> AppResult<String> {
        let mut state = self.state.lock().await;
        let sequence = state.sequences.entry((kind, year)).or_insert(0);
        *sequence += 1;
        Ok(generate_document_code(kind, year, *sequence))
    }

    async fn insert_document(&self, document: &MovementDocument) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.documents.values().any(|existing| existing.code == document.code) {
            return Err(AppError::DuplicateEntry("code".to_string()));
        }
        state.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn get_document(&self, document_id: Uuid) -> AppResult<Option<MovementDocument>> {
        Ok(self.state.lock().await.documents.get(&document_id).cloned())
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> AppResult<Vec<MovementDocument>> {
        let state = self.state.lock().await;
        let mut documents: Vec<MovementDocument> = state
            .documents
            .values()
            .filter(|document| filter.matches(document))
            .cloned()
            .collect();
        documents.sort_by(|a, b| {
            b.movement_date
                .cmp(&a.movement_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(documents)
    }

    async fn update_document(&self, document: &MovementDocument, expected: DocumentStatus) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.documents.get_mut(&document.id) {
            Some(existing) if existing.status == expected => {
                *existing = document.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_document(&self, document_id: Uuid, expected: DocumentStatus) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.documents.get(&document_id) {
            Some(existing) if existing.status == expected => {
                state.documents.remove(&document_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn begin_approval(&self) -> AppResult<Box<dyn ApprovalUnit>> {
        let mut state = self.state.clone().lock_owned().await;
        state.ledger.begin_journal();
        Ok(Box::new(MemoryApproval {
            state,
            document: None,
            committed: false,
        }))
    }
}

/// Approval holding the global state lock for its whole lifetime
struct MemoryApproval {
    state: OwnedMutexGuard<MemoryState>,
    document: Option<MovementDocument>,
    committed: bool,
}

#[async_trait]
impl ApprovalUnit for MemoryApproval {
    async fn load_document(&mut self, document_id: Uuid) -> AppResult<Option<MovementDocument>> {
        Ok(self.state.documents.get(&document_id).cloned())
    }

    async fn lock_items(&mut self, item_ids: &[Uuid]) -> AppResult<StockSnapshot> {
        // The global lock is already held
        Ok(self.state.snapshot(item_ids))
    }

    async fn allocatable(&mut self, item_id: Uuid) -> AppResult<Vec<AllocatableLot>> {
        Ok(self.state.ledger.list_allocatable(item_id))
    }

    async fn create_lot(&mut self, new_lot: &NewLot, created_at: DateTime<Utc>) -> AppResult<Uuid> {
        Ok(self.state.ledger.create_lot(new_lot.clone(), created_at)?)
    }

    async fn consume(&mut self, lot_id: Uuid, quantity: i64) -> AppResult<()> {
        Ok(self.state.ledger.consume(lot_id, quantity)?)
    }

    async fn save_document(&mut self, document: &MovementDocument) -> AppResult<()> {
        self.document = Some(document.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let mut unit = self;
        if let Some(document) = unit.document.take() {
            unit.state.documents.insert(document.id, document);
        }
        unit.state.ledger.commit_journal();
        unit.committed = true;
        Ok(())
    }
}

impl Drop for MemoryApproval {
    fn drop(&mut self) {
        if !self.committed {
            self.state.ledger.rollback_journal();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn new_lot(item_id: Uuid, qty: i64) -> NewLot {
        NewLot {
            item_id,
            intake_qty: qty,
            lot_number: Some("L1".to_string()),
            manufacture_date: None,
            expiry_date: None,
            unit_cost: Decimal::ZERO,
            source_document_id: None,
        }
    }

    #[tokio::test]
    async fn test_dropped_unit_rolls_back() {
        let store = MemoryStore::new();
        let item_id = Uuid::new_v4();

        {
            let mut unit = store.begin_approval().await.unwrap();
            unit.create_lot(&new_lot(item_id, 10), Utc::now()).await.unwrap();
        }

        assert!(store.lots_for_item(item_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_committed_unit_keeps_lots() {
        let store = MemoryStore::new();
        let item_id = Uuid::new_v4();

        let mut unit = store.begin_approval().await.unwrap();
        let lot_id = unit.create_lot(&new_lot(item_id, 10), Utc::now()).await.unwrap();
        unit.consume(lot_id, 4).await.unwrap();
        unit.commit().await.unwrap();

        let lots = store.lots_for_item(item_id).await.unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].remaining_qty, 6);
    }

    #[tokio::test]
    async fn test_document_codes_sequence_per_kind_and_year() {
        let store = MemoryStore::new();
        assert_eq!(store.next_document_code(MovementKind::Receipt, 2025).await.unwrap(), "PN-2025-0001");
        assert_eq!(store.next_document_code(MovementKind::Receipt, 2025).await.unwrap(), "PN-2025-0002");
        assert_eq!(store.next_document_code(MovementKind::Issue, 2025).await.unwrap(), "PX-2025-0001");
        assert_eq!(store.next_document_code(MovementKind::Receipt, 2026).await.unwrap(), "PN-2026-0001");
    }
}
