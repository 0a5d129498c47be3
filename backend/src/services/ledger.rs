//! Lot ledger and stock service
//!
//! Read-only stock views, lot status, expiry and min/max reports, plus lot
//! deletion. Ledger mutations from documents happen only in approval.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use shared::{expiring_lots, ItemStock, LotStatus, StockLevel, StockView};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::error::{AppError, AppResult};
use crate::store::InventoryStore;

/// Service over the lot ledger and its stock aggregations
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn InventoryStore>,
    config: LedgerConfig,
}

/// Status of one lot as of today
#[derive(Debug, Clone, Serialize)]
pub struct LotStatusView {
    pub lot_id: Uuid,
    pub item_id: Uuid,
    pub lot_number: Option<String>,
    pub intake_qty: i64,
    pub remaining_qty: i64,
    pub expiry_date: Option<NaiveDate>,
    pub status: LotStatus,
}

/// A lot in the expiry report
#[derive(Debug, Clone, Serialize)]
pub struct ExpiringLot {
    pub lot_id: Uuid,
    pub item_id: Uuid,
    pub item_code: String,
    pub item_name: String,
    pub lot_number: Option<String>,
    pub remaining_qty: i64,
    pub expiry_date: Option<NaiveDate>,
    /// Negative once expired
    pub days_to_expiry: Option<i64>,
    pub status: LotStatus,
}

/// An active item whose stock is outside its min/max band
#[derive(Debug, Clone, Serialize)]
pub struct StockAlert {
    pub item_id: Uuid,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub available_qty: i64,
    pub min_qty: i64,
    pub max_qty: i64,
    pub level: StockLevel,
}

impl LedgerService {
    pub fn new(store: Arc<dyn InventoryStore>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Available quantity and per-lot status of an item
    pub async fn item_stock(&self, item_id: Uuid) -> AppResult<ItemStock> {
        if self.store.get_item(item_id).await?.is_none() {
            return Err(AppError::NotFound("Item".to_string()));
        }
        let lots = self.store.lots_for_item(item_id).await?;
        Ok(ItemStock::from_lots(
            item_id,
            &lots,
            self.config.today(),
            self.config.near_expiry_threshold_days,
        ))
    }

    pub async fn lot_status(&self, lot_id: Uuid) -> AppResult<LotStatusView> {
        let lot = self
            .store
            .get_lot(lot_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Lot".to_string()))?;

        Ok(LotStatusView {
            status: lot.status(self.config.today(), self.config.near_expiry_threshold_days),
            lot_id: lot.id,
            item_id: lot.item_id,
            lot_number: lot.lot_number,
            intake_qty: lot.intake_qty,
            remaining_qty: lot.remaining_qty,
            expiry_date: lot.expiry_date,
        })
    }

    /// Delete a lot nothing has been issued from
    pub async fn delete_lot(&self, lot_id: Uuid) -> AppResult<()> {
        self.store.delete_lot(lot_id).await?;
        tracing::info!(%lot_id, "Lot deleted");
        Ok(())
    }

    /// Undepleted lots that are expired, near expiry, or expire within
    /// `within_days`, soonest first
    pub async fn expiring_lots(&self, within_days: Option<i64>) -> AppResult<Vec<ExpiringLot>> {
        if within_days.is_some_and(|days| days < 0) {
            return Err(AppError::InvalidInput {
                field: "within_days".to_string(),
                message: "within_days must not be negative".to_string(),
                message_vi: "Số ngày không được âm".to_string(),
            });
        }

        let today = self.config.today();
        let lots = self.store.undepleted_lots().await?;
        let items: HashMap<Uuid, _> = self
            .store
            .list_items()
            .await?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        Ok(
            expiring_lots(&lots, today, self.config.near_expiry_threshold_days, within_days)
                .into_iter()
                .map(|lot| {
                    let (item_code, item_name) = items
                        .get(&lot.item_id)
                        .map(|item| (item.code.clone(), item.name.clone()))
                        .unwrap_or_default();
                    ExpiringLot {
                        lot_id: lot.id,
                        item_id: lot.item_id,
                        item_code,
                        item_name,
                        lot_number: lot.lot_number.clone(),
                        remaining_qty: lot.remaining_qty,
                        expiry_date: lot.expiry_date,
                        days_to_expiry: lot.expiry_date.map(|expiry| (expiry - today).num_days()),
                        status: lot.status(today, self.config.near_expiry_threshold_days),
                    }
                })
                .collect(),
        )
    }

    /// Active items below their minimum or above their maximum
    pub async fn stock_alerts(&self) -> AppResult<Vec<StockAlert>> {
        let items: Vec<_> = self
            .store
            .list_items()
            .await?
            .into_iter()
            .filter(|item| item.is_active)
            .collect();
        let ids: Vec<Uuid> = items.iter().map(|item| item.id).collect();
        let snapshot = self.store.stock_snapshot(&ids).await?;

        Ok(items
            .into_iter()
            .filter_map(|item| {
                let available_qty = snapshot.available_qty(item.id);
                let level = item.constraints().stock_level(available_qty);
                (level != StockLevel::Normal).then(|| StockAlert {
                    item_id: item.id,
                    code: item.code,
                    name: item.name,
                    unit: item.unit,
                    available_qty,
                    min_qty: item.min_qty,
                    max_qty: item.max_qty,
                    level,
                })
            })
            .collect())
    }
}
