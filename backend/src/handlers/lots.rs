//! HTTP handlers for lots and stock reports

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::ledger::{ExpiringLot, LotStatusView, StockAlert};
use crate::services::LedgerService;
use crate::AppState;

/// Query parameters for the expiry report
#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub within_days: Option<i64>,
}

pub async fn get_lot_status(
    State(state): State<AppState>,
    Path(lot_id): Path<Uuid>,
) -> AppResult<Json<LotStatusView>> {
    let service = LedgerService::new(state.store, state.config.ledger);
    let status = service.lot_status(lot_id).await?;
    Ok(Json(status))
}

/// Delete a lot nothing has been issued from
pub async fn delete_lot(State(state): State<AppState>, Path(lot_id): Path<Uuid>) -> AppResult<Json<()>> {
    let service = LedgerService::new(state.store, state.config.ledger);
    service.delete_lot(lot_id).await?;
    Ok(Json(()))
}

/// Lots expired, near expiry, or expiring within `within_days`
pub async fn get_expiring_lots(
    State(state): State<AppState>,
    Query(query): Query<ExpiringQuery>,
) -> AppResult<Json<Vec<ExpiringLot>>> {
    let service = LedgerService::new(state.store, state.config.ledger);
    let lots = service.expiring_lots(query.within_days).await?;
    Ok(Json(lots))
}

/// Items outside their min/max stock band
pub async fn get_stock_alerts(State(state): State<AppState>) -> AppResult<Json<Vec<StockAlert>>> {
    let service = LedgerService::new(state.store, state.config.ledger);
    let alerts = service.stock_alerts().await?;
    Ok(Json(alerts))
}
