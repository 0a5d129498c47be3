//! HTTP handlers for the item catalog

use axum::{
    extract::{Path, State},
    Json,
};
use shared::{Item, ItemStock};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::catalog::{CreateItemInput, SetActiveInput};
use crate::services::{CatalogService, LedgerService};
use crate::AppState;

/// Create an item
pub async fn create_item(
    State(state): State<AppState>,
    Json(input): Json<CreateItemInput>,
) -> AppResult<Json<Item>> {
    let service = CatalogService::new(state.store);
    let item = service.create_item(input).await?;
    Ok(Json(item))
}

/// List all items, active or not
pub async fn list_items(State(state): State<AppState>) -> AppResult<Json<Vec<Item>>> {
    let service = CatalogService::new(state.store);
    let items = service.list_items().await?;
    Ok(Json(items))
}

pub async fn get_item(State(state): State<AppState>, Path(item_id): Path<Uuid>) -> AppResult<Json<Item>> {
    let service = CatalogService::new(state.store);
    let item = service.get_item(item_id).await?;
    Ok(Json(item))
}

/// Activate or deactivate an item
pub async fn set_item_active(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(input): Json<SetActiveInput>,
) -> AppResult<Json<Item>> {
    let service = CatalogService::new(state.store);
    let item = service.set_item_active(item_id, input.is_active).await?;
    Ok(Json(item))
}

/// Available quantity and lots of an item
pub async fn get_item_stock(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<ItemStock>> {
    let service = LedgerService::new(state.store, state.config.ledger);
    let stock = service.item_stock(item_id).await?;
    Ok(Json(stock))
}
