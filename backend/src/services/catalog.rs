//! Item catalog service
//!
//! The movement core only reads item constraints; create and activate exist
//! so a standalone deployment can seed and maintain its catalog.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use shared::{Item, ItemConstraints};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::store::InventoryStore;

/// Catalog service for items and their stock-keeping constraints
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn InventoryStore>,
}

/// Input for creating an item
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateItemInput {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 30))]
    pub unit: String,
    #[serde(default)]
    pub requires_lot_tracking: bool,
    #[serde(default)]
    pub requires_expiry: bool,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub min_qty: i64,
    /// 0 means no maximum
    #[serde(default)]
    #[validate(range(min = 0))]
    pub max_qty: i64,
}

/// Input for activating or deactivating an item
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SetActiveInput {
    pub is_active: bool,
}

impl CatalogService {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Create a new active item
    pub async fn create_item(&self, input: CreateItemInput) -> AppResult<Item> {
        input.validate()?;

        let code = input.code.trim().to_string();
        if code.is_empty() {
            return Err(AppError::InvalidInput {
                field: "code".to_string(),
                message: "Item code must not be blank".to_string(),
                message_vi: "Mã vật tư không được để trống".to_string(),
            });
        }
        if input.max_qty > 0 && input.max_qty < input.min_qty {
            return Err(AppError::InvalidInput {
                field: "max_qty".to_string(),
                message: "Maximum quantity must not be below the minimum".to_string(),
                message_vi: "Tồn tối đa không được nhỏ hơn tồn tối thiểu".to_string(),
            });
        }
        if self.store.find_item_by_code(&code).await?.is_some() {
            return Err(AppError::DuplicateEntry("code".to_string()));
        }

        let now = Utc::now();
        let item = Item {
            id: Uuid::new_v4(),
            code,
            name: input.name.trim().to_string(),
            unit: input.unit.trim().to_string(),
            requires_lot_tracking: input.requires_lot_tracking,
            requires_expiry: input.requires_expiry,
            min_qty: input.min_qty,
            max_qty: input.max_qty,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_item(&item).await?;
        tracing::info!(item_id = %item.id, code = %item.code, "Item created");
        Ok(item)
    }

    pub async fn get_item(&self, item_id: Uuid) -> AppResult<Item> {
        self.store
            .get_item(item_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Item".to_string()))
    }

    pub async fn list_items(&self) -> AppResult<Vec<Item>> {
        self.store.list_items().await
    }

    pub async fn set_item_active(&self, item_id: Uuid, is_active: bool) -> AppResult<Item> {
        let mut item = self.get_item(item_id).await?;
        if item.is_active != is_active {
            item.is_active = is_active;
            item.updated_at = Utc::now();
            self.store.update_item(&item).await?;
            tracing::info!(item_id = %item.id, is_active, "Item activation changed");
        }
        Ok(item)
    }

    /// Constraints of an active item. Unknown and inactive items are both
    /// reported as not found.
    pub async fn get_constraints(&self, item_id: Uuid) -> AppResult<ItemConstraints> {
        match self.store.get_item(item_id).await? {
            Some(item) if item.is_active => Ok(item.constraints()),
            _ => Err(AppError::NotFound("Item".to_string())),
        }
    }
}
