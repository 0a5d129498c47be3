//! Item catalog models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stock-keeping item (drug, consumable, device) in the hospital catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    /// Unit of measure (e.g. "box", "vial", "tablet")
    pub unit: String,
    pub requires_lot_tracking: bool,
    pub requires_expiry: bool,
    pub min_qty: i64,
    /// Zero means the item has no upper stock limit
    pub max_qty: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn constraints(&self) -> ItemConstraints {
        ItemConstraints {
            requires_lot_tracking: self.requires_lot_tracking,
            requires_expiry: self.requires_expiry,
            min_qty: self.min_qty,
            max_qty: self.max_qty,
        }
    }
}

/// The per-item configuration consumed by movement validation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ItemConstraints {
    pub requires_lot_tracking: bool,
    pub requires_expiry: bool,
    pub min_qty: i64,
    pub max_qty: i64,
}

/// Where an item's available quantity sits relative to its min/max configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StockLevel {
    BelowMinimum,
    Normal,
    AboveMaximum,
}

impl ItemConstraints {
    pub fn stock_level(&self, available_qty: i64) -> StockLevel {
        if available_qty < self.min_qty {
            StockLevel::BelowMinimum
        } else if self.max_qty > 0 && available_qty > self.max_qty {
            StockLevel::AboveMaximum
        } else {
            StockLevel::Normal
        }
    }
}

impl std::fmt::Display for StockLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StockLevel::BelowMinimum => write!(f, "Below Minimum"),
            StockLevel::Normal => write!(f, "Normal"),
            StockLevel::AboveMaximum => write!(f, "Above Maximum"),
        }
    }
}
