//! Stock movement documents: receipts (phiếu nhập) and issues (phiếu xuất)

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a movement document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Stock entering the warehouse; creates lots on approval
    Receipt,
    /// Stock leaving the warehouse; consumes lots on approval
    Issue,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Receipt => "receipt",
            MovementKind::Issue => "issue",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "receipt" => Some(MovementKind::Receipt),
            "issue" => Some(MovementKind::Issue),
            _ => None,
        }
    }

    /// Prefix of the human-readable document code
    pub fn code_prefix(&self) -> &'static str {
        match self {
            MovementKind::Receipt => "PN",
            MovementKind::Issue => "PX",
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MovementKind::Receipt => write!(f, "Receipt"),
            MovementKind::Issue => write!(f, "Issue"),
        }
    }
}

/// Lifecycle status of a movement document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Draft,
    PendingApproval,
    Approved,
    Cancelled,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "DRAFT",
            DocumentStatus::PendingApproval => "PENDING_APPROVAL",
            DocumentStatus::Approved => "APPROVED",
            DocumentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(DocumentStatus::Draft),
            "PENDING_APPROVAL" => Some(DocumentStatus::PendingApproval),
            "APPROVED" => Some(DocumentStatus::Approved),
            "CANCELLED" => Some(DocumentStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A receipt or issue document with its ordered lines
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovementDocument {
    pub id: Uuid,
    /// Human code, e.g. "PN-2025-0001"
    pub code: String,
    pub kind: MovementKind,
    pub warehouse_id: Uuid,
    /// Supplier for receipts, requesting department for issues
    pub counterparty_id: Option<Uuid>,
    pub movement_date: NaiveDate,
    /// Justification; mandatory for issues
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub status: DocumentStatus,
    pub lines: Vec<MovementLine>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl MovementDocument {
    /// Distinct item ids referenced by the lines, ascending.
    ///
    /// Approval locks items in this order.
    pub fn item_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.lines.iter().map(MovementLine::item_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// A document line. Receipt lines carry lot metadata; issue lines only name
/// the item and are allocated to lots at approval time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MovementLine {
    Receipt(ReceiptLine),
    Issue(IssueLine),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptLine {
    pub item_id: Uuid,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub lot_number: Option<String>,
    pub manufacture_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    /// Set when the document is approved
    #[serde(default)]
    pub lot_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueLine {
    pub item_id: Uuid,
    pub requested_quantity: i64,
    /// Quantity actually issued; may be lower than requested
    pub resolved_quantity: i64,
    pub unit_price: Decimal,
    /// Lots consumed, filled in at approval
    #[serde(default)]
    pub allocations: Vec<LotAllocation>,
}

/// Quantity drawn from one lot for an issue line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LotAllocation {
    pub lot_id: Uuid,
    pub quantity: i64,
}

impl MovementLine {
    pub fn kind(&self) -> MovementKind {
        match self {
            MovementLine::Receipt(_) => MovementKind::Receipt,
            MovementLine::Issue(_) => MovementKind::Issue,
        }
    }

    pub fn item_id(&self) -> Uuid {
        match self {
            MovementLine::Receipt(line) => line.item_id,
            MovementLine::Issue(line) => line.item_id,
        }
    }

    /// Quantity that moves; receipts resolve to the received quantity
    pub fn resolved_quantity(&self) -> i64 {
        match self {
            MovementLine::Receipt(line) => line.quantity,
            MovementLine::Issue(line) => line.resolved_quantity,
        }
    }

    pub fn unit_price(&self) -> Decimal {
        match self {
            MovementLine::Receipt(line) => line.unit_price,
            MovementLine::Issue(line) => line.unit_price,
        }
    }
}

/// Generate a document code: PN-YYYY-NNNN or PX-YYYY-NNNN
pub fn generate_document_code(kind: MovementKind, year: i32, sequence: i64) -> String {
    format!("{}-{}-{:04}", kind.code_prefix(), year, sequence)
}
