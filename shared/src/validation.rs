//! Movement validation
//!
//! One rule set for receipt and issue documents, run when a document leaves
//! DRAFT and again under lock right before approval. Evaluation is fail-fast:
//! document-level rules first, then each line in order, and the first broken
//! rule is the reported error. Non-blocking warnings are collected along the
//! way.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ItemConstraints, MovementDocument, MovementKind, MovementLine};

// ============================================================================
// Validation outcomes
// ============================================================================

/// Blocking validation failures
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    EmptyDocument,
    ReasonRequired,
    /// A receipt line on an issue document or vice versa
    LineKindMismatch,
    ItemNotFound,
    InvalidQuantity,
    InvalidPrice,
    InsufficientStock,
    LotNumberRequired,
    ExpiryRequired,
    InvalidDateRange,
    FutureManufactureDate,
}

impl ValidationErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationErrorKind::EmptyDocument => "EMPTY_DOCUMENT",
            ValidationErrorKind::ReasonRequired => "REASON_REQUIRED",
            ValidationErrorKind::LineKindMismatch => "LINE_KIND_MISMATCH",
            ValidationErrorKind::ItemNotFound => "ITEM_NOT_FOUND",
            ValidationErrorKind::InvalidQuantity => "INVALID_QUANTITY",
            ValidationErrorKind::InvalidPrice => "INVALID_PRICE",
            ValidationErrorKind::InsufficientStock => "INSUFFICIENT_STOCK",
            ValidationErrorKind::LotNumberRequired => "LOT_NUMBER_REQUIRED",
            ValidationErrorKind::ExpiryRequired => "EXPIRY_REQUIRED",
            ValidationErrorKind::InvalidDateRange => "INVALID_DATE_RANGE",
            ValidationErrorKind::FutureManufactureDate => "FUTURE_MANUFACTURE_DATE",
        }
    }

    pub fn message_en(&self) -> &'static str {
        match self {
            ValidationErrorKind::EmptyDocument => "Document must contain at least one line",
            ValidationErrorKind::ReasonRequired => "A reason is required for stock issues",
            ValidationErrorKind::LineKindMismatch => "Line type does not match the document type",
            ValidationErrorKind::ItemNotFound => "Item does not exist or is inactive",
            ValidationErrorKind::InvalidQuantity => "Quantity must be positive",
            ValidationErrorKind::InvalidPrice => "Unit price cannot be negative",
            ValidationErrorKind::InsufficientStock => "Quantity exceeds available stock",
            ValidationErrorKind::LotNumberRequired => "Lot number is required for this item",
            ValidationErrorKind::ExpiryRequired => "Expiry date is required for this item",
            ValidationErrorKind::InvalidDateRange => "Expiry date is before manufacture date",
            ValidationErrorKind::FutureManufactureDate => "Manufacture date is in the future",
        }
    }

    pub fn message_vi(&self) -> &'static str {
        match self {
            ValidationErrorKind::EmptyDocument => "Phiếu phải có ít nhất một dòng",
            ValidationErrorKind::ReasonRequired => "Phiếu xuất phải có lý do",
            ValidationErrorKind::LineKindMismatch => "Loại dòng không khớp với loại phiếu",
            ValidationErrorKind::ItemNotFound => "Vật tư không tồn tại hoặc đã ngừng sử dụng",
            ValidationErrorKind::InvalidQuantity => "Số lượng phải lớn hơn 0",
            ValidationErrorKind::InvalidPrice => "Đơn giá không được âm",
            ValidationErrorKind::InsufficientStock => "Số lượng vượt quá tồn kho khả dụng",
            ValidationErrorKind::LotNumberRequired => "Vật tư này bắt buộc nhập số lô",
            ValidationErrorKind::ExpiryRequired => "Vật tư này bắt buộc nhập hạn sử dụng",
            ValidationErrorKind::InvalidDateRange => "Hạn sử dụng trước ngày sản xuất",
            ValidationErrorKind::FutureManufactureDate => "Ngày sản xuất nằm trong tương lai",
        }
    }
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message_en())
    }
}

/// Non-blocking findings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ValidationWarningKind {
    /// The received lot is already past its expiry date
    ExpiredOnIntake,
}

/// A blocking failure; `line_index` is `None` for document-level rules
#[derive(Debug, Clone, Copy, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("{}{kind}", .line_index.map(|index| format!("line {}: ", index)).unwrap_or_default())]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub line_index: Option<usize>,
}

impl ValidationError {
    pub fn document(kind: ValidationErrorKind) -> Self {
        Self {
            kind,
            line_index: None,
        }
    }

    pub fn line(kind: ValidationErrorKind, line_index: usize) -> Self {
        Self {
            kind,
            line_index: Some(line_index),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationWarning {
    pub kind: ValidationWarningKind,
    pub line_index: usize,
}

/// Result of validating a document.
///
/// `errors` holds at most one entry since evaluation stops at the first
/// failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn first_error(&self) -> Option<ValidationError> {
        self.errors.first().copied()
    }

    /// Convert into the warnings on success or the blocking error
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ValidationError> {
        match self.errors.first() {
            Some(error) => Err(*error),
            None => Ok(self.warnings),
        }
    }
}

// ============================================================================
// Stock view
// ============================================================================

/// Read access to catalog constraints and available stock
pub trait StockView {
    /// `None` when the item is unknown or inactive
    fn constraints(&self, item_id: Uuid) -> Option<ItemConstraints>;

    fn available_qty(&self, item_id: Uuid) -> i64;
}

/// Point-in-time copy of the constraints and stock of a set of items
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StockSnapshot {
    pub items: HashMap<Uuid, ItemConstraints>,
    pub available: HashMap<Uuid, i64>,
}

impl StockSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, item_id: Uuid, constraints: ItemConstraints, available_qty: i64) -> Self {
        self.insert(item_id, constraints, available_qty);
        self
    }

    pub fn insert(&mut self, item_id: Uuid, constraints: ItemConstraints, available_qty: i64) {
        self.items.insert(item_id, constraints);
        self.available.insert(item_id, available_qty);
    }
}

impl StockView for StockSnapshot {
    fn constraints(&self, item_id: Uuid) -> Option<ItemConstraints> {
        self.items.get(&item_id).copied()
    }

    fn available_qty(&self, item_id: Uuid) -> i64 {
        self.available.get(&item_id).copied().unwrap_or(0)
    }
}

// ============================================================================
// Rules
// ============================================================================

/// Validate a movement document against catalog constraints and stock.
///
/// Pure: the same document and view always give the same report.
pub fn validate_document<V: StockView + ?Sized>(
    document: &MovementDocument,
    view: &V,
    today: NaiveDate,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    if let Err(error) = check_document(document) {
        report.errors.push(error);
        return report;
    }

    for (index, line) in document.lines.iter().enumerate() {
        if let Err(kind) = check_line(document.kind, line, view, today, index, &mut report.warnings) {
            report.errors.push(ValidationError::line(kind, index));
            break;
        }
    }

    report
}

fn check_document(document: &MovementDocument) -> Result<(), ValidationError> {
    if document.lines.is_empty() {
        return Err(ValidationError::document(ValidationErrorKind::EmptyDocument));
    }
    if document.kind == MovementKind::Issue && !is_present(document.reason.as_deref()) {
        return Err(ValidationError::document(ValidationErrorKind::ReasonRequired));
    }
    Ok(())
}

fn check_line<V: StockView + ?Sized>(
    kind: MovementKind,
    line: &MovementLine,
    view: &V,
    today: NaiveDate,
    index: usize,
    warnings: &mut Vec<ValidationWarning>,
) -> Result<(), ValidationErrorKind> {
    if line.kind() != kind {
        return Err(ValidationErrorKind::LineKindMismatch);
    }

    let item_id = line.item_id();
    let constraints = view
        .constraints(item_id)
        .ok_or(ValidationErrorKind::ItemNotFound)?;

    if line.resolved_quantity() <= 0 {
        return Err(ValidationErrorKind::InvalidQuantity);
    }
    if line.unit_price() < Decimal::ZERO {
        return Err(ValidationErrorKind::InvalidPrice);
    }

    match line {
        // Lines are checked one by one against current stock, never netted
        MovementLine::Issue(issue) => {
            // Issuing may settle for less than requested, never more
            if issue.resolved_quantity > issue.requested_quantity {
                return Err(ValidationErrorKind::InvalidQuantity);
            }
            if issue.resolved_quantity > view.available_qty(item_id) {
                return Err(ValidationErrorKind::InsufficientStock);
            }
        }
        MovementLine::Receipt(receipt) => {
            if constraints.requires_lot_tracking {
                if !is_present(receipt.lot_number.as_deref()) {
                    return Err(ValidationErrorKind::LotNumberRequired);
                }
                if constraints.requires_expiry && receipt.expiry_date.is_none() {
                    return Err(ValidationErrorKind::ExpiryRequired);
                }
            }

            // Date rules only apply when both dates are known
            if let (Some(manufacture), Some(expiry)) = (receipt.manufacture_date, receipt.expiry_date) {
                if expiry < manufacture {
                    return Err(ValidationErrorKind::InvalidDateRange);
                }
                if manufacture > today {
                    return Err(ValidationErrorKind::FutureManufactureDate);
                }
            }

            if receipt.expiry_date.is_some_and(|expiry| expiry < today) {
                warnings.push(ValidationWarning {
                    kind: ValidationWarningKind::ExpiredOnIntake,
                    line_index: index,
                });
            }
        }
    }

    Ok(())
}

fn is_present(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentStatus, IssueLine, ReceiptLine};
    use chrono::Utc;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tracked() -> ItemConstraints {
        ItemConstraints {
            requires_lot_tracking: true,
            requires_expiry: true,
            min_qty: 0,
            max_qty: 0,
        }
    }

    fn document(kind: MovementKind, lines: Vec<MovementLine>) -> MovementDocument {
        let now = Utc::now();
        MovementDocument {
            id: Uuid::new_v4(),
            code: "PN-2025-0001".to_string(),
            kind,
            warehouse_id: Uuid::new_v4(),
            counterparty_id: None,
            movement_date: today(),
            reason: Some("Cấp phát khoa Nội".to_string()),
            notes: None,
            status: DocumentStatus::Draft,
            lines,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            approved_at: None,
            cancelled_at: None,
        }
    }

    fn receipt(item_id: Uuid, qty: i64, lot: Option<&str>, expiry: Option<NaiveDate>) -> MovementLine {
        MovementLine::Receipt(ReceiptLine {
            item_id,
            quantity: qty,
            unit_price: Decimal::new(1500, 2),
            lot_number: lot.map(str::to_string),
            manufacture_date: None,
            expiry_date: expiry,
            lot_id: None,
        })
    }

    fn issue(item_id: Uuid, qty: i64) -> MovementLine {
        MovementLine::Issue(IssueLine {
            item_id,
            requested_quantity: qty,
            resolved_quantity: qty,
            unit_price: Decimal::ZERO,
            allocations: vec![],
        })
    }

    fn error_of(report: &ValidationReport) -> Option<(ValidationErrorKind, Option<usize>)> {
        report.first_error().map(|e| (e.kind, e.line_index))
    }

    #[test]
    fn test_empty_document_rejected() {
        let view = StockSnapshot::new();
        let report = validate_document(&document(MovementKind::Receipt, vec![]), &view, today());
        assert_eq!(error_of(&report), Some((ValidationErrorKind::EmptyDocument, None)));
    }

    #[test]
    fn test_issue_requires_reason() {
        let item = Uuid::new_v4();
        let view = StockSnapshot::new().with_item(item, tracked(), 10);
        let mut doc = document(MovementKind::Issue, vec![issue(item, 1)]);
        doc.reason = Some("   ".to_string());
        let report = validate_document(&doc, &view, today());
        assert_eq!(error_of(&report), Some((ValidationErrorKind::ReasonRequired, None)));
    }

    #[test]
    fn test_unknown_item_rejected() {
        let view = StockSnapshot::new();
        let doc = document(MovementKind::Receipt, vec![receipt(Uuid::new_v4(), 1, Some("L1"), Some(date(2026, 1, 1)))]);
        let report = validate_document(&doc, &view, today());
        assert_eq!(error_of(&report), Some((ValidationErrorKind::ItemNotFound, Some(0))));
    }

    #[test]
    fn test_quantity_and_price_rules() {
        let item = Uuid::new_v4();
        let view = StockSnapshot::new().with_item(item, ItemConstraints::default(), 0);

        let doc = document(MovementKind::Receipt, vec![receipt(item, 0, None, None)]);
        assert_eq!(
            error_of(&validate_document(&doc, &view, today())),
            Some((ValidationErrorKind::InvalidQuantity, Some(0)))
        );

        let mut line = receipt(item, 1, None, None);
        if let MovementLine::Receipt(r) = &mut line {
            r.unit_price = Decimal::new(-1, 0);
        }
        let doc = document(MovementKind::Receipt, vec![line]);
        assert_eq!(
            error_of(&validate_document(&doc, &view, today())),
            Some((ValidationErrorKind::InvalidPrice, Some(0)))
        );
    }

    #[test]
    fn test_mandatory_lot_fields() {
        let item = Uuid::new_v4();
        let view = StockSnapshot::new().with_item(item, tracked(), 0);

        let doc = document(MovementKind::Receipt, vec![receipt(item, 5, Some(""), Some(date(2026, 1, 1)))]);
        assert_eq!(
            error_of(&validate_document(&doc, &view, today())),
            Some((ValidationErrorKind::LotNumberRequired, Some(0)))
        );

        let doc = document(MovementKind::Receipt, vec![receipt(item, 5, Some("L1"), None)]);
        assert_eq!(
            error_of(&validate_document(&doc, &view, today())),
            Some((ValidationErrorKind::ExpiryRequired, Some(0)))
        );

        let untracked = Uuid::new_v4();
        let view = view.with_item(untracked, ItemConstraints::default(), 0);
        let doc = document(MovementKind::Receipt, vec![receipt(untracked, 5, None, None)]);
        assert!(validate_document(&doc, &view, today()).is_valid());
    }

    #[test]
    fn test_expiry_only_enforced_with_lot_tracking() {
        let item = Uuid::new_v4();
        let constraints = ItemConstraints {
            requires_lot_tracking: false,
            requires_expiry: true,
            ..Default::default()
        };
        let view = StockSnapshot::new().with_item(item, constraints, 0);
        let doc = document(MovementKind::Receipt, vec![receipt(item, 5, None, None)]);
        assert!(validate_document(&doc, &view, today()).is_valid());
    }

    #[test]
    fn test_date_rules() {
        let item = Uuid::new_v4();
        let view = StockSnapshot::new().with_item(item, ItemConstraints::default(), 0);

        let mut line = receipt(item, 1, None, Some(date(2025, 1, 1)));
        if let MovementLine::Receipt(r) = &mut line {
            r.manufacture_date = Some(date(2025, 2, 1));
        }
        let doc = document(MovementKind::Receipt, vec![line]);
        assert_eq!(
            error_of(&validate_document(&doc, &view, today())),
            Some((ValidationErrorKind::InvalidDateRange, Some(0)))
        );

        let mut line = receipt(item, 1, None, Some(date(2027, 1, 1)));
        if let MovementLine::Receipt(r) = &mut line {
            r.manufacture_date = Some(date(2025, 6, 2));
        }
        let doc = document(MovementKind::Receipt, vec![line]);
        assert_eq!(
            error_of(&validate_document(&doc, &view, today())),
            Some((ValidationErrorKind::FutureManufactureDate, Some(0)))
        );
    }

    #[test]
    fn test_future_manufacture_date_without_expiry_accepted() {
        let item = Uuid::new_v4();
        let view = StockSnapshot::new().with_item(item, ItemConstraints::default(), 0);

        let mut line = receipt(item, 1, None, None);
        if let MovementLine::Receipt(r) = &mut line {
            r.manufacture_date = Some(date(2099, 1, 1));
        }
        let report = validate_document(&document(MovementKind::Receipt, vec![line]), &view, today());
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_issue_cannot_resolve_more_than_requested() {
        let item = Uuid::new_v4();
        let view = StockSnapshot::new().with_item(item, ItemConstraints::default(), 100);

        let mut line = issue(item, 5);
        if let MovementLine::Issue(i) = &mut line {
            i.resolved_quantity = 6;
        }
        let doc = document(MovementKind::Issue, vec![line]);
        assert_eq!(
            error_of(&validate_document(&doc, &view, today())),
            Some((ValidationErrorKind::InvalidQuantity, Some(0)))
        );

        let mut line = issue(item, 5);
        if let MovementLine::Issue(i) = &mut line {
            i.resolved_quantity = 3;
        }
        let doc = document(MovementKind::Issue, vec![line]);
        assert!(validate_document(&doc, &view, today()).is_valid());
    }

    #[test]
    fn test_validation_error_display() {
        assert_eq!(
            ValidationError::line(ValidationErrorKind::InsufficientStock, 2).to_string(),
            format!("line 2: {}", ValidationErrorKind::InsufficientStock)
        );
        assert_eq!(
            ValidationError::document(ValidationErrorKind::EmptyDocument).to_string(),
            ValidationErrorKind::EmptyDocument.to_string()
        );
    }

    #[test]
    fn test_expired_on_intake_is_warning() {
        let item = Uuid::new_v4();
        let view = StockSnapshot::new().with_item(item, tracked(), 0);
        let doc = document(
            MovementKind::Receipt,
            vec![
                receipt(item, 1, Some("L1"), Some(date(2026, 1, 1))),
                receipt(item, 1, Some("L2"), Some(date(2025, 5, 31))),
            ],
        );
        let report = validate_document(&doc, &view, today());
        assert!(report.is_valid());
        assert_eq!(
            report.warnings,
            vec![ValidationWarning {
                kind: ValidationWarningKind::ExpiredOnIntake,
                line_index: 1
            }]
        );
    }

    #[test]
    fn test_issue_lines_not_netted() {
        let item = Uuid::new_v4();
        let view = StockSnapshot::new().with_item(item, tracked(), 10);

        let doc = document(MovementKind::Issue, vec![issue(item, 6), issue(item, 6)]);
        assert!(validate_document(&doc, &view, today()).is_valid());

        let doc = document(MovementKind::Issue, vec![issue(item, 6), issue(item, 11)]);
        assert_eq!(
            error_of(&validate_document(&doc, &view, today())),
            Some((ValidationErrorKind::InsufficientStock, Some(1)))
        );
    }

    #[test]
    fn test_first_failure_wins() {
        let item = Uuid::new_v4();
        let view = StockSnapshot::new().with_item(item, tracked(), 0);
        let doc = document(
            MovementKind::Receipt,
            vec![
                receipt(item, 1, Some("L1"), Some(date(2026, 1, 1))),
                receipt(item, -1, None, None),
                receipt(Uuid::new_v4(), 1, None, None),
            ],
        );
        let report = validate_document(&doc, &view, today());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(error_of(&report), Some((ValidationErrorKind::InvalidQuantity, Some(1))));
    }

    #[test]
    fn test_line_kind_must_match_document() {
        let item = Uuid::new_v4();
        let view = StockSnapshot::new().with_item(item, tracked(), 10);
        let doc = document(MovementKind::Issue, vec![receipt(item, 1, Some("L1"), Some(date(2026, 1, 1)))]);
        assert_eq!(
            error_of(&validate_document(&doc, &view, today())),
            Some((ValidationErrorKind::LineKindMismatch, Some(0)))
        );
    }

    #[test]
    fn test_into_result() {
        let report = ValidationReport {
            errors: vec![ValidationError::line(ValidationErrorKind::InsufficientStock, 2)],
            warnings: vec![],
        };
        let error = report.into_result().unwrap_err();
        assert_eq!(error.to_string(), "line 2: Quantity exceeds available stock");
    }
}
