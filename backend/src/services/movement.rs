//! Movement document service: receipts (phiếu nhập) and issues (phiếu xuất)
//!
//! Drives the document workflow. Submission validates against an advisory
//! stock snapshot; approval re-validates with the ledger-write lock held and
//! applies every lot effect as one unit of work.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    next_status, plan_approval, record_approval, validate_document, DocumentStatus, IssueLine, LinePlan,
    MovementDocument, MovementKind, MovementLine, ReceiptLine, ValidationError, ValidationErrorKind,
    ValidationReport, ValidationWarning, WorkflowAction,
};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::error::{AppError, AppResult};
use crate::store::{DocumentFilter, InventoryStore};

/// Movement service for the document workflow
#[derive(Clone)]
pub struct MovementService {
    store: Arc<dyn InventoryStore>,
    config: LedgerConfig,
}

/// A document line as submitted by a client
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineInput {
    Receipt {
        item_id: Uuid,
        quantity: i64,
        #[serde(default)]
        unit_price: Decimal,
        #[serde(default)]
        lot_number: Option<String>,
        #[serde(default)]
        manufacture_date: Option<NaiveDate>,
        #[serde(default)]
        expiry_date: Option<NaiveDate>,
    },
    Issue {
        item_id: Uuid,
        requested_quantity: i64,
        /// Defaults to the requested quantity
        #[serde(default)]
        resolved_quantity: Option<i64>,
        #[serde(default)]
        unit_price: Decimal,
    },
}

impl From<LineInput> for MovementLine {
    fn from(input: LineInput) -> Self {
        match input {
            LineInput::Receipt {
                item_id,
                quantity,
                unit_price,
                lot_number,
                manufacture_date,
                expiry_date,
            } => MovementLine::Receipt(ReceiptLine {
                item_id,
                quantity,
                unit_price,
                lot_number,
                manufacture_date,
                expiry_date,
                lot_id: None,
            }),
            LineInput::Issue {
                item_id,
                requested_quantity,
                resolved_quantity,
                unit_price,
            } => MovementLine::Issue(IssueLine {
                item_id,
                requested_quantity,
                resolved_quantity: resolved_quantity.unwrap_or(requested_quantity),
                unit_price,
                allocations: Vec::new(),
            }),
        }
    }
}

/// Input for creating a document
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDocumentInput {
    pub kind: MovementKind,
    pub warehouse_id: Uuid,
    pub counterparty_id: Option<Uuid>,
    /// Defaults to today
    pub movement_date: Option<NaiveDate>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub lines: Vec<LineInput>,
}

/// Input for editing a draft; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDocumentInput {
    pub warehouse_id: Option<Uuid>,
    pub counterparty_id: Option<Uuid>,
    pub movement_date: Option<NaiveDate>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub lines: Option<Vec<LineInput>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelDocumentInput {
    pub reason: String,
}

/// A document after a transition, with any non-blocking findings
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub document: MovementDocument,
    pub warnings: Vec<ValidationWarning>,
}

impl MovementService {
    pub fn new(store: Arc<dyn InventoryStore>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Create a document in DRAFT with a fresh PN-/PX- code
    pub async fn create_document(&self, input: CreateDocumentInput) -> AppResult<MovementDocument> {
        let now = Utc::now();
        let movement_date = input.movement_date.unwrap_or_else(|| self.config.today());
        let code = self
            .store
            .next_document_code(input.kind, movement_date.year())
            .await?;

        let document = MovementDocument {
            id: Uuid::new_v4(),
            code,
            kind: input.kind,
            warehouse_id: input.warehouse_id,
            counterparty_id: input.counterparty_id,
            movement_date,
            reason: input.reason,
            notes: input.notes,
            status: DocumentStatus::Draft,
            lines: input.lines.into_iter().map(MovementLine::from).collect(),
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            approved_at: None,
            cancelled_at: None,
        };

        self.store.insert_document(&document).await?;
        tracing::info!(document_id = %document.id, code = %document.code, "Movement document created");
        Ok(document)
    }

    pub async fn get_document(&self, document_id: Uuid) -> AppResult<MovementDocument> {
        self.store
            .get_document(document_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Document".to_string()))
    }

    pub async fn list_documents(&self, filter: DocumentFilter) -> AppResult<Vec<MovementDocument>> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(AppError::InvalidInput {
                    field: "from".to_string(),
                    message: "Date range start is after its end".to_string(),
                    message_vi: "Ngày bắt đầu sau ngày kết thúc".to_string(),
                });
            }
        }
        self.store.list_documents(&filter).await
    }

    /// Edit the header or replace the lines of a DRAFT document
    pub async fn update_document(&self, document_id: Uuid, input: UpdateDocumentInput) -> AppResult<MovementDocument> {
        let mut document = self.get_document(document_id).await?;
        next_status(document.status, WorkflowAction::Edit)?;

        if let Some(warehouse_id) = input.warehouse_id {
            document.warehouse_id = warehouse_id;
        }
        if let Some(counterparty_id) = input.counterparty_id {
            document.counterparty_id = Some(counterparty_id);
        }
        if let Some(movement_date) = input.movement_date {
            document.movement_date = movement_date;
        }
        if let Some(reason) = input.reason {
            document.reason = Some(reason);
        }
        if let Some(notes) = input.notes {
            document.notes = Some(notes);
        }
        if let Some(lines) = input.lines {
            document.lines = lines.into_iter().map(MovementLine::from).collect();
        }
        document.updated_at = Utc::now();

        if !self.store.update_document(&document, DocumentStatus::Draft).await? {
            return Err(self.lost_race(document_id, WorkflowAction::Edit).await);
        }
        Ok(document)
    }

    /// Dry-run validation against current stock; changes nothing
    pub async fn validate_document(&self, document_id: Uuid) -> AppResult<ValidationReport> {
        let document = self.get_document(document_id).await?;
        let snapshot = self.store.stock_snapshot(&document.item_ids()).await?;
        Ok(validate_document(&document, &snapshot, self.config.today()))
    }

    /// DRAFT -> PENDING_APPROVAL once the document validates
    pub async fn submit(&self, document_id: Uuid) -> AppResult<TransitionOutcome> {
        let mut document = self.get_document(document_id).await?;
        let status = next_status(document.status, WorkflowAction::Submit)?;

        let snapshot = self.store.stock_snapshot(&document.item_ids()).await?;
        let warnings = validate_document(&document, &snapshot, self.config.today())
            .into_result()
            .map_err(AppError::Validation)?;

        let now = Utc::now();
        document.status = status;
        document.submitted_at = Some(now);
        document.updated_at = now;

        if !self.store.update_document(&document, DocumentStatus::Draft).await? {
            return Err(self.lost_race(document_id, WorkflowAction::Submit).await);
        }

        tracing::info!(document_id = %document.id, code = %document.code, "Movement document submitted");
        Ok(TransitionOutcome { document, warnings })
    }

    /// PENDING_APPROVAL -> APPROVED, applying the document to the lot ledger.
    ///
    /// Runs as one unit of work: the document is re-validated with the
    /// ledger-write lock held, and any failure discards every lot change.
    pub async fn approve(&self, document_id: Uuid) -> AppResult<TransitionOutcome> {
        let mut unit = self.store.begin_approval().await?;

        let mut document = unit
            .load_document(document_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Document".to_string()))?;
        next_status(document.status, WorkflowAction::Approve)?;

        let snapshot = unit.lock_items(&document.item_ids()).await?;
        let warnings = validate_document(&document, &snapshot, self.config.today())
            .into_result()
            .map_err(|error| {
                tracing::warn!(
                    document_id = %document.id,
                    error = %error,
                    "Approval re-validation failed"
                );
                AppError::ConcurrencyConflict(error)
            })?;

        let mut allocatable = HashMap::new();
        for line in &document.lines {
            if let MovementLine::Issue(issue) = line {
                if !allocatable.contains_key(&issue.item_id) {
                    allocatable.insert(issue.item_id, unit.allocatable(issue.item_id).await?);
                }
            }
        }

        let plan = plan_approval(&document, &allocatable).map_err(|shortfall| {
            tracing::warn!(
                document_id = %document.id,
                line_index = shortfall.line_index,
                shortfall = shortfall.shortfall,
                "Approval rolled back: cumulative issue exceeds stock"
            );
            AppError::Validation(ValidationError::line(
                ValidationErrorKind::InsufficientStock,
                shortfall.line_index,
            ))
        })?;

        let now = Utc::now();
        let mut created_lot_ids = Vec::new();
        for (line_index, step) in plan.steps.iter().enumerate() {
            match step {
                LinePlan::CreateLot(new_lot) => created_lot_ids.push(unit.create_lot(new_lot, now).await?),
                LinePlan::Consume(allocations) => {
                    for allocation in allocations {
                        unit.consume(allocation.lot_id, allocation.quantity)
                            .await
                            .map_err(|e| match e {
                                AppError::InsufficientLotQuantity(_) | AppError::NotFound(_) => {
                                    AppError::ConcurrencyConflict(ValidationError::line(
                                        ValidationErrorKind::InsufficientStock,
                                        line_index,
                                    ))
                                }
                                other => other,
                            })?;
                    }
                }
            }
        }

        record_approval(&mut document, &plan, &created_lot_ids, now);
        unit.save_document(&document).await?;
        unit.commit().await?;

        tracing::info!(
            document_id = %document.id,
            code = %document.code,
            kind = %document.kind,
            lots_created = created_lot_ids.len(),
            "Movement document approved"
        );
        Ok(TransitionOutcome { document, warnings })
    }

    /// DRAFT or PENDING_APPROVAL -> CANCELLED; no ledger effect
    pub async fn cancel(&self, document_id: Uuid, reason: &str) -> AppResult<MovementDocument> {
        let mut document = self.get_document(document_id).await?;
        let previous = document.status;
        document.status = next_status(previous, WorkflowAction::Cancel)?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::InvalidInput {
                field: "reason".to_string(),
                message: "A cancellation reason is required".to_string(),
                message_vi: "Vui lòng nhập lý do hủy phiếu".to_string(),
            });
        }

        let now = Utc::now();
        document.cancel_reason = Some(reason.to_string());
        document.cancelled_at = Some(now);
        document.updated_at = now;

        if !self.store.update_document(&document, previous).await? {
            return Err(self.lost_race(document_id, WorkflowAction::Cancel).await);
        }

        tracing::info!(document_id = %document.id, code = %document.code, "Movement document cancelled");
        Ok(document)
    }

    /// Delete a DRAFT or CANCELLED document
    pub async fn delete_document(&self, document_id: Uuid) -> AppResult<()> {
        let document = self.get_document(document_id).await?;
        next_status(document.status, WorkflowAction::Delete)?;

        if !self.store.delete_document(document_id, document.status).await? {
            return Err(self.lost_race(document_id, WorkflowAction::Delete).await);
        }

        tracing::info!(document_id = %document.id, code = %document.code, "Movement document deleted");
        Ok(())
    }

    /// Error for a conditional write that lost to a concurrent transition
    async fn lost_race(&self, document_id: Uuid, action: WorkflowAction) -> AppError {
        match self.store.get_document(document_id).await {
            Ok(Some(document)) => match next_status(document.status, action) {
                Err(err) => err.into(),
                Ok(_) => AppError::StateConflict {
                    from: document.status,
                    action,
                },
            },
            Ok(None) => AppError::NotFound("Document".to_string()),
            Err(err) => err,
        }
    }
}
