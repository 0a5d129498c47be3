//! Movement document workflow
//!
//! DRAFT -> PENDING_APPROVAL -> APPROVED, with CANCELLED reachable from DRAFT
//! and PENDING_APPROVAL. APPROVED and CANCELLED are terminal. Approval is the
//! only step with ledger effects; [`plan_approval`] turns a validated document
//! into those effects and [`record_approval`] writes the outcome back onto the
//! document.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::{allocate_by_expiry, AllocatableLot};
use crate::models::{DocumentStatus, LotAllocation, MovementDocument, MovementLine, NewLot};

/// Operations that act on a document's status or content
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Submit,
    Approve,
    Cancel,
    Edit,
    Delete,
}

impl std::fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowAction::Submit => write!(f, "submit"),
            WorkflowAction::Approve => write!(f, "approve"),
            WorkflowAction::Cancel => write!(f, "cancel"),
            WorkflowAction::Edit => write!(f, "edit"),
            WorkflowAction::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Approved documents cannot be modified")]
    CannotModifyApproved,

    #[error("Cannot {action} a document in status {from}")]
    InvalidTransition {
        from: DocumentStatus,
        action: WorkflowAction,
    },
}

/// Status after `action`, or why the action is not allowed.
///
/// `Edit` and `Delete` leave the status unchanged when permitted.
pub fn next_status(from: DocumentStatus, action: WorkflowAction) -> Result<DocumentStatus, TransitionError> {
    use DocumentStatus::*;
    use WorkflowAction::*;

    match (from, action) {
        (Draft, Submit) => Ok(PendingApproval),
        (Draft, Edit) => Ok(Draft),
        (Draft, Delete) | (Cancelled, Delete) => Ok(from),
        (PendingApproval, Approve) => Ok(Approved),
        (Draft, Cancel) | (PendingApproval, Cancel) => Ok(Cancelled),
        // Cancelling an approved document is a plain state conflict; every
        // other attempt to touch it is a modification.
        (Approved, Cancel) => Err(TransitionError::InvalidTransition { from, action }),
        (Approved, _) => Err(TransitionError::CannotModifyApproved),
        _ => Err(TransitionError::InvalidTransition { from, action }),
    }
}

// ============================================================================
// Approval planning
// ============================================================================

/// What approval does for one line
#[derive(Debug, Clone, PartialEq)]
pub enum LinePlan {
    CreateLot(NewLot),
    Consume(Vec<LotAllocation>),
}

/// Ledger effects of approving a document, one step per line
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalPlan {
    pub steps: Vec<LinePlan>,
}

/// An issue line the allocatable lots cannot satisfy
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("line {line_index}: item {item_id} is short by {shortfall}")]
pub struct AllocationShortfall {
    pub line_index: usize,
    pub item_id: Uuid,
    pub shortfall: i64,
}

/// Plan the ledger effects of approving `document`.
///
/// `allocatable` holds each issued item's lots in allocation order. Issue
/// lines are allocated cumulatively, so two lines of the same item never
/// draw the same units twice.
pub fn plan_approval(
    document: &MovementDocument,
    allocatable: &HashMap<Uuid, Vec<AllocatableLot>>,
) -> Result<ApprovalPlan, AllocationShortfall> {
    let mut taken: HashMap<Uuid, i64> = HashMap::new();
    let mut steps = Vec::with_capacity(document.lines.len());

    for (line_index, line) in document.lines.iter().enumerate() {
        match line {
            MovementLine::Receipt(receipt) => steps.push(LinePlan::CreateLot(NewLot {
                item_id: receipt.item_id,
                intake_qty: receipt.quantity,
                lot_number: receipt
                    .lot_number
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string),
                manufacture_date: receipt.manufacture_date,
                expiry_date: receipt.expiry_date,
                unit_cost: receipt.unit_price,
                source_document_id: Some(document.id),
            })),
            MovementLine::Issue(issue) => {
                let lots: Vec<AllocatableLot> = allocatable
                    .get(&issue.item_id)
                    .map(Vec::as_slice)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|lot| {
                        let left = lot.remaining_qty - taken.get(&lot.lot_id).copied().unwrap_or(0);
                        (left > 0).then_some(AllocatableLot {
                            remaining_qty: left,
                            ..*lot
                        })
                    })
                    .collect();

                let allocations = allocate_by_expiry(&lots, issue.resolved_quantity).map_err(|shortfall| {
                    AllocationShortfall {
                        line_index,
                        item_id: issue.item_id,
                        shortfall,
                    }
                })?;
                for allocation in &allocations {
                    *taken.entry(allocation.lot_id).or_default() += allocation.quantity;
                }
                steps.push(LinePlan::Consume(allocations));
            }
        }
    }

    Ok(ApprovalPlan { steps })
}

/// Mark `document` approved and record created lot ids and allocations on
/// its lines. `created_lot_ids` are in plan order, one per receipt line.
pub fn record_approval(
    document: &mut MovementDocument,
    plan: &ApprovalPlan,
    created_lot_ids: &[Uuid],
    approved_at: DateTime<Utc>,
) {
    let mut created = created_lot_ids.iter();
    for (line, step) in document.lines.iter_mut().zip(plan.steps.iter()) {
        match (line, step) {
            (MovementLine::Receipt(receipt), LinePlan::CreateLot(_)) => {
                receipt.lot_id = created.next().copied();
            }
            (MovementLine::Issue(issue), LinePlan::Consume(allocations)) => {
                issue.allocations = allocations.clone();
            }
            _ => {}
        }
    }
    document.status = DocumentStatus::Approved;
    document.approved_at = Some(approved_at);
    document.updated_at = approved_at;
}
