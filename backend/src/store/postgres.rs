//! PostgreSQL store
//!
//! Approvals run in one transaction. The document row and the rows of every
//! referenced item are locked `FOR UPDATE`, items in ascending id order, so
//! concurrent approvals touching the same item serialize without deadlock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::{
    check_new_lot, generate_document_code, AllocatableLot, DocumentStatus, IssueLine, Item, ItemConstraints,
    LedgerError, Lot, LotAllocation, MovementDocument, MovementKind, MovementLine, NewLot, ReceiptLine,
    StockSnapshot,
};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{ApprovalUnit, DocumentFilter, InventoryStore};
use crate::error::{AppError, AppResult};

const ITEM_COLUMNS: &str = "id, code, name, unit, requires_lot_tracking, requires_expiry, min_qty, max_qty, \
     is_active, created_at, updated_at";

const LOT_COLUMNS: &str = "id, item_id, lot_number, manufacture_date, expiry_date, intake_qty, remaining_qty, \
     unit_cost, source_document_id, created_at";

const DOCUMENT_COLUMNS: &str = "id, code, kind, warehouse_id, counterparty_id, movement_date, reason, notes, status, \
     cancel_reason, created_at, updated_at, submitted_at, approved_at, cancelled_at";

#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    code: String,
    name: String,
    unit: String,
    requires_lot_tracking: bool,
    requires_expiry: bool,
    min_qty: i64,
    max_qty: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: row.id,
            code: row.code,
            name: row.name,
            unit: row.unit,
            requires_lot_tracking: row.requires_lot_tracking,
            requires_expiry: row.requires_expiry,
            min_qty: row.min_qty,
            max_qty: row.max_qty,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct LotRow {
    id: Uuid,
    item_id: Uuid,
    lot_number: Option<String>,
    manufacture_date: Option<NaiveDate>,
    expiry_date: Option<NaiveDate>,
    intake_qty: i64,
    remaining_qty: i64,
    unit_cost: Decimal,
    source_document_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<LotRow> for Lot {
    fn from(row: LotRow) -> Self {
        Lot {
            id: row.id,
            item_id: row.item_id,
            lot_number: row.lot_number,
            manufacture_date: row.manufacture_date,
            expiry_date: row.expiry_date,
            intake_qty: row.intake_qty,
            remaining_qty: row.remaining_qty,
            unit_cost: row.unit_cost,
            source_document_id: row.source_document_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct SnapshotRow {
    id: Uuid,
    requires_lot_tracking: bool,
    requires_expiry: bool,
    min_qty: i64,
    max_qty: i64,
    available_qty: i64,
}

#[derive(Debug, FromRow)]
struct AllocatableRow {
    id: Uuid,
    remaining_qty: i64,
    expiry_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: Uuid,
    code: String,
    kind: String,
    warehouse_id: Uuid,
    counterparty_id: Option<Uuid>,
    movement_date: NaiveDate,
    reason: Option<String>,
    notes: Option<String>,
    status: String,
    cancel_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl DocumentRow {
    fn into_document(self, lines: Vec<MovementLine>) -> AppResult<MovementDocument> {
        let kind = MovementKind::from_str(&self.kind)
            .ok_or_else(|| AppError::Internal(format!("Unknown document kind '{}'", self.kind)))?;
        let status = DocumentStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown document status '{}'", self.status)))?;

        Ok(MovementDocument {
            id: self.id,
            code: self.code,
            kind,
            warehouse_id: self.warehouse_id,
            counterparty_id: self.counterparty_id,
            movement_date: self.movement_date,
            reason: self.reason,
            notes: self.notes,
            status,
            lines,
            cancel_reason: self.cancel_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
            submitted_at: self.submitted_at,
            approved_at: self.approved_at,
            cancelled_at: self.cancelled_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LineRow {
    document_id: Uuid,
    position: i32,
    kind: String,
    item_id: Uuid,
    requested_quantity: i64,
    resolved_quantity: i64,
    unit_price: Decimal,
    lot_number: Option<String>,
    manufacture_date: Option<NaiveDate>,
    expiry_date: Option<NaiveDate>,
    lot_id: Option<Uuid>,
}

impl LineRow {
    fn into_line(self, allocations: Vec<LotAllocation>) -> AppResult<MovementLine> {
        match MovementKind::from_str(&self.kind) {
            Some(MovementKind::Receipt) => Ok(MovementLine::Receipt(ReceiptLine {
                item_id: self.item_id,
                quantity: self.resolved_quantity,
                unit_price: self.unit_price,
                lot_number: self.lot_number,
                manufacture_date: self.manufacture_date,
                expiry_date: self.expiry_date,
                lot_id: self.lot_id,
            })),
            Some(MovementKind::Issue) => Ok(MovementLine::Issue(IssueLine {
                item_id: self.item_id,
                requested_quantity: self.requested_quantity,
                resolved_quantity: self.resolved_quantity,
                unit_price: self.unit_price,
                allocations,
            })),
            None => Err(AppError::Internal(format!("Unknown line kind '{}'", self.kind))),
        }
    }
}

#[derive(Debug, FromRow)]
struct AllocationRow {
    document_id: Uuid,
    position: i32,
    lot_id: Uuid,
    quantity: i64,
}

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_unique_violation(err: sqlx::Error, field: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::DuplicateEntry(field.to_string()),
        _ => AppError::DatabaseError(err),
    }
}

/// Constraints and available quantity of the active items among `item_ids`
async fn read_snapshot(conn: &mut PgConnection, item_ids: &[Uuid]) -> AppResult<StockSnapshot> {
    let rows = sqlx::query_as::<_, SnapshotRow>(
        r#"
        SELECT i.id, i.requires_lot_tracking, i.requires_expiry, i.min_qty, i.max_qty,
               COALESCE((SELECT SUM(l.remaining_qty) FROM lots l WHERE l.item_id = i.id), 0)::BIGINT
                   AS available_qty
        FROM items i
        WHERE i.id = ANY($1) AND i.is_active
        "#,
    )
    .bind(item_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut snapshot = StockSnapshot::new();
    for row in rows {
        let constraints = ItemConstraints {
            requires_lot_tracking: row.requires_lot_tracking,
            requires_expiry: row.requires_expiry,
            min_qty: row.min_qty,
            max_qty: row.max_qty,
        };
        snapshot.insert(row.id, constraints, row.available_qty);
    }
    Ok(snapshot)
}

/// Attach lines and allocations to document rows, preserving row order
async fn load_documents(conn: &mut PgConnection, rows: Vec<DocumentRow>) -> AppResult<Vec<MovementDocument>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();

    let lines = sqlx::query_as::<_, LineRow>(
        r#"
        SELECT document_id, position, kind, item_id, requested_quantity, resolved_quantity, unit_price,
               lot_number, manufacture_date, expiry_date, lot_id
        FROM movement_lines
        WHERE document_id = ANY($1)
        ORDER BY document_id, position
        "#,
    )
    .bind(ids.as_slice())
    .fetch_all(&mut *conn)
    .await?;

    let allocations = sqlx::query_as::<_, AllocationRow>(
        r#"
        SELECT document_id, position, lot_id, quantity
        FROM movement_line_allocations
        WHERE document_id = ANY($1)
        ORDER BY document_id, position, ordinal
        "#,
    )
    .bind(ids.as_slice())
    .fetch_all(&mut *conn)
    .await?;

    let mut allocations_by_line: HashMap<(Uuid, i32), Vec<LotAllocation>> = HashMap::new();
    for row in allocations {
        allocations_by_line
            .entry((row.document_id, row.position))
            .or_default()
            .push(LotAllocation {
                lot_id: row.lot_id,
                quantity: row.quantity,
            });
    }

    let mut lines_by_document: HashMap<Uuid, Vec<MovementLine>> = HashMap::new();
    for row in lines {
        let allocations = allocations_by_line
            .remove(&(row.document_id, row.position))
            .unwrap_or_default();
        let document_id = row.document_id;
        lines_by_document
            .entry(document_id)
            .or_default()
            .push(row.into_line(allocations)?);
    }

    rows.into_iter()
        .map(|row| {
            let lines = lines_by_document.remove(&row.id).unwrap_or_default();
            row.into_document(lines)
        })
        .collect()
}

/// Replace the stored lines of a document
async fn write_lines(conn: &mut PgConnection, document: &MovementDocument) -> AppResult<()> {
    sqlx::query("DELETE FROM movement_lines WHERE document_id = $1")
        .bind(document.id)
        .execute(&mut *conn)
        .await?;

    for (position, line) in document.lines.iter().enumerate() {
        let position = position as i32;
        let (requested, lot_number, manufacture_date, expiry_date, lot_id, allocations) = match line {
            MovementLine::Receipt(receipt) => (
                receipt.quantity,
                receipt.lot_number.as_deref(),
                receipt.manufacture_date,
                receipt.expiry_date,
                receipt.lot_id,
                &[][..],
            ),
            MovementLine::Issue(issue) => (
                issue.requested_quantity,
                None,
                None,
                None,
                None,
                issue.allocations.as_slice(),
            ),
        };

        sqlx::query(
            r#"
            INSERT INTO movement_lines (
                document_id, position, kind, item_id, requested_quantity, resolved_quantity, unit_price,
                lot_number, manufacture_date, expiry_date, lot_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(document.id)
        .bind(position)
        .bind(line.kind().as_str())
        .bind(line.item_id())
        .bind(requested)
        .bind(line.resolved_quantity())
        .bind(line.unit_price())
        .bind(lot_number)
        .bind(manufacture_date)
        .bind(expiry_date)
        .bind(lot_id)
        .execute(&mut *conn)
        .await?;

        for (ordinal, allocation) in allocations.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO movement_line_allocations (document_id, position, ordinal, lot_id, quantity)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(document.id)
            .bind(position)
            .bind(ordinal as i32)
            .bind(allocation.lot_id)
            .bind(allocation.quantity)
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}

/// Overwrite the header of a document, optionally only if its status is
/// still `expected`. Returns the number of rows updated.
async fn write_header(
    conn: &mut PgConnection,
    document: &MovementDocument,
    expected: Option<DocumentStatus>,
) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE movement_documents
        SET warehouse_id = $2, counterparty_id = $3, movement_date = $4, reason = $5, notes = $6,
            status = $7, cancel_reason = $8, updated_at = $9, submitted_at = $10, approved_at = $11,
            cancelled_at = $12
        WHERE id = $1 AND ($13::TEXT IS NULL OR status = $13)
        "#,
    )
    .bind(document.id)
    .bind(document.warehouse_id)
    .bind(document.counterparty_id)
    .bind(document.movement_date)
    .bind(document.reason.as_deref())
    .bind(document.notes.as_deref())
    .bind(document.status.as_str())
    .bind(document.cancel_reason.as_deref())
    .bind(document.updated_at)
    .bind(document.submitted_at)
    .bind(document.approved_at)
    .bind(document.cancelled_at)
    .bind(expected.map(|status| status.as_str()))
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn insert_item(&self, item: &Item) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO items (
                id, code, name, unit, requires_lot_tracking, requires_expiry, min_qty, max_qty,
                is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(item.id)
        .bind(&item.code)
        .bind(&item.name)
        .bind(&item.unit)
        .bind(item.requires_lot_tracking)
        .bind(item.requires_expiry)
        .bind(item.min_qty)
        .bind(item.max_qty)
        .bind(item.is_active)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| map_unique_violation(e, "code"))?;

        Ok(())
    }

    async fn get_item(&self, item_id: Uuid) -> AppResult<Option<Item>> {
        let row = sqlx::query_as::<_, ItemRow>(&format!("SELECT {} FROM items WHERE id = $1", ITEM_COLUMNS))
            .bind(item_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Item::from))
    }

    async fn find_item_by_code(&self, code: &str) -> AppResult<Option<Item>> {
        let row = sqlx::query_as::<_, ItemRow>(&format!("SELECT {} FROM items WHERE code = $1", ITEM_COLUMNS))
            .bind(code)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Item::from))
    }

    async fn list_items(&self) -> AppResult<Vec<Item>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!("SELECT {} FROM items ORDER BY code", ITEM_COLUMNS))
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn update_item(&self, item: &Item) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE items
            SET name = $2, unit = $3, requires_lot_tracking = $4, requires_expiry = $5,
                min_qty = $6, max_qty = $7, is_active = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(item.id)
        .bind(&item.name)
        .bind(&item.unit)
        .bind(item.requires_lot_tracking)
        .bind(item.requires_expiry)
        .bind(item.min_qty)
        .bind(item.max_qty)
        .bind(item.is_active)
        .bind(item.updated_at)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Item".to_string()));
        }
        Ok(())
    }

    async fn get_lot(&self, lot_id: Uuid) -> AppResult<Option<Lot>> {
        let row = sqlx::query_as::<_, LotRow>(&format!("SELECT {} FROM lots WHERE id = $1", LOT_COLUMNS))
            .bind(lot_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Lot::from))
    }

    async fn lots_for_item(&self, item_id: Uuid) -> AppResult<Vec<Lot>> {
        let rows = sqlx::query_as::<_, LotRow>(&format!(
            "SELECT {} FROM lots WHERE item_id = $1 ORDER BY created_at, seq",
            LOT_COLUMNS
        ))
        .bind(item_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Lot::from).collect())
    }

    async fn undepleted_lots(&self) -> AppResult<Vec<Lot>> {
        let rows = sqlx::query_as::<_, LotRow>(&format!(
            "SELECT {} FROM lots WHERE remaining_qty > 0 ORDER BY expiry_date ASC NULLS LAST, created_at",
            LOT_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Lot::from).collect())
    }

    async fn delete_lot(&self, lot_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let quantities = sqlx::query_as::<_, (i64, i64)>(
            "SELECT intake_qty, remaining_qty FROM lots WHERE id = $1 FOR UPDATE",
        )
        .bind(lot_id)
        .fetch_optional(&mut *tx)
        .await?;

        match quantities {
            None => return Err(LedgerError::LotNotFound(lot_id).into()),
            Some((intake, remaining)) if remaining < intake => {
                return Err(LedgerError::LotHasIssuedQuantity(lot_id).into());
            }
            Some(_) => {}
        }

        sqlx::query("DELETE FROM lots WHERE id = $1")
            .bind(lot_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn stock_snapshot(&self, item_ids: &[Uuid]) -> AppResult<StockSnapshot> {
        let mut conn = self.db.acquire().await?;
        read_snapshot(&mut conn, item_ids).await
    }

    async fn next_document_code(&self, kind: MovementKind, year: i32) -> AppResult<String> {
        let sequence = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO document_sequences (kind, year, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (kind, year) DO UPDATE SET last_value = document_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(kind.as_str())
        .bind(year)
        .fetch_one(&self.db)
        .await?;

        Ok(generate_document_code(kind, year, sequence))
    }

    async fn insert_document(&self, document: &MovementDocument) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO movement_documents (
                id, code, kind, warehouse_id, counterparty_id, movement_date, reason, notes, status,
                cancel_reason, created_at, updated_at, submitted_at, approved_at, cancelled_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(document.id)
        .bind(&document.code)
        .bind(document.kind.as_str())
        .bind(document.warehouse_id)
        .bind(document.counterparty_id)
        .bind(document.movement_date)
        .bind(document.reason.as_deref())
        .bind(document.notes.as_deref())
        .bind(document.status.as_str())
        .bind(document.cancel_reason.as_deref())
        .bind(document.created_at)
        .bind(document.updated_at)
        .bind(document.submitted_at)
        .bind(document.approved_at)
        .bind(document.cancelled_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, "code"))?;

        write_lines(&mut tx, document).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_document(&self, document_id: Uuid) -> AppResult<Option<MovementDocument>> {
        let mut conn = self.db.acquire().await?;
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM movement_documents WHERE id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(document_id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(load_documents(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> AppResult<Vec<MovementDocument>> {
        let mut conn = self.db.acquire().await?;
        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            r#"
            SELECT {} FROM movement_documents
            WHERE ($1::TEXT IS NULL OR kind = $1)
              AND ($2::TEXT IS NULL OR status = $2)
              AND ($3::DATE IS NULL OR movement_date >= $3)
              AND ($4::DATE IS NULL OR movement_date <= $4)
            ORDER BY movement_date DESC, created_at DESC
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(filter.kind.map(|kind| kind.as_str()))
        .bind(filter.status.map(|status| status.as_str()))
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&mut *conn)
        .await?;

        load_documents(&mut conn, rows).await
    }

    async fn update_document(&self, document: &MovementDocument, expected: DocumentStatus) -> AppResult<bool> {
        let mut tx = self.db.begin().await?;

        if write_header(&mut tx, document, Some(expected)).await? == 0 {
            return Ok(false);
        }
        write_lines(&mut tx, document).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn delete_document(&self, document_id: Uuid, expected: DocumentStatus) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM movement_documents WHERE id = $1 AND status = $2")
            .bind(document_id)
            .bind(expected.as_str())
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn begin_approval(&self) -> AppResult<Box<dyn ApprovalUnit>> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgApproval { tx }))
    }
}

/// Approval running inside one database transaction; dropping it rolls back
struct PgApproval {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ApprovalUnit for PgApproval {
    async fn load_document(&mut self, document_id: Uuid) -> AppResult<Option<MovementDocument>> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM movement_documents WHERE id = $1 FOR UPDATE",
            DOCUMENT_COLUMNS
        ))
        .bind(document_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(load_documents(&mut self.tx, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn lock_items(&mut self, item_ids: &[Uuid]) -> AppResult<StockSnapshot> {
        sqlx::query("SELECT id FROM items WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(item_ids)
            .execute(&mut *self.tx)
            .await?;

        read_snapshot(&mut self.tx, item_ids).await
    }

    async fn allocatable(&mut self, item_id: Uuid) -> AppResult<Vec<AllocatableLot>> {
        let rows = sqlx::query_as::<_, AllocatableRow>(
            r#"
            SELECT id, remaining_qty, expiry_date, created_at
            FROM lots
            WHERE item_id = $1 AND remaining_qty > 0
            ORDER BY expiry_date ASC NULLS LAST, created_at ASC, seq ASC
            "#,
        )
        .bind(item_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AllocatableLot {
                lot_id: row.id,
                remaining_qty: row.remaining_qty,
                expiry_date: row.expiry_date,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn create_lot(&mut self, new_lot: &NewLot, created_at: DateTime<Utc>) -> AppResult<Uuid> {
        check_new_lot(new_lot)?;

        let lot_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO lots (
                id, item_id, lot_number, manufacture_date, expiry_date, intake_qty, remaining_qty,
                unit_cost, source_document_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7, $8, $9)
            "#,
        )
        .bind(lot_id)
        .bind(new_lot.item_id)
        .bind(new_lot.lot_number.as_deref())
        .bind(new_lot.manufacture_date)
        .bind(new_lot.expiry_date)
        .bind(new_lot.intake_qty)
        .bind(new_lot.unit_cost)
        .bind(new_lot.source_document_id)
        .bind(created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(lot_id)
    }

    async fn consume(&mut self, lot_id: Uuid, quantity: i64) -> AppResult<()> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidConsumeQuantity(quantity).into());
        }

        let result = sqlx::query(
            "UPDATE lots SET remaining_qty = remaining_qty - $2 WHERE id = $1 AND remaining_qty >= $2",
        )
        .bind(lot_id)
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            let remaining = sqlx::query_scalar::<_, i64>("SELECT remaining_qty FROM lots WHERE id = $1")
                .bind(lot_id)
                .fetch_optional(&mut *self.tx)
                .await?;
            return Err(match remaining {
                Some(remaining) => LedgerError::InsufficientLotQuantity {
                    lot_id,
                    requested: quantity,
                    remaining,
                },
                None => LedgerError::LotNotFound(lot_id),
            }
            .into());
        }
        Ok(())
    }

    async fn save_document(&mut self, document: &MovementDocument) -> AppResult<()> {
        write_header(&mut self.tx, document, None).await?;
        write_lines(&mut self.tx, document).await
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let PgApproval { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
