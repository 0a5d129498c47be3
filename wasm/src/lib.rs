//! WebAssembly module for the hospital warehouse
//!
//! Lets receipt and issue forms check a document in the browser with the
//! same rules the server re-runs on submit and approve:
//! - Movement document validation against a stock snapshot
//! - Lot status derivation
//! - FIFO-by-expiry allocation preview for issues

use chrono::NaiveDate;
use wasm_bindgen::prelude::*;

use shared::{
    allocate_by_expiry, derive_lot_status, sort_for_allocation, validate_document, AllocatableLot,
    MovementDocument, StockSnapshot, ValidationErrorKind, ValidationReport, ValidationWarningKind,
};

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| format!("Invalid date '{}': {}", value, e))
}

#[cfg(target_arch = "wasm32")]
fn console_warn(message: &str) {
    web_sys::console::warn_1(&JsValue::from_str(message));
}

#[cfg(not(target_arch = "wasm32"))]
fn console_warn(_message: &str) {}

fn validate_movement_report(document_json: &str, snapshot_json: &str, today: &str) -> Result<ValidationReport, String> {
    let document: MovementDocument =
        serde_json::from_str(document_json).map_err(|e| format!("Invalid document JSON: {}", e))?;
    let snapshot: StockSnapshot =
        serde_json::from_str(snapshot_json).map_err(|e| format!("Invalid snapshot JSON: {}", e))?;

    Ok(validate_document(&document, &snapshot, parse_date(today)?))
}

fn has_expired_intake(report: &ValidationReport) -> bool {
    report
        .warnings
        .iter()
        .any(|warning| warning.kind == ValidationWarningKind::ExpiredOnIntake)
}

fn lot_status_str(
    remaining_qty: i64,
    expiry_date: Option<String>,
    today: &str,
    near_expiry_days: i64,
) -> Result<String, String> {
    let expiry = expiry_date.as_deref().map(parse_date).transpose()?;
    let status = derive_lot_status(remaining_qty, expiry, parse_date(today)?, near_expiry_days);
    Ok(status.as_str().to_string())
}

fn preview_allocation_json(lots_json: &str, quantity: i64) -> Result<String, String> {
    let mut lots: Vec<AllocatableLot> =
        serde_json::from_str(lots_json).map_err(|e| format!("Invalid lots JSON: {}", e))?;
    sort_for_allocation(&mut lots);

    let allocations = allocate_by_expiry(&lots, quantity)
        .map_err(|shortfall| format!("Insufficient stock: short by {}", shortfall))?;
    serde_json::to_string(&allocations).map_err(|e| e.to_string())
}

fn error_message_str(kind: &str, lang: &str) -> Option<&'static str> {
    let kind: ValidationErrorKind = serde_json::from_value(serde_json::Value::String(kind.to_string())).ok()?;
    Some(match lang {
        "vi" => kind.message_vi(),
        _ => kind.message_en(),
    })
}

/// Validate a movement document against a stock snapshot.
///
/// Returns the validation report as JSON: `{ errors, warnings }`.
#[wasm_bindgen]
pub fn validate_movement(document_json: &str, snapshot_json: &str, today: &str) -> Result<String, JsValue> {
    let report = validate_movement_report(document_json, snapshot_json, today).map_err(|e| JsValue::from_str(&e))?;

    if has_expired_intake(&report) {
        console_warn("Receipt contains lots already past expiry");
    }

    serde_json::to_string(&report).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Status of a lot: FRESH, NEAR_EXPIRY, EXPIRED or DEPLETED
#[wasm_bindgen]
pub fn lot_status(
    remaining_qty: i64,
    expiry_date: Option<String>,
    today: &str,
    near_expiry_days: i64,
) -> Result<String, JsValue> {
    lot_status_str(remaining_qty, expiry_date, today, near_expiry_days).map_err(|e| JsValue::from_str(&e))
}

/// Preview which lots an issue of `quantity` would draw from.
///
/// Returns `[{ lot_id, quantity }]` as JSON, or an error when stock is short.
#[wasm_bindgen]
pub fn preview_issue_allocation(lots_json: &str, quantity: i64) -> Result<String, JsValue> {
    preview_allocation_json(lots_json, quantity).map_err(|e| JsValue::from_str(&e))
}

/// Localized message for a validation error kind ("en" or "vi")
#[wasm_bindgen]
pub fn validation_message(kind: &str, lang: &str) -> Option<String> {
    error_message_str(kind, lang).map(str::to_string)
}

/// Today's date in the browser's local time, as YYYY-MM-DD
#[wasm_bindgen]
pub fn local_today() -> String {
    let now = js_sys::Date::new_0();
    format!(
        "{:04}-{:02}-{:02}",
        now.get_full_year(),
        now.get_month() + 1,
        now.get_date()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ITEM: &str = "11111111-1111-1111-1111-111111111111";

    fn issue_document(quantity: i64) -> String {
        json!({
            "id": "22222222-2222-2222-2222-222222222222",
            "code": "PX-2025-0001",
            "kind": "issue",
            "warehouse_id": "33333333-3333-3333-3333-333333333333",
            "counterparty_id": null,
            "movement_date": "2025-03-01",
            "reason": "Cấp phát khoa Nhi",
            "notes": null,
            "status": "DRAFT",
            "lines": [{
                "kind": "issue",
                "item_id": ITEM,
                "requested_quantity": quantity,
                "resolved_quantity": quantity,
                "unit_price": "0"
            }],
            "cancel_reason": null,
            "created_at": "2025-03-01T00:00:00Z",
            "updated_at": "2025-03-01T00:00:00Z",
            "submitted_at": null,
            "approved_at": null,
            "cancelled_at": null
        })
        .to_string()
    }

    fn snapshot(available: i64) -> String {
        json!({
            "items": { ITEM: {
                "requires_lot_tracking": false,
                "requires_expiry": false,
                "min_qty": 0,
                "max_qty": 0
            }},
            "available": { ITEM: available }
        })
        .to_string()
    }

    fn receipt_document(expiry: &str) -> String {
        let mut document: serde_json::Value = serde_json::from_str(&issue_document(1)).unwrap();
        document["kind"] = json!("receipt");
        document["lines"] = json!([{
            "kind": "receipt",
            "item_id": ITEM,
            "quantity": 10,
            "unit_price": "1500",
            "lot_number": "L1",
            "manufacture_date": null,
            "expiry_date": expiry
        }]);
        document.to_string()
    }

    #[test]
    fn test_validate_movement() {
        let ok = validate_movement_report(&issue_document(5), &snapshot(10), "2025-03-01").unwrap();
        assert!(ok.is_valid());

        let short = validate_movement_report(&issue_document(50), &snapshot(10), "2025-03-01").unwrap();
        let error = short.first_error().unwrap();
        assert_eq!(error.kind, ValidationErrorKind::InsufficientStock);
        assert_eq!(error.line_index, Some(0));

        let json: serde_json::Value = serde_json::to_value(&short).unwrap();
        assert_eq!(json["errors"][0]["kind"], "InsufficientStock");
    }

    #[test]
    fn test_expired_intake_detected_from_warnings() {
        let expired = validate_movement_report(&receipt_document("2025-01-01"), &snapshot(0), "2025-03-01").unwrap();
        assert!(expired.is_valid());
        assert!(has_expired_intake(&expired));

        let fresh = validate_movement_report(&receipt_document("2026-01-01"), &snapshot(0), "2025-03-01").unwrap();
        assert!(!has_expired_intake(&fresh));
    }

    #[test]
    fn test_validate_movement_rejects_bad_input() {
        assert!(validate_movement_report("{", &snapshot(1), "2025-03-01").is_err());
        assert!(validate_movement_report(&issue_document(1), &snapshot(1), "01/03/2025").is_err());
    }

    #[test]
    fn test_lot_status() {
        assert_eq!(lot_status_str(0, None, "2025-03-01", 30).unwrap(), "DEPLETED");
        assert_eq!(lot_status_str(5, None, "2025-03-01", 30).unwrap(), "FRESH");
        assert_eq!(lot_status_str(5, Some("2025-02-28".into()), "2025-03-01", 30).unwrap(), "EXPIRED");
        assert_eq!(lot_status_str(5, Some("2025-03-20".into()), "2025-03-01", 30).unwrap(), "NEAR_EXPIRY");
        assert_eq!(lot_status_str(5, Some("2025-12-31".into()), "2025-03-01", 30).unwrap(), "FRESH");
    }

    #[test]
    fn test_preview_issue_allocation() {
        let lots = json!([
            { "lot_id": "00000000-0000-0000-0000-000000000003", "remaining_qty": 5,
              "expiry_date": null, "created_at": "2025-01-01T00:00:00Z" },
            { "lot_id": "00000000-0000-0000-0000-000000000002", "remaining_qty": 5,
              "expiry_date": "2024-06-01", "created_at": "2025-01-01T00:00:00Z" },
            { "lot_id": "00000000-0000-0000-0000-000000000001", "remaining_qty": 5,
              "expiry_date": "2024-01-01", "created_at": "2025-01-01T00:00:00Z" }
        ])
        .to_string();

        let allocations: serde_json::Value = serde_json::from_str(&preview_allocation_json(&lots, 8).unwrap()).unwrap();
        assert_eq!(allocations[0]["lot_id"], "00000000-0000-0000-0000-000000000001");
        assert_eq!(allocations[0]["quantity"], 5);
        assert_eq!(allocations[1]["lot_id"], "00000000-0000-0000-0000-000000000002");
        assert_eq!(allocations[1]["quantity"], 3);
        assert_eq!(allocations.as_array().unwrap().len(), 2);

        assert!(preview_allocation_json(&lots, 16).unwrap_err().contains("short by 1"));
    }

    #[test]
    fn test_validation_message() {
        assert_eq!(error_message_str("ExpiryRequired", "en"), Some(ValidationErrorKind::ExpiryRequired.message_en()));
        assert_eq!(error_message_str("ExpiryRequired", "vi"), Some(ValidationErrorKind::ExpiryRequired.message_vi()));
        assert_eq!(error_message_str("NoSuchKind", "en"), None);
    }
}
