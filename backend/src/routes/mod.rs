//! Route definitions for the hospital warehouse API

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Item catalog and per-item stock
        .nest("/items", item_routes())
        // Stock reports
        .route("/stock/alerts", get(handlers::get_stock_alerts))
        // Lot ledger
        .nest("/lots", lot_routes())
        // Receipt and issue documents
        .nest("/documents", document_routes())
}

/// Item catalog routes
fn item_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_items).post(handlers::create_item))
        .route("/:item_id", get(handlers::get_item))
        .route("/:item_id/active", put(handlers::set_item_active))
        .route("/:item_id/stock", get(handlers::get_item_stock))
}

/// Lot routes
fn lot_routes() -> Router<AppState> {
    Router::new()
        .route("/expiring", get(handlers::get_expiring_lots))
        .route("/:lot_id", delete(handlers::delete_lot))
        .route("/:lot_id/status", get(handlers::get_lot_status))
}

/// Movement document routes
fn document_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_documents).post(handlers::create_document))
        .route(
            "/:document_id",
            get(handlers::get_document)
                .put(handlers::update_document)
                .delete(handlers::delete_document),
        )
        .route("/:document_id/validate", post(handlers::validate_document))
        .route("/:document_id/submit", post(handlers::submit_document))
        .route("/:document_id/approve", post(handlers::approve_document))
        .route("/:document_id/cancel", post(handlers::cancel_document))
}
