//! HTTP handlers for movement documents

use axum::{
    extract::{Path, Query, State},
    Json,
};
use shared::{MovementDocument, ValidationReport};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::movement::{
    CancelDocumentInput, CreateDocumentInput, TransitionOutcome, UpdateDocumentInput,
};
use crate::services::MovementService;
use crate::store::DocumentFilter;
use crate::AppState;

fn service(state: AppState) -> MovementService {
    MovementService::new(state.store, state.config.ledger)
}

/// Create a receipt or issue document in DRAFT
pub async fn create_document(
    State(state): State<AppState>,
    Json(input): Json<CreateDocumentInput>,
) -> AppResult<Json<MovementDocument>> {
    let document = service(state).create_document(input).await?;
    Ok(Json(document))
}

/// List documents filtered by kind, status and movement date range
pub async fn list_documents(
    State(state): State<AppState>,
    Query(filter): Query<DocumentFilter>,
) -> AppResult<Json<Vec<MovementDocument>>> {
    let documents = service(state).list_documents(filter).await?;
    Ok(Json(documents))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<MovementDocument>> {
    let document = service(state).get_document(document_id).await?;
    Ok(Json(document))
}

/// Edit a draft
pub async fn update_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(input): Json<UpdateDocumentInput>,
) -> AppResult<Json<MovementDocument>> {
    let document = service(state).update_document(document_id, input).await?;
    Ok(Json(document))
}

/// Delete a draft or cancelled document
pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<()>> {
    service(state).delete_document(document_id).await?;
    Ok(Json(()))
}

/// Validate without changing anything
pub async fn validate_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<ValidationReport>> {
    let report = service(state).validate_document(document_id).await?;
    Ok(Json(report))
}

pub async fn submit_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<TransitionOutcome>> {
    let outcome = service(state).submit(document_id).await?;
    Ok(Json(outcome))
}

pub async fn approve_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<TransitionOutcome>> {
    let outcome = service(state).approve(document_id).await?;
    Ok(Json(outcome))
}

pub async fn cancel_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(input): Json<CancelDocumentInput>,
) -> AppResult<Json<MovementDocument>> {
    let document = service(state).cancel(document_id, &input.reason).await?;
    Ok(Json(document))
}
