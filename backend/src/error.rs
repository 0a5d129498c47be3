//! Error handling for the hospital warehouse service
//!
//! Provides consistent error responses in English and Vietnamese

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{DocumentStatus, LedgerError, TransitionError, ValidationError, WorkflowAction};
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Movement rule violations
    #[error("Validation error: {0}")]
    Validation(ValidationError),

    #[error("Invalid input: {message}")]
    InvalidInput {
        field: String,
        message: String,
        message_vi: String,
    },

    #[error("Invalid input: {0}")]
    ValidationError(String),

    // Workflow errors
    #[error("Cannot {action} a document in status {from}")]
    StateConflict {
        from: DocumentStatus,
        action: WorkflowAction,
    },

    #[error("Approved documents cannot be modified")]
    CannotModifyApproved,

    #[error("Stock changed since submission: {0}")]
    ConcurrencyConflict(ValidationError),

    // Ledger errors
    #[error("Lot {0} has issued quantity and cannot be deleted")]
    LotHasIssuedQuantity(Uuid),

    #[error("Insufficient lot quantity: {0}")]
    InsufficientLotQuantity(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::CannotModifyApproved => AppError::CannotModifyApproved,
            TransitionError::InvalidTransition { from, action } => AppError::StateConflict { from, action },
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::LotNotFound(_) => AppError::NotFound("Lot".to_string()),
            LedgerError::LotHasIssuedQuantity(lot_id) => AppError::LotHasIssuedQuantity(lot_id),
            LedgerError::InsufficientLotQuantity { .. } => AppError::InsufficientLotQuantity(err.to_string()),
            LedgerError::InvalidIntakeQuantity(_) | LedgerError::InvalidConsumeQuantity(_) => AppError::InvalidInput {
                field: "quantity".to_string(),
                message: err.to_string(),
                message_vi: "Số lượng phải lớn hơn 0".to_string(),
            },
            LedgerError::InvalidDateRange { .. } => AppError::InvalidInput {
                field: "expiry_date".to_string(),
                message: err.to_string(),
                message_vi: "Hạn sử dụng trước ngày sản xuất".to_string(),
            },
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_vi: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_index: Option<usize>,
    /// Underlying validation kind of a concurrency conflict
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ErrorDetail {
    fn new(code: &str, message_en: impl Into<String>, message_vi: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message_en: message_en.into(),
            message_vi: message_vi.into(),
            field: None,
            line_index: None,
            cause: None,
        }
    }
}

impl AppError {
    /// Stable machine-readable code of the error
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(err) => err.kind.code(),
            AppError::InvalidInput { .. } | AppError::ValidationError(_) => "INVALID_INPUT",
            AppError::StateConflict { .. } => "STATE_CONFLICT",
            AppError::CannotModifyApproved => "CANNOT_MODIFY_APPROVED",
            AppError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            AppError::LotHasIssuedQuantity(_) => "LOT_HAS_ISSUED_QUANTITY",
            AppError::InsufficientLotQuantity(_) => "INSUFFICIENT_LOT_QUANTITY",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::DuplicateEntry(_) => "DUPLICATE_ENTRY",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) | AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidInput { .. } | AppError::ValidationError(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::StateConflict { .. }
            | AppError::CannotModifyApproved
            | AppError::ConcurrencyConflict(_)
            | AppError::LotHasIssuedQuantity(_)
            | AppError::InsufficientLotQuantity(_)
            | AppError::DuplicateEntry(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DatabaseError(_)
            | AppError::Internal(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> ErrorDetail {
        let code = self.code();
        match self {
            AppError::Validation(err) => ErrorDetail {
                line_index: err.line_index,
                ..ErrorDetail::new(code, err.kind.message_en(), err.kind.message_vi())
            },
            AppError::InvalidInput {
                field,
                message,
                message_vi,
            } => ErrorDetail {
                field: Some(field.clone()),
                ..ErrorDetail::new(code, message.clone(), message_vi.clone())
            },
            AppError::ValidationError(msg) => {
                ErrorDetail::new(code, msg.clone(), format!("Dữ liệu không hợp lệ: {}", msg))
            }
            AppError::StateConflict { from, action } => ErrorDetail::new(
                code,
                format!("Cannot {} a document in status {}", action, from),
                format!("Không thể thực hiện '{}' với phiếu ở trạng thái {}", action, from),
            ),
            AppError::CannotModifyApproved => ErrorDetail::new(
                code,
                "Approved documents cannot be modified",
                "Phiếu đã duyệt không được phép chỉnh sửa",
            ),
            AppError::ConcurrencyConflict(err) => ErrorDetail {
                line_index: err.line_index,
                cause: Some(err.kind.code().to_string()),
                ..ErrorDetail::new(
                    code,
                    format!("Stock changed since submission ({}). Please retry.", err.kind.message_en()),
                    format!("Tồn kho đã thay đổi sau khi gửi duyệt ({}). Vui lòng thử lại.", err.kind.message_vi()),
                )
            },
            AppError::LotHasIssuedQuantity(lot_id) => ErrorDetail::new(
                code,
                format!("Lot {} has already been issued from and cannot be deleted", lot_id),
                format!("Lô {} đã được xuất kho, không thể xóa", lot_id),
            ),
            AppError::InsufficientLotQuantity(msg) => ErrorDetail::new(
                code,
                msg.clone(),
                format!("Số lượng trong lô không đủ: {}", msg),
            ),
            AppError::NotFound(resource) => ErrorDetail::new(
                code,
                format!("{} not found", resource),
                format!("Không tìm thấy {}", resource),
            ),
            AppError::DuplicateEntry(field) => ErrorDetail {
                field: Some(field.clone()),
                ..ErrorDetail::new(
                    code,
                    format!("A record with this {} already exists", field),
                    format!("Đã tồn tại bản ghi với {} này", field),
                )
            },
            AppError::DatabaseError(_) => ErrorDetail::new(
                code,
                "A database error occurred",
                "Đã xảy ra lỗi cơ sở dữ liệu",
            ),
            AppError::Internal(msg) => ErrorDetail::new(code, msg.clone(), "Lỗi máy chủ nội bộ"),
            AppError::InternalError(_) => ErrorDetail::new(
                code,
                "An internal server error occurred",
                "Lỗi máy chủ nội bộ",
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_detail = self.detail();

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
