use rust_decimal::Decimal;
use sea_orm::error::{DbErr, SqlErr};
use serde::Serialize;

/// Coarse classification of a [`ServiceError`], used by callers that need to
/// decide between retrying, reporting bad input or surfacing an outage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Conflict,
    InsufficientStock,
    NotFound,
    Internal,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Requisition has no line items")]
    EmptyRequisition,

    #[error("Requisition {requisition_id} is {status}, not Approved")]
    NotApproved { requisition_id: i64, status: String },

    #[error("Batch {batch_number} already exists for material variant {variant_id}")]
    DuplicateBatch { variant_id: i64, batch_number: String },

    #[error("Invoice {invoice_number} already recorded for vendor {vendor_id}")]
    DuplicateInvoiceNumber {
        vendor_id: i64,
        invoice_number: String,
    },

    #[error("Concurrent modification of {entity} {id}")]
    ConcurrencyConflict { entity: String, id: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(
        "Insufficient stock for material variant {variant_id}: requested {requested}, available {available}, short by {shortfall}"
    )]
    InsufficientStock {
        variant_id: i64,
        requested: Decimal,
        available: Decimal,
        shortfall: Decimal,
    },

    #[error(
        "Cannot release {requested} of material variant {variant_id}: only {reserved} reserved"
    )]
    OverRelease {
        variant_id: i64,
        requested: Decimal,
        reserved: Decimal,
    },

    #[error(
        "Cannot consume {requested} of material variant {variant_id}: only {reserved} reserved"
    )]
    OverConsume {
        variant_id: i64,
        requested: Decimal,
        reserved: Decimal,
    },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Translates a unique-constraint violation into the domain error produced
    /// by `on_unique`; every other database error passes through unchanged.
    pub fn on_unique_violation(err: DbErr, on_unique: impl FnOnce() -> ServiceError) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => on_unique(),
            _ => ServiceError::DatabaseError(err),
        }
    }

    /// Single source of truth for error classification.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationError(_)
            | Self::InvalidArgument(_)
            | Self::EmptyRequisition
            | Self::NotApproved { .. }
            | Self::InvalidOperation(_) => ErrorCategory::Validation,
            Self::DuplicateBatch { .. }
            | Self::DuplicateInvoiceNumber { .. }
            | Self::ConcurrencyConflict { .. }
            | Self::Conflict(_) => ErrorCategory::Conflict,
            Self::InsufficientStock { .. } | Self::OverRelease { .. } | Self::OverConsume { .. } => {
                ErrorCategory::InsufficientStock
            }
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::DatabaseError(_) | Self::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// True when the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}
