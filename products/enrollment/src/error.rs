use platform_api::ApiError;
use rust_decimal::Decimal;
use sea_orm::DbErr;
use serde_json::json;
use thiserror::Error;

pub type EnrollmentResult<T> = Result<T, EnrollmentError>;

#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("{0}")]
    Validation(String),
    #[error("amount exceeds the outstanding total by {excess}")]
    AmountExceedsTotal {
        limit: Decimal,
        requested: Decimal,
        excess: Decimal,
    },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("{0}")]
    Internal(String),
}

impl EnrollmentError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn exceeds(limit: Decimal, requested: Decimal) -> Self {
        Self::AmountExceedsTotal {
            limit,
            requested,
            excess: requested - limit,
        }
    }

    /// Errors that leave stored state untouched and are the caller's to fix.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            EnrollmentError::Database(_) | EnrollmentError::Internal(_)
        )
    }
}

impl From<EnrollmentError> for ApiError {
    fn from(value: EnrollmentError) -> Self {
        match value {
            EnrollmentError::Validation(message) => ApiError::invalid(message),
            EnrollmentError::AmountExceedsTotal {
                limit,
                requested,
                excess,
            } => ApiError::invalid_with(
                format!("amount exceeds the outstanding total by {excess}"),
                json!({
                    "excess": excess.to_string(),
                    "limit": limit.to_string(),
                    "requested": requested.to_string(),
                }),
            ),
            EnrollmentError::NotFound(what) => ApiError::not_found(format!("{what} not found")),
            EnrollmentError::Conflict(message) => ApiError::conflict(message),
            err @ (EnrollmentError::Database(_) | EnrollmentError::Internal(_)) => {
                ApiError::internal(anyhow::Error::new(err))
            }
        }
    }
}
