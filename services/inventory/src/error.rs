//! Error types for the inventory service

use axum::{
    Json,
    extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use auth::AuthError;

/// Outcome of a rejected ledger operation; nothing was changed
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i32, available: i32 },

    #[error("Item is not available for rent")]
    NotRentable,

    #[error("Rental has already been returned")]
    AlreadyReturned,

    #[error("Transaction is not a rental")]
    NotARental,

    #[error("Not allowed to act on this rental")]
    Forbidden,

    #[error("No active rental found for this item")]
    NoOpenRental,

    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl LedgerError {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::InsufficientStock { .. } => "insufficient_stock",
            LedgerError::NotRentable => "not_rentable",
            LedgerError::AlreadyReturned => "already_returned",
            LedgerError::NotARental => "not_a_rental",
            LedgerError::Forbidden => "forbidden",
            LedgerError::NoOpenRental => "no_open_rental",
            LedgerError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            LedgerError::Validation(_)
            | LedgerError::InsufficientStock { .. }
            | LedgerError::NotRentable
            | LedgerError::AlreadyReturned
            | LedgerError::NotARental
            | LedgerError::NoOpenRental => StatusCode::BAD_REQUEST,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::Forbidden => StatusCode::FORBIDDEN,
            LedgerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        error!("Inventory storage failure: {:#}", err);
        LedgerError::Internal(err)
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error type returned by the HTTP handlers
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request body, query or path that failed to deserialize
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

macro_rules! rejected {
    ($($rejection:ty),*) => {
        $(
            impl From<$rejection> for ApiError {
                fn from(rejection: $rejection) -> Self {
                    ApiError::Rejected {
                        status: rejection.status(),
                        message: rejection.body_text(),
                    }
                }
            }
        )*
    };
}

rejected!(JsonRejection, FormRejection, QueryRejection, PathRejection);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, kind) = match self {
            ApiError::Ledger(err) => (err.status(), err.to_string(), err.kind()),
            ApiError::Auth(err) => return err.into_response(),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "validation"),
            ApiError::Rejected { status, message } => (status, message, "validation"),
        };

        let body = Json(json!({
            "error": message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rule_errors_are_distinguishable() {
        let short = LedgerError::InsufficientStock {
            requested: 2,
            available: 0,
        };
        assert_eq!(short.kind(), "insufficient_stock");
        assert_eq!(short.status(), StatusCode::BAD_REQUEST);
        assert_ne!(LedgerError::NotRentable.kind(), LedgerError::AlreadyReturned.kind());
        assert_eq!(LedgerError::Forbidden.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn rejections_keep_their_status() {
        let err = ApiError::Rejected {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "missing field `qty`".to_string(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn storage_failures_hide_details() {
        let err = LedgerError::from(anyhow::anyhow!("pool timed out"));
        assert_eq!(err.to_string(), "Internal error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
