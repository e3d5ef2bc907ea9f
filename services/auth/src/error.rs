//! Authentication error taxonomy

use axum::{
    Json,
    extract::rejection::{FormRejection, JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Too many failed login attempts. Please try again later.")]
    RateLimited,

    /// Deliberately silent about which of identifier or password was wrong
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Two-factor authentication code required")]
    SecondFactorRequired,

    #[error("Invalid two-factor authentication code")]
    InvalidSecondFactor,

    #[error("{0}")]
    Conflict(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl AuthError {
    /// Stable snake_case name used in JSON error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "validation",
            AuthError::RateLimited => "rate_limited",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::SecondFactorRequired => "second_factor_required",
            AuthError::InvalidSecondFactor => "invalid_second_factor",
            AuthError::Conflict(_) => "conflict",
            AuthError::Unauthorized => "unauthorized",
            AuthError::NotFound(_) => "not_found",
            AuthError::Internal(_) => "internal",
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        error!("Authentication infrastructure failure: {:#}", err);
        AuthError::Internal(err)
    }
}

macro_rules! validation_rejection {
    ($($rejection:ty),*) => {
        $(
            impl From<$rejection> for AuthError {
                fn from(rejection: $rejection) -> Self {
                    AuthError::Validation(rejection.body_text())
                }
            }
        )*
    };
}

validation_rejection!(FormRejection, JsonRejection, QueryRejection);

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::Validation(_) | AuthError::InvalidSecondFactor => StatusCode::BAD_REQUEST,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::InvalidCredentials
            | AuthError::SecondFactorRequired
            | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinguishable() {
        assert_eq!(AuthError::RateLimited.kind(), "rate_limited");
        assert_eq!(AuthError::InvalidCredentials.kind(), "invalid_credentials");
        assert_ne!(
            AuthError::SecondFactorRequired.kind(),
            AuthError::InvalidSecondFactor.kind()
        );
    }

    #[test]
    fn infrastructure_errors_hide_details() {
        let err = AuthError::from(anyhow::anyhow!("connection refused"));
        assert_eq!(err.to_string(), "Internal error");
        assert_eq!(err.kind(), "internal");
    }
}
