//! API error types and HTTP response mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to API clients
///
/// Every variant maps to a stable machine-readable code; internal detail
/// (database text, library messages) never reaches the response body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid MFA code")]
    InvalidMfaCode,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Resource not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream identity provider error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            Self::InvalidMfaCode => (StatusCode::FORBIDDEN, "invalid_mfa_code"),
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            Self::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Database text can contain schema details; replace it client-side
        let message = match &self {
            Self::Database(detail) => {
                tracing::error!(detail, "Database error");
                "An internal error occurred".to_string()
            }
            Self::Internal => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db_err) => {
                // 23505 = unique_violation
                if db_err.code().as_deref() == Some("23505") {
                    Self::Conflict("Resource already exists".to_string())
                } else {
                    Self::Database(err.to_string())
                }
            }
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<crate::auth::password::PasswordError> for ApiError {
    fn from(err: crate::auth::password::PasswordError) -> Self {
        // A malformed stored hash is indistinguishable from a wrong password
        // to the client, but worth a trace server-side
        tracing::warn!(error = %err, "Password operation failed");
        Self::InvalidCredentials
    }
}

impl From<crate::auth::jwt::JwtError> for ApiError {
    fn from(err: crate::auth::jwt::JwtError) -> Self {
        use crate::auth::jwt::JwtError;
        match err {
            JwtError::Encoding(detail) => {
                tracing::error!(detail, "Token encoding failed");
                Self::Internal
            }
            JwtError::Expired | JwtError::Invalid | JwtError::WrongTokenType => Self::InvalidToken,
        }
    }
}

impl From<crate::auth::totp::TotpError> for ApiError {
    fn from(err: crate::auth::totp::TotpError) -> Self {
        // All TOTP errors are server-side (bad stored secret, QR encoding);
        // a wrong code is a boolean result, not an error
        tracing::error!(error = %err, "TOTP operation failed");
        Self::Internal
    }
}

impl From<crate::oidc::OidcError> for ApiError {
    fn from(err: crate::oidc::OidcError) -> Self {
        use crate::oidc::OidcError;
        match err {
            OidcError::Upstream(detail) => Self::Upstream(detail),
            OidcError::Unauthorized => Self::Unauthorized,
            OidcError::BadRequest(detail) => Self::BadRequest(detail),
        }
    }
}

/// Convenience result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::InvalidCredentials.status_and_code().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::InvalidMfaCode.status_and_code().0,
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::NotFound.status_and_code().0, StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Conflict("x".into()).status_and_code().0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Upstream("idp down".into()).status_and_code().0,
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_database_detail_never_leaks() {
        let err = ApiError::Database("relation \"users\" does not exist".to_string());
        let (_, code) = err.status_and_code();
        assert_eq!(code, "internal_error");
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_404() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ApiError::NotFound));
    }
}
