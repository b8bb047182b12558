use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::{password::HashError, repository::RepoError};

/// Result alias used by handlers and gateway services.
pub type ApiResult<T> = Result<T, ApiError>;

/// ApiError
///
/// The error taxonomy surfaced to HTTP callers. Every failure inside the gateway
/// is classified into one of these variants before it leaves a handler.
///
/// `InvalidCredentials` and `AccessDenied` both map to 401 with a fixed message:
/// the caller cannot tell why authentication or authorization failed.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing caller input (400).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Login with an unknown email or a wrong password (401).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Authentication or authorization failure (401).
    #[error("access denied")]
    AccessDenied,

    /// A referenced entity does not exist (404).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A uniqueness rule was violated (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage, hashing or runtime failure (500). The message is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

/// ErrorBody
///
/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials | ApiError::AccessDenied => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message that is safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Validation(message) => message.clone(),
            ApiError::InvalidCredentials => "Invalid password or unknown user".to_string(),
            ApiError::AccessDenied => "Access denied".to_string(),
            ApiError::NotFound(resource) => format!("{resource} not found"),
            ApiError::Conflict(message) => message.clone(),
            ApiError::Internal(_) => "Internal error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(error = %detail, "request failed with internal error");
        }

        let body = ErrorBody {
            error: self.public_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => ApiError::NotFound("record"),
            RepoError::Conflict(_) => ApiError::Conflict("resource already exists".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

/// ApiJson
///
/// `Json` request body whose rejections (bad syntax, wrong field types, missing
/// content type) surface as a 400 [`ApiError::Validation`] with the usual error
/// body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

impl From<HashError> for ApiError {
    fn from(err: HashError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failures_share_a_status() {
        assert_eq!(ApiError::AccessDenied.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn internal_detail_is_not_public() {
        let err = ApiError::internal("connection refused on 10.0.0.4:5432");
        assert_eq!(err.public_message(), "Internal error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn repository_errors_are_classified() {
        assert!(matches!(ApiError::from(RepoError::NotFound), ApiError::NotFound(_)));
        assert!(matches!(
            ApiError::from(RepoError::Backend("boom".into())),
            ApiError::Internal(_)
        ));
        assert!(matches!(
            ApiError::from(RepoError::Timeout(std::time::Duration::from_millis(5))),
            ApiError::Internal(_)
        ));
    }
}
