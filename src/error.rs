use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::repo::StoreError;
use crate::storage::BlobError;

pub type AppResult<T> = Result<T, AppError>;
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Outcomes of the session, credential and document services.
///
/// Everything except `Internal` is an expected result the caller branches on.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("item not found")]
    NotFound,
    #[error("item already exists")]
    Conflict,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("bad password or login")]
    BadCredentials,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
    #[error("token not found")]
    TokenNotFound,
    #[error("forbidden")]
    Forbidden,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::UniqueViolation => ServiceError::Conflict,
            StoreError::ForeignKeyViolation => {
                ServiceError::invalid_input("referenced login does not exist")
            }
            StoreError::Backend(err) => ServiceError::Internal(err),
        }
    }
}

impl From<BlobError> for ServiceError {
    fn from(value: BlobError) -> Self {
        match value {
            BlobError::NotFound(_) => ServiceError::NotFound,
            BlobError::InvalidName(name) => {
                ServiceError::invalid_input(format!("invalid stored name: {name}"))
            }
            other => ServiceError::Internal(anyhow::Error::new(other)),
        }
    }
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: ErrorBody {
                code: status.as_u16(),
                text: self.message,
            },
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    text: String,
}

impl From<ServiceError> for AppError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::NotFound => AppError::not_found("looks like there is no such item"),
            ServiceError::Conflict => AppError::new(StatusCode::CONFLICT, "item already exists"),
            ServiceError::InvalidInput(message) => AppError::bad_request(message),
            ServiceError::BadCredentials => AppError::unauthorized("wrong password or login"),
            ServiceError::InvalidToken => AppError::unauthorized("token is not authenticated"),
            ServiceError::TokenExpired => AppError::unauthorized("token expired"),
            ServiceError::TokenNotFound => AppError::not_found("token not found"),
            ServiceError::Forbidden => AppError::forbidden("forbidden"),
            ServiceError::Internal(err) => {
                tracing::error!(error = ?err, "unexpected service failure");
                AppError::internal()
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::from(ServiceError::Internal(value))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::from(ServiceError::Internal(anyhow::Error::new(value)))
    }
}
