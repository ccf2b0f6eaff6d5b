use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::types::ApiResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not registered: {0}")]
    NotRegistered(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Signature invalid")]
    SignatureInvalid,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::AlreadyExists(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotRegistered(_) | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidKeyFormat(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MalformedSignature(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::SignatureInvalid => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CryptoError> for ApiError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidPublicKey(msg) => ApiError::InvalidKeyFormat(msg),
            CryptoError::MalformedSignature(msg) => ApiError::MalformedSignature(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, hint) = match &self {
            ApiError::AlreadyExists(msg) => (
                msg.clone(),
                Some("Usernames are bound to their first public key and cannot be re-registered"),
            ),
            ApiError::NotFound(msg) => (msg.clone(), None),
            ApiError::NotRegistered(msg) => {
                (msg.clone(), Some("Register the username with POST /register first"))
            }
            ApiError::InvalidKeyFormat(msg) => (
                msg.clone(),
                Some("Upload an Ed25519 public key in PEM SubjectPublicKeyInfo format"),
            ),
            ApiError::Unauthorized => (
                "Invalid / expired token".to_string(),
                Some("Include 'Authorization: Bearer <access_token>' from POST /token"),
            ),
            ApiError::MalformedSignature(msg) => (
                msg.clone(),
                Some("Ed25519 signatures are 64 bytes, sent as 128 hex characters"),
            ),
            ApiError::SignatureInvalid => ("INVALID SIGNATURE".to_string(), None),
            ApiError::BadRequest(msg) => (msg.clone(), None),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    "Internal storage error".to_string(),
                    Some("Please try again later or contact the operator"),
                )
            }
        };

        let body = if let Some(h) = hint {
            ApiResponse::<()>::error_with_hint(message, h)
        } else {
            ApiResponse::<()>::error(message)
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
