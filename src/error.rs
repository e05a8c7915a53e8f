//! Error types for segmented object transfer
//!
//! One taxonomy is shared by the store, the coordinator and the requester so
//! that a failure raised on the serving side reaches the resolving caller with
//! the same variant, whether the channel between them is in-process or HTTP.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;

/// Transfer error type
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object id: {0:?}")]
    InvalidId(String),

    #[error("Object id already used: {0}")]
    DuplicateId(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Object must be fetched in chunks: {0}")]
    ChunkingRequired(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Chunk {index} unavailable after {attempts} attempts")]
    ChunkUnavailable { index: u32, attempts: u32 },

    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Integrity mismatch: expected sha256 {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("Payload too large: {size} bytes (limit: {limit})")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransferError {
    /// Whether a request failing with this error may be retried as-is
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Channel(_))
    }

    /// Stable machine-readable code used on the wire
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::InvalidId(_) => ErrorCode::InvalidId,
            Self::DuplicateId(_) => ErrorCode::DuplicateId,
            Self::OutOfRange(_) => ErrorCode::OutOfRange,
            Self::ChunkingRequired(_) => ErrorCode::ChunkingRequired,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::ChunkUnavailable { .. } => ErrorCode::ChunkUnavailable,
            Self::SizeMismatch { .. } => ErrorCode::SizeMismatch,
            Self::IntegrityMismatch { .. } => ErrorCode::IntegrityMismatch,
            Self::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            Self::Channel(_) => ErrorCode::Channel,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidId(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateId(_) => StatusCode::CONFLICT,
            Self::OutOfRange(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::ChunkingRequired(_) => StatusCode::CONFLICT,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::ChunkUnavailable { .. } => StatusCode::BAD_GATEWAY,
            Self::SizeMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::IntegrityMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Channel(_) => StatusCode::BAD_GATEWAY,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to the serializable error body
    pub fn to_body(&self) -> ErrorBody {
        let (index, expected, actual) = match self {
            Self::ChunkUnavailable { index, attempts } => {
                (Some(*index), None, Some(u64::from(*attempts)))
            }
            Self::SizeMismatch { expected, actual } => (None, Some(*expected), Some(*actual)),
            Self::PayloadTooLarge { size, limit } => (None, Some(*limit), Some(*size)),
            _ => (None, None, None),
        };

        ErrorBody {
            code: self.code(),
            error: self.to_string(),
            detail: self.detail(),
            index,
            expected,
            actual,
        }
    }

    /// The free-form payload of string-carrying variants
    fn detail(&self) -> Option<String> {
        match self {
            Self::NotFound(s)
            | Self::InvalidId(s)
            | Self::DuplicateId(s)
            | Self::OutOfRange(s)
            | Self::ChunkingRequired(s)
            | Self::Channel(s)
            | Self::InvalidConfig(s)
            | Self::Internal(s) => Some(s.clone()),
            Self::IntegrityMismatch { expected, actual } => Some(format!("{}:{}", expected, actual)),
            _ => None,
        }
    }
}

// ============================================================================
// Wire Representation
// ============================================================================

/// Machine-readable error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    InvalidId,
    DuplicateId,
    OutOfRange,
    ChunkingRequired,
    Timeout,
    ChunkUnavailable,
    SizeMismatch,
    IntegrityMismatch,
    PayloadTooLarge,
    Channel,
    Cancelled,
    InvalidConfig,
    Internal,
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<u64>,
}

impl From<ErrorBody> for TransferError {
    fn from(body: ErrorBody) -> Self {
        let detail = body.detail.unwrap_or(body.error);
        match body.code {
            ErrorCode::NotFound => Self::NotFound(detail),
            ErrorCode::InvalidId => Self::InvalidId(detail),
            ErrorCode::DuplicateId => Self::DuplicateId(detail),
            ErrorCode::OutOfRange => Self::OutOfRange(detail),
            ErrorCode::ChunkingRequired => Self::ChunkingRequired(detail),
            // The remote side never measured our timeout; keep it transient
            ErrorCode::Timeout => Self::Channel(detail),
            ErrorCode::ChunkUnavailable => Self::ChunkUnavailable {
                index: body.index.unwrap_or_default(),
                attempts: body.actual.unwrap_or_default() as u32,
            },
            ErrorCode::SizeMismatch => Self::SizeMismatch {
                expected: body.expected.unwrap_or_default(),
                actual: body.actual.unwrap_or_default(),
            },
            ErrorCode::IntegrityMismatch => {
                let (expected, actual) = detail
                    .split_once(':')
                    .map(|(e, a)| (e.to_string(), a.to_string()))
                    .unwrap_or_else(|| (detail.clone(), String::new()));
                Self::IntegrityMismatch { expected, actual }
            }
            ErrorCode::PayloadTooLarge => Self::PayloadTooLarge {
                size: body.actual.unwrap_or_default(),
                limit: body.expected.unwrap_or_default(),
            },
            ErrorCode::Channel => Self::Channel(detail),
            ErrorCode::Cancelled => Self::Cancelled,
            ErrorCode::InvalidConfig => Self::InvalidConfig(detail),
            ErrorCode::Internal => Self::Internal(detail),
        }
    }
}

impl IntoResponse for TransferError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = ?self.code(), "Transfer error: {}", self);
        }
        (status, Json(self.to_body())).into_response()
    }
}
