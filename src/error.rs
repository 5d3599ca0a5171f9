//! Error types for the ceremony coordinator.
//!
//! Validation errors are split by the component that detects them
//! (`RosterError`, `PayloadError`, `RequestError`) and funnel into the
//! top-level `CeremonyError`, which also implements `ResponseError` for
//! the HTTP surface.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ceremony::payload::PayloadId;
use crate::ceremony::roster::{PeerAddress, PeerId};
use crate::ceremony::types::CeremonyKind;

/// Roster validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RosterError {
    #[error("Roster is empty")]
    EmptyRoster,

    #[error("Duplicate peer in roster: {0}")]
    DuplicatePeer(PeerId),

    #[error("Address {0} is claimed by more than one peer")]
    DuplicateAddress(PeerAddress),

    #[error("Sender {0} is not a member of the roster")]
    SenderNotInRoster(PeerId),
}

/// Ceremony payload validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Message digest is empty")]
    EmptyMessage,

    #[error("Invalid digest length: expected {expected} bytes, got {actual}")]
    InvalidDigestLength { expected: usize, actual: usize },

    #[error("Peer {0} is not part of the key generation roster")]
    KeygenRosterMismatch(PeerId),

    #[error("Key generation roster is empty")]
    EmptyKeygenRoster,
}

/// Request-level validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("Threshold out of range: t={t}, n={n}, roster size {roster_len} (need 1 <= t < n = roster size)")]
    ThresholdOutOfRange { t: u16, n: u16, roster_len: usize },

    #[error("Payload id already used: {0}")]
    DuplicatePayloadId(PayloadId),

    #[error("No completed key generation ceremony for id {0}")]
    UnknownKeygenId(PayloadId),

    #[error("No ceremony recorded for payload id {0}")]
    UnknownPayloadId(PayloadId),

    #[error("Key material does not match key generation ceremony: {0}")]
    KeyMaterialMismatch(String),

    #[error("Wrong payload type: expected {expected}, got {actual}")]
    WrongPayloadType {
        expected: CeremonyKind,
        actual: CeremonyKind,
    },
}

/// Top-level error returned across the coordinator boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CeremonyError {
    #[error(transparent)]
    Request(#[from] RequestError),

    // Opaque pass-through from the signing engine
    #[error("Engine failure: {0}")]
    EngineFailure(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a failure for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request is wrong; fix it before retrying.
    Validation,
    /// The ceremony failed inside the engine; retry with a fresh payload id.
    Engine,
    /// The auth header was rejected.
    Unauthorized,
    /// Coordinator-side fault.
    Internal,
}

/// JSON error body shared by the result envelope and HTTP responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl CeremonyError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Request(_) | Self::MalformedInput(_) => ErrorKind::Validation,
            Self::EngineFailure(_) => ErrorKind::Engine,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Storage(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Request(err) => match err {
                RequestError::Roster(RosterError::EmptyRoster) => "EMPTY_ROSTER",
                RequestError::Roster(RosterError::DuplicatePeer(_)) => "DUPLICATE_PEER",
                RequestError::Roster(RosterError::DuplicateAddress(_)) => "DUPLICATE_ADDRESS",
                RequestError::Roster(RosterError::SenderNotInRoster(_)) => "SENDER_NOT_IN_ROSTER",
                RequestError::Payload(PayloadError::EmptyMessage) => "EMPTY_MESSAGE",
                RequestError::Payload(PayloadError::InvalidDigestLength { .. }) => {
                    "INVALID_DIGEST_LENGTH"
                }
                RequestError::Payload(PayloadError::KeygenRosterMismatch(_)) => {
                    "KEYGEN_ROSTER_MISMATCH"
                }
                RequestError::Payload(PayloadError::EmptyKeygenRoster) => "EMPTY_KEYGEN_ROSTER",
                RequestError::ThresholdOutOfRange { .. } => "THRESHOLD_OUT_OF_RANGE",
                RequestError::DuplicatePayloadId(_) => "DUPLICATE_PAYLOAD_ID",
                RequestError::UnknownKeygenId(_) => "UNKNOWN_KEYGEN_ID",
                RequestError::UnknownPayloadId(_) => "UNKNOWN_PAYLOAD_ID",
                RequestError::KeyMaterialMismatch(_) => "KEY_MATERIAL_MISMATCH",
                RequestError::WrongPayloadType { .. } => "WRONG_PAYLOAD_TYPE",
            },
            Self::EngineFailure(_) => "ENGINE_FAILURE",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::MalformedInput(_) => "MALFORMED_INPUT",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Build the JSON error body.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            // Don't leak storage or internal details to callers
            Self::Storage(_) | Self::Internal(_) => "Internal error".to_string(),
            _ => self.to_string(),
        };
        ErrorBody {
            kind: self.kind(),
            code: self.error_code().to_string(),
            message,
        }
    }
}

impl ResponseError for CeremonyError {
    fn status_code(&self) -> StatusCode {
        match self {
            // 409 Conflict
            Self::Request(RequestError::DuplicatePayloadId(_)) => StatusCode::CONFLICT,

            // 404 Not Found
            Self::Request(
                RequestError::UnknownKeygenId(_) | RequestError::UnknownPayloadId(_),
            ) => StatusCode::NOT_FOUND,

            // 400 Bad Request - Client errors
            Self::Request(_) | Self::MalformedInput(_) => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,

            // 502 Bad Gateway - Engine errors
            Self::EngineFailure(_) => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.to_body())
    }
}

impl From<RosterError> for CeremonyError {
    fn from(err: RosterError) -> Self {
        Self::Request(err.into())
    }
}

impl From<PayloadError> for CeremonyError {
    fn from(err: PayloadError) -> Self {
        Self::Request(err.into())
    }
}

impl From<std::io::Error> for CeremonyError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CeremonyError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Self::MalformedInput(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl From<redb::Error> for CeremonyError {
    fn from(err: redb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::DatabaseError> for CeremonyError {
    fn from(err: redb::DatabaseError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::TableError> for CeremonyError {
    fn from(err: redb::TableError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::TransactionError> for CeremonyError {
    fn from(err: redb::TransactionError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::CommitError> for CeremonyError {
    fn from(err: redb::CommitError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::StorageError> for CeremonyError {
    fn from(err: redb::StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type alias for coordinator operations.
pub type CeremonyResultOf<T> = Result<T, CeremonyError>;
