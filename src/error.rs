use std::fmt;

use thiserror::Error;

use crate::identity::IdentityId;
use crate::registration::ValidationErrors;

/// Failures of the descriptor transport, matching and registration paths.
///
/// Each variant drives a different client action, so callers must not fold
/// them into one generic message. A face that is simply not recognised is
/// not an error; see [`crate::LoginOutcome::NotRecognized`].
#[derive(Debug, Error)]
pub enum FaceError {
    #[error("malformed descriptor input: {0}")]
    MalformedInput(String),

    #[error("transport key expired or unknown; request a new key and retry")]
    KeyExpired,

    #[error("face descriptor could not be decrypted")]
    Decryption,

    #[error("a user with a similar face is already registered")]
    DuplicateFace,

    #[error("registration rejected: {0}")]
    Registration(ValidationErrors),

    #[error("face does not match the signed-in user")]
    Mismatch,

    #[error("identity {0} not found")]
    IdentityNotFound(IdentityId),

    #[error("stored face descriptor of identity {0} is unreadable")]
    CorruptStoredRecord(IdentityId),

    #[error("OS random generator unavailable")]
    Rng,
}

impl FaceError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            FaceError::MalformedInput(_) => "malformed_input",
            FaceError::KeyExpired => "key_expired",
            FaceError::Decryption => "decryption_failed",
            FaceError::DuplicateFace => "duplicate_face",
            FaceError::Registration(_) => "registration_rejected",
            FaceError::Mismatch => "face_mismatch",
            FaceError::IdentityNotFound(_) => "identity_not_found",
            FaceError::CorruptStoredRecord(_) => "stored_descriptor_unreadable",
            FaceError::Rng => "rng_unavailable",
        }
    }

    /// HTTP status the web layer should answer with.
    pub fn status(&self) -> u16 {
        match self {
            FaceError::MalformedInput(_)
            | FaceError::Decryption
            | FaceError::DuplicateFace
            | FaceError::Registration(_) => 400,
            FaceError::KeyExpired => 410,
            FaceError::Mismatch => 403,
            FaceError::IdentityNotFound(_) => 404,
            FaceError::CorruptStoredRecord(_) | FaceError::Rng => 500,
        }
    }
}

impl From<serde_json::Error> for FaceError {
    fn from(e: serde_json::Error) -> Self {
        FaceError::MalformedInput(e.to_string())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum StoreError {
    EmailTaken(String),
    PhoneTaken(String),
    NotFound(IdentityId),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::EmailTaken(e) => write!(f, "email '{e}' is already registered"),
            StoreError::PhoneTaken(p) => write!(f, "mobile phone '{p}' is already registered"),
            StoreError::NotFound(id) => write!(f, "identity {id} not found"),
        }
    }
}

impl std::error::Error for StoreError {}
