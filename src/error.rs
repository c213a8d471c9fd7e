//! Error types for taskdesk
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, invalid transition, missing record)
//! - 3: Access denied (no session, insufficient role)
//! - 4: Operation failed (backend unreachable, storage error)

use std::path::PathBuf;
use thiserror::Error;

use crate::task::TaskStatus;

/// Exit codes for the taskdesk CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const ACCESS_DENIED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for taskdesk operations
#[derive(Error, Debug)]
pub enum Error {
    // Access (exit code 3)
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Access denied: {0}")]
    Unauthorized(String),

    // User errors (exit code 2)
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Operation failures (exit code 4)
    #[error("Backend request failed: {0}")]
    RemoteFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Unauthenticated | Error::Unauthorized(_) => exit_codes::ACCESS_DENIED,

            Error::NotFound { .. }
            | Error::InvalidTransition { .. }
            | Error::ConfirmationRequired(_)
            | Error::InvalidConfig(_)
            | Error::InvalidArgument(_) => exit_codes::USER_ERROR,

            Error::RemoteFailure(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Stable machine-readable name for the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Unauthenticated => "unauthenticated",
            Error::Unauthorized(_) => "unauthorized",
            Error::NotFound { .. } => "not_found",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::ConfirmationRequired(_) => "confirmation_required",
            Error::InvalidConfig(_) | Error::InvalidArgument(_) => "user_error",
            _ => "remote_failure",
        }
    }

    /// Guard-level failures are answered with a redirect instead of a page error.
    pub fn is_access_error(&self) -> bool {
        matches!(self, Error::Unauthenticated | Error::Unauthorized(_))
    }

    /// Structured details for JSON error output.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::NotFound { kind, id } => Some(serde_json::json!({ "kind": kind, "id": id })),
            Error::InvalidTransition { from, to } => {
                Some(serde_json::json!({ "from": from, "to": to }))
            }
            _ => None,
        }
    }
}

/// Result type alias for taskdesk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
