use serde::{Deserialize, Serialize};

/// Failure classes reported to callers. Each maps to a distinct client reaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing input; nothing was changed.
    Validation,
    /// The requested edge does not exist from the record's current status.
    InvalidTransition,
    /// The id has no live record.
    NotFound,
    /// Persistence failed; the write did not commit.
    Store,
}

/// Single structured error shape used across backend layers and exposed to client sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: kind == ErrorKind::Store,
        }
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, code, message)
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::InvalidTransition,
            "LIFECYCLE_INVALID_TRANSITION",
            message,
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, "DB_NOT_FOUND", message)
    }

    pub fn store(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Store, code, message)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}
