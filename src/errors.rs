//! Unified error types and result handling.
//!
//! Every error the crate produces maps onto one [`ErrorKind`], which is what a
//! caller sees. Storage and environment failures are never shown verbatim: they
//! are logged under a correlation id and reported as a generic internal error.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// A ledger invariant did not hold, e.g. a committed write produced no row
    #[error("Invariant violated: {message}")]
    Invariant {
        /// Which invariant
        message: String,
    },

    /// Storage-layer failure
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or malformed environment variable
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// A view could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No identity on an operation that requires one
    #[error("Authentication required")]
    Unauthorized,

    /// Identity present but not allowed to perform the operation
    #[error("Forbidden: {reason}")]
    Forbidden {
        /// Why access was refused
        reason: String,
    },

    /// Input failed field validation
    #[error("{message}")]
    BadRequest {
        /// Field-qualified failure reason
        message: String,
        /// HTTP-equivalent status to report (400 unless a validator overrides it)
        status: u16,
    },

    /// Amount is zero, negative or not finite
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: f64,
    },

    /// Recipient list is empty or contains the sender
    #[error("Invalid recipient: {reason}")]
    InvalidRecipient {
        /// Why the recipient list was rejected
        reason: String,
    },

    /// Referenced user does not exist
    #[error("User not found: {id}")]
    UserNotFound {
        /// User id or external id that failed to resolve
        id: String,
    },

    /// Referenced transaction does not exist
    #[error("Transaction not found: {id}")]
    TransactionNotFound {
        /// Transaction id
        id: i64,
    },

    /// Referenced store does not exist
    #[error("Store not found: {id}")]
    StoreNotFound {
        /// Store id
        id: i64,
    },

    /// Referenced store item does not exist
    #[error("Store item not found: {id}")]
    ItemNotFound {
        /// Item id
        id: i64,
    },

    /// Referenced store request does not exist
    #[error("Store request not found: {id}")]
    RequestNotFound {
        /// Request id
        id: i64,
    },

    /// Sender cannot cover the aggregate amount
    #[error("Insufficient funds: balance {current:.2}, required {required:.2}")]
    InsufficientFunds {
        /// Sender balance at the time of the check
        current: f64,
        /// Aggregate amount the operation needed
        required: f64,
    },

    /// Not enough stock to fulfil a purchase
    #[error("Out of stock: {available} available, {requested} requested")]
    OutOfStock {
        /// Items left
        available: i32,
        /// Items asked for
        requested: i32,
    },

    /// Store request was already approved or denied
    #[error("Store request {id} is already {status}")]
    RequestNotPending {
        /// Request id
        id: i64,
        /// Current request status
        status: String,
    },

    /// Transaction is older than the deletion window
    #[error("Transaction {id} can no longer be modified")]
    MutabilityWindowElapsed {
        /// Transaction id
        id: i64,
    },
}

/// Client-facing error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// No identity, authentication required
    Unauthorized,
    /// Identity present, role or ownership insufficient
    Forbidden,
    /// Malformed or invalid input
    BadRequest,
    /// Referenced record absent
    NotFound,
    /// Operation conflicts with current state
    Conflict,
    /// Unexpected storage or environment failure
    Internal,
}

impl ErrorKind {
    /// Default HTTP-equivalent status code for this kind.
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Internal => 500,
        }
    }
}

/// Error as it is handed back to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    /// HTTP-equivalent status code
    pub status: u16,
    /// Error category
    pub kind: ErrorKind,
    /// Human-readable message; generic for internal errors
    pub message: String,
    /// Set only for internal errors, matches the id in the logs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Error {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Forbidden { .. } | Self::MutabilityWindowElapsed { .. } => ErrorKind::Forbidden,
            Self::BadRequest { .. } | Self::InvalidAmount { .. } | Self::InvalidRecipient { .. } => {
                ErrorKind::BadRequest
            }
            Self::UserNotFound { .. }
            | Self::TransactionNotFound { .. }
            | Self::StoreNotFound { .. }
            | Self::ItemNotFound { .. }
            | Self::RequestNotFound { .. } => ErrorKind::NotFound,
            Self::InsufficientFunds { .. }
            | Self::OutOfStock { .. }
            | Self::RequestNotPending { .. } => ErrorKind::Conflict,
            Self::Config { .. }
            | Self::Invariant { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::EnvVar(_)
            | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Status code to report, honouring validator overrides.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { status, .. } => *status,
            other => other.kind().status_code(),
        }
    }

    /// Builds a field-validation failure with the default status.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            status: ErrorKind::BadRequest.status_code(),
        }
    }

    /// Builds a forbidden error.
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// Converts the error into its client-facing shape.
    ///
    /// Internal errors are logged with a fresh correlation id and their details
    /// are replaced by a generic message carrying that id.
    #[must_use]
    pub fn into_response(self) -> ErrorResponse {
        let kind = self.kind();
        let status = self.status_code();

        if kind == ErrorKind::Internal {
            let correlation_id = Uuid::new_v4().to_string();
            tracing::error!(%correlation_id, error = %self, "internal error");
            return ErrorResponse {
                status,
                kind,
                message: format!("Internal server error (reference {correlation_id})"),
                correlation_id: Some(correlation_id),
            };
        }

        ErrorResponse {
            status,
            kind,
            message: self.to_string(),
            correlation_id: None,
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
