//! Error types for the node metadata store.

use std::time::Duration;
use thiserror::Error;

/// Result type for node metadata store operations.
pub type NodeDbResult<T> = Result<T, NodeDbError>;

/// Errors that can occur while initializing or using the node metadata store.
#[derive(Debug, Error)]
pub enum NodeDbError {
    /// The node database could not be opened or the link to it was lost.
    #[error("connection error ({context}): {message}")]
    Connection {
        /// What was being attempted (a database path or an operation name).
        context: String,
        /// Description of the failure.
        message: String,
        /// Underlying SQLite error, if any.
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// A declared operation failed to precompile.
    #[error("prepare {operation} failed: {source}; query: {query}")]
    Prepare {
        /// Logical operation name.
        operation: String,
        /// Rendered statement text.
        query: String,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },

    /// An operation was invoked on a store that is not ready.
    #[error("node database is not ready: {reason}")]
    NotReady {
        /// Why the store cannot serve the request.
        reason: String,
    },

    /// Initialize was called after a previous attempt completed.
    #[error("node database has already been initialized")]
    AlreadyInitialized,

    /// The database rejected a row because of an integrity rule.
    #[error("constraint violation in {operation}: {message}")]
    ConstraintViolation {
        /// Logical operation name.
        operation: String,
        /// Message reported by SQLite.
        message: String,
    },

    /// The operation exceeded its time bound.
    #[error("{operation} timed out after {waited:?}")]
    Timeout {
        /// Logical operation name.
        operation: String,
        /// The bound that was exceeded.
        waited: Duration,
    },

    /// No operation with this name is declared.
    #[error("unknown operation: {name}")]
    UnknownOperation {
        /// The name that was looked up.
        name: String,
    },

    /// The arguments supplied to an operation are unusable.
    #[error("invalid arguments for {operation}: {message}")]
    InvalidArguments {
        /// Logical operation name.
        operation: String,
        /// Description of the problem.
        message: String,
    },

    /// The store configuration is unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Any other database failure while executing an operation.
    #[error("{operation} failed: {source}")]
    Execution {
        /// Logical operation name.
        operation: String,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },
}

impl NodeDbError {
    /// Creates a connection error without an underlying SQLite error.
    pub fn connection(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            context: context.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a not-ready error.
    pub fn not_ready(reason: impl Into<String>) -> Self {
        Self::NotReady {
            reason: reason.into(),
        }
    }

    /// Creates an invalid arguments error.
    pub fn invalid_arguments(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            waited,
        }
    }

    /// Classifies a SQLite error raised while running `operation`.
    ///
    /// `waited` is the configured busy timeout, reported when SQLite gave
    /// up waiting for a lock.
    pub fn from_sqlite(operation: &str, waited: Duration, err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        let Some(code) = err.sqlite_error_code() else {
            return Self::Execution {
                operation: operation.to_string(),
                source: err,
            };
        };

        match code {
            ErrorCode::ConstraintViolation => Self::ConstraintViolation {
                operation: operation.to_string(),
                message: err.to_string(),
            },
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                Self::timeout(operation, waited)
            }
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::SystemIoFailure
            | ErrorCode::PermissionDenied
            | ErrorCode::ReadOnly
            | ErrorCode::DatabaseCorrupt => Self::Connection {
                context: operation.to_string(),
                message: "node database became unusable".to_string(),
                source: Some(err),
            },
            _ => Self::Execution {
                operation: operation.to_string(),
                source: err,
            },
        }
    }

    /// Returns true if retrying the same call might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connection { .. })
    }

    /// Returns the logical operation name this error concerns, if any.
    pub fn operation(&self) -> Option<&str> {
        match self {
            Self::Prepare { operation, .. }
            | Self::ConstraintViolation { operation, .. }
            | Self::Timeout { operation, .. }
            | Self::InvalidArguments { operation, .. }
            | Self::Execution { operation, .. } => Some(operation),
            Self::UnknownOperation { name } => Some(name),
            _ => None,
        }
    }
}
