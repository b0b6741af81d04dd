//! Error types for the transaction coordinator.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Failures that relate to one participant always name it, so a caller can tell
//! which database a coordinated operation tripped over.

use thiserror::Error;

/// A failure recorded against a single participant while the coordinator
/// kept going with the others (rollback is attempted on every participant).
#[derive(Debug)]
pub struct ParticipantFailure {
    pub participant: String,
    pub error: DbError,
}

impl std::fmt::Display for ParticipantFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.participant, self.error)
    }
}

fn join_failures(failures: &[ParticipantFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn commit_details(committed: &[String], rollback_failures: &[ParticipantFailure]) -> String {
    let mut details = String::new();
    if !committed.is_empty() {
        details.push_str(&format!(" (already committed: {})", committed.join(", ")));
    }
    if !rollback_failures.is_empty() {
        details.push_str(&format!(
            " (rollback also failed: {})",
            join_failures(rollback_failures)
        ));
    }
    details
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Unsupported operation: {operation} on {db_type}")]
    Unsupported { operation: String, db_type: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Cancelled: {operation} before participant '{participant}'")]
    Cancelled {
        operation: String,
        participant: String,
    },

    #[error("Failed to open participant '{participant}': {source}")]
    Open {
        participant: String,
        #[source]
        source: Box<DbError>,
    },

    /// `committed` lists participants whose commit already went through before
    /// the failure. Those cannot be undone; without a distributed transaction
    /// manager the databases may now disagree.
    #[error(
        "Commit failed on participant '{participant}': {source}{}",
        commit_details(.committed, .rollback_failures)
    )]
    Commit {
        participant: String,
        #[source]
        source: Box<DbError>,
        committed: Vec<String>,
        rollback_failures: Vec<ParticipantFailure>,
    },

    #[error("Rollback failed on {} participant(s): {}", .failures.len(), join_failures(.failures))]
    Rollback { failures: Vec<ParticipantFailure> },

    #[error("Invalid state: {message} (scope: {scope_id})")]
    InvalidState { message: String, scope_id: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>, db_type: impl std::fmt::Display) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            db_type: db_type.to_string(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>, participant: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
            participant: participant.into(),
        }
    }

    /// Wrap a provider error raised while opening a participant.
    pub fn open(participant: impl Into<String>, source: DbError) -> Self {
        Self::Open {
            participant: participant.into(),
            source: Box::new(source),
        }
    }

    /// Wrap the original commit failure of a participant.
    pub fn commit(
        participant: impl Into<String>,
        source: DbError,
        committed: Vec<String>,
        rollback_failures: Vec<ParticipantFailure>,
    ) -> Self {
        Self::Commit {
            participant: participant.into(),
            source: Box::new(source),
            committed,
            rollback_failures,
        }
    }

    /// Create an aggregate rollback error.
    pub fn rollback(failures: Vec<ParticipantFailure>) -> Self {
        Self::Rollback { failures }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>, scope_id: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
            scope_id: scope_id.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::Open { source, .. } | Self::Commit { source, .. } => source.suggestion(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Check if this error stems from cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The provider error underneath coordinator wrapping.
    ///
    /// For `Open` and `Commit` this is the error the driver raised; every other
    /// variant is already the original error.
    pub fn original(&self) -> &DbError {
        match self {
            Self::Open { source, .. } | Self::Commit { source, .. } => source.original(),
            other => other,
        }
    }

    /// The participant this error relates to, when it relates to exactly one.
    pub fn participant(&self) -> Option<&str> {
        match self {
            Self::Cancelled { participant, .. }
            | Self::Open { participant, .. }
            | Self::Commit { participant, .. } => Some(participant),
            _ => None,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection acquire", 30),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::AnyDriverError(err) => DbError::connection(
                format!("Driver error: {}", err),
                "Check database driver configuration",
            ),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
