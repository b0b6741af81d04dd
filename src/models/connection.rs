//! Connection-related data models.
//!
//! This module defines the connection profile a caller hands to the coordinator,
//! the isolation levels a participant transaction can be opened at, and the
//! per-participant transaction state.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Isolation level requested for a participant transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
    /// Mapped to the closest snapshot-style level each engine offers
    Snapshot,
}

impl IsolationLevel {
    /// SQL keyword form shared by PostgreSQL and MySQL.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead | Self::Snapshot => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ReadUncommitted => "read_uncommitted",
            Self::ReadCommitted => "read_committed",
            Self::RepeatableRead => "repeatable_read",
            Self::Serializable => "serializable",
            Self::Snapshot => "snapshot",
        };
        f.write_str(name)
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "read_uncommitted" => Ok(Self::ReadUncommitted),
            "read_committed" => Ok(Self::ReadCommitted),
            "repeatable_read" => Ok(Self::RepeatableRead),
            "serializable" => Ok(Self::Serializable),
            "snapshot" => Ok(Self::Snapshot),
            _ => Err(format!(
                "Unknown isolation level '{}'. Expected one of: read_uncommitted, read_committed, repeatable_read, serializable, snapshot",
                s
            )),
        }
    }
}

/// How to reach one database taking part in a coordinated transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub id: String,
    pub db_type: DatabaseType,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub connection_string: String,
    /// Level used when the coordinator is asked to honour per-profile isolation.
    #[serde(default)]
    pub isolation_level: IsolationLevel,
}

impl ConnectionProfile {
    /// Create a new connection profile.
    pub fn new(
        id: impl Into<String>,
        connection_string: impl Into<String>,
        isolation_level: IsolationLevel,
    ) -> Result<Self, ConnectionProfileError> {
        let id = id.into();
        let connection_string = connection_string.into();

        if id.is_empty() {
            return Err(ConnectionProfileError::EmptyId);
        }
        if !id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConnectionProfileError::InvalidId(id));
        }
        if connection_string.trim().is_empty() {
            return Err(ConnectionProfileError::EmptyConnectionString(id));
        }

        let db_type = DatabaseType::from_connection_string(&connection_string)
            .ok_or_else(|| ConnectionProfileError::UnknownDatabaseType(id.clone()))?;

        Ok(Self {
            id,
            db_type,
            connection_string,
            isolation_level,
        })
    }

    /// Get a display-safe version of the connection string (credentials masked).
    pub fn masked_connection_string(&self) -> String {
        if let Some(at_pos) = self.connection_string.find('@') {
            if let Some(colon_pos) = self.connection_string[..at_pos].rfind(':') {
                let prefix = &self.connection_string[..colon_pos + 1];
                let suffix = &self.connection_string[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.connection_string.clone()
    }
}

/// Errors that can occur when creating a connection profile.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionProfileError {
    /// Profile ID is empty
    #[error("Profile ID cannot be empty")]
    EmptyId,

    /// Profile ID contains invalid characters
    #[error("Profile ID contains invalid characters: {0}")]
    InvalidId(String),

    /// Connection string is empty
    #[error("Connection string for profile '{0}' cannot be empty")]
    EmptyConnectionString(String),

    /// Could not determine database type from connection string
    #[error("Unknown database type in connection string for profile '{0}'")]
    UnknownDatabaseType(String),
}

impl From<ConnectionProfileError> for crate::error::DbError {
    fn from(err: ConnectionProfileError) -> Self {
        crate::error::DbError::invalid_input(err.to_string())
    }
}

/// Transaction state of one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantState {
    Active,
    Committed,
    RolledBack,
    /// Transaction and connection released
    Disposed,
}

impl ParticipantState {
    /// Check if the transaction is still active.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if the transaction has ended (committed, rolled back, or disposed).
    pub fn is_ended(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}
