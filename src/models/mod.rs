//! Data models for the transaction coordinator.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{
    ConnectionProfile, ConnectionProfileError, DatabaseType, IsolationLevel, ParticipantState,
};
pub use query::{PlannedStatement, QueryParam};
