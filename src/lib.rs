//! Multi-Database Transaction Coordinator Library
//!
//! This library groups transactions on independent databases (SQLite,
//! PostgreSQL, MySQL) into one scope that commits, rolls back and releases
//! them together.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::Config;
pub use db::{
    BlockingCoordinator, BlockingScope, CancellationToken, Connection, Connector,
    ExponentialBackoff, NoRetry, Participant, ResiliencePolicy, SqlxConnector,
    TransactionCoordinator, TransactionScope,
};
pub use error::{DbError, DbResult, ParticipantFailure};
pub use models::{ConnectionProfile, DatabaseType, IsolationLevel, ParticipantState, QueryParam};
