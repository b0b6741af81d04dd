//! Coordinated transactions across independent databases.
//!
//! This module provides:
//! - Connection and transaction providers (trait seam plus the sqlx provider)
//! - The coordinator that opens one participant per connection profile
//! - The transaction scope that commits, rolls back and disposes them together
//! - Cooperative cancellation and a pluggable retry policy
//! - A blocking facade over the async API
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod blocking;
pub mod cancel;
pub mod connection;
pub mod coordinator;
pub(crate) mod params;
pub mod participant;
pub mod retry;
pub mod scope;

pub use blocking::{BlockingCoordinator, BlockingScope};
pub use cancel::CancellationToken;
pub use connection::{Connection, Connector, NativeConnection, SqlxConnection, SqlxConnector};
pub use coordinator::TransactionCoordinator;
pub use participant::Participant;
pub use retry::{ExponentialBackoff, NoRetry, ResiliencePolicy};
pub use scope::{ParticipantMetadata, ScopeMetadata, ScopeState, TransactionScope};
