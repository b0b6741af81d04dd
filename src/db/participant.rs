//! One database enlisted in a coordinated transaction.
//!
//! A [`Participant`] only exists once its connection is open and its
//! transaction has begun. It is owned by a [`TransactionScope`] and released
//! exactly once, transaction first and connection second.
//!
//! [`TransactionScope`]: crate::db::TransactionScope

use crate::db::connection::Connection;
use crate::db::retry::{ResiliencePolicy, execute_with_policy};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionProfile, DatabaseType, IsolationLevel, ParticipantState, QueryParam};
use tracing::{debug, info, warn};

/// Maximum savepoint name length accepted by every supported engine.
const MAX_SAVEPOINT_NAME_LEN: usize = 63;

pub struct Participant {
    profile: ConnectionProfile,
    connection: Option<Box<dyn Connection>>,
    isolation_level: IsolationLevel,
    state: ParticipantState,
    /// Set once a commit went through, even if a rollback was attempted later
    committed: bool,
    rollback_attempted: bool,
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("id", &self.profile.id)
            .field("db_type", &self.profile.db_type)
            .field("isolation_level", &self.isolation_level)
            .field("state", &self.state)
            .field("committed", &self.committed)
            .field("rollback_attempted", &self.rollback_attempted)
            .field("connection_open", &self.connection.is_some())
            .finish()
    }
}

impl Participant {
    /// Wrap a connection whose transaction has already begun.
    pub(crate) fn new(
        profile: ConnectionProfile,
        connection: Box<dyn Connection>,
        isolation_level: IsolationLevel,
    ) -> Self {
        Self {
            profile,
            connection: Some(connection),
            isolation_level,
            state: ParticipantState::Active,
            committed: false,
            rollback_attempted: false,
        }
    }

    /// Profile ID of this participant.
    pub fn id(&self) -> &str {
        &self.profile.id
    }

    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    pub fn db_type(&self) -> DatabaseType {
        self.profile.db_type
    }

    /// Isolation level the transaction was begun at.
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> ParticipantState {
        self.state
    }

    /// Whether this participant's commit went through.
    ///
    /// Stays true after a compensating rollback: a committed transaction cannot
    /// be undone by a later rollback call.
    pub fn committed(&self) -> bool {
        self.committed
    }

    /// Whether a rollback was invoked on this participant.
    pub fn rollback_attempted(&self) -> bool {
        self.rollback_attempted
    }

    /// Execute a statement inside this participant's transaction.
    pub async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let connection = self.active_connection("execute")?;
        let rows_affected = connection.execute(sql, params).await?;
        debug!(
            participant = %self.profile.id,
            sql = %sql,
            rows_affected = rows_affected,
            "Executed in participant transaction"
        );
        Ok(rows_affected)
    }

    /// Create a savepoint inside this participant's transaction only.
    pub async fn savepoint(&mut self, name: &str) -> DbResult<()> {
        validate_savepoint_name(name)?;
        self.active_connection("savepoint")?.savepoint(name).await
    }

    /// Roll this participant back to a savepoint; the transaction stays open.
    pub async fn rollback_to_savepoint(&mut self, name: &str) -> DbResult<()> {
        validate_savepoint_name(name)?;
        self.active_connection("rollback to savepoint")?
            .rollback_to_savepoint(name)
            .await
    }

    pub async fn release_savepoint(&mut self, name: &str) -> DbResult<()> {
        validate_savepoint_name(name)?;
        self.active_connection("release savepoint")?
            .release_savepoint(name)
            .await
    }

    fn active_connection(&mut self, operation: &str) -> DbResult<&mut Box<dyn Connection>> {
        if self.state != ParticipantState::Active {
            return Err(DbError::internal(format!(
                "Cannot {} on participant '{}': transaction is {}",
                operation, self.profile.id, self.state
            )));
        }
        self.connection.as_mut().ok_or_else(|| {
            DbError::internal(format!(
                "Cannot {} on participant '{}': connection is closed",
                operation, self.profile.id
            ))
        })
    }

    pub(crate) async fn commit(&mut self, policy: &dyn ResiliencePolicy) -> DbResult<()> {
        let id = self.profile.id.clone();
        let connection = self.active_connection("commit")?;
        execute_with_policy(policy, connection.as_mut(), "commit", &id, |c| c.commit()).await?;

        self.state = ParticipantState::Committed;
        self.committed = true;
        info!(participant = %self.profile.id, "Participant committed");
        Ok(())
    }

    /// Invoke rollback on the provider whatever the current state, as long as
    /// the connection is still open.
    pub(crate) async fn rollback(&mut self, policy: &dyn ResiliencePolicy) -> DbResult<()> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(DbError::internal(format!(
                "Cannot roll back participant '{}': connection is closed",
                self.profile.id
            )));
        };

        self.rollback_attempted = true;
        if self.committed {
            warn!(
                participant = %self.profile.id,
                "Rolling back a participant that already committed; its changes remain"
            );
        }

        execute_with_policy(
            policy,
            connection.as_mut(),
            "rollback",
            &self.profile.id,
            |c| c.rollback(),
        )
        .await?;

        self.state = ParticipantState::RolledBack;
        info!(participant = %self.profile.id, "Participant rolled back");
        Ok(())
    }

    /// Release the transaction, then the connection. Runs once; later calls do nothing.
    ///
    /// A transaction still active here is rolled back, as a native transaction
    /// handle does when it is disposed. Failures are logged, never raised.
    pub(crate) async fn dispose(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };

        if self.state == ParticipantState::Active {
            self.rollback_attempted = true;
            if let Err(e) = connection.rollback().await {
                warn!(
                    participant = %self.profile.id,
                    error = %e,
                    "Failed to release active transaction"
                );
            }
        }

        if let Err(e) = connection.close().await {
            warn!(
                participant = %self.profile.id,
                error = %e,
                "Failed to close connection"
            );
        }

        self.state = ParticipantState::Disposed;
        debug!(participant = %self.profile.id, "Participant disposed");
    }

    /// Hand the raw connection over for release outside of async context.
    pub(crate) fn take_connection(&mut self) -> Option<Box<dyn Connection>> {
        self.connection.take()
    }
}

/// Savepoint names are interpolated into SQL, so only plain identifiers pass.
fn validate_savepoint_name(name: &str) -> DbResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start
        || name.len() > MAX_SAVEPOINT_NAME_LEN
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(DbError::invalid_input(format!(
            "Invalid savepoint name '{}': use letters, digits and underscores, starting with a letter or underscore",
            name
        )));
    }
    Ok(())
}
