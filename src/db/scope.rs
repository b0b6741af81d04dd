//! The transaction scope handed to callers by the coordinator.
//!
//! A scope applies one outcome to all of its participants, in the order the
//! profiles were supplied. There is no two-phase commit underneath: if
//! participant *j* fails to commit, participants before *j* have already
//! committed and stay committed. The scope then rolls back everything it still
//! can and reports which participants were already committed, so the caller
//! can reconcile them.
//!
//! Lifecycle: `Open` → `Completed` (commit or rollback decided) → `Disposed`
//! (all connections released). `dispose()` on an open scope rolls back first.

use crate::db::cancel::CancellationToken;
use crate::db::connection::Connection;
use crate::db::participant::Participant;
use crate::db::retry::ResiliencePolicy;
use crate::error::{DbError, DbResult, ParticipantFailure};
use crate::models::{ParticipantState, IsolationLevel};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeState {
    /// Participants live, no outcome decided
    Open,
    /// Commit or rollback has been attempted and recorded
    Completed,
    /// All transactions and connections released
    Disposed,
}

/// Snapshot of a scope for logging and reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ScopeMetadata {
    pub scope_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
    pub state: ScopeState,
    pub participants: Vec<ParticipantMetadata>,
}

/// Per-participant part of [`ScopeMetadata`].
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantMetadata {
    pub id: String,
    pub db_type: crate::models::DatabaseType,
    pub isolation_level: IsolationLevel,
    pub state: ParticipantState,
    pub committed: bool,
}

pub struct TransactionScope {
    id: String,
    started_at: DateTime<Utc>,
    created_at: Instant,
    participants: Vec<Participant>,
    policy: Arc<dyn ResiliencePolicy>,
    completed: bool,
    disposed: bool,
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("participants", &self.participants)
            .field("policy", &self.policy)
            .finish()
    }
}

impl TransactionScope {
    pub(crate) fn new(participants: Vec<Participant>, policy: Arc<dyn ResiliencePolicy>) -> Self {
        Self {
            id: generate_scope_id(),
            started_at: Utc::now(),
            created_at: Instant::now(),
            participants,
            policy,
            completed: false,
            disposed: false,
        }
    }

    /// Unique scope identifier, used in logs.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> ScopeState {
        if self.disposed {
            ScopeState::Disposed
        } else if self.completed {
            ScopeState::Completed
        } else {
            ScopeState::Open
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Participants in profile order.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Look up a participant by profile ID.
    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id() == id)
    }

    /// Mutable access to a participant, to issue statements before the decision.
    pub fn participant_mut(&mut self, id: &str) -> DbResult<&mut Participant> {
        self.ensure_not_disposed("access participant")?;
        self.participants
            .iter_mut()
            .find(|p| p.id() == id)
            .ok_or_else(|| DbError::invalid_input(format!("Unknown participant '{}'", id)))
    }

    /// Mutable access to all participants, in profile order.
    pub fn participants_mut(&mut self) -> DbResult<&mut [Participant]> {
        self.ensure_not_disposed("access participants")?;
        Ok(&mut self.participants)
    }

    pub fn metadata(&self) -> ScopeMetadata {
        ScopeMetadata {
            scope_id: self.id.clone(),
            started_at: self.started_at,
            duration_secs: self.created_at.elapsed().as_secs(),
            state: self.state(),
            participants: self
                .participants
                .iter()
                .map(|p| ParticipantMetadata {
                    id: p.id().to_string(),
                    db_type: p.db_type(),
                    isolation_level: p.isolation_level(),
                    state: p.state(),
                    committed: p.committed(),
                })
                .collect(),
        }
    }

    /// Commit every participant in order.
    ///
    /// On the first failure every participant is rolled back (including those
    /// already committed, which cannot actually be undone) and the original
    /// error is returned inside [`DbError::Commit`]. Calling this again once
    /// the scope is completed does nothing.
    pub async fn commit(&mut self, cancel: &CancellationToken) -> DbResult<()> {
        self.ensure_not_disposed("commit")?;
        if self.completed {
            debug!(scope_id = %self.id, "Scope already completed, commit skipped");
            return Ok(());
        }

        let mut failure = None;
        for participant in self.participants.iter_mut() {
            let result = match cancel.check("commit", participant.id()) {
                Ok(()) => participant.commit(self.policy.as_ref()).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                failure = Some((participant.id().to_string(), e));
                break;
            }
        }

        let Some((failed, cause)) = failure else {
            self.completed = true;
            info!(
                scope_id = %self.id,
                participants = self.participants.len(),
                "Scope committed"
            );
            return Ok(());
        };

        warn!(
            scope_id = %self.id,
            participant = %failed,
            error = %cause,
            "Participant commit failed, rolling back all participants"
        );

        let committed: Vec<String> = self
            .participants
            .iter()
            .filter(|p| p.committed())
            .map(|p| p.id().to_string())
            .collect();

        let rollback_failures = self.rollback_all(cancel).await;
        self.completed = true;

        if !committed.is_empty() {
            error!(
                scope_id = %self.id,
                committed = ?committed,
                "Participants committed before the failure cannot be undone; databases may be inconsistent"
            );
        }

        Err(DbError::commit(failed, cause, committed, rollback_failures))
    }

    /// Roll back every participant in order.
    ///
    /// A failure on one participant does not stop the others; all failures are
    /// returned together in [`DbError::Rollback`]. The scope is completed
    /// either way. Calling this again once the scope is completed does nothing.
    pub async fn rollback(&mut self, cancel: &CancellationToken) -> DbResult<()> {
        self.ensure_not_disposed("rollback")?;
        if self.completed {
            debug!(scope_id = %self.id, "Scope already completed, rollback skipped");
            return Ok(());
        }

        let failures = self.rollback_all(cancel).await;
        self.completed = true;

        if failures.is_empty() {
            info!(
                scope_id = %self.id,
                participants = self.participants.len(),
                "Scope rolled back"
            );
            Ok(())
        } else {
            Err(DbError::rollback(failures))
        }
    }

    /// Release every participant. Rolls back first if no decision was made.
    ///
    /// Never fails: rollback and close errors are logged. A second call does nothing.
    pub async fn dispose(&mut self) {
        if self.disposed {
            return;
        }

        if !self.completed {
            warn!(
                scope_id = %self.id,
                "Scope disposed without commit or rollback, rolling back"
            );
            let failures = self.rollback_all(&CancellationToken::new()).await;
            for failure in &failures {
                warn!(
                    scope_id = %self.id,
                    participant = %failure.participant,
                    error = %failure.error,
                    "Implicit rollback failed"
                );
            }
            self.completed = true;
        }

        for participant in self.participants.iter_mut() {
            participant.dispose().await;
        }
        self.disposed = true;

        info!(
            scope_id = %self.id,
            duration_ms = self.created_at.elapsed().as_millis() as u64,
            "Scope disposed"
        );
    }

    /// Attempt rollback on every participant, collecting failures.
    ///
    /// Once cancellation is observed no further participant is started; the
    /// remaining ones are rolled back when they are disposed.
    async fn rollback_all(&mut self, cancel: &CancellationToken) -> Vec<ParticipantFailure> {
        let mut failures = Vec::new();
        for participant in self.participants.iter_mut() {
            if let Err(e) = cancel.check("rollback", participant.id()) {
                warn!(
                    scope_id = %self.id,
                    participant = %participant.id(),
                    "Rollback cancelled, remaining participants roll back on dispose"
                );
                failures.push(ParticipantFailure {
                    participant: participant.id().to_string(),
                    error: e,
                });
                break;
            }

            if let Err(e) = participant.rollback(self.policy.as_ref()).await {
                warn!(
                    scope_id = %self.id,
                    participant = %participant.id(),
                    error = %e,
                    "Participant rollback failed"
                );
                failures.push(ParticipantFailure {
                    participant: participant.id().to_string(),
                    error: e,
                });
            }
        }
        failures
    }

    fn ensure_not_disposed(&self, operation: &str) -> DbResult<()> {
        if self.disposed {
            return Err(DbError::invalid_state(
                format!("cannot {} after the scope was disposed", operation),
                &self.id,
            ));
        }
        Ok(())
    }
}

/// Safety net for scopes dropped without `dispose()`.
///
/// The async release is spawned on the current tokio runtime. Without a
/// runtime the connections are dropped as-is and the servers discard the open
/// transactions when the sessions end.
impl Drop for TransactionScope {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }

        let pending: Vec<(String, bool, Box<dyn Connection>)> = self
            .participants
            .iter_mut()
            .filter_map(|p| {
                let active = p.state() == ParticipantState::Active;
                let id = p.id().to_string();
                p.take_connection().map(|c| (id, active, c))
            })
            .collect();
        if pending.is_empty() {
            return;
        }

        warn!(
            scope_id = %self.id,
            completed = self.completed,
            "Scope dropped without dispose() - consider calling dispose() explicitly"
        );

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(scope_id = %self.id, "No tokio runtime, dropping connections without rollback");
            return;
        };

        let scope_id = self.id.clone();
        handle.spawn(async move {
            for (participant, active, mut connection) in pending {
                if active {
                    if let Err(e) = connection.rollback().await {
                        warn!(scope_id = %scope_id, participant = %participant, error = %e, "Background rollback failed");
                    }
                }
                if let Err(e) = connection.close().await {
                    warn!(scope_id = %scope_id, participant = %participant, error = %e, "Background close failed");
                }
            }
        });
    }
}

/// Generate a unique scope ID.
fn generate_scope_id() -> String {
    format!("scope_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::retry::NoRetry;

    #[test]
    fn test_scope_id_format() {
        let id = generate_scope_id();
        assert!(id.starts_with("scope_"));
        assert_eq!(id.len(), 6 + 32);
    }

    #[tokio::test]
    async fn test_empty_scope_lifecycle() {
        let mut scope = TransactionScope::new(Vec::new(), Arc::new(NoRetry));
        assert_eq!(scope.state(), ScopeState::Open);
        assert!(scope.is_empty());

        scope.commit(&CancellationToken::new()).await.unwrap();
        assert_eq!(scope.state(), ScopeState::Completed);

        scope.dispose().await;
        assert_eq!(scope.state(), ScopeState::Disposed);

        let err = scope.commit(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidState { .. }));
        assert!(scope.participants_mut().is_err());
    }

    #[test]
    fn test_metadata_serializes() {
        let scope = TransactionScope::new(Vec::new(), Arc::new(NoRetry));
        let json = serde_json::to_value(scope.metadata()).unwrap();
        assert_eq!(json["state"], "open");
        assert!(json["scope_id"].as_str().unwrap().starts_with("scope_"));
    }
}
