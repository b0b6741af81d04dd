//! Opens the participant set for a coordinated transaction.
//!
//! [`TransactionCoordinator::begin`] opens one connection and one transaction
//! per profile, in profile order, and either returns a scope holding all of
//! them or fails with nothing left open.

use crate::db::cancel::CancellationToken;
use crate::db::connection::{Connector, SqlxConnector};
use crate::db::participant::Participant;
use crate::db::retry::{NoRetry, ResiliencePolicy};
use crate::db::scope::TransactionScope;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionProfile, IsolationLevel};
use futures_util::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entry point for coordinated transactions.
///
/// The coordinator itself is stateless apart from its collaborators; scopes
/// are independent of each other and of the coordinator once begun.
#[derive(Clone)]
pub struct TransactionCoordinator {
    connector: Arc<dyn Connector>,
    policy: Arc<dyn ResiliencePolicy>,
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl TransactionCoordinator {
    /// Create a coordinator over `connector` with no retries.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            policy: Arc::new(NoRetry),
        }
    }

    /// Coordinator backed by dedicated sqlx connections.
    pub fn sqlx() -> Self {
        Self::new(Arc::new(SqlxConnector::new()))
    }

    /// Use `policy` around every participant commit and rollback.
    pub fn with_policy(mut self, policy: Arc<dyn ResiliencePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &Arc<dyn ResiliencePolicy> {
        &self.policy
    }

    /// Open every profile at `isolation` and return the scope.
    ///
    /// Participants are opened in order. If opening or beginning fails for a
    /// profile, or `cancel` fires before it, every participant opened so far is
    /// released before the error is returned.
    pub async fn begin(
        &self,
        profiles: &[ConnectionProfile],
        isolation: IsolationLevel,
        cancel: &CancellationToken,
    ) -> DbResult<TransactionScope> {
        self.begin_inner(profiles, |_| isolation, cancel).await
    }

    /// Like [`begin`](Self::begin), but each participant uses its profile's
    /// own isolation level.
    pub async fn begin_with_profile_isolation(
        &self,
        profiles: &[ConnectionProfile],
        cancel: &CancellationToken,
    ) -> DbResult<TransactionScope> {
        self.begin_inner(profiles, |p| p.isolation_level, cancel)
            .await
    }

    /// Run `work` inside a scope: commit if it succeeds, roll back if it fails,
    /// and dispose the scope on every path.
    ///
    /// ```ignore
    /// let inserted = coordinator
    ///     .run(&profiles, IsolationLevel::ReadCommitted, &cancel, |scope| {
    ///         Box::pin(async move {
    ///             scope.participant_mut("orders")?.execute(sql, &params).await
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn run<T, F>(
        &self,
        profiles: &[ConnectionProfile],
        isolation: IsolationLevel,
        cancel: &CancellationToken,
        work: F,
    ) -> DbResult<T>
    where
        F: for<'s> FnOnce(&'s mut TransactionScope) -> BoxFuture<'s, DbResult<T>>,
    {
        let mut scope = self.begin(profiles, isolation, cancel).await?;

        let result = match work(&mut scope).await {
            Ok(value) => scope.commit(cancel).await.map(|()| value),
            Err(e) => {
                if let Err(rollback_err) = scope.rollback(cancel).await {
                    warn!(
                        scope_id = %scope.id(),
                        error = %rollback_err,
                        "Rollback after failed work also failed"
                    );
                }
                Err(e)
            }
        };

        scope.dispose().await;
        result
    }

    async fn begin_inner<I>(
        &self,
        profiles: &[ConnectionProfile],
        isolation_for: I,
        cancel: &CancellationToken,
    ) -> DbResult<TransactionScope>
    where
        I: Fn(&ConnectionProfile) -> IsolationLevel + Send + Sync,
    {
        validate_profiles(profiles)?;

        let mut participants: Vec<Participant> = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let isolation = isolation_for(profile);
            match self.open_participant(profile, isolation, cancel).await {
                Ok(participant) => participants.push(participant),
                Err(e) => {
                    warn!(
                        participant = %profile.id,
                        opened = participants.len(),
                        error = %e,
                        "Failed to open participant, releasing participants already opened"
                    );
                    for opened in participants.iter_mut() {
                        opened.dispose().await;
                    }
                    return Err(e);
                }
            }
        }

        let scope = TransactionScope::new(participants, Arc::clone(&self.policy));
        info!(
            scope_id = %scope.id(),
            participants = scope.len(),
            "Scope begun"
        );
        Ok(scope)
    }

    async fn open_participant(
        &self,
        profile: &ConnectionProfile,
        isolation: IsolationLevel,
        cancel: &CancellationToken,
    ) -> DbResult<Participant> {
        cancel.check("open", &profile.id)?;

        let mut connection = self
            .connector
            .open(profile)
            .await
            .map_err(|e| DbError::open(&profile.id, e))?;

        let begun = match cancel.check("begin", &profile.id) {
            Ok(()) => connection
                .begin(isolation)
                .await
                .map_err(|e| DbError::open(&profile.id, e)),
            Err(e) => Err(e),
        };
        if let Err(e) = begun {
            if let Err(close_err) = connection.close().await {
                warn!(
                    participant = %profile.id,
                    error = %close_err,
                    "Failed to close connection before its transaction began"
                );
            }
            return Err(e);
        }

        debug!(
            participant = %profile.id,
            db_type = %profile.db_type,
            isolation = %isolation,
            "Participant transaction begun"
        );
        Ok(Participant::new(profile.clone(), connection, isolation))
    }
}

/// Reject input that must fail before any connection is touched.
fn validate_profiles(profiles: &[ConnectionProfile]) -> DbResult<()> {
    if profiles.is_empty() {
        return Err(DbError::invalid_input(
            "At least one connection profile is required",
        ));
    }

    let mut seen = HashSet::with_capacity(profiles.len());
    for profile in profiles {
        if profile.connection_string.trim().is_empty() {
            return Err(DbError::invalid_input(format!(
                "Connection string for profile '{}' cannot be empty",
                profile.id
            )));
        }
        if !seen.insert(profile.id.as_str()) {
            return Err(DbError::invalid_input(format!(
                "Duplicate profile ID '{}'",
                profile.id
            )));
        }
    }
    Ok(())
}
