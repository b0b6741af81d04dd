//! Blocking facade over the async coordinator.
//!
//! Each [`BlockingCoordinator`] owns a current-thread tokio runtime and drives
//! the same async code paths with `block_on`, so ordering, unwinding and
//! failure handling are exactly those of the async API.
//!
//! Do not use these types from inside an async context: `block_on` panics
//! when called on a runtime thread.

use crate::db::cancel::CancellationToken;
use crate::db::coordinator::TransactionCoordinator;
use crate::db::scope::TransactionScope;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionProfile, IsolationLevel, QueryParam};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

#[derive(Debug, Clone)]
pub struct BlockingCoordinator {
    inner: TransactionCoordinator,
    runtime: Arc<Runtime>,
}

impl BlockingCoordinator {
    /// Wrap `inner`, creating a dedicated runtime.
    pub fn new(inner: TransactionCoordinator) -> DbResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DbError::internal(format!("Failed to build runtime: {}", e)))?;
        Ok(Self {
            inner,
            runtime: Arc::new(runtime),
        })
    }

    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.inner
    }

    /// Blocking [`TransactionCoordinator::begin`].
    pub fn begin(
        &self,
        profiles: &[ConnectionProfile],
        isolation: IsolationLevel,
        cancel: &CancellationToken,
    ) -> DbResult<BlockingScope> {
        let scope = self
            .runtime
            .block_on(self.inner.begin(profiles, isolation, cancel))?;
        Ok(self.wrap(scope))
    }

    /// Blocking [`TransactionCoordinator::begin_with_profile_isolation`].
    pub fn begin_with_profile_isolation(
        &self,
        profiles: &[ConnectionProfile],
        cancel: &CancellationToken,
    ) -> DbResult<BlockingScope> {
        let scope = self
            .runtime
            .block_on(self.inner.begin_with_profile_isolation(profiles, cancel))?;
        Ok(self.wrap(scope))
    }

    fn wrap(&self, scope: TransactionScope) -> BlockingScope {
        BlockingScope {
            scope,
            runtime: Arc::clone(&self.runtime),
        }
    }
}

/// Blocking handle on a [`TransactionScope`]. Dropping it disposes the scope.
#[derive(Debug)]
pub struct BlockingScope {
    scope: TransactionScope,
    runtime: Arc<Runtime>,
}

impl BlockingScope {
    /// Read-only view of the underlying scope.
    pub fn scope(&self) -> &TransactionScope {
        &self.scope
    }

    pub fn commit(&mut self, cancel: &CancellationToken) -> DbResult<()> {
        self.runtime.block_on(self.scope.commit(cancel))
    }

    pub fn rollback(&mut self, cancel: &CancellationToken) -> DbResult<()> {
        self.runtime.block_on(self.scope.rollback(cancel))
    }

    pub fn dispose(&mut self) {
        self.runtime.block_on(self.scope.dispose())
    }

    /// Execute a statement on one participant.
    pub fn execute(&mut self, participant: &str, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let participant = self.scope.participant_mut(participant)?;
        self.runtime.block_on(participant.execute(sql, params))
    }

    pub fn savepoint(&mut self, participant: &str, name: &str) -> DbResult<()> {
        let participant = self.scope.participant_mut(participant)?;
        self.runtime.block_on(participant.savepoint(name))
    }

    pub fn rollback_to_savepoint(&mut self, participant: &str, name: &str) -> DbResult<()> {
        let participant = self.scope.participant_mut(participant)?;
        self.runtime.block_on(participant.rollback_to_savepoint(name))
    }

    pub fn release_savepoint(&mut self, participant: &str, name: &str) -> DbResult<()> {
        let participant = self.scope.participant_mut(participant)?;
        self.runtime.block_on(participant.release_savepoint(name))
    }
}

impl Drop for BlockingScope {
    fn drop(&mut self) {
        if !self.scope.is_disposed() {
            self.runtime.block_on(self.scope.dispose());
        }
    }
}
