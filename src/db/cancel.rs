//! Cooperative cancellation for coordinated operations.
//!
//! The coordinator checks the token before it starts an operation on each
//! participant. A provider call that is already running is never interrupted.

use crate::error::{DbError, DbResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A handle for cancelling a coordinated open, commit or rollback.
///
/// Can be shared between tasks to allow cancellation from outside the task
/// driving the scope.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Requests cancellation.
    #[inline]
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Checks if cancellation was requested.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`DbError::Cancelled`] if cancellation was requested before
    /// `operation` starts on `participant`.
    pub fn check(&self, operation: &str, participant: &str) -> DbResult<()> {
        if self.is_cancelled() {
            Err(DbError::cancelled(operation, participant))
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_token() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        let token2 = token.clone();
        token.cancel();

        assert!(token.is_cancelled());
        assert!(token2.is_cancelled());
    }

    #[test]
    fn check_reports_operation_and_participant() {
        let token = CancellationToken::new();
        assert!(token.check("open", "orders").is_ok());

        token.cancel();
        let err = token.check("open", "orders").unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.participant(), Some("orders"));
    }
}
