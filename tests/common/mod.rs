//! Shared test helpers: a scripted connection provider that records every
//! provider call and fails on demand.

#![allow(dead_code)]

use async_trait::async_trait;
use db_txn_coordinator::db::{CancellationToken, Connection, Connector};
use db_txn_coordinator::error::{DbError, DbResult};
use db_txn_coordinator::models::{ConnectionProfile, DatabaseType, IsolationLevel, QueryParam};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    events: Vec<String>,
    failures: HashSet<String>,
    transient: HashMap<String, u32>,
    cancel_after: Vec<(String, CancellationToken)>,
    isolations: HashMap<String, IsolationLevel>,
}

/// Connector whose connections log calls as `"<operation>:<participant>"`.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call matching `event` with a non-retryable database error.
    pub fn fail_on(self, event: &str) -> Self {
        self.state.lock().unwrap().failures.insert(event.to_string());
        self
    }

    /// Fail the first `times` calls matching `event` with a retryable connection error.
    pub fn fail_transiently(self, event: &str, times: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .transient
            .insert(event.to_string(), times);
        self
    }

    /// Cancel `token` once a call matching `event` has succeeded.
    pub fn cancel_after(self, event: &str, token: &CancellationToken) -> Self {
        self.state
            .lock()
            .unwrap()
            .cancel_after
            .push((event.to_string(), token.clone()));
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn isolation_of(&self, participant: &str) -> Option<IsolationLevel> {
        self.state
            .lock()
            .unwrap()
            .isolations
            .get(participant)
            .copied()
    }

    fn record(&self, event: String) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(event.clone());

        if let Some(remaining) = state.transient.get_mut(&event) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DbError::connection(
                    format!("{}: connection reset", event),
                    "Retry the operation",
                ));
            }
        }

        if state.failures.contains(&event) {
            return Err(DbError::database(
                format!("{}: injected failure", event),
                Some("XX000".to_string()),
                "Injected by test",
            ));
        }

        for (trigger, token) in &state.cancel_after {
            if *trigger == event {
                token.cancel();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, profile: &ConnectionProfile) -> DbResult<Box<dyn Connection>> {
        self.record(format!("open:{}", profile.id))?;
        Ok(Box::new(MockConnection {
            id: profile.id.clone(),
            connector: self.clone(),
        }))
    }
}

struct MockConnection {
    id: String,
    connector: MockConnector,
}

#[async_trait]
impl Connection for MockConnection {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    async fn begin(&mut self, isolation: IsolationLevel) -> DbResult<()> {
        self.connector.record(format!("begin:{}", self.id))?;
        self.connector
            .state
            .lock()
            .unwrap()
            .isolations
            .insert(self.id.clone(), isolation);
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.connector.record(format!("commit:{}", self.id))
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.connector.record(format!("rollback:{}", self.id))
    }

    async fn execute(&mut self, _sql: &str, _params: &[QueryParam]) -> DbResult<u64> {
        self.connector.record(format!("execute:{}", self.id))?;
        Ok(1)
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        self.connector.record(format!("close:{}", self.id))
    }
}

/// Profiles with the given IDs, all at the default isolation level.
pub fn profiles(ids: &[&str]) -> Vec<ConnectionProfile> {
    ids.iter()
        .map(|id| {
            ConnectionProfile::new(*id, format!("sqlite:{}.db", id), IsolationLevel::default())
                .unwrap()
        })
        .collect()
}

pub fn strings(events: &[&str]) -> Vec<String> {
    events.iter().map(|e| e.to_string()).collect()
}
