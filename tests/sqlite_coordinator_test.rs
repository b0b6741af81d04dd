//! End-to-end coordinated transactions over SQLite database files.

use db_txn_coordinator::db::{BlockingCoordinator, CancellationToken, TransactionCoordinator};
use db_txn_coordinator::error::DbError;
use db_txn_coordinator::models::{ConnectionProfile, IsolationLevel, ParticipantState, QueryParam};
use sqlx::Connection as _;
use sqlx::sqlite::SqliteConnection;
use tempfile::TempDir;

fn sqlite_profile(dir: &TempDir, id: &str) -> ConnectionProfile {
    let path = dir.path().join(format!("{}.db", id));
    ConnectionProfile::new(
        id,
        format!("sqlite:{}?mode=rwc", path.display()),
        IsolationLevel::ReadCommitted,
    )
    .unwrap()
}

async fn count_rows(profile: &ConnectionProfile, table: &str) -> i64 {
    let mut conn = SqliteConnection::connect(&profile.connection_string)
        .await
        .unwrap();
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(&mut conn)
        .await
        .unwrap();
    conn.close().await.unwrap();
    count
}

/// Two ledgers: `orders` and `billing`, each with an empty `ledger` table.
async fn setup() -> (TempDir, Vec<ConnectionProfile>) {
    let dir = TempDir::new().unwrap();
    let profiles = vec![sqlite_profile(&dir, "orders"), sqlite_profile(&dir, "billing")];
    let cancel = CancellationToken::new();

    let mut scope = TransactionCoordinator::sqlx()
        .begin(&profiles, IsolationLevel::ReadCommitted, &cancel)
        .await
        .unwrap();
    for participant in scope.participants_mut().unwrap() {
        participant
            .execute(
                "CREATE TABLE ledger (id INTEGER PRIMARY KEY, amount INTEGER NOT NULL)",
                &[],
            )
            .await
            .unwrap();
    }
    scope.commit(&cancel).await.unwrap();
    scope.dispose().await;

    (dir, profiles)
}

async fn insert_everywhere(scope: &mut db_txn_coordinator::TransactionScope) {
    for participant in scope.participants_mut().unwrap() {
        participant
            .execute(
                "INSERT INTO ledger (id, amount) VALUES (?, ?)",
                &[QueryParam::Int(1), QueryParam::Int(250)],
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_commit_persists_in_every_database() {
    let (_dir, profiles) = setup().await;
    let cancel = CancellationToken::new();

    let mut scope = TransactionCoordinator::sqlx()
        .begin(&profiles, IsolationLevel::Serializable, &cancel)
        .await
        .unwrap();
    insert_everywhere(&mut scope).await;
    scope.commit(&cancel).await.unwrap();
    scope.dispose().await;

    assert_eq!(count_rows(&profiles[0], "ledger").await, 1);
    assert_eq!(count_rows(&profiles[1], "ledger").await, 1);
}

#[tokio::test]
async fn test_rollback_discards_in_every_database() {
    let (_dir, profiles) = setup().await;
    let cancel = CancellationToken::new();

    let mut scope = TransactionCoordinator::sqlx()
        .begin(&profiles, IsolationLevel::ReadCommitted, &cancel)
        .await
        .unwrap();
    insert_everywhere(&mut scope).await;
    scope.rollback(&cancel).await.unwrap();
    assert!(
        scope
            .participants()
            .iter()
            .all(|p| p.state() == ParticipantState::RolledBack)
    );
    scope.dispose().await;

    assert_eq!(count_rows(&profiles[0], "ledger").await, 0);
    assert_eq!(count_rows(&profiles[1], "ledger").await, 0);
}

#[tokio::test]
async fn test_dispose_without_decision_discards_changes() {
    let (_dir, profiles) = setup().await;
    let cancel = CancellationToken::new();

    let mut scope = TransactionCoordinator::sqlx()
        .begin(&profiles, IsolationLevel::ReadCommitted, &cancel)
        .await
        .unwrap();
    insert_everywhere(&mut scope).await;
    scope.dispose().await;

    assert_eq!(count_rows(&profiles[0], "ledger").await, 0);
    assert_eq!(count_rows(&profiles[1], "ledger").await, 0);
}

#[tokio::test]
async fn test_failed_commit_reports_consistency_gap() {
    let (_dir, profiles) = setup().await;
    let cancel = CancellationToken::new();

    // A deferred foreign key is only checked at COMMIT, so billing fails there
    let mut scope = TransactionCoordinator::sqlx()
        .begin(&profiles, IsolationLevel::ReadCommitted, &cancel)
        .await
        .unwrap();
    scope
        .participant_mut("billing")
        .unwrap()
        .execute(
            "CREATE TABLE invoice (id INTEGER PRIMARY KEY, ledger_id INTEGER \
             REFERENCES ledger(id) DEFERRABLE INITIALLY DEFERRED)",
            &[],
        )
        .await
        .unwrap();
    scope.commit(&cancel).await.unwrap();
    scope.dispose().await;

    let mut scope = TransactionCoordinator::sqlx()
        .begin(&profiles, IsolationLevel::ReadCommitted, &cancel)
        .await
        .unwrap();
    scope
        .participant_mut("orders")
        .unwrap()
        .execute("INSERT INTO ledger (id, amount) VALUES (7, 100)", &[])
        .await
        .unwrap();
    scope
        .participant_mut("billing")
        .unwrap()
        .execute("INSERT INTO invoice (id, ledger_id) VALUES (1, 999)", &[])
        .await
        .unwrap();

    let err = scope.commit(&cancel).await.unwrap_err();
    match &err {
        DbError::Commit {
            participant,
            committed,
            ..
        } => {
            assert_eq!(participant, "billing");
            assert_eq!(committed, &vec!["orders".to_string()]);
        }
        other => panic!("expected commit error, got {:?}", other),
    }
    assert!(matches!(err.original(), DbError::Database { .. }));
    scope.dispose().await;

    // The first database committed before the failure and keeps its row
    assert_eq!(count_rows(&profiles[0], "ledger").await, 1);
    assert_eq!(count_rows(&profiles[1], "invoice").await, 0);
}

#[tokio::test]
async fn test_savepoint_on_one_participant() {
    let (_dir, profiles) = setup().await;
    let cancel = CancellationToken::new();

    let mut scope = TransactionCoordinator::sqlx()
        .begin(&profiles, IsolationLevel::ReadCommitted, &cancel)
        .await
        .unwrap();
    let orders = scope.participant_mut("orders").unwrap();
    orders
        .execute("INSERT INTO ledger (id, amount) VALUES (1, 10)", &[])
        .await
        .unwrap();
    orders.savepoint("second_row").await.unwrap();
    orders
        .execute("INSERT INTO ledger (id, amount) VALUES (2, 20)", &[])
        .await
        .unwrap();
    orders.rollback_to_savepoint("second_row").await.unwrap();
    orders.release_savepoint("second_row").await.unwrap();
    assert!(orders.savepoint("bad name").await.is_err());

    scope.commit(&cancel).await.unwrap();
    scope.dispose().await;

    assert_eq!(count_rows(&profiles[0], "ledger").await, 1);
    assert_eq!(count_rows(&profiles[1], "ledger").await, 0);
}

#[tokio::test]
async fn test_unreachable_participant_releases_the_others() {
    let (dir, mut profiles) = setup().await;
    let missing = dir.path().join("no-such-dir").join("gone.db");
    profiles.push(
        ConnectionProfile::new(
            "gone",
            format!("sqlite:{}", missing.display()),
            IsolationLevel::ReadCommitted,
        )
        .unwrap(),
    );

    let err = TransactionCoordinator::sqlx()
        .begin(&profiles, IsolationLevel::Serializable, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.participant(), Some("gone"));
    assert!(matches!(err.original(), DbError::Connection { .. }));

    // Write locks taken by BEGIN IMMEDIATE were released
    let mut scope = TransactionCoordinator::sqlx()
        .begin(&profiles[..2], IsolationLevel::Serializable, &CancellationToken::new())
        .await
        .unwrap();
    insert_everywhere(&mut scope).await;
    scope.commit(&CancellationToken::new()).await.unwrap();
    scope.dispose().await;
}

#[test]
fn test_blocking_facade_commits() {
    let dir = TempDir::new().unwrap();
    let profiles = vec![sqlite_profile(&dir, "left"), sqlite_profile(&dir, "right")];
    let blocking = BlockingCoordinator::new(TransactionCoordinator::sqlx()).unwrap();
    let cancel = CancellationToken::new();

    let mut scope = blocking
        .begin(&profiles, IsolationLevel::ReadCommitted, &cancel)
        .unwrap();
    for id in ["left", "right"] {
        scope
            .execute(id, "CREATE TABLE ledger (id INTEGER PRIMARY KEY)", &[])
            .unwrap();
        scope
            .execute(id, "INSERT INTO ledger (id) VALUES (?)", &[QueryParam::Int(42)])
            .unwrap();
    }
    scope.commit(&cancel).unwrap();
    scope.dispose();

    let mut scope = blocking
        .begin(&profiles, IsolationLevel::ReadCommitted, &cancel)
        .unwrap();
    scope
        .execute("left", "DELETE FROM ledger", &[])
        .unwrap();
    drop(scope);

    let runtime = tokio::runtime::Runtime::new().unwrap();
    assert_eq!(runtime.block_on(count_rows(&profiles[0], "ledger")), 1);
    assert_eq!(runtime.block_on(count_rows(&profiles[1], "ledger")), 1);
}
