//! Runs the PostgreSQL binding against a real server.
//!
//! Set `TIDEMARK_TEST_DATABASE_URL` to a disposable database to enable these
//! tests; without it every test returns early. Object names carry a per-test
//! suffix so the tests can share one database and run in parallel.

use core::time::Duration;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tidemark_contracts::{AppliedRecord, Connection, ConnectionSource};
use tidemark_db::PgSource;
use tidemark_executor::{Engine, EngineConfig, FailureKind, OutcomeStatus, SkipReason};
use tidemark_lock::lock_key;

const DATABASE_URL_VAR: &str = "TIDEMARK_TEST_DATABASE_URL";

async fn source() -> Option<PgSource> {
    let url = match std::env::var(DATABASE_URL_VAR) {
        Ok(url) if !url.is_empty() => url,
        _ => {
            eprintln!("{DATABASE_URL_VAR} not set, skipping");
            return None;
        }
    };
    Some(PgSource::connect(&url, Duration::from_secs(10)).await.unwrap())
}

fn suffix() -> String {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    format!("{}_{}", std::process::id(), NEXT.fetch_add(1, Ordering::Relaxed))
}

fn write_scripts(dir: &Path, scripts: &[(&str, String)]) {
    for (name, sql) in scripts {
        fs::write(dir.join(name), sql).unwrap();
    }
}

async fn drop_tables(source: &PgSource, tables: &[&String]) {
    let mut conn = source.acquire().await.unwrap();
    for table in tables {
        conn.execute(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
            .await
            .unwrap();
    }
    conn.release().await.unwrap();
}

async fn table_exists(source: &PgSource, table: &str) -> bool {
    let mut conn = source.acquire().await.unwrap();
    let exists = conn.execute(&format!("SELECT 1 FROM {table} LIMIT 0")).await.is_ok();
    conn.release().await.unwrap();
    exists
}

#[tokio::test]
async fn applies_then_skips_by_ledger_then_by_existing_schema() {
    let Some(source) = source().await else { return };
    let s = suffix();
    let (users, orders, ledger) = (
        format!("tm_users_{s}"),
        format!("tm_orders_{s}"),
        format!("tm_ledger_{s}"),
    );
    let tmp = tempfile::tempdir().unwrap();
    write_scripts(
        tmp.path(),
        &[
            ("001_users.sql", format!("CREATE TABLE {users} (id bigint primary key);")),
            (
                "002_orders.sql",
                format!(
                    "CREATE TABLE {orders} (id bigint primary key, user_id bigint references {users}(id));\n\
                     CREATE INDEX ON {orders} (user_id);"
                ),
            ),
        ],
    );
    let config = EngineConfig::new(tmp.path()).with_ledger_table(ledger.clone());

    let first = Engine::new(source.clone(), config.clone())
        .unwrap()
        .run()
        .await
        .unwrap();
    let second = Engine::new(source.clone(), config.clone())
        .unwrap()
        .run()
        .await
        .unwrap();
    let inferred = Engine::new(source.clone(), config.with_ledger(false))
        .unwrap()
        .run()
        .await
        .unwrap();

    drop_tables(&source, &[&orders, &users, &ledger]).await;
    source.close().await;

    assert_eq!(first.applied(), 2);
    assert!(second
        .outcomes()
        .iter()
        .all(|o| o.status == OutcomeStatus::SkippedAlreadyApplied(SkipReason::Ledger)));
    assert_eq!(second.skipped(), 2);
    assert!(inferred
        .outcomes()
        .iter()
        .all(|o| o.status == OutcomeStatus::SkippedAlreadyApplied(SkipReason::AlreadyExists)));
    assert_eq!(inferred.skipped(), 2);
}

#[tokio::test]
async fn failing_script_aborts_and_rolls_back() {
    let Some(source) = source().await else { return };
    let s = suffix();
    let (a, b, c) = (format!("tm_a_{s}"), format!("tm_b_{s}"), format!("tm_c_{s}"));
    let tmp = tempfile::tempdir().unwrap();
    write_scripts(
        tmp.path(),
        &[
            ("001_a.sql", format!("CREATE TABLE {a} (id int);")),
            ("002_b.sql", format!("CREATE TABLE {b} (id int); CREATE TABLE x_{b} (v no_such_type);")),
            ("003_c.sql", format!("CREATE TABLE {c} (id int);")),
        ],
    );
    let config = EngineConfig::new(tmp.path()).with_ledger(false);

    let result = Engine::new(source.clone(), config).unwrap().run().await.unwrap();

    let (identity, failure) = result.failure().unwrap();
    assert_eq!(identity, "002_b.sql");
    assert_eq!(failure.kind, FailureKind::Execution);
    assert_eq!(failure.code.as_deref(), Some("42704"));
    assert_eq!(result.outcomes().len(), 2);
    assert!(table_exists(&source, &a).await);
    assert!(!table_exists(&source, &b).await);
    assert!(!table_exists(&source, &c).await);

    drop_tables(&source, &[&a]).await;
    source.close().await;
}

#[tokio::test]
async fn ledger_round_trip() {
    let Some(source) = source().await else { return };
    let table = format!("tm_ledger_{}", suffix());
    let mut conn = source.acquire().await.unwrap();

    assert!(conn.load_ledger(&table).await.unwrap().is_empty());

    conn.ensure_ledger(&table).await.unwrap();
    conn.ensure_ledger(&table).await.unwrap();
    conn.record_applied(&table, &AppliedRecord::new("001_a.sql", "aaa"))
        .await
        .unwrap();
    assert_eq!(
        conn.load_ledger(&table).await.unwrap(),
        vec![AppliedRecord::new("001_a.sql", "aaa")]
    );

    conn.record_applied(&table, &AppliedRecord::new("001_a.sql", "bbb"))
        .await
        .unwrap();
    assert_eq!(
        conn.load_ledger(&table).await.unwrap(),
        vec![AppliedRecord::new("001_a.sql", "bbb")]
    );

    conn.release().await.unwrap();
    drop_tables(&source, &[&table]).await;
    source.close().await;
}

#[tokio::test]
async fn advisory_lock_is_exclusive_between_sessions() {
    let Some(source) = source().await else { return };
    let key = lock_key(&format!("tm_lock_{}", suffix()));
    let mut first = source.acquire().await.unwrap();
    let mut second = source.acquire().await.unwrap();

    assert!(first.try_advisory_lock(key).await.unwrap());
    assert!(!second.try_advisory_lock(key).await.unwrap());
    assert!(first.advisory_unlock(key).await.unwrap());
    assert!(second.try_advisory_lock(key).await.unwrap());
    assert!(second.advisory_unlock(key).await.unwrap());
    assert!(!second.advisory_unlock(key).await.unwrap());

    first.release().await.unwrap();
    second.release().await.unwrap();
    source.close().await;
}

async fn assert_slow_script_times_out(transactional: bool) {
    let Some(source) = source().await else { return };
    let s = suffix();
    let after = format!("tm_after_{s}");
    let tmp = tempfile::tempdir().unwrap();
    write_scripts(
        tmp.path(),
        &[
            ("001_slow.sql", "SELECT pg_sleep(30);".to_string()),
            ("002_after.sql", format!("CREATE TABLE {after} (id int);")),
        ],
    );
    let config = EngineConfig::new(tmp.path())
        .with_ledger(false)
        .with_transactional(transactional)
        .with_statement_timeout(Some(Duration::from_millis(200)));

    let started = Instant::now();
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        Engine::new(source.clone(), config).unwrap().run(),
    )
    .await
    .expect("run blocked past its statement timeout")
    .unwrap();

    let (identity, failure) = result.failure().unwrap();
    assert_eq!(identity, "001_slow.sql");
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!table_exists(&source, &after).await);

    // The session came back clean: the limit does not leak into later work.
    let mut conn = source.acquire().await.unwrap();
    conn.execute("SELECT pg_sleep(0.4)").await.unwrap();
    conn.release().await.unwrap();
    source.close().await;
}

#[tokio::test]
async fn statement_timeout_aborts_the_run() {
    assert_slow_script_times_out(true).await;
}

#[tokio::test]
async fn statement_timeout_aborts_the_run_without_transactions() {
    assert_slow_script_times_out(false).await;
}
