//! In-memory stand-in for a database, for tests.
//!
//! Understands just enough SQL to be useful: `BEGIN` / `COMMIT` / `ROLLBACK`,
//! `SET [LOCAL] statement_timeout` / `RESET statement_timeout` and
//! `CREATE TABLE [IF NOT EXISTS] name`, which fails with SQLSTATE `42P07` when
//! the table already exists. Everything else succeeds unless a failure has been
//! injected for it.
//!
//! A batch that hangs while no statement timeout is in force leaves the session
//! busy, the way a real driver does once its caller stops waiting: every later
//! call on that session hangs too, until the handle is released.

use crate::db::{BoxFuture, Connection, ConnectionSource};
use crate::error::DbError;
use crate::ledger::AppliedRecord;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

pub const DUPLICATE_TABLE: &str = "42P07";
pub const QUERY_CANCELED: &str = "57014";

#[derive(Default)]
struct State {
    database: String,
    executed: Vec<String>,
    tables: BTreeSet<String>,
    ledger: BTreeMap<String, String>,
    ledger_ready: bool,
    tx: Option<PendingTx>,
    session_timeout: bool,
    busy: bool,
    failures: Vec<(String, DbError)>,
    hang_on: Option<String>,
    hang_ignores_timeout: bool,
    fail_acquire: Option<DbError>,
    fail_release: Option<DbError>,
    fail_commit: Option<DbError>,
    fail_ensure_ledger: Option<DbError>,
    fail_load_ledger: Option<DbError>,
    fail_record: Option<DbError>,
    lock_held_elsewhere: bool,
    lock_held: Option<i64>,
    acquires: usize,
    releases: usize,
    discarded: usize,
}

#[derive(Default)]
struct PendingTx {
    tables: Vec<String>,
    ledger: Vec<AppliedRecord>,
    local_timeout: bool,
}

impl State {
    fn has_table(&self, name: &str) -> bool {
        self.tables.contains(name)
            || self
                .tx
                .as_ref()
                .is_some_and(|tx| tx.tables.iter().any(|t| t == name))
    }

    fn create_table(&mut self, name: String) {
        match self.tx.as_mut() {
            Some(tx) => tx.tables.push(name),
            None => {
                self.tables.insert(name);
            }
        }
    }

    fn commit(&mut self) {
        if let Some(tx) = self.tx.take() {
            self.tables.extend(tx.tables);
            for record in tx.ledger {
                self.ledger.insert(record.identity, record.checksum);
            }
        }
    }

    fn timeout_in_force(&self) -> bool {
        self.session_timeout || self.tx.as_ref().is_some_and(|tx| tx.local_timeout)
    }
}

enum Step {
    Done(Result<(), DbError>),
    Hang,
}

/// Shared handle to the fake database. Clones see the same state.
#[derive(Clone)]
pub struct FakeDatabase {
    state: Arc<Mutex<State>>,
}

impl Default for FakeDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDatabase {
    pub fn new() -> Self {
        let state = State {
            database: "tidemark_test".to_string(),
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Any batch containing `marker` fails with `error`.
    pub fn fail_when_contains(self, marker: impl Into<String>, error: DbError) -> Self {
        self.state().failures.push((marker.into(), error));
        self
    }

    /// Any batch containing `marker` never completes. With a statement timeout
    /// in force the batch is cancelled with SQLSTATE `57014` instead.
    pub fn hang_when_contains(self, marker: impl Into<String>) -> Self {
        self.state().hang_on = Some(marker.into());
        self
    }

    /// Hanging batches ignore `statement_timeout`, as a statement stuck outside
    /// the server's reach would.
    pub fn ignore_statement_timeout(self) -> Self {
        self.state().hang_ignores_timeout = true;
        self
    }

    pub fn fail_acquire(self, error: DbError) -> Self {
        self.state().fail_acquire = Some(error);
        self
    }

    pub fn fail_release(self, error: DbError) -> Self {
        self.state().fail_release = Some(error);
        self
    }

    /// `COMMIT` fails and ends the transaction without applying it.
    pub fn fail_commit(self, error: DbError) -> Self {
        self.state().fail_commit = Some(error);
        self
    }

    pub fn fail_ensure_ledger(self, error: DbError) -> Self {
        self.state().fail_ensure_ledger = Some(error);
        self
    }

    pub fn fail_load_ledger(self, error: DbError) -> Self {
        self.state().fail_load_ledger = Some(error);
        self
    }

    pub fn fail_record_applied(self, error: DbError) -> Self {
        self.state().fail_record = Some(error);
        self
    }

    /// Simulates another session holding the migration lock.
    pub fn lock_held_elsewhere(self) -> Self {
        self.state().lock_held_elsewhere = true;
        self
    }

    pub fn with_table(self, name: impl Into<String>) -> Self {
        self.state().tables.insert(name.into());
        self
    }

    pub fn with_ledger_entry(self, identity: impl Into<String>, checksum: impl Into<String>) -> Self {
        {
            let mut state = self.state();
            state.ledger_ready = true;
            state.ledger.insert(identity.into(), checksum.into());
        }
        self
    }

    /// Every batch executed, including transaction control.
    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    /// Executed batches without transaction control or session settings.
    pub fn executed_scripts(&self) -> Vec<String> {
        self.state()
            .executed
            .iter()
            .filter(|sql| !is_control(sql))
            .cloned()
            .collect()
    }

    pub fn tables(&self) -> Vec<String> {
        self.state().tables.iter().cloned().collect()
    }

    pub fn ledger(&self) -> BTreeMap<String, String> {
        self.state().ledger.clone()
    }

    pub fn ledger_ready(&self) -> bool {
        self.state().ledger_ready
    }

    pub fn acquires(&self) -> usize {
        self.state().acquires
    }

    pub fn releases(&self) -> usize {
        self.state().releases
    }

    /// Releases of handles that had been marked broken.
    pub fn discarded(&self) -> usize {
        self.state().discarded
    }

    pub fn lock_held(&self) -> bool {
        self.state().lock_held.is_some()
    }

    pub fn in_transaction(&self) -> bool {
        self.state().tx.is_some()
    }

    fn busy(&self) -> bool {
        self.state().busy
    }

    fn apply(&self, sql: &str) -> Step {
        let mut state = self.state();
        if state.busy {
            return Step::Hang;
        }
        state.executed.push(sql.to_string());

        let normalized = sql.trim().trim_end_matches(';').to_ascii_lowercase();
        match normalized.as_str() {
            "begin" => {
                state.tx = Some(PendingTx::default());
                return Step::Done(Ok(()));
            }
            "commit" => {
                if let Some(err) = state.fail_commit.clone() {
                    state.tx = None;
                    return Step::Done(Err(err));
                }
                state.commit();
                return Step::Done(Ok(()));
            }
            "rollback" => {
                state.tx = None;
                return Step::Done(Ok(()));
            }
            "reset statement_timeout" => {
                state.session_timeout = false;
                return Step::Done(Ok(()));
            }
            _ => {}
        }

        if normalized.starts_with("set local statement_timeout") {
            if let Some(tx) = state.tx.as_mut() {
                tx.local_timeout = true;
            }
            return Step::Done(Ok(()));
        }
        if normalized.starts_with("set statement_timeout") {
            state.session_timeout = true;
            return Step::Done(Ok(()));
        }

        if state.hang_on.as_deref().is_some_and(|marker| sql.contains(marker)) {
            if state.timeout_in_force() && !state.hang_ignores_timeout {
                return Step::Done(Err(DbError::message(
                    "canceling statement due to statement timeout",
                )
                .with_code(QUERY_CANCELED)));
            }
            state.busy = true;
            return Step::Hang;
        }

        if let Some((_, err)) = state.failures.iter().find(|(marker, _)| sql.contains(marker.as_str())) {
            return Step::Done(Err(err.clone()));
        }

        for stmt in sql.split(';') {
            let Some((name, if_not_exists)) = created_table(stmt) else {
                continue;
            };

            if state.has_table(&name) {
                if if_not_exists {
                    continue;
                }
                return Step::Done(Err(DbError::message(format!(
                    "relation \"{name}\" already exists"
                ))
                .with_code(DUPLICATE_TABLE)));
            }

            state.create_table(name);
        }

        Step::Done(Ok(()))
    }
}

fn is_control(sql: &str) -> bool {
    let normalized = sql.trim().trim_end_matches(';').to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "begin" | "commit" | "rollback" | "reset statement_timeout"
    ) || normalized.starts_with("set local statement_timeout")
        || normalized.starts_with("set statement_timeout")
}

fn created_table(stmt: &str) -> Option<(String, bool)> {
    let lowered = stmt.to_ascii_lowercase();
    let mut tokens = lowered.split_whitespace();

    if tokens.next()? != "create" || tokens.next()? != "table" {
        return None;
    }

    let mut name = tokens.next()?;
    let mut if_not_exists = false;
    if name == "if" {
        if tokens.next()? != "not" || tokens.next()? != "exists" {
            return None;
        }
        if_not_exists = true;
        name = tokens.next()?;
    }

    let name = name.split('(').next().unwrap_or(name).trim_matches('"');
    if name.is_empty() {
        return None;
    }

    Some((name.to_string(), if_not_exists))
}

pub struct FakeConnection {
    db: FakeDatabase,
    broken: bool,
}

impl FakeConnection {
    // A session still busy with an abandoned statement never answers.
    fn blocked<'a, T: Send + 'a>(&self, ready: Result<T, DbError>) -> BoxFuture<'a, Result<T, DbError>> {
        if self.db.busy() {
            return Box::pin(std::future::pending());
        }
        Box::pin(async move { ready })
    }
}

impl Connection for FakeConnection {
    fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<(), DbError>> {
        let step = self.db.apply(sql);
        Box::pin(async move {
            match step {
                Step::Done(result) => result,
                Step::Hang => std::future::pending().await,
            }
        })
    }

    fn database_name<'a>(&'a mut self) -> BoxFuture<'a, Result<String, DbError>> {
        let name = self.db.state().database.clone();
        self.blocked(Ok(name))
    }

    fn try_advisory_lock<'a>(&'a mut self, key: i64) -> BoxFuture<'a, Result<bool, DbError>> {
        if self.db.busy() {
            return self.blocked(Ok(false));
        }
        let acquired = {
            let mut state = self.db.state();
            if state.lock_held_elsewhere {
                false
            } else {
                state.lock_held = Some(key);
                true
            }
        };
        self.blocked(Ok(acquired))
    }

    fn advisory_unlock<'a>(&'a mut self, key: i64) -> BoxFuture<'a, Result<bool, DbError>> {
        if self.db.busy() {
            return self.blocked(Ok(false));
        }
        let released = {
            let mut state = self.db.state();
            if state.lock_held == Some(key) {
                state.lock_held = None;
                true
            } else {
                false
            }
        };
        self.blocked(Ok(released))
    }

    fn ensure_ledger<'a>(&'a mut self, _table: &'a str) -> BoxFuture<'a, Result<(), DbError>> {
        let result = {
            let mut state = self.db.state();
            match state.fail_ensure_ledger.clone() {
                Some(err) => Err(err),
                None => {
                    state.ledger_ready = true;
                    Ok(())
                }
            }
        };
        self.blocked(result)
    }

    fn load_ledger<'a>(
        &'a mut self,
        _table: &'a str,
    ) -> BoxFuture<'a, Result<Vec<AppliedRecord>, DbError>> {
        let result = {
            let state = self.db.state();
            match state.fail_load_ledger.clone() {
                Some(err) => Err(err),
                None => Ok(state
                    .ledger
                    .iter()
                    .map(|(identity, checksum)| AppliedRecord::new(identity.clone(), checksum.clone()))
                    .collect()),
            }
        };
        self.blocked(result)
    }

    fn record_applied<'a>(
        &'a mut self,
        _table: &'a str,
        record: &'a AppliedRecord,
    ) -> BoxFuture<'a, Result<(), DbError>> {
        let result = {
            let mut state = self.db.state();
            if let Some(err) = state.fail_record.clone() {
                Err(err)
            } else if !state.ledger_ready {
                Err(DbError::message("ledger table does not exist").with_code("42P01"))
            } else {
                match state.tx.as_mut() {
                    Some(tx) => tx.ledger.push(record.clone()),
                    None => {
                        state
                            .ledger
                            .insert(record.identity.clone(), record.checksum.clone());
                    }
                }
                Ok(())
            }
        };
        self.blocked(result)
    }

    fn mark_broken(&mut self) {
        self.broken = true;
    }

    fn is_broken(&self) -> bool {
        self.broken
    }

    fn release(self) -> BoxFuture<'static, Result<(), DbError>> {
        let result = {
            let mut state = self.db.state();
            state.releases += 1;
            if self.broken {
                state.discarded += 1;
            }
            // Session state, locks included, goes away with the session.
            state.tx = None;
            state.busy = false;
            state.session_timeout = false;
            state.lock_held = None;
            match state.fail_release.clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        };
        Box::pin(async move { result })
    }
}

impl ConnectionSource for FakeDatabase {
    type Conn = FakeConnection;

    fn acquire(&self) -> BoxFuture<'_, Result<Self::Conn, DbError>> {
        let result = {
            let mut state = self.state();
            match state.fail_acquire.clone() {
                Some(err) => Err(err),
                None => {
                    state.acquires += 1;
                    Ok(FakeConnection {
                        db: self.clone(),
                        broken: false,
                    })
                }
            }
        };
        Box::pin(async move { result })
    }
}
