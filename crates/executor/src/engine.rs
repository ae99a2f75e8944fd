use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ledger::{Ledger, LedgerCheck};
use crate::outcome::RunResult;
use crate::resource::ConnectionGuard;
use crate::runner::Runner;
use tidemark_contracts::{Connection, ConnectionSource, DbError};
use tidemark_lock::AdvisoryLockGuard;
use tidemark_migration::discover_migrations;

/// Where a discovered script stands according to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
    Pending,
    Applied,
    Changed,
    Unreadable,
}

impl ScriptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptState::Pending => "pending",
            ScriptState::Applied => "applied",
            ScriptState::Changed => "changed",
            ScriptState::Unreadable => "unreadable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStatus {
    pub identity: String,
    pub state: ScriptState,
}

pub struct Engine<S: ConnectionSource> {
    source: S,
    config: EngineConfig,
}

impl<S: ConnectionSource> Engine<S> {
    pub fn new(source: S, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { source, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One full migration run: connect, lock, discover, apply, unlock, release.
    ///
    /// A script failure is not an `Err`; it ends the run and shows up as the
    /// last outcome of the returned [`RunResult`]. The connection is released
    /// before this returns, whatever happened.
    pub async fn run(&self) -> Result<RunResult, EngineError> {
        tracing::info!(dir = %self.config.migrations_dir.display(), "migration run starting");

        let conn = self.source.acquire().await.map_err(EngineError::Connection)?;
        let mut guard = ConnectionGuard::new(conn);

        let result = self.locked_run(guard.conn_mut()).await;

        let result = match (result, guard.release().await) {
            (result, Ok(())) => result,
            (Ok(completed), Err(source)) => Err(EngineError::Release {
                source,
                completed: Some(completed),
            }),
            (Err(original), Err(e)) => Err(released_after_error(original, e)),
        }?;
        tracing::info!(
            applied = result.applied(),
            skipped = result.skipped(),
            success = result.is_success(),
            "migration run finished"
        );
        Ok(result)
    }

    /// Reports each discovered script against the ledger without executing
    /// anything.
    pub async fn status(&self) -> Result<Vec<ScriptStatus>, EngineError> {
        let conn = self.source.acquire().await.map_err(EngineError::Connection)?;
        let mut guard = ConnectionGuard::new(conn);

        let result = self.collect_status(guard.conn_mut()).await;

        match (result, guard.release().await) {
            (result, Ok(())) => result,
            (Ok(_), Err(source)) => Err(EngineError::Release {
                source,
                completed: None,
            }),
            (Err(original), Err(e)) => Err(released_after_error(original, e)),
        }
    }

    async fn locked_run<C: Connection>(&self, conn: &mut C) -> Result<RunResult, EngineError> {
        if !self.config.lock.enabled {
            return self.migrate(conn).await;
        }

        let lock = AdvisoryLockGuard::acquire(conn, self.config.lock.timeout).await?;
        let result = self.migrate(conn).await;

        if conn.is_broken() {
            // Unlocking would wait on the abandoned script. The lock is
            // session-scoped and goes when the connection is closed.
            tracing::warn!(key = lock.key(), "leaving migration lock to the closing session");
            return result;
        }

        match (lock.release(conn).await, result) {
            (Ok(()), result) => result,
            (Err(e), Ok(_)) => Err(e.into()),
            (Err(e), Err(original)) => {
                tracing::warn!(error = %e, "migration lock release failed after an earlier error");
                Err(original)
            }
        }
    }

    async fn migrate<C: Connection>(&self, conn: &mut C) -> Result<RunResult, EngineError> {
        let scripts = discover_migrations(&self.config.migrations_dir)?;

        let mut ledger = if self.config.ledger.enabled {
            Some(Ledger::open(conn, &self.config.ledger.table).await?)
        } else {
            None
        };

        Ok(Runner::new(&self.config)
            .run(&scripts, conn, ledger.as_mut())
            .await)
    }

    async fn collect_status<C: Connection>(&self, conn: &mut C) -> Result<Vec<ScriptStatus>, EngineError> {
        let scripts = discover_migrations(&self.config.migrations_dir)?;
        let ledger = Ledger::load(conn, &self.config.ledger.table).await?;

        Ok(scripts
            .iter()
            .map(|script| {
                let state = match script.read() {
                    Err(_) => ScriptState::Unreadable,
                    Ok(content) => match ledger.check(script.identity(), &content.checksum) {
                        LedgerCheck::Unrecorded => ScriptState::Pending,
                        LedgerCheck::Recorded => ScriptState::Applied,
                        LedgerCheck::Changed { .. } => ScriptState::Changed,
                    },
                };
                ScriptStatus {
                    identity: script.identity().to_string(),
                    state,
                }
            })
            .collect())
    }
}

fn released_after_error(original: EngineError, release: DbError) -> EngineError {
    tracing::warn!(error = %release, "connection release failed after an earlier error");
    original
}
