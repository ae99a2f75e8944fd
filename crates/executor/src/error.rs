use crate::outcome::RunResult;
use tidemark_contracts::DbError;
use tidemark_lock::LockError;
use tidemark_migration::DiscoveryError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid ledger table name '{table}'")]
    InvalidLedgerTable { table: String },
    #[error("{setting} must be greater than zero")]
    ZeroTimeout { setting: &'static str },
}

/// Errors that stop a run outside of any single script. Script-level failures
/// are reported through the run result instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    Connection(DbError),
    /// Handing the connection back failed. When the run itself had finished,
    /// its outcomes travel along so they can still be reported.
    #[error("database connection release failed: {source}")]
    Release {
        source: DbError,
        completed: Option<RunResult>,
    },
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("migration ledger {operation} failed: {source}")]
    Ledger {
        operation: &'static str,
        source: DbError,
    },
}

impl EngineError {
    /// Outcomes of a run that completed before the error occurred.
    pub fn completed_run(&self) -> Option<&RunResult> {
        match self {
            EngineError::Release { completed, .. } => completed.as_ref(),
            _ => None,
        }
    }
}
