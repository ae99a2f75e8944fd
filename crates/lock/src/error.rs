use tidemark_contracts::DbError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("migration lock unavailable (timeout_ms={timeout_ms})")]
    MigrationLockUnavailable { timeout_ms: u64 },
    #[error("lock acquire failed: {source}")]
    LockAcquireFailed { source: DbError },
    #[error("lock release failed: {message}")]
    LockReleaseFailed { message: String },
}
