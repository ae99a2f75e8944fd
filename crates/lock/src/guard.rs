use crate::advisory;
use crate::error::LockError;
use core::time::Duration;
use tidemark_contracts::Connection;
use tokio::time::{sleep, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Proof that the session holding `conn` owns the migration lock.
///
/// The guard does not own the connection: the lock lives as long as the session
/// does, so releasing the connection also drops the lock server-side. Call
/// [`AdvisoryLockGuard::release`] before handing the connection back to a pool.
#[derive(Debug)]
#[must_use = "the lock stays held until released"]
pub struct AdvisoryLockGuard {
    key: i64,
}

impl AdvisoryLockGuard {
    pub async fn acquire<C: Connection>(conn: &mut C, timeout: Duration) -> Result<Self, LockError> {
        let db_name = conn
            .database_name()
            .await
            .map_err(|source| LockError::LockAcquireFailed { source })?;
        let key = advisory::lock_key(&db_name);

        let deadline = Instant::now() + timeout;

        loop {
            let locked = conn
                .try_advisory_lock(key)
                .await
                .map_err(|source| LockError::LockAcquireFailed { source })?;
            if locked {
                tracing::debug!(database = %db_name, key, "migration lock acquired");
                return Ok(Self { key });
            }

            if Instant::now() >= deadline {
                return Err(LockError::MigrationLockUnavailable {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }

            tracing::debug!(database = %db_name, key, "migration lock busy, waiting");
            sleep(POLL_INTERVAL).await;
        }
    }

    pub fn key(&self) -> i64 {
        self.key
    }

    pub async fn release<C: Connection>(self, conn: &mut C) -> Result<(), LockError> {
        match conn.advisory_unlock(self.key).await {
            Ok(true) => {
                tracing::debug!(key = self.key, "migration lock released");
                Ok(())
            }
            Ok(false) => Err(LockError::LockReleaseFailed {
                message: format!("advisory unlock returned false for key {}", self.key),
            }),
            Err(e) => Err(LockError::LockReleaseFailed {
                message: e.to_string(),
            }),
        }
    }
}
