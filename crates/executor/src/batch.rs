use crate::classify;
use core::time::Duration;
use tidemark_contracts::{Connection, DbError};

/// Longest the client keeps waiting once the server-side limit has passed.
const MAX_CLIENT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    Db(DbError),
    /// The server cancelled the script at `statement_timeout`. The session is
    /// still usable.
    TimedOut(Duration),
    /// The client stopped waiting. The session may still be running the script
    /// and has been marked broken.
    Abandoned(Duration),
}

pub fn duration_ms(d: Duration) -> i32 {
    let ms = d.as_millis();
    if ms > i32::MAX as u128 {
        i32::MAX
    } else {
        ms as i32
    }
}

fn timeout_ms(limit: Duration) -> u128 {
    limit.as_millis().max(1)
}

pub fn set_timeout_sql(limit: Duration, transactional: bool) -> String {
    if transactional {
        format!("SET LOCAL statement_timeout = {}", timeout_ms(limit))
    } else {
        format!("SET statement_timeout = {}", timeout_ms(limit))
    }
}

pub const RESET_TIMEOUT_SQL: &str = "RESET statement_timeout";

fn client_deadline(limit: Duration) -> Duration {
    limit + limit.min(MAX_CLIENT_GRACE)
}

/// Sends a script body to the database as one batch, bounded by `timeout`.
///
/// The limit is enforced by the server through `statement_timeout`, scoped to
/// the open transaction when `transactional` and reset afterwards otherwise.
/// The client waits a little longer than the limit; if the server still has
/// not answered, the connection is marked broken and must not be reused.
pub async fn execute_batch<C: Connection>(
    conn: &mut C,
    sql: &str,
    timeout: Option<Duration>,
    transactional: bool,
) -> Result<(), BatchError> {
    let Some(limit) = timeout else {
        return conn.execute(sql).await.map_err(BatchError::Db);
    };

    conn.execute(&set_timeout_sql(limit, transactional))
        .await
        .map_err(BatchError::Db)?;

    let waited = tokio::time::timeout(client_deadline(limit), conn.execute(sql)).await;

    let result = match waited {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) if classify::is_query_canceled(&e) => Err(BatchError::TimedOut(limit)),
        Ok(Err(e)) => Err(BatchError::Db(e)),
        Err(_) => {
            conn.mark_broken();
            return Err(BatchError::Abandoned(limit));
        }
    };

    if !transactional {
        if let Err(e) = conn.execute(RESET_TIMEOUT_SQL).await {
            tracing::warn!(error = %e, "resetting statement_timeout failed");
        }
    }

    result
}
