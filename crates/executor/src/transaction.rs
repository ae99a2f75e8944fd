use tidemark_contracts::{Connection, DbError};

pub async fn begin<C: Connection>(conn: &mut C) -> Result<(), DbError> {
    conn.execute("BEGIN").await
}

pub async fn commit<C: Connection>(conn: &mut C) -> Result<(), DbError> {
    conn.execute("COMMIT").await
}

/// Rolls back after a failed script. A rollback error is logged rather than
/// returned: the script's own error is what the caller needs to see.
pub async fn rollback<C: Connection>(conn: &mut C, identity: &str) {
    if let Err(e) = conn.execute("ROLLBACK").await {
        tracing::warn!(script = identity, error = %e, "rollback after failed migration failed");
    }
}
