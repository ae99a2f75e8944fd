use core::time::Duration;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool, Postgres};
use tidemark_contracts::{AppliedRecord, BoxFuture, Connection, ConnectionSource, DbError};

const SQL_CURRENT_DATABASE: &str = "SELECT current_database()::text";
const SQL_TRY_LOCK: &str = "SELECT pg_try_advisory_lock($1)";
const SQL_UNLOCK: &str = "SELECT pg_advisory_unlock($1)";
const SQL_TABLE_EXISTS: &str = "SELECT to_regclass($1) IS NOT NULL";

/// Pool-backed connection source. A run only ever checks out one handle, so a
/// small pool is enough.
#[derive(Clone)]
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    pub async fn connect(database_url: &str, acquire_timeout: Duration) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;

        Ok(Self { pool })
    }

    /// Closes every pooled connection. Call once the engine is done.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl ConnectionSource for PgSource {
    type Conn = PgHandle;

    fn acquire(&self) -> BoxFuture<'_, Result<Self::Conn, DbError>> {
        Box::pin(async move {
            let conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
            Ok(PgHandle { conn, broken: false })
        })
    }
}

pub struct PgHandle {
    conn: PoolConnection<Postgres>,
    broken: bool,
}

impl Connection for PgHandle {
    fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<(), DbError>> {
        Box::pin(async move {
            // No bind arguments, so sqlx uses the simple-query protocol and the
            // whole file goes over as one batch.
            (&mut *self.conn)
                .execute(sql)
                .await
                .map(|_| ())
                .map_err(map_sqlx_error)
        })
    }

    fn database_name<'a>(&'a mut self) -> BoxFuture<'a, Result<String, DbError>> {
        Box::pin(async move {
            sqlx::query_scalar::<_, String>(SQL_CURRENT_DATABASE)
                .fetch_one(&mut *self.conn)
                .await
                .map_err(map_sqlx_error)
        })
    }

    fn try_advisory_lock<'a>(&'a mut self, key: i64) -> BoxFuture<'a, Result<bool, DbError>> {
        Box::pin(async move {
            sqlx::query_scalar::<_, bool>(SQL_TRY_LOCK)
                .bind(key)
                .fetch_one(&mut *self.conn)
                .await
                .map_err(map_sqlx_error)
        })
    }

    fn advisory_unlock<'a>(&'a mut self, key: i64) -> BoxFuture<'a, Result<bool, DbError>> {
        Box::pin(async move {
            sqlx::query_scalar::<_, bool>(SQL_UNLOCK)
                .bind(key)
                .fetch_one(&mut *self.conn)
                .await
                .map_err(map_sqlx_error)
        })
    }

    fn ensure_ledger<'a>(&'a mut self, table: &'a str) -> BoxFuture<'a, Result<(), DbError>> {
        Box::pin(async move {
            let ddl = ledger_ddl(table);
            (&mut *self.conn)
                .execute(ddl.as_str())
                .await
                .map(|_| ())
                .map_err(map_sqlx_error)
        })
    }

    fn load_ledger<'a>(
        &'a mut self,
        table: &'a str,
    ) -> BoxFuture<'a, Result<Vec<AppliedRecord>, DbError>> {
        Box::pin(async move {
            let exists = sqlx::query_scalar::<_, bool>(SQL_TABLE_EXISTS)
                .bind(table)
                .fetch_one(&mut *self.conn)
                .await
                .map_err(map_sqlx_error)?;
            if !exists {
                return Ok(Vec::new());
            }

            let select = ledger_select(table);
            let rows: Vec<(String, String)> = sqlx::query_as(&select)
                .fetch_all(&mut *self.conn)
                .await
                .map_err(map_sqlx_error)?;

            Ok(rows
                .into_iter()
                .map(|(identity, checksum)| AppliedRecord { identity, checksum })
                .collect())
        })
    }

    fn record_applied<'a>(
        &'a mut self,
        table: &'a str,
        record: &'a AppliedRecord,
    ) -> BoxFuture<'a, Result<(), DbError>> {
        Box::pin(async move {
            let insert = ledger_insert(table);
            sqlx::query(&insert)
                .bind(&record.identity)
                .bind(&record.checksum)
                .execute(&mut *self.conn)
                .await
                .map(|_| ())
                .map_err(map_sqlx_error)
        })
    }

    fn mark_broken(&mut self) {
        self.broken = true;
    }

    fn is_broken(&self) -> bool {
        self.broken
    }

    fn release(self) -> BoxFuture<'static, Result<(), DbError>> {
        Box::pin(async move {
            if self.broken {
                // A graceful close would wait for the abandoned statement.
                // Dropping the detached connection closes the socket; the
                // server ends the session and drops its locks once it notices.
                drop(self.conn.detach());
                tracing::debug!("broken migration connection closed");
            } else {
                // Dropping a pool connection returns it to the pool.
                drop(self.conn);
                tracing::debug!("migration connection returned to pool");
            }
            Ok(())
        })
    }
}

fn ledger_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
    identity TEXT PRIMARY KEY,
    checksum TEXT NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
)"
    )
}

fn ledger_select(table: &str) -> String {
    format!("SELECT identity, checksum FROM {table} ORDER BY identity")
}

fn ledger_insert(table: &str) -> String {
    format!(
        "INSERT INTO {table} (identity, checksum)
VALUES ($1, $2)
ON CONFLICT (identity) DO UPDATE
SET checksum = EXCLUDED.checksum,
    applied_at = now()"
    )
}

pub fn map_sqlx_error(err: sqlx::Error) -> DbError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let mapped = DbError::message(db_err.message());
            match db_err.code() {
                Some(code) => mapped.with_code(code.into_owned()),
                None => mapped,
            }
        }
        _ => DbError::message(err.to_string()),
    }
}
