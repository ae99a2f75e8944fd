use tidemark_contracts::{Connection, DbError};

/// Owns the run's connection and hands it back exactly once.
pub struct ConnectionGuard<C: Connection> {
    conn: C,
    pending: PendingRelease,
}

struct PendingRelease {
    armed: bool,
}

impl Drop for PendingRelease {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("migration connection dropped without release; leaving it to the pool");
        }
    }
}

impl<C: Connection> ConnectionGuard<C> {
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            pending: PendingRelease { armed: true },
        }
    }

    pub fn conn_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    pub async fn release(self) -> Result<(), DbError> {
        let Self { conn, mut pending } = self;
        pending.armed = false;
        if conn.is_broken() {
            tracing::warn!("closing broken migration connection instead of reusing it");
        }
        conn.release().await
    }
}
