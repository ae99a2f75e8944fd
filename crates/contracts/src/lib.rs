pub mod error {
    /// Failure reported by a database handle.
    ///
    /// `code` carries the machine-readable code when the backend exposes one
    /// (SQLSTATE for PostgreSQL); `message` is the backend's text as-is.
    #[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
    #[error("{}", render(.code, .message))]
    pub struct DbError {
        pub code: Option<String>,
        pub message: String,
    }

    impl DbError {
        pub fn message(message: impl Into<String>) -> Self {
            Self {
                code: None,
                message: message.into(),
            }
        }

        pub fn with_code(mut self, code: impl Into<String>) -> Self {
            self.code = Some(code.into());
            self
        }

        pub fn code(&self) -> Option<&str> {
            self.code.as_deref()
        }
    }

    fn render(code: &Option<String>, message: &str) -> String {
        match code {
            Some(code) => format!("[{code}] {message}"),
            None => message.to_string(),
        }
    }
}

pub use error::DbError;

pub mod ledger {
    /// One row of the applied-migrations ledger.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct AppliedRecord {
        pub identity: String,
        pub checksum: String,
    }

    impl AppliedRecord {
        pub fn new(identity: impl Into<String>, checksum: impl Into<String>) -> Self {
            Self {
                identity: identity.into(),
                checksum: checksum.into(),
            }
        }
    }
}

pub use ledger::AppliedRecord;

pub mod db {
    use crate::error::DbError;
    use crate::ledger::AppliedRecord;
    use core::future::Future;
    use core::pin::Pin;

    pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

    /// A single checked-out database handle.
    ///
    /// Everything a run does goes through one of these, so session state set by
    /// one script (search path, settings) is visible to the next.
    pub trait Connection: Send {
        /// Executes `sql` as one batch. Multi-statement text is allowed.
        fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<(), DbError>>;

        fn database_name<'a>(&'a mut self) -> BoxFuture<'a, Result<String, DbError>>;

        /// Non-blocking attempt at a session-level advisory lock.
        fn try_advisory_lock<'a>(&'a mut self, key: i64) -> BoxFuture<'a, Result<bool, DbError>>;

        fn advisory_unlock<'a>(&'a mut self, key: i64) -> BoxFuture<'a, Result<bool, DbError>>;

        fn ensure_ledger<'a>(&'a mut self, table: &'a str) -> BoxFuture<'a, Result<(), DbError>>;

        fn load_ledger<'a>(
            &'a mut self,
            table: &'a str,
        ) -> BoxFuture<'a, Result<Vec<AppliedRecord>, DbError>>;

        fn record_applied<'a>(
            &'a mut self,
            table: &'a str,
            record: &'a AppliedRecord,
        ) -> BoxFuture<'a, Result<(), DbError>>;

        /// Flags the session as unusable after an in-flight statement was
        /// abandoned. A broken handle is closed on release, never reused.
        fn mark_broken(&mut self);

        fn is_broken(&self) -> bool;

        /// Hands the handle back to wherever it came from. Consumes the handle so
        /// it cannot be released twice.
        fn release(self) -> BoxFuture<'static, Result<(), DbError>>
        where
            Self: Sized;
    }

    /// Where connections come from, usually a pool.
    pub trait ConnectionSource: Send + Sync {
        type Conn: Connection + 'static;

        fn acquire(&self) -> BoxFuture<'_, Result<Self::Conn, DbError>>;
    }
}

pub use db::{BoxFuture, Connection, ConnectionSource};

#[cfg(any(test, feature = "fake"))]
pub mod fake;
