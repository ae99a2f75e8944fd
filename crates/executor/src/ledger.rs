use crate::error::EngineError;
use std::collections::HashMap;
use tidemark_contracts::{AppliedRecord, Connection, DbError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCheck {
    Unrecorded,
    Recorded,
    Changed { recorded: String },
}

/// In-memory view of the applied-migrations table, loaded once per run.
#[derive(Debug, Clone)]
pub struct Ledger {
    table: String,
    entries: HashMap<String, String>,
}

impl Ledger {
    /// Creates the ledger table if needed and loads its rows.
    pub async fn open<C: Connection>(conn: &mut C, table: &str) -> Result<Self, EngineError> {
        conn.ensure_ledger(table)
            .await
            .map_err(|source| EngineError::Ledger {
                operation: "setup",
                source,
            })?;
        tracing::debug!(table, "migration ledger ready");
        Self::load(conn, table).await
    }

    /// Loads the rows without creating anything; a missing table reads as empty.
    pub async fn load<C: Connection>(conn: &mut C, table: &str) -> Result<Self, EngineError> {
        let records = conn
            .load_ledger(table)
            .await
            .map_err(|source| EngineError::Ledger {
                operation: "lookup",
                source,
            })?;
        Ok(Self::from_records(table, records))
    }

    pub fn from_records(table: impl Into<String>, records: Vec<AppliedRecord>) -> Self {
        Self {
            table: table.into(),
            entries: records
                .into_iter()
                .map(|r| (r.identity, r.checksum))
                .collect(),
        }
    }

    pub fn check(&self, identity: &str, checksum: &str) -> LedgerCheck {
        match self.entries.get(identity) {
            None => LedgerCheck::Unrecorded,
            Some(recorded) if recorded == checksum => LedgerCheck::Recorded,
            Some(recorded) => LedgerCheck::Changed {
                recorded: recorded.clone(),
            },
        }
    }

    pub async fn record<C: Connection>(&mut self, conn: &mut C, record: AppliedRecord) -> Result<(), DbError> {
        conn.record_applied(&self.table, &record).await?;
        self.entries.insert(record.identity, record.checksum);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Ledger, LedgerCheck};
    use tidemark_contracts::AppliedRecord;

    fn ledger() -> Ledger {
        Ledger::from_records(
            "tidemark_migrations",
            vec![AppliedRecord::new("001_users.sql", "aaa")],
        )
    }

    #[test]
    fn unknown_identity_is_unrecorded() {
        assert_eq!(ledger().check("002_orders.sql", "bbb"), LedgerCheck::Unrecorded);
    }

    #[test]
    fn same_checksum_is_recorded() {
        assert_eq!(ledger().check("001_users.sql", "aaa"), LedgerCheck::Recorded);
    }

    #[test]
    fn different_checksum_is_changed() {
        assert_eq!(
            ledger().check("001_users.sql", "zzz"),
            LedgerCheck::Changed {
                recorded: "aaa".to_string()
            }
        );
    }
}
