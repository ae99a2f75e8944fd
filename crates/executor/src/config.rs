use crate::error::ConfigError;
use core::time::Duration;
use std::path::PathBuf;

pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";
pub const DEFAULT_LEDGER_TABLE: &str = "tidemark_migrations";
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    pub enabled: bool,
    pub timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub enabled: bool,
    pub table: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }
}

/// Everything the engine needs to know for one run. Built by the caller; the
/// engine itself never looks at the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub migrations_dir: PathBuf,
    /// Wrap each script and its ledger row in `BEGIN` / `COMMIT`.
    pub transactional: bool,
    /// Upper bound for one script's execution. Expiry aborts the run.
    pub statement_timeout: Option<Duration>,
    pub lock: LockConfig,
    pub ledger: LedgerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            transactional: true,
            statement_timeout: None,
            lock: LockConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }

    pub fn with_statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn with_lock(mut self, enabled: bool, timeout: Duration) -> Self {
        self.lock = LockConfig { enabled, timeout };
        self
    }

    pub fn with_ledger(mut self, enabled: bool) -> Self {
        self.ledger.enabled = enabled;
        self
    }

    pub fn with_ledger_table(mut self, table: impl Into<String>) -> Self {
        self.ledger.table = table.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.enabled && !is_valid_table_name(&self.ledger.table) {
            return Err(ConfigError::InvalidLedgerTable {
                table: self.ledger.table.clone(),
            });
        }

        if self.statement_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTimeout {
                setting: "statement_timeout",
            });
        }

        Ok(())
    }
}

// The ledger table name is interpolated into SQL, so only plain identifiers
// (optionally schema-qualified) are accepted.
fn is_valid_table_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return false;
    }

    parts.iter().all(|part| {
        let mut chars = part.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn accepts_schema_qualified_table() {
        let config = EngineConfig::default().with_ledger_table("ops.applied_migrations");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_injection_in_table_name() {
        let config = EngineConfig::default().with_ledger_table("m; drop table users");
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLedgerTable {
                table: "m; drop table users".to_string()
            })
        );
    }

    #[test]
    fn table_name_is_ignored_when_ledger_disabled() {
        let config = EngineConfig::default()
            .with_ledger(false)
            .with_ledger_table("not valid!");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_statement_timeout() {
        let config = EngineConfig::default().with_statement_timeout(Some(Duration::ZERO));
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout { .. })));
    }
}
