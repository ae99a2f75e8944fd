use crate::args::{MigrateArgs, StatusArgs};
use crate::error::CliError;
use core::time::Duration;
use tidemark_executor::EngineConfig;

pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

pub fn database_url(arg: Option<&str>) -> Result<String, CliError> {
    match arg {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        _ => Err(CliError::user_error("DATABASE_URL is required")
            .with_action("Set DATABASE_URL (or pass --database-url) to the target PostgreSQL database.")),
    }
}

pub fn migrate_config(args: &MigrateArgs) -> Result<EngineConfig, CliError> {
    let statement_timeout = match args.statement_timeout_ms {
        Some(0) => {
            return Err(CliError::user_error("--statement-timeout-ms must be greater than zero"))
        }
        Some(ms) => Some(Duration::from_millis(ms)),
        None => None,
    };

    Ok(EngineConfig::new(&args.source.dir)
        .with_ledger(!args.no_ledger)
        .with_ledger_table(&args.source.ledger_table)
        .with_lock(!args.no_lock, Duration::from_millis(args.lock_timeout_ms))
        .with_transactional(!args.no_transaction)
        .with_statement_timeout(statement_timeout))
}

/// Status only reads; it never locks.
pub fn status_config(args: &StatusArgs) -> EngineConfig {
    EngineConfig::new(&args.source.dir)
        .with_ledger_table(&args.source.ledger_table)
        .with_lock(false, Duration::ZERO)
}
