use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tidemark", version, about = "Apply ordered SQL migrations to a PostgreSQL database")]
pub struct Cli {
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,

    /// Log filter, e.g. `info` or `tidemark_executor=debug`.
    #[arg(long, env = "TIDEMARK_LOG", default_value = "warn", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply every migration that has not been applied yet.
    Migrate(MigrateArgs),
    /// Show which migrations the ledger has recorded.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Directory holding the `.sql` migration files.
    #[arg(long, env = "TIDEMARK_MIGRATIONS_DIR", default_value = "migrations")]
    pub dir: PathBuf,

    /// Table recording applied migrations.
    #[arg(long, env = "TIDEMARK_LEDGER_TABLE", default_value = "tidemark_migrations")]
    pub ledger_table: String,
}

#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Do not read or write the ledger; rely on "already exists" errors only.
    #[arg(long)]
    pub no_ledger: bool,

    /// Do not take the advisory lock.
    #[arg(long)]
    pub no_lock: bool,

    /// Run scripts outside a transaction (needed for e.g. CREATE INDEX CONCURRENTLY).
    #[arg(long)]
    pub no_transaction: bool,

    /// How long to wait for another run to release the lock.
    #[arg(long, default_value_t = 10_000)]
    pub lock_timeout_ms: u64,

    /// Abort the run when one script takes longer than this.
    #[arg(long)]
    pub statement_timeout_ms: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;

    #[test]
    fn migrate_defaults() {
        let cli = Cli::try_parse_from(["tidemark", "migrate"]).unwrap();
        let Command::Migrate(args) = cli.command else {
            panic!("expected migrate");
        };
        assert_eq!(args.source.dir.to_str(), Some("migrations"));
        assert_eq!(args.source.ledger_table, "tidemark_migrations");
        assert!(!args.no_ledger && !args.no_lock && !args.no_transaction);
        assert_eq!(args.lock_timeout_ms, 10_000);
        assert_eq!(args.statement_timeout_ms, None);
    }

    #[test]
    fn global_database_url_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tidemark",
            "status",
            "--database-url",
            "postgres://localhost/app",
            "--dir",
            "db/migrations",
        ])
        .unwrap();
        assert_eq!(cli.database_url.as_deref(), Some("postgres://localhost/app"));
        let Command::Status(args) = cli.command else {
            panic!("expected status");
        };
        assert_eq!(args.source.dir.to_str(), Some("db/migrations"));
    }

    #[test]
    fn migrate_flags() {
        let cli = Cli::try_parse_from([
            "tidemark",
            "migrate",
            "--no-ledger",
            "--no-lock",
            "--statement-timeout-ms",
            "5000",
        ])
        .unwrap();
        let Command::Migrate(args) = cli.command else {
            panic!("expected migrate");
        };
        assert!(args.no_ledger);
        assert!(args.no_lock);
        assert_eq!(args.statement_timeout_ms, Some(5000));
    }
}
