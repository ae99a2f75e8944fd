use crate::args::MigrateArgs;
use crate::config;
use crate::error::CliError;
use crate::output;
use crate::style::Style;
use crate::ui::Ui;
use tidemark_db::PgSource;
use tidemark_executor::{Engine, EngineError, ExecutionOutcome, OutcomeStatus, RunResult, SkipReason};
use tidemark_lock::LockError;

pub async fn run(
    args: &MigrateArgs,
    database_url: Option<&str>,
    tidemark_version: &str,
) -> Result<(), CliError> {
    let database_url = config::database_url(database_url)?;
    let engine_config = config::migrate_config(args)?;
    tracing::debug!(config = ?engine_config, "resolved migration config");

    let source = PgSource::connect(&database_url, config::ACQUIRE_TIMEOUT)
        .await
        .map_err(|e| map_engine_error(EngineError::Connection(e)))?;

    let engine = Engine::new(source.clone(), engine_config).map_err(map_engine_error)?;

    let ui = Ui::new(Style::detect());
    output::line(ui.rule());
    output::line(format!("tidemark {tidemark_version}"));
    output::line(ui.kv("migrations", &engine.config().migrations_dir.display().to_string()));
    output::line(ui.rule());

    let run = engine.run().await;
    source.close().await;

    let (report, outcome) = settle(run);
    if let Some(result) = &report {
        print_report(&ui, result);
    }
    outcome
}

/// Splits an engine result into the outcomes worth reporting and how the
/// command ends. Outcomes survive a release failure that follows the run.
fn settle(run: Result<RunResult, EngineError>) -> (Option<RunResult>, Result<(), CliError>) {
    let result = match run {
        Ok(result) => result,
        Err(err) => {
            let completed = err.completed_run().cloned();
            return (completed, Err(map_engine_error(err)));
        }
    };

    let outcome = match result.failure() {
        Some((identity, failure)) => Err(CliError::migration_failed(format!(
            "Migration {identity} failed"
        ))
        .with_reason(failure.to_string())
        .with_meaning(
            "Scripts before it are applied; it and every later script were not. \
             The database connection has been released.",
        )
        .with_action("Fix the script or the database state, then run `tidemark migrate` again.")),
        None => Ok(()),
    };

    (Some(result), outcome)
}

fn print_report(ui: &Ui, result: &RunResult) {
    if result.outcomes().is_empty() {
        output::line("no migrations found");
    }

    for outcome in result.outcomes() {
        output::line(outcome_line(ui, outcome));
    }

    output::line(ui.rule());
    output::line(ui.kv("applied", &result.applied().to_string()));
    output::line(ui.kv("skipped", &result.skipped().to_string()));
    output::line(ui.rule());
}

pub fn outcome_line(ui: &Ui, outcome: &ExecutionOutcome) -> String {
    let style = ui.style();
    let (mark, suffix) = match &outcome.status {
        OutcomeStatus::Applied => (
            style.ok(),
            format!("{} ({}ms)", outcome.status.label(), outcome.elapsed_ms),
        ),
        OutcomeStatus::SkippedAlreadyApplied(SkipReason::Ledger) => {
            (style.skip(), outcome.status.label().to_string())
        }
        OutcomeStatus::SkippedAlreadyApplied(SkipReason::AlreadyExists) => (
            style.skip(),
            format!("{}, objects exist", outcome.status.label()),
        ),
        OutcomeStatus::Failed(failure) => (
            style.fail(),
            format!("{} ({})", outcome.status.label(), failure.kind),
        ),
    };

    ui.list_item(&outcome.identity, &mark, Some(&suffix))
}

pub fn map_engine_error(err: EngineError) -> CliError {
    let reason = err.to_string();
    match err {
        EngineError::Config(_) => CliError::user_error("Invalid configuration").with_reason(reason),
        EngineError::Connection(_) => CliError::user_error("Database connection failed")
            .with_reason(reason)
            .with_action("Check that DATABASE_URL points at a reachable PostgreSQL server."),
        EngineError::Release { .. } => {
            CliError::migration_failed("Failed to release the database connection").with_reason(reason)
        }
        EngineError::Discovery(_) => CliError::user_error("Migration discovery failed")
            .with_reason(reason)
            .with_action("Check --dir / TIDEMARK_MIGRATIONS_DIR."),
        EngineError::Lock(LockError::MigrationLockUnavailable { .. }) => {
            CliError::lock_unavailable("Another migration process is currently running")
                .with_reason(reason)
                .with_meaning("No migrations were applied.")
                .with_action("Wait for the other run to finish, or raise --lock-timeout-ms.")
        }
        EngineError::Lock(_) => {
            CliError::migration_failed("Migration lock could not be managed").with_reason(reason)
        }
        EngineError::Ledger { .. } => {
            CliError::migration_failed("Migration ledger is unavailable").with_reason(reason)
        }
    }
}
