use crate::args::StatusArgs;
use crate::config;
use crate::error::CliError;
use crate::migrate::map_engine_error;
use crate::output;
use crate::style::Style;
use crate::ui::Ui;
use tidemark_db::PgSource;
use tidemark_executor::{Engine, EngineError, ScriptState, ScriptStatus};

pub async fn run(args: &StatusArgs, database_url: Option<&str>) -> Result<(), CliError> {
    let database_url = config::database_url(database_url)?;

    let source = PgSource::connect(&database_url, config::ACQUIRE_TIMEOUT)
        .await
        .map_err(|e| map_engine_error(EngineError::Connection(e)))?;

    let engine = Engine::new(source.clone(), config::status_config(args)).map_err(map_engine_error)?;
    let statuses = engine.status().await;
    source.close().await;
    let statuses = statuses.map_err(map_engine_error)?;

    let ui = Ui::new(Style::detect());
    for status in &statuses {
        output::line(status_line(&ui, status));
    }

    output::line(ui.rule());
    for (label, count) in summary(&statuses) {
        output::line(ui.kv(label, &count.to_string()));
    }

    verdict(&statuses)
}

fn count(statuses: &[ScriptStatus], state: ScriptState) -> usize {
    statuses.iter().filter(|s| s.state == state).count()
}

// Problem states only appear when present.
fn summary(statuses: &[ScriptStatus]) -> Vec<(&'static str, usize)> {
    let mut lines = vec![
        ("applied", count(statuses, ScriptState::Applied)),
        ("pending", count(statuses, ScriptState::Pending)),
    ];
    for state in [ScriptState::Changed, ScriptState::Unreadable] {
        let n = count(statuses, state);
        if n > 0 {
            lines.push((state.as_str(), n));
        }
    }
    lines
}

fn verdict(statuses: &[ScriptStatus]) -> Result<(), CliError> {
    let changed = count(statuses, ScriptState::Changed);
    if changed > 0 {
        return Err(CliError::user_error(format!(
            "{changed} applied migration(s) changed on disk"
        ))
        .with_meaning("`tidemark migrate` will refuse to run until the files match the ledger.")
        .with_action("Restore the original files; put new changes in a new migration."));
    }

    let unreadable = count(statuses, ScriptState::Unreadable);
    if unreadable > 0 {
        return Err(CliError::user_error(format!(
            "{unreadable} migration(s) could not be read"
        ))
        .with_meaning("`tidemark migrate` will stop at the first of them.")
        .with_action("Check file permissions and that every script is valid UTF-8."));
    }

    Ok(())
}

fn status_line(ui: &Ui, status: &ScriptStatus) -> String {
    let style = ui.style();
    let mark = match status.state {
        ScriptState::Applied => style.ok(),
        ScriptState::Pending => style.skip(),
        ScriptState::Changed | ScriptState::Unreadable => style.fail(),
    };
    ui.list_item(&status.identity, &mark, Some(status.state.as_str()))
}
