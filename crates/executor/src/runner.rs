use crate::batch::{self, BatchError};
use crate::classify;
use crate::config::EngineConfig;
use crate::ledger::{Ledger, LedgerCheck};
use crate::outcome::{ExecutionOutcome, FailureKind, OutcomeStatus, RunResult, ScriptFailure, SkipReason};
use crate::transaction;
use tidemark_contracts::{AppliedRecord, Connection};
use tidemark_migration::MigrationScript;

/// Applies scripts one after another over a single connection.
pub struct Runner<'c> {
    config: &'c EngineConfig,
}

impl<'c> Runner<'c> {
    pub fn new(config: &'c EngineConfig) -> Self {
        Self { config }
    }

    /// Runs `scripts` in the given order and stops at the first failure.
    ///
    /// Scripts after a failed one are never read or executed.
    pub async fn run<C: Connection>(
        &self,
        scripts: &[MigrationScript],
        conn: &mut C,
        mut ledger: Option<&mut Ledger>,
    ) -> RunResult {
        let mut result = RunResult::default();

        for script in scripts {
            let started = std::time::Instant::now();
            let status = self.apply(script, conn, ledger.as_deref_mut()).await;
            let outcome = ExecutionOutcome::new(
                script.identity(),
                status,
                batch::duration_ms(started.elapsed()),
            );

            let failed = outcome.is_failed();
            match &outcome.status {
                OutcomeStatus::Failed(failure) => tracing::error!(
                    script = %outcome.identity,
                    kind = %failure.kind,
                    code = failure.code.as_deref().unwrap_or(""),
                    error = %failure.message,
                    "migration failed, aborting run"
                ),
                status => tracing::info!(
                    script = %outcome.identity,
                    outcome = status.label(),
                    elapsed_ms = outcome.elapsed_ms,
                    "migration finished"
                ),
            }

            result.push(outcome);
            if failed {
                break;
            }
        }

        result
    }

    async fn apply<C: Connection>(
        &self,
        script: &MigrationScript,
        conn: &mut C,
        ledger: Option<&mut Ledger>,
    ) -> OutcomeStatus {
        let identity = script.identity();

        let content = match script.read() {
            Ok(content) => content,
            Err(e) => {
                return OutcomeStatus::Failed(ScriptFailure::new(FailureKind::Io, e.to_string()))
            }
        };

        if let Some(ledger) = ledger.as_deref() {
            match ledger.check(identity, &content.checksum) {
                LedgerCheck::Unrecorded => {}
                LedgerCheck::Recorded => {
                    return OutcomeStatus::SkippedAlreadyApplied(SkipReason::Ledger)
                }
                LedgerCheck::Changed { recorded } => {
                    return OutcomeStatus::Failed(ScriptFailure::new(
                        FailureKind::ChecksumMismatch,
                        format!(
                            "script changed after it was applied (ledger={recorded}, file={})",
                            content.checksum
                        ),
                    ))
                }
            }
        }

        let transactional = self.config.transactional;
        if transactional {
            if let Err(e) = transaction::begin(conn).await {
                return OutcomeStatus::Failed(execution_failure(e));
            }
        }

        let record = AppliedRecord::new(identity, content.checksum);

        let executed = batch::execute_batch(
            conn,
            &content.sql,
            self.config.statement_timeout,
            transactional,
        )
        .await;

        match executed {
            Ok(()) => {
                if let Some(ledger) = ledger {
                    if let Err(e) = ledger.record(conn, record).await {
                        if transactional {
                            transaction::rollback(conn, identity).await;
                        }
                        return OutcomeStatus::Failed(
                            ScriptFailure::new(FailureKind::Ledger, e.message).with_code(e.code),
                        );
                    }
                }

                if transactional {
                    if let Err(e) = transaction::commit(conn).await {
                        transaction::rollback(conn, identity).await;
                        return OutcomeStatus::Failed(execution_failure(e));
                    }
                }

                OutcomeStatus::Applied
            }
            Err(BatchError::Db(e)) if classify::is_already_exists(&e) => {
                tracing::warn!(
                    script = identity,
                    error = %e,
                    "objects already exist, treating migration as applied"
                );

                if transactional {
                    transaction::rollback(conn, identity).await;
                }

                // Adopt the script so the next run skips it by bookkeeping.
                if let Some(ledger) = ledger {
                    if let Err(e) = ledger.record(conn, record).await {
                        return OutcomeStatus::Failed(
                            ScriptFailure::new(FailureKind::Ledger, e.message).with_code(e.code),
                        );
                    }
                }

                OutcomeStatus::SkippedAlreadyApplied(SkipReason::AlreadyExists)
            }
            Err(BatchError::Db(e)) => {
                if transactional {
                    transaction::rollback(conn, identity).await;
                }
                OutcomeStatus::Failed(execution_failure(e))
            }
            Err(BatchError::TimedOut(limit)) => {
                if transactional {
                    transaction::rollback(conn, identity).await;
                }
                OutcomeStatus::Failed(ScriptFailure::new(
                    FailureKind::Timeout,
                    format!("script did not finish within {}ms", limit.as_millis()),
                ))
            }
            Err(BatchError::Abandoned(limit)) => {
                // The session may still be busy with the script; nothing more
                // is sent on it. Closing it ends the transaction server-side.
                tracing::warn!(
                    script = identity,
                    "database did not cancel the script, discarding the connection"
                );
                OutcomeStatus::Failed(ScriptFailure::new(
                    FailureKind::Timeout,
                    format!(
                        "script did not finish within {}ms and was not cancelled by the server",
                        limit.as_millis()
                    ),
                ))
            }
        }
    }
}

fn execution_failure(e: tidemark_contracts::DbError) -> ScriptFailure {
    ScriptFailure::new(FailureKind::Execution, e.message).with_code(e.code)
}
