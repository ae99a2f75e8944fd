#![allow(dead_code)]

use core::time::Duration;
use std::fs;
use std::path::Path;
use tidemark_contracts::fake::FakeDatabase;
use tidemark_executor::{Engine, EngineConfig, OutcomeStatus, RunResult, SkipReason};

pub fn write_scripts(dir: &Path, scripts: &[(&str, &str)]) {
    for (name, sql) in scripts {
        fs::write(dir.join(name), sql).unwrap();
    }
}

pub fn config(dir: &Path) -> EngineConfig {
    EngineConfig::new(dir).with_lock(true, Duration::ZERO)
}

pub async fn run(db: &FakeDatabase, config: EngineConfig) -> RunResult {
    Engine::new(db.clone(), config).unwrap().run().await.unwrap()
}

pub fn identities(result: &RunResult) -> Vec<&str> {
    result.outcomes().iter().map(|o| o.identity.as_str()).collect()
}

pub fn statuses(result: &RunResult) -> Vec<OutcomeStatus> {
    result.outcomes().iter().map(|o| o.status.clone()).collect()
}

pub const SKIPPED_BY_LEDGER: OutcomeStatus = OutcomeStatus::SkippedAlreadyApplied(SkipReason::Ledger);
pub const SKIPPED_EXISTING: OutcomeStatus =
    OutcomeStatus::SkippedAlreadyApplied(SkipReason::AlreadyExists);
