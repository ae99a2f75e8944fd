pub mod batch;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod outcome;
pub mod resource;
pub mod runner;
pub mod transaction;

pub use config::{EngineConfig, LedgerConfig, LockConfig};
pub use engine::{Engine, ScriptState, ScriptStatus};
pub use error::{ConfigError, EngineError};
pub use ledger::Ledger;
pub use outcome::{ExecutionOutcome, FailureKind, OutcomeStatus, RunResult, ScriptFailure, SkipReason};
pub use runner::Runner;
