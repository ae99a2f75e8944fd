use core::fmt;

/// Why a script counted as already applied without running to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The ledger holds the script with the same checksum; it was not executed.
    Ledger,
    /// The database rejected the script because its objects already exist.
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Io,
    Execution,
    Timeout,
    ChecksumMismatch,
    Ledger,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Io => "io",
            FailureKind::Execution => "execution",
            FailureKind::Timeout => "timeout",
            FailureKind::ChecksumMismatch => "checksum_mismatch",
            FailureKind::Ledger => "ledger",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    pub kind: FailureKind,
    pub code: Option<String>,
    pub message: String,
}

impl ScriptFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: Option<String>) -> Self {
        self.code = code;
        self
    }
}

impl fmt::Display for ScriptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} error [{code}]: {}", self.kind, self.message),
            None => write!(f, "{} error: {}", self.kind, self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Applied,
    SkippedAlreadyApplied(SkipReason),
    Failed(ScriptFailure),
}

impl OutcomeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeStatus::Applied => "applied",
            OutcomeStatus::SkippedAlreadyApplied(_) => "skipped (already applied)",
            OutcomeStatus::Failed(_) => "FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub identity: String,
    pub status: OutcomeStatus,
    pub elapsed_ms: i32,
}

impl ExecutionOutcome {
    pub fn new(identity: impl Into<String>, status: OutcomeStatus, elapsed_ms: i32) -> Self {
        Self {
            identity: identity.into(),
            status,
            elapsed_ms,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed(_))
    }

    pub fn failure(&self) -> Option<&ScriptFailure> {
        match &self.status {
            OutcomeStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Outcomes of one run, in execution order. Ends at the first failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    outcomes: Vec<ExecutionOutcome>,
}

impl RunResult {
    pub(crate) fn push(&mut self, outcome: ExecutionOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[ExecutionOutcome] {
        &self.outcomes
    }

    pub fn applied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Applied)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::SkippedAlreadyApplied(_)))
            .count()
    }

    /// The failing script and what went wrong, if the run aborted.
    pub fn failure(&self) -> Option<(&str, &ScriptFailure)> {
        self.outcomes
            .last()
            .and_then(|o| o.failure().map(|f| (o.identity.as_str(), f)))
    }

    pub fn is_success(&self) -> bool {
        self.failure().is_none()
    }
}
