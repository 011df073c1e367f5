use serde::{Deserialize, Serialize};

// --- Scheduler results ---

/// Why a `drive` call returned control without finishing the cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Suspension {
    /// The budget was spent mid-phase. The next item has not been produced yet.
    Budget,
    /// The named phase ran out of items; the next phase starts on the next drive.
    PhaseBoundary { finished: String },
}

/// Caller-visible outcome of a single `drive` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriveResult {
    Completed,
    Suspended(Suspension),
}

impl DriveResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, DriveResult::Completed)
    }

    /// Name of the phase that finished on this call, if a boundary was taken.
    pub fn finished_phase(&self) -> Option<&str> {
        match self {
            DriveResult::Suspended(Suspension::PhaseBoundary { finished }) => Some(finished),
            _ => None,
        }
    }
}

/// Read-only snapshot of a cycle's position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleProgress {
    /// Index of the active phase, or of the next phase at a boundary.
    pub phase_index: usize,
    pub phase_count: usize,
    /// Name of the phase items are currently drawn from. `None` at a boundary.
    pub current_phase: Option<String>,
    pub items_executed: u64,
    pub items_last_drive: u32,
    pub phases_finished: usize,
}

// --- Driver ---

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Drop the failed cycle and start a fresh one on the next drive tick.
    #[default]
    Restart,
    /// Stop driving altogether.
    Halt,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Restart => write!(f, "restart"),
            FailurePolicy::Halt => write!(f, "halt"),
        }
    }
}

pub fn parse_failure_policy(s: &str) -> Result<FailurePolicy, String> {
    match s.to_lowercase().as_str() {
        "restart" | "r" => Ok(FailurePolicy::Restart),
        "halt" | "h" => Ok(FailurePolicy::Halt),
        _ => Err(format!(
            "Invalid failure policy '{}': expected restart or halt",
            s
        )),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HaltReason {
    /// The phase source rejected its setup; no cycle was ever started.
    SetupInvalid(Vec<String>),
    /// A cycle failed under `FailurePolicy::Halt`.
    CycleFailed(String),
    /// The source could not build a phase list for a new cycle.
    SourceFailed(String),
    CycleCapReached,
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::SetupInvalid(errors) => {
                write!(f, "setup invalid: {}", errors.join("; "))
            }
            HaltReason::CycleFailed(msg) => write!(f, "cycle failed: {}", msg),
            HaltReason::SourceFailed(msg) => write!(f, "phase source failed: {}", msg),
            HaltReason::CycleCapReached => write!(f, "cycle cap reached"),
        }
    }
}

/// What a single `Driver::tick` did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not a drive tick under the configured interval.
    Skipped,
    Suspended(Suspension),
    CycleCompleted { cycle: u64 },
    /// The cycle was abandoned; under `Restart` a new one starts next drive tick.
    CycleFailed { cycle: u64, error: String },
    Halted(HaltReason),
}
