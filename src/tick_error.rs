/// Error produced by a phase's item producer or a `PhaseSource`.
pub type ProduceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the scheduler, driver, and the config/plan layers.
///
/// Categories:
/// - Start: `start` refused, no cycle exists
/// - Cycle: the cycle was abandoned, its handle is no longer usable
/// - Caller: misuse of the API, the cycle itself is unaffected
/// - Ambient: config, plan, and I/O failures outside a cycle
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    // Start
    #[error("Cannot start a cycle with no phases")]
    EmptyPhaseList,

    // Cycle -- handle invalidated
    #[error("Phase '{phase}' failed to produce work items: {source}")]
    PhaseProductionFailure {
        phase: String,
        #[source]
        source: ProduceError,
    },

    #[error("Cycle handle already completed or failed; start a new cycle")]
    InvalidHandleReuse,

    // Caller
    #[error("Budget must be >= 1, got {0}")]
    InvalidBudget(u32),

    // Ambient
    #[error("Config error: {0}")]
    Config(String),

    #[error("Plan error: {0}")]
    Plan(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl TickError {
    /// Returns true if the error abandoned the cycle it was raised from.
    pub fn invalidates_cycle(&self) -> bool {
        matches!(self, TickError::PhaseProductionFailure { .. })
    }

    /// Returns true if no further `drive` call on the same handle can succeed.
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(
            self,
            TickError::PhaseProductionFailure { .. } | TickError::InvalidHandleReuse
        )
    }

    /// Name of the phase that failed, if the error came from a producer.
    pub fn failed_phase(&self) -> Option<&str> {
        match self {
            TickError::PhaseProductionFailure { phase, .. } => Some(phase),
            _ => None,
        }
    }
}

/// Lets `?` turn a `TickError` into `String` in the CLI handlers.
impl From<TickError> for String {
    fn from(err: TickError) -> String {
        err.to_string()
    }
}
