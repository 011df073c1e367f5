pub mod config;
pub mod driver;
pub mod log;
pub mod phase;
pub mod plan;
pub mod scheduler;
pub mod shutdown;
pub mod tick_error;
pub mod trace;
pub mod types;

pub use driver::{Driver, DriverStats, PhaseSource};
pub use phase::{ItemIter, Phase, WorkItem};
pub use scheduler::CycleHandle;
pub use tick_error::{ProduceError, TickError};
pub use types::{CycleProgress, DriveResult, FailurePolicy, HaltReason, Suspension, TickOutcome};
