use crate::config::DriverConfig;
use crate::phase::{Phase, WorkItem};
use crate::scheduler::CycleHandle;
use crate::tick_error::{ProduceError, TickError};
use crate::types::{DriveResult, FailurePolicy, HaltReason, TickOutcome};
use crate::{log_debug, log_info, log_warn};

/// Builds the phase list for each new cycle from live state.
pub trait PhaseSource {
    type Item: WorkItem;

    /// Called once per cycle, right before the cycle starts.
    fn phases(&mut self) -> Result<Vec<Phase<Self::Item>>, ProduceError>;

    /// One-time setup check, run on the first drive tick. Any error halts the
    /// driver before a cycle is started.
    fn validate(&mut self) -> Result<(), Vec<String>> {
        Ok(())
    }
}

/// Counters accumulated across every tick of a driver.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DriverStats {
    pub ticks: u64,
    pub drives: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub items_executed: u64,
}

/// The periodic invoker around `CycleHandle`.
///
/// Owns at most one cycle at a time and starts the next one only after the
/// previous one completed or failed.
pub struct Driver<S: PhaseSource> {
    source: S,
    config: DriverConfig,
    cycle: Option<CycleHandle<S::Item>>,
    cycle_number: u64,
    stats: DriverStats,
    items_last_tick: u32,
    validated: bool,
    halted: Option<HaltReason>,
}

impl<S: PhaseSource> Driver<S> {
    pub fn new(source: S, config: DriverConfig) -> Self {
        Self {
            source,
            config,
            cycle: None,
            cycle_number: 0,
            stats: DriverStats::default(),
            items_last_tick: 0,
            validated: false,
            halted: None,
        }
    }

    /// One host invocation.
    ///
    /// The first tick and every `tick_interval`-th tick after it drive the
    /// current cycle with the configured budget; all others are skipped.
    pub fn tick(&mut self) -> TickOutcome {
        if let Some(reason) = &self.halted {
            return TickOutcome::Halted(reason.clone());
        }

        self.stats.ticks += 1;
        self.items_last_tick = 0;
        let interval = u64::from(self.config.tick_interval.max(1));
        if (self.stats.ticks - 1) % interval != 0 {
            return TickOutcome::Skipped;
        }

        if !self.validated {
            if let Err(errors) = self.source.validate() {
                for error in &errors {
                    log_warn!("[driver] Setup error: {}", error);
                }
                return self.halt(HaltReason::SetupInvalid(errors));
            }
            self.validated = true;
        }

        let mut cycle = match self.cycle.take() {
            Some(cycle) => cycle,
            None => match self.start_cycle() {
                Ok(cycle) => cycle,
                Err(outcome) => return outcome,
            },
        };

        self.stats.drives += 1;
        let result = cycle.drive(self.config.budget);
        self.items_last_tick = cycle.progress().items_last_drive;
        self.stats.items_executed += u64::from(self.items_last_tick);

        match result {
            Ok(DriveResult::Suspended(suspension)) => {
                self.cycle = Some(cycle);
                TickOutcome::Suspended(suspension)
            }
            Ok(DriveResult::Completed) => {
                self.stats.cycles_completed += 1;
                log_debug!(
                    "[driver] Cycle {} complete ({} items)",
                    self.cycle_number,
                    cycle.progress().items_executed
                );

                if let Some(max) = self.config.max_cycles {
                    if self.stats.cycles_completed >= max {
                        log_info!("[driver] Completed {} cycle(s), stopping", max);
                        self.halted = Some(HaltReason::CycleCapReached);
                    }
                }

                TickOutcome::CycleCompleted {
                    cycle: self.cycle_number,
                }
            }
            Err(err) => self.fail_cycle(HaltReason::CycleFailed(err.to_string())),
        }
    }

    fn start_cycle(&mut self) -> Result<CycleHandle<S::Item>, TickOutcome> {
        self.cycle_number += 1;

        let phases = match self.source.phases() {
            Ok(phases) => phases,
            Err(err) => return Err(self.fail_cycle(HaltReason::SourceFailed(err.to_string()))),
        };

        CycleHandle::start(phases)
            .map_err(|err: TickError| self.fail_cycle(HaltReason::CycleFailed(err.to_string())))
    }

    /// `failure` becomes the halt reason under `Halt`, or the error text of
    /// `CycleFailed` under `Restart`.
    fn fail_cycle(&mut self, failure: HaltReason) -> TickOutcome {
        self.stats.cycles_failed += 1;
        log_warn!("[driver] Cycle {} failed: {}", self.cycle_number, failure);

        match self.config.on_failure {
            FailurePolicy::Restart => TickOutcome::CycleFailed {
                cycle: self.cycle_number,
                error: failure.to_string(),
            },
            FailurePolicy::Halt => self.halt(failure),
        }
    }

    fn halt(&mut self, reason: HaltReason) -> TickOutcome {
        log_info!("[driver] Halted: {}", reason);
        self.cycle = None;
        self.halted = Some(reason.clone());
        TickOutcome::Halted(reason)
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    /// Work items executed by the most recent tick.
    pub fn items_last_tick(&self) -> u32 {
        self.items_last_tick
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Number of the cycle in flight, or of the last one started.
    pub fn cycle_number(&self) -> u64 {
        self.cycle_number
    }

    pub fn current_cycle(&self) -> Option<&CycleHandle<S::Item>> {
        self.cycle.as_ref()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn halt_reason(&self) -> Option<&HaltReason> {
        self.halted.as_ref()
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}
