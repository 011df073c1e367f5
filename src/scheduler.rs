use crate::phase::{ItemIter, Phase, Producer, WorkItem};
use crate::tick_error::TickError;
use crate::types::{CycleProgress, DriveResult, Suspension};
use crate::{log_debug, log_trace};

// --- Internal state ---

struct PhaseSlot<W> {
    name: String,
    /// Taken when the phase opens; `None` afterwards.
    producer: Option<Producer<W>>,
}

enum CycleState<W> {
    /// Before the first phase, or between two phases. The phase at `next`
    /// opens on the next drive.
    Boundary { next: usize },
    /// Drawing items from phase `index`. `items` is positioned at the next
    /// item to execute; nothing past it has been produced.
    Running { index: usize, items: ItemIter<W> },
    Completed,
    Failed,
}

// --- CycleHandle ---

/// One in-flight pass over an ordered list of phases.
///
/// Boundary rule: the per-drive counter is checked only after an item has
/// executed. When the counter reaches the budget the call returns
/// `Suspended(Budget)` without pulling the next item, so no item is produced
/// before the call that executes it. The one exception is a sequence whose
/// `size_hint` already reports nothing left: then the suspension doubles as
/// the phase boundary. Otherwise the next drive finds the phase exhausted and
/// returns `Suspended(PhaseBoundary)` after 0 items. A phase that runs out
/// before the budget is spent also yields `Suspended(PhaseBoundary)`, so
/// every phase boundary yields exactly once. The last phase ends in
/// `Completed` instead.
pub struct CycleHandle<W> {
    phases: Vec<PhaseSlot<W>>,
    state: CycleState<W>,
    items_executed: u64,
    items_last_drive: u32,
    phases_finished: usize,
}

impl<W: WorkItem> CycleHandle<W> {
    /// Begin a new cycle. No producer runs until the first `drive`.
    pub fn start(phases: Vec<Phase<W>>) -> Result<Self, TickError> {
        if phases.is_empty() {
            return Err(TickError::EmptyPhaseList);
        }

        let phases: Vec<PhaseSlot<W>> = phases
            .into_iter()
            .map(|phase| {
                let (name, producer) = phase.into_parts();
                PhaseSlot {
                    name,
                    producer: Some(producer),
                }
            })
            .collect();

        log_debug!("[cycle] Starting cycle with {} phase(s)", phases.len());

        Ok(Self {
            phases,
            state: CycleState::Boundary { next: 0 },
            items_executed: 0,
            items_last_drive: 0,
            phases_finished: 0,
        })
    }

    /// Execute up to `budget` items, resuming exactly where the previous call
    /// stopped.
    ///
    /// A producer failure abandons the cycle: the error is returned and every
    /// later call fails with `InvalidHandleReuse`. Items that already executed
    /// are not rolled back.
    pub fn drive(&mut self, budget: u32) -> Result<DriveResult, TickError> {
        if budget == 0 {
            return Err(TickError::InvalidBudget(budget));
        }

        // Parked as Failed while running, so a panicking item leaves the
        // handle unusable rather than half-advanced.
        let mut state = std::mem::replace(&mut self.state, CycleState::Failed);
        if matches!(state, CycleState::Completed | CycleState::Failed) {
            self.state = state;
            return Err(TickError::InvalidHandleReuse);
        }

        self.items_last_drive = 0;
        let result = self.run(&mut state, budget);
        self.state = state;
        result
    }

    fn run(&mut self, state: &mut CycleState<W>, budget: u32) -> Result<DriveResult, TickError> {
        loop {
            match std::mem::replace(state, CycleState::Failed) {
                CycleState::Boundary { next } => {
                    let items = self.open_phase(next)?;
                    *state = CycleState::Running { index: next, items };
                }
                CycleState::Running { index, mut items } => {
                    let Some(item) = items.next() else {
                        return Ok(self.finish_phase(index, state));
                    };

                    item.execute();
                    self.items_last_drive += 1;
                    self.items_executed += 1;

                    if self.items_last_drive < budget {
                        *state = CycleState::Running { index, items };
                        continue;
                    }

                    if known_exhausted(&items) {
                        return Ok(self.finish_phase(index, state));
                    }

                    log_trace!(
                        "[cycle] Budget of {} spent in phase '{}'",
                        budget,
                        self.phases[index].name
                    );
                    *state = CycleState::Running { index, items };
                    return Ok(DriveResult::Suspended(Suspension::Budget));
                }
                terminal @ (CycleState::Completed | CycleState::Failed) => {
                    *state = terminal;
                    return Err(TickError::InvalidHandleReuse);
                }
            }
        }
    }

    fn open_phase(&mut self, index: usize) -> Result<ItemIter<W>, TickError> {
        let slot = &mut self.phases[index];
        let producer = slot.producer.take().ok_or(TickError::InvalidHandleReuse)?;

        log_debug!("[cycle] Entering phase '{}'", slot.name);

        producer().map_err(|source| TickError::PhaseProductionFailure {
            phase: slot.name.clone(),
            source,
        })
    }

    fn finish_phase(&mut self, index: usize, state: &mut CycleState<W>) -> DriveResult {
        self.phases_finished += 1;
        let finished = self.phases[index].name.clone();

        if index + 1 == self.phases.len() {
            log_debug!(
                "[cycle] Phase '{}' finished, cycle complete ({} items)",
                finished,
                self.items_executed
            );
            *state = CycleState::Completed;
            return DriveResult::Completed;
        }

        log_debug!("[cycle] Phase '{}' finished", finished);
        *state = CycleState::Boundary { next: index + 1 };
        DriveResult::Suspended(Suspension::PhaseBoundary { finished })
    }
}

/// True only when the sequence promises no further items. Never pulls one.
fn known_exhausted<W>(items: &ItemIter<W>) -> bool {
    items.size_hint().1 == Some(0)
}

impl<W> CycleHandle<W> {
    /// True once the cycle completed or failed. Further drives will error.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, CycleState::Completed | CycleState::Failed)
    }

    pub fn phase_names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn progress(&self) -> CycleProgress {
        let (phase_index, current_phase) = match &self.state {
            CycleState::Boundary { next } => (*next, None),
            CycleState::Running { index, .. } => (*index, Some(self.phases[*index].name.clone())),
            CycleState::Completed | CycleState::Failed => (self.phases_finished, None),
        };

        CycleProgress {
            phase_index,
            phase_count: self.phases.len(),
            current_phase,
            items_executed: self.items_executed,
            items_last_drive: self.items_last_drive,
            phases_finished: self.phases_finished,
        }
    }
}

impl<W> std::fmt::Debug for CycleHandle<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleHandle")
            .field("phases", &self.phase_names())
            .field("progress", &self.progress())
            .finish()
    }
}
