#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tick_golem::config::DriverConfig;
use tick_golem::phase::Phase;
use tick_golem::scheduler::CycleHandle;
use tick_golem::types::DriveResult;
use tick_golem::FailurePolicy;

/// Work item used throughout the tests: a boxed closure.
pub type Job = Box<dyn FnOnce()>;

/// Shared record of executed item ids, in execution order.
#[derive(Clone, Default)]
pub struct Recorder(Rc<RefCell<Vec<u32>>>);

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A job that appends `id` when executed.
    pub fn job(&self, id: u32) -> Job {
        let log = Rc::clone(&self.0);
        Box::new(move || log.borrow_mut().push(id))
    }

    pub fn executed(&self) -> Vec<u32> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }
}

/// Creates a phase whose items record `ids` in order.
///
/// The jobs are built when the phase is reached, not when it is created.
pub fn numbered_phase(name: &str, ids: &[u32], recorder: &Recorder) -> Phase<Job> {
    let ids = ids.to_vec();
    let recorder = recorder.clone();
    Phase::new(name, move || {
        Ok(ids
            .into_iter()
            .map(move |id| recorder.job(id))
            .collect::<Vec<Job>>())
    })
}

/// Builds phases from `(name, ids)` pairs.
pub fn numbered_phases(shape: &[(&str, &[u32])], recorder: &Recorder) -> Vec<Phase<Job>> {
    shape
        .iter()
        .map(|(name, ids)| numbered_phase(name, ids, recorder))
        .collect()
}

/// Drives `cycle` until `Completed`, returning each call's result together
/// with the number of items it executed.
///
/// Panics after `limit` calls so a scheduler that stops making progress
/// fails the test instead of hanging it.
pub fn drive_to_completion(
    cycle: &mut CycleHandle<Job>,
    budget: u32,
    recorder: &Recorder,
    limit: usize,
) -> Vec<(DriveResult, usize)> {
    let mut calls = Vec::new();
    for _ in 0..limit {
        let before = recorder.len();
        let result = cycle.drive(budget).expect("drive should succeed");
        let executed = recorder.len() - before;
        let done = result.is_completed();
        calls.push((result, executed));
        if done {
            return calls;
        }
    }
    panic!("cycle did not complete within {} drive calls", limit);
}

pub fn driver_config(budget: u32) -> DriverConfig {
    DriverConfig {
        budget,
        tick_interval: 1,
        tick_ms: 1,
        on_failure: FailurePolicy::Restart,
        max_cycles: None,
    }
}

/// Writes `contents` to `{dir}/{name}` and returns the path.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write test file");
    path
}
