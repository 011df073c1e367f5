use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::driver::PhaseSource;
use crate::log_trace;
use crate::phase::{Phase, WorkItem};
use crate::tick_error::{ProduceError, TickError};

// --- Plan file ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Plan {
    #[serde(default)]
    pub phases: Vec<PlanPhase>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PlanPhase {
    pub name: String,
    #[serde(default)]
    pub items: Vec<String>,
    /// Generates `{name}-1..={name}-N` instead of listing items.
    #[serde(default)]
    pub repeat: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PlanPhase {
    pub fn new(name: &str, items: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            items: items.iter().map(|s| s.to_string()).collect(),
            repeat: None,
            enabled: true,
        }
    }

    /// Item labels in execution order.
    pub fn labels(&self) -> Vec<String> {
        match self.repeat {
            Some(n) => (1..=n).map(|i| format!("{}-{}", self.name, i)).collect(),
            None => self.items.clone(),
        }
    }
}

pub fn load_plan(path: &Path) -> Result<Plan, TickError> {
    let contents = std::fs::read_to_string(path).map_err(|source| TickError::Io {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str(&contents)
        .map_err(|e| TickError::Plan(format!("Failed to parse {}: {}", path.display(), e)))
}

pub fn validate_plan(plan: &Plan) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if !plan.phases.iter().any(|p| p.enabled) {
        errors.push("plan must have at least one enabled phase".to_string());
    }

    let mut seen_names = HashSet::new();
    for (index, phase) in plan.phases.iter().enumerate() {
        if phase.name.trim().is_empty() {
            errors.push(format!("phases[{}]: name must not be empty", index));
            continue;
        }

        if !seen_names.insert(phase.name.as_str()) {
            errors.push(format!("duplicate phase name '{}'", phase.name));
        }

        if phase.repeat.is_some() && !phase.items.is_empty() {
            errors.push(format!(
                "phase '{}': set either items or repeat, not both",
                phase.name
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Load and validate in one step, folding validation errors into
/// `TickError::Plan`.
///
/// Used on every re-read while running, since the file may have been edited
/// into an invalid state since the last check.
pub fn load_valid_plan(path: &Path) -> Result<Plan, TickError> {
    let plan = load_plan(path)?;
    validate_plan(&plan).map_err(|errors| {
        TickError::Plan(format!("{} is invalid: {}", path.display(), errors.join("; ")))
    })?;
    Ok(plan)
}

/// Contents written by `tick-golem init`.
pub fn default_plan_toml() -> String {
    r#"[[phases]]
name = "intake"
items = ["unload", "sort", "stack"]

[[phases]]
name = "sweep"
repeat = 12

[[phases]]
name = "audit"
items = ["count", "report"]
"#
    .to_string()
}

// --- Execution log ---

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ExecutedItem {
    pub cycle: u64,
    pub phase: String,
    pub label: String,
}

#[derive(Default)]
struct LogInner {
    total: u64,
    per_phase: BTreeMap<String, u64>,
    entries: Vec<ExecutedItem>,
}

/// Shared record of executed plan items.
///
/// Counts are always kept. Individual entries are only retained when
/// `retain_entries` is set, since a long run executes items indefinitely.
#[derive(Clone, Default)]
pub struct ExecutionLog {
    inner: Rc<RefCell<LogInner>>,
    retain_entries: bool,
}

impl ExecutionLog {
    pub fn new(retain_entries: bool) -> Self {
        Self {
            inner: Rc::default(),
            retain_entries,
        }
    }

    pub fn record(&self, item: ExecutedItem) {
        let mut inner = self.inner.borrow_mut();
        inner.total += 1;
        *inner.per_phase.entry(item.phase.clone()).or_insert(0) += 1;
        if self.retain_entries {
            inner.entries.push(item);
        }
    }

    pub fn total(&self) -> u64 {
        self.inner.borrow().total
    }

    pub fn per_phase(&self) -> BTreeMap<String, u64> {
        self.inner.borrow().per_phase.clone()
    }

    pub fn entries(&self) -> Vec<ExecutedItem> {
        self.inner.borrow().entries.clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.inner
            .borrow()
            .entries
            .iter()
            .map(|e| e.label.clone())
            .collect()
    }
}

// --- Work items and source ---

/// One plan entry. Executing it records it in the shared log.
pub struct PlanItem {
    cycle: u64,
    phase: String,
    label: String,
    log: ExecutionLog,
}

impl WorkItem for PlanItem {
    fn execute(self) {
        log_trace!("[{}] {} (cycle {})", self.phase, self.label, self.cycle);
        self.log.record(ExecutedItem {
            cycle: self.cycle,
            phase: self.phase,
            label: self.label,
        });
    }
}

/// Serves phases from a plan file, re-reading it as the cycle progresses.
///
/// The phase list is read when a cycle starts. Each phase's items are read
/// again when that phase is reached, so edits to the file take effect without
/// a restart. Every re-read is validated again, so an edit that leaves the
/// file invalid (a duplicated phase name, say) fails the cycle instead of
/// resolving to the wrong entry. A phase removed or disabled mid-cycle also
/// fails the cycle.
pub struct PlanSource {
    path: PathBuf,
    log: ExecutionLog,
    cycle: u64,
}

impl PlanSource {
    pub fn new(path: PathBuf, log: ExecutionLog) -> Self {
        Self { path, log, cycle: 0 }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }
}

impl PhaseSource for PlanSource {
    type Item = PlanItem;

    fn phases(&mut self) -> Result<Vec<Phase<PlanItem>>, ProduceError> {
        let plan = load_valid_plan(&self.path)?;
        self.cycle += 1;

        let phases = plan
            .phases
            .iter()
            .filter(|p| p.enabled)
            .map(|p| {
                let name = p.name.clone();
                let path = self.path.clone();
                let log = self.log.clone();
                let cycle = self.cycle;

                Phase::new(p.name.clone(), move || {
                    let plan = load_valid_plan(&path)?;
                    let phase = plan
                        .phases
                        .into_iter()
                        .find(|entry| entry.name == name && entry.enabled)
                        .ok_or_else(|| {
                            TickError::Plan(format!(
                                "phase '{}' is no longer enabled in {}",
                                name,
                                path.display()
                            ))
                        })?;

                    Ok(phase.labels().into_iter().map(move |label| PlanItem {
                        cycle,
                        phase: name.clone(),
                        label,
                        log: log.clone(),
                    }))
                })
            })
            .collect();

        Ok(phases)
    }

    fn validate(&mut self) -> Result<(), Vec<String>> {
        let plan = load_plan(&self.path).map_err(|e| vec![e.to_string()])?;
        validate_plan(&plan)
    }
}
