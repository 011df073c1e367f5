use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Suspension, TickOutcome};

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Suspended,
    PhaseBoundary,
    Completed,
    Failed,
    Halted,
}

/// One line of the JSONL trace.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TraceEvent {
    pub at: DateTime<Utc>,
    pub tick: u64,
    pub cycle: u64,
    pub event: TraceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Items executed during this tick.
    pub items: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TraceEvent {
    /// Build the event for a tick. Skipped ticks are not traced.
    pub fn from_outcome(tick: u64, cycle: u64, outcome: &TickOutcome, items: u32) -> Option<Self> {
        let (event, phase, detail) = match outcome {
            TickOutcome::Skipped => return None,
            TickOutcome::Suspended(Suspension::Budget) => (TraceKind::Suspended, None, None),
            TickOutcome::Suspended(Suspension::PhaseBoundary { finished }) => {
                (TraceKind::PhaseBoundary, Some(finished.clone()), None)
            }
            TickOutcome::CycleCompleted { .. } => (TraceKind::Completed, None, None),
            TickOutcome::CycleFailed { error, .. } => (TraceKind::Failed, None, Some(error.clone())),
            TickOutcome::Halted(reason) => (TraceKind::Halted, None, Some(reason.to_string())),
        };

        Some(Self {
            at: Utc::now(),
            tick,
            cycle,
            event,
            phase,
            items,
            detail,
        })
    }
}

/// Appends trace events to a file, one JSON object per line.
///
/// Creates the file and parent directories if missing.
pub struct TraceWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl TraceWriter {
    pub fn open(path: &Path) -> Result<Self, String> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    format!(
                        "Failed to create trace directory {}: {}",
                        parent.display(),
                        e
                    )
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| format!("Failed to open trace file {}: {}", path.display(), e))?;

        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, event: &TraceEvent) -> Result<(), String> {
        let line = serde_json::to_string(event)
            .map_err(|e| format!("Failed to serialize trace event: {}", e))?;
        writeln!(self.out, "{}", line)
            .map_err(|e| format!("Failed to write {}: {}", self.path.display(), e))
    }

    pub fn flush(&mut self) -> Result<(), String> {
        self.out
            .flush()
            .map_err(|e| format!("Failed to flush {}: {}", self.path.display(), e))
    }
}
