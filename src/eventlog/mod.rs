//! Hierarchical progress log
//!
//! A [`Log`] opens [`Stage`]s; a stage hands out [`Task`]s with increasing
//! indices up to its declared total. Every task transition becomes one
//! [`LogEntry`] written to a pluggable [`Device`].
//!
//! # Task states
//!
//! | State | Entry emitted | Progress |
//! |-------|---------------|----------|
//! | Created | none | - |
//! | Started | `started` | 0 |
//! | Finished | `finished` | 100 |
//! | Failed | `failed` + `data.error` | 100 |
//!
//! A task dropped before it ends (its future was cancelled) is recorded as
//! failed with `data.error = "cancelled"`, so every started task gets exactly
//! one terminal entry.
//!
//! Progress reporting is best effort: a device failure is logged through
//! `tracing` and never reaches the caller.

mod device;
mod factory;

pub use device::{Device, JsonDevice, TextDevice};
pub use factory::{DeviceType, Factory};

use crate::error::RelprovResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::error;

/// State of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Created,
    Started,
    Finished,
    Failed,
}

impl TaskState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One line of the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unix timestamp in seconds
    pub time: i64,

    pub stage: String,
    pub task: String,
    pub tags: Vec<String>,

    pub total: usize,
    pub index: usize,

    pub state: TaskState,
    pub progress: u8,

    /// Might contain an `error` key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, serde_json::Value>>,
}

/// Event log writing entries to a device
///
/// Cloning is cheap; clones share the device, and writes from all clones
/// are serialized so entries never interleave.
#[derive(Clone)]
pub struct Log {
    device: Arc<Mutex<Box<dyn Device>>>,
}

impl Log {
    pub fn new(device: impl Device + 'static) -> Self {
        Self {
            device: Arc::new(Mutex::new(Box::new(device))),
        }
    }

    /// Open a stage expecting `total` tasks
    pub fn begin_stage(&self, name: impl Into<String>, total: usize) -> Stage {
        Stage {
            log: self.clone(),
            name: name.into(),
            total,
            next_index: AtomicUsize::new(0),
        }
    }

    /// Write an entry, logging instead of returning any failure
    pub fn write_log_entry_no_err(&self, entry: &LogEntry) {
        let mut device = match self.device.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Err(e) = device.write_log_entry(entry) {
            error!("Failed writing log entry: {}", e);
        }
    }
}

impl fmt::Debug for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Log").finish_non_exhaustive()
    }
}

/// A group of a known number of tasks
#[derive(Debug)]
pub struct Stage {
    log: Log,
    name: String,
    total: usize,
    next_index: AtomicUsize,
}

impl Stage {
    /// Create the next task and start it
    pub fn begin_task(&self, name: impl Into<String>) -> Task<'_> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let mut task = Task {
            stage: self,
            name: name.into(),
            index,
            state: TaskState::Created,
        };
        task.start();
        task
    }
}

/// A unit of progress inside a stage
///
/// Ending a task consumes it, so a task cannot be ended twice or restarted.
#[derive(Debug)]
pub struct Task<'s> {
    stage: &'s Stage,
    name: String,
    index: usize,
    state: TaskState,
}

impl Task<'_> {
    pub fn state(&self) -> TaskState {
        self.state
    }

    fn start(&mut self) {
        debug_assert_eq!(self.state, TaskState::Created);
        self.state = TaskState::Started;
        self.emit(0, None);
    }

    /// Finish or fail the task according to `result`, then hand it back
    pub fn end<T>(mut self, result: RelprovResult<T>) -> RelprovResult<T> {
        match &result {
            Ok(_) => {
                self.state = TaskState::Finished;
                self.emit(100, None);
            }
            Err(e) => self.fail(e.to_string()),
        }
        result
    }

    fn fail(&mut self, error: String) {
        self.state = TaskState::Failed;
        let mut data = BTreeMap::new();
        data.insert("error".to_string(), serde_json::Value::String(error));
        self.emit(100, Some(data));
    }

    fn emit(&self, progress: u8, data: Option<BTreeMap<String, serde_json::Value>>) {
        let entry = LogEntry {
            time: Utc::now().timestamp(),
            stage: self.stage.name.clone(),
            task: self.name.clone(),
            tags: vec![],
            total: self.stage.total,
            index: self.index,
            state: self.state,
            progress,
            data,
        };
        self.stage.log.write_log_entry_no_err(&entry);
    }
}

impl Drop for Task<'_> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.fail("cancelled".to_string());
        }
    }
}
