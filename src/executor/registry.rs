//! Active-execution tracking for the wave executor.

use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ActiveExecution {
    pub task_id: String,
    pub wave_index: Option<usize>,
    pub status: ExecutionStatus,
    pub started_at: Instant,
}

/// Registry of task executions keyed by task id.
///
/// Entries persist after completion for monitoring; `cancel_all` flips
/// running entries only. Cancellation is cooperative, so a flipped status is
/// a signal, not a termination.
#[derive(Debug, Default)]
pub struct ExecutionRegistry {
    entries: DashMap<String, ActiveExecution>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, task_id: &str, wave_index: Option<usize>) {
        self.entries.insert(
            task_id.to_string(),
            ActiveExecution {
                task_id: task_id.to_string(),
                wave_index,
                status: ExecutionStatus::Running,
                started_at: Instant::now(),
            },
        );
    }

    pub fn complete(&self, task_id: &str) {
        if let Some(mut entry) = self.entries.get_mut(task_id) {
            if entry.status == ExecutionStatus::Running {
                entry.status = ExecutionStatus::Completed;
            }
        }
    }

    /// Flip every running entry to cancelled; returns the affected task ids.
    pub fn cancel_all(&self) -> Vec<String> {
        let mut cancelled = Vec::new();
        for mut entry in self.entries.iter_mut() {
            if entry.status == ExecutionStatus::Running {
                entry.status = ExecutionStatus::Cancelled;
                cancelled.push(entry.task_id.clone());
            }
        }
        cancelled.sort();
        cancelled
    }

    pub fn status_of(&self, task_id: &str) -> Option<ExecutionStatus> {
        self.entries.get(task_id).map(|e| e.status)
    }

    pub fn running_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == ExecutionStatus::Running)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
