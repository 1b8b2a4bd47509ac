use serde::{Deserialize, Serialize};

/// Raw contract returned by workers (`TaskExecutor`, `SubagentRunner`).
///
/// The executor and dispatcher wrap this into a `TaskResult` with timing and
/// agent attribution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub success: bool,

    #[serde(default)]
    pub output: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub files_modified: Vec<String>,
}

impl WorkerOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            files_modified: Vec::new(),
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            files_modified: Vec::new(),
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files_modified = files;
        self
    }
}

/// Outcome of a single task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    pub success: bool,

    #[serde(default)]
    pub output: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub files_modified: Vec<String>,

    pub duration_ms: u64,
}

impl TaskResult {
    pub fn success(task_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            agent: None,
            success: true,
            output: output.into(),
            error: None,
            files_modified: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn failure(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            agent: None,
            success: false,
            output: String::new(),
            error: Some(error.into()),
            files_modified: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files_modified = files;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// All task results from one settled wave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveResult {
    pub wave_index: usize,
    pub results: Vec<TaskResult>,
    pub all_succeeded: bool,
}

impl WaveResult {
    pub fn new(wave_index: usize, results: Vec<TaskResult>) -> Self {
        let all_succeeded = results.iter().all(|r| r.success);
        Self {
            wave_index,
            results,
            all_succeeded,
        }
    }
}

/// Aggregate metrics over a full execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub total_tasks: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage, 100 when no tasks ran.
    pub success_rate: f64,
    /// Sum of individual task durations.
    pub total_duration_ms: u64,
    /// Sum over waves of the longest task duration in each wave.
    pub wall_time_ms: u64,
    /// total_duration / wall_time; >= 1 when at least two tasks overlapped.
    pub parallel_efficiency: f64,
    pub total_waves: usize,
}

/// Final outcome of `execute_waves`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Unique id of this execution run.
    pub run_id: String,
    pub workflow_id: String,
    pub success: bool,
    pub waves: Vec<WaveResult>,
    pub metrics: ExecutionMetrics,
    pub aborted: bool,
    pub total_duration_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
