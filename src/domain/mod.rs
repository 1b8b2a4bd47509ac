//! Core data model: tasks, waves, and execution results.

mod result;
mod task;

pub use result::{ExecutionMetrics, ExecutionReport, TaskResult, WaveResult, WorkerOutcome};
pub use task::{ExecutionContext, Task, Wave};
