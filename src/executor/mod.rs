//! Wave execution: strict wave ordering, bounded per-wave concurrency,
//! per-task timeout and cooperative cancellation.

mod registry;
mod wave;

pub use registry::{ActiveExecution, ExecutionRegistry, ExecutionStatus};
pub use wave::{
    chunk_array, ExecutorStatus, RateLimiter, TaskExecutor, WaveAnalyzer, WaveExecutor, WavePlan,
};
