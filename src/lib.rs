//! riptide: parallel task execution and conflict resolution core for an
//! AI-assisted development orchestrator.
//!
//! Tasks arrive grouped into dependency-free waves. The [`WaveExecutor`]
//! runs each wave's tasks concurrently against pluggable workers with a
//! per-task timeout, the [`SubagentDispatcher`] resolves which agent handles
//! a task and retries failures, the [`ResultAggregator`] turns settled waves
//! into conflict lists, warnings, and reports, and the
//! [`SemanticMergeEngine`] reconciles files that several tasks modified.

pub mod aggregate;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod events;
pub mod executor;
pub mod merge;
pub mod utils;

pub use aggregate::{FileConflict, ResultAggregator, WaveAggregation};
pub use config::RiptideConfig;
pub use dispatch::{SubagentDispatcher, SubagentRunner};
pub use domain::{
    ExecutionContext, ExecutionMetrics, ExecutionReport, Task, TaskResult, Wave, WaveResult,
    WorkerOutcome,
};
pub use error::{Result, RiptideError};
pub use events::{EventBus, EventKind, ExecutionEvent};
pub use executor::{RateLimiter, TaskExecutor, WaveAnalyzer, WaveExecutor, WavePlan};
pub use merge::{
    ChangeType, CompletionClient, ConflictSeverity, MergeDecision, MergeOutcome, MergeStrategy,
    SemanticMergeEngine, TaskSnapshot,
};
