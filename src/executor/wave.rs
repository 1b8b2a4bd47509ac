//! Wave scheduling with bounded parallelism and per-task timeouts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::registry::{ExecutionRegistry, ExecutionStatus};
use crate::config::ExecutorConfig;
use crate::domain::{
    ExecutionContext, ExecutionMetrics, ExecutionReport, Task, TaskResult, Wave, WaveResult,
    WorkerOutcome,
};
use crate::error::Result;
use crate::events::{EventBus, EventKind, ExecutionEvent};

/// Pluggable worker: runs one task to an outcome. Must not outlive the
/// caller's timeout; the executor races it against a deadline regardless.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task, context: &ExecutionContext) -> Result<WorkerOutcome>;
}

/// Optional backoff/retry wrapper substituted transparently for the plain
/// executor when present.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn execute_with_retry(
        &self,
        task: &Task,
        context: &ExecutionContext,
    ) -> Result<WorkerOutcome>;
}

/// Resolves a workflow id into ordered waves of independent tasks.
pub trait WaveAnalyzer: Send + Sync {
    fn analyze(&self, workflow_id: &str) -> Result<WavePlan>;
}

#[derive(Debug, Clone, Default)]
pub struct WavePlan {
    pub waves: Vec<Wave>,
}

/// Snapshot of executor state for monitoring.
#[derive(Debug, Clone)]
pub struct ExecutorStatus {
    pub current_wave: Option<usize>,
    pub active_executions: usize,
    pub completed_waves: usize,
}

/// Schedules waves strictly in order: tasks within a wave run concurrently
/// in chunks of `max_parallel`, and wave N+1 never starts before wave N has
/// fully settled.
pub struct WaveExecutor {
    config: ExecutorConfig,
    executor: Option<Arc<dyn TaskExecutor>>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    analyzer: Option<Arc<dyn WaveAnalyzer>>,
    registry: ExecutionRegistry,
    events: EventBus,
    completed_waves: RwLock<Vec<WaveResult>>,
    /// 1-based index of the wave in flight, 0 when idle.
    current_wave: AtomicUsize,
}

impl WaveExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            executor: None,
            rate_limiter: None,
            analyzer: None,
            registry: ExecutionRegistry::new(),
            events: EventBus::default(),
            completed_waves: RwLock::new(Vec::new()),
            current_wave: AtomicUsize::new(0),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn WaveAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &ExecutionRegistry {
        &self.registry
    }

    /// Execute all waves for a workflow.
    ///
    /// Waves come from the analyzer when one is configured; otherwise the
    /// caller's `context.tasks` form a single synthetic wave. With neither,
    /// the run succeeds vacuously.
    pub async fn execute_waves(
        &self,
        workflow_id: &str,
        context: &ExecutionContext,
    ) -> Result<ExecutionReport> {
        let run_id = Uuid::new_v4().to_string();
        let waves = self.resolve_waves(workflow_id, context);

        if waves.is_empty() {
            debug!(workflow_id, "No waves to execute");
            return Ok(ExecutionReport {
                run_id,
                workflow_id: workflow_id.to_string(),
                success: true,
                waves: Vec::new(),
                metrics: ExecutionMetrics {
                    success_rate: 100.0,
                    parallel_efficiency: 1.0,
                    ..ExecutionMetrics::default()
                },
                aborted: false,
                total_duration_ms: 0,
                message: Some("No waves to execute".to_string()),
            });
        }

        info!(workflow_id, run_id = %run_id, waves = waves.len(), "Starting wave execution");
        self.events.emit(
            ExecutionEvent::new(EventKind::ExecutionStarted)
                .with_workflow(workflow_id)
                .with_detail(json!({ "run_id": run_id })),
        );

        let started = Instant::now();
        let mut wave_results: Vec<WaveResult> = Vec::new();
        let mut aborted = false;

        for wave in &waves {
            self.current_wave.store(wave.index, Ordering::Relaxed);
            self.events.emit(
                ExecutionEvent::new(EventKind::WaveStarted)
                    .with_workflow(workflow_id)
                    .with_wave(wave.index)
                    .with_detail(json!({ "tasks": wave.tasks.len() })),
            );

            let results = self.execute_wave(wave, context).await;
            let wave_result = WaveResult::new(wave.index, results);

            self.events.emit(
                ExecutionEvent::new(EventKind::WaveCompleted)
                    .with_workflow(workflow_id)
                    .with_wave(wave.index)
                    .with_detail(json!({ "all_succeeded": wave_result.all_succeeded })),
            );

            self.completed_waves.write().push(wave_result.clone());
            let abort_now = self.should_abort(wave, &wave_result);
            wave_results.push(wave_result);

            if abort_now {
                warn!(
                    workflow_id,
                    wave = wave.index,
                    "Critical task failed under strict policy, aborting remaining waves"
                );
                aborted = true;
                break;
            }
        }

        self.current_wave.store(0, Ordering::Relaxed);

        let metrics = self.calculate_metrics(&wave_results);
        let success = !aborted && wave_results.iter().all(|w| w.all_succeeded);

        self.events.emit(
            ExecutionEvent::new(EventKind::ExecutionCompleted)
                .with_workflow(workflow_id)
                .with_detail(json!({ "success": success, "aborted": aborted })),
        );

        Ok(ExecutionReport {
            run_id,
            workflow_id: workflow_id.to_string(),
            success,
            waves: wave_results,
            metrics,
            aborted,
            total_duration_ms: started.elapsed().as_millis() as u64,
            message: None,
        })
    }

    fn resolve_waves(&self, workflow_id: &str, context: &ExecutionContext) -> Vec<Wave> {
        if let Some(analyzer) = &self.analyzer {
            match analyzer.analyze(workflow_id) {
                Ok(plan) if !plan.waves.is_empty() => return plan.waves,
                Ok(_) => debug!(workflow_id, "Analyzer produced no waves"),
                Err(e) => {
                    warn!(workflow_id, error = %e, "Wave analyzer failed, falling back to context tasks")
                }
            }
        }

        if context.tasks.is_empty() {
            Vec::new()
        } else {
            vec![Wave::new(1, context.tasks.clone())]
        }
    }

    /// Run one wave: chunks sequentially, tasks within a chunk concurrently.
    pub async fn execute_wave(&self, wave: &Wave, context: &ExecutionContext) -> Vec<TaskResult> {
        if wave.tasks.is_empty() {
            return Vec::new();
        }

        let mut results = Vec::with_capacity(wave.tasks.len());

        for chunk in chunk_array(&wave.tasks, self.config.max_parallel) {
            let chunk_results = join_all(
                chunk
                    .iter()
                    .map(|task| self.execute_task_with_timeout_in_wave(task, context, wave.index)),
            )
            .await;
            results.extend(chunk_results);
        }

        results
    }

    /// Race the worker against the configured deadline. Expiry and worker
    /// errors both settle into a failed result; nothing is thrown.
    pub async fn execute_task_with_timeout(
        &self,
        task: &Task,
        context: &ExecutionContext,
    ) -> TaskResult {
        self.execute_task_with_timeout_in_wave(task, context, 0)
            .await
    }

    async fn execute_task_with_timeout_in_wave(
        &self,
        task: &Task,
        context: &ExecutionContext,
        wave_index: usize,
    ) -> TaskResult {
        let wave = (wave_index > 0).then_some(wave_index);
        self.registry.begin(&task.id, wave);
        self.events.emit(
            ExecutionEvent::new(EventKind::TaskStarted)
                .with_task(&task.id)
                .with_wave(wave_index),
        );

        let started = Instant::now();
        let deadline = Duration::from_millis(self.config.task_timeout_ms);

        let outcome = tokio::time::timeout(deadline, self.invoke_worker(task, context)).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        let result = match outcome {
            Ok(Ok(worker)) => TaskResult {
                task_id: task.id.clone(),
                agent: task.agent.clone(),
                success: worker.success,
                output: worker.output,
                error: worker.error,
                files_modified: worker.files_modified,
                duration_ms,
            },
            Ok(Err(e)) => {
                debug!(task_id = %task.id, error = %e, "Worker returned an error");
                TaskResult::failure(&task.id, e.to_string()).with_duration_ms(duration_ms)
            }
            Err(_) => {
                warn!(task_id = %task.id, timeout_ms = self.config.task_timeout_ms, "Task timed out");
                TaskResult::failure(
                    &task.id,
                    format!(
                        "task '{}' timed out after {}ms",
                        task.id, self.config.task_timeout_ms
                    ),
                )
                .with_duration_ms(duration_ms)
            }
        };

        self.registry.complete(&task.id);
        self.events.emit(
            ExecutionEvent::new(EventKind::TaskCompleted)
                .with_task(&task.id)
                .with_wave(wave_index)
                .with_detail(json!({ "success": result.success })),
        );

        result
    }

    async fn invoke_worker(
        &self,
        task: &Task,
        context: &ExecutionContext,
    ) -> Result<WorkerOutcome> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.execute_with_retry(task, context).await
        } else if let Some(executor) = &self.executor {
            executor.execute(task, context).await
        } else {
            Ok(WorkerOutcome::err("no task executor configured"))
        }
    }

    fn should_abort(&self, wave: &Wave, result: &WaveResult) -> bool {
        if self.config.continue_on_non_critical_failure {
            return false;
        }

        result.results.iter().any(|r| {
            !r.success
                && wave
                    .tasks
                    .iter()
                    .any(|t| t.id == r.task_id && t.critical)
        })
    }

    /// Cooperative cancellation: flips every running execution to cancelled
    /// and emits events. The underlying workers are expected to notice and
    /// stop; nothing is force-killed.
    pub fn cancel_all(&self) {
        let cancelled = self.registry.cancel_all();
        for task_id in &cancelled {
            self.events
                .emit(ExecutionEvent::new(EventKind::TaskCancelled).with_task(task_id));
        }
        self.events.emit(
            ExecutionEvent::new(EventKind::ExecutionCancelled)
                .with_detail(json!({ "cancelled": cancelled.len() })),
        );
        info!(cancelled = cancelled.len(), "All active executions cancelled");
    }

    pub fn calculate_metrics(&self, waves: &[WaveResult]) -> ExecutionMetrics {
        let total_tasks: usize = waves.iter().map(|w| w.results.len()).sum();
        let successful: usize = waves
            .iter()
            .flat_map(|w| &w.results)
            .filter(|r| r.success)
            .count();
        let failed = total_tasks - successful;

        let success_rate = if total_tasks == 0 {
            100.0
        } else {
            successful as f64 / total_tasks as f64 * 100.0
        };

        let total_duration_ms: u64 = waves
            .iter()
            .flat_map(|w| &w.results)
            .map(|r| r.duration_ms)
            .sum();

        let wall_time_ms: u64 = waves
            .iter()
            .map(|w| w.results.iter().map(|r| r.duration_ms).max().unwrap_or(0))
            .sum();

        let parallel_efficiency = if wall_time_ms == 0 {
            1.0
        } else {
            total_duration_ms as f64 / wall_time_ms as f64
        };

        ExecutionMetrics {
            total_tasks,
            successful,
            failed,
            success_rate,
            total_duration_ms,
            wall_time_ms,
            parallel_efficiency,
            total_waves: waves.len(),
        }
    }

    pub fn status(&self) -> ExecutorStatus {
        let current = self.current_wave.load(Ordering::Relaxed);
        ExecutorStatus {
            current_wave: (current > 0).then_some(current),
            active_executions: self.registry.running_count(),
            completed_waves: self.completed_waves.read().len(),
        }
    }

    pub fn format_status(&self) -> String {
        let status = self.status();
        format!(
            "Wave Executor Status\n  Current wave: {}\n  Active executions: {}\n  Completed waves: {}\n  Max parallel: {}\n  Task timeout: {}ms\n",
            status
                .current_wave
                .map(|w| w.to_string())
                .unwrap_or_else(|| "-".to_string()),
            status.active_executions,
            status.completed_waves,
            self.config.max_parallel,
            self.config.task_timeout_ms
        )
    }

    pub fn task_status(&self, task_id: &str) -> Option<ExecutionStatus> {
        self.registry.status_of(task_id)
    }
}

/// Fixed-size chunking preserving order; the last chunk may be short.
pub fn chunk_array<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    items.chunks(size).map(|chunk| chunk.to_vec()).collect()
}
