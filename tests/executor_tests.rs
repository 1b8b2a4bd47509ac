use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use riptide::config::ExecutorConfig;
use riptide::events::EventKind;
use riptide::executor::{ExecutionStatus, RateLimiter, TaskExecutor, WaveAnalyzer, WavePlan};
use riptide::{
    ExecutionContext, Result, Task, Wave, WaveExecutor, WorkerOutcome,
};

struct StaticExecutor {
    success: bool,
    delay: Duration,
    calls: AtomicUsize,
}

impl StaticExecutor {
    fn ok() -> Self {
        Self {
            success: true,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            success: false,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl TaskExecutor for StaticExecutor {
    async fn execute(&self, task: &Task, _context: &ExecutionContext) -> Result<WorkerOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.success {
            Ok(WorkerOutcome::ok("ok").with_files(vec![format!("src/{}.rs", task.id)]))
        } else {
            Ok(WorkerOutcome::err("executor failed"))
        }
    }
}

/// Executor whose future never resolves for one designated task id.
struct HangingExecutor {
    hang_task: String,
}

#[async_trait]
impl TaskExecutor for HangingExecutor {
    async fn execute(&self, task: &Task, _context: &ExecutionContext) -> Result<WorkerOutcome> {
        if task.id == self.hang_task {
            std::future::pending::<()>().await;
        }
        Ok(WorkerOutcome::ok("done"))
    }
}

struct StaticAnalyzer {
    waves: Vec<Wave>,
}

impl WaveAnalyzer for StaticAnalyzer {
    fn analyze(&self, _workflow_id: &str) -> Result<WavePlan> {
        Ok(WavePlan {
            waves: self.waves.clone(),
        })
    }
}

fn tasks(n: usize) -> Vec<Task> {
    (1..=n)
        .map(|i| Task::new(format!("task-{i}"), format!("do thing {i}")))
        .collect()
}

fn config_with_timeout(timeout_ms: u64) -> ExecutorConfig {
    ExecutorConfig {
        task_timeout_ms: timeout_ms,
        ..ExecutorConfig::default()
    }
}

#[tokio::test]
async fn executes_single_wave_successfully() {
    let executor = WaveExecutor::new(ExecutorConfig::default())
        .with_executor(Arc::new(StaticExecutor::ok()))
        .with_analyzer(Arc::new(StaticAnalyzer {
            waves: vec![Wave::new(1, tasks(2))],
        }));

    let report = executor
        .execute_waves("wf-1", &ExecutionContext::default())
        .await
        .unwrap();

    assert!(report.success);
    assert!(!report.aborted);
    assert_eq!(report.waves.len(), 1);
    assert!(report.waves[0].all_succeeded);
    assert_eq!(report.waves[0].results.len(), 2);
}

#[tokio::test]
async fn executes_multiple_sequential_waves() {
    let executor = WaveExecutor::new(ExecutorConfig::default())
        .with_executor(Arc::new(StaticExecutor::ok()))
        .with_analyzer(Arc::new(StaticAnalyzer {
            waves: vec![Wave::new(1, tasks(2)), Wave::new(2, tasks(1))],
        }));

    let report = executor
        .execute_waves("wf-1", &ExecutionContext::default())
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.waves.len(), 2);
    assert_eq!(report.metrics.total_waves, 2);
    assert_eq!(report.metrics.total_tasks, 3);
}

#[tokio::test]
async fn empty_plan_yields_vacuous_success() {
    let executor = WaveExecutor::new(ExecutorConfig::default())
        .with_analyzer(Arc::new(StaticAnalyzer { waves: vec![] }));

    let report = executor
        .execute_waves("wf-1", &ExecutionContext::default())
        .await
        .unwrap();

    assert!(report.success);
    assert!(report.waves.is_empty());
    assert_eq!(report.total_duration_ms, 0);
    assert_eq!(report.message.as_deref(), Some("No waves to execute"));
}

#[tokio::test]
async fn falls_back_to_context_tasks_without_analyzer() {
    let executor =
        WaveExecutor::new(ExecutorConfig::default()).with_executor(Arc::new(StaticExecutor::ok()));

    let context = ExecutionContext::with_tasks(tasks(2));
    let report = executor.execute_waves("wf-1", &context).await.unwrap();

    assert!(report.success);
    assert_eq!(report.waves.len(), 1);
    assert_eq!(report.waves[0].results.len(), 2);
}

#[tokio::test]
async fn non_critical_failure_does_not_abort() {
    let executor = WaveExecutor::new(ExecutorConfig::default())
        .with_executor(Arc::new(StaticExecutor::failing()))
        .with_analyzer(Arc::new(StaticAnalyzer {
            waves: vec![Wave::new(1, tasks(3))],
        }));

    let report = executor
        .execute_waves("wf-1", &ExecutionContext::default())
        .await
        .unwrap();

    assert!(!report.aborted);
    assert!(!report.success);
    assert!(!report.waves[0].all_succeeded);
    assert_eq!(report.waves[0].results.len(), 3);
}

#[tokio::test]
async fn critical_failure_aborts_remaining_waves_under_strict_policy() {
    let critical_task = Task::new("critical-1", "must not fail").critical(true);
    let config = ExecutorConfig {
        continue_on_non_critical_failure: false,
        ..ExecutorConfig::default()
    };

    let executor = WaveExecutor::new(config)
        .with_executor(Arc::new(StaticExecutor::failing()))
        .with_analyzer(Arc::new(StaticAnalyzer {
            waves: vec![Wave::new(1, vec![critical_task]), Wave::new(2, tasks(1))],
        }));

    let report = executor
        .execute_waves("wf-1", &ExecutionContext::default())
        .await
        .unwrap();

    assert!(report.aborted);
    assert!(!report.success);
    // The second wave never ran.
    assert_eq!(report.waves.len(), 1);
}

#[tokio::test]
async fn respects_max_parallel_bound() {
    struct ConcurrencyProbe {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl TaskExecutor for ConcurrencyProbe {
        async fn execute(
            &self,
            _task: &Task,
            _context: &ExecutionContext,
        ) -> Result<WorkerOutcome> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(WorkerOutcome::ok("ok"))
        }
    }

    let probe = Arc::new(ConcurrencyProbe {
        current: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let config = ExecutorConfig {
        max_parallel: 2,
        ..ExecutorConfig::default()
    };
    let executor = WaveExecutor::new(config).with_executor(probe.clone());

    let wave = Wave::new(1, tasks(4));
    let results = executor
        .execute_wave(&wave, &ExecutionContext::default())
        .await;

    assert_eq!(results.len(), 4);
    assert!(probe.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn hanging_task_times_out_while_others_succeed() {
    let config = ExecutorConfig {
        max_parallel: 2,
        task_timeout_ms: 50,
        ..ExecutorConfig::default()
    };
    let executor = WaveExecutor::new(config)
        .with_executor(Arc::new(HangingExecutor {
            hang_task: "task-2".to_string(),
        }))
        .with_analyzer(Arc::new(StaticAnalyzer {
            waves: vec![Wave::new(1, tasks(3))],
        }));

    let report = executor
        .execute_waves("wf-1", &ExecutionContext::default())
        .await
        .unwrap();

    let results = &report.waves[0].results;
    assert_eq!(results.len(), 3);

    let hung = results.iter().find(|r| r.task_id == "task-2").unwrap();
    assert!(!hung.success);
    assert!(hung.error.as_ref().unwrap().contains("timed out"));

    for id in ["task-1", "task-3"] {
        let result = results.iter().find(|r| r.task_id == id).unwrap();
        assert!(result.success, "{id} should succeed");
    }
}

#[tokio::test]
async fn worker_errors_become_failed_results() {
    struct ErroringExecutor;

    #[async_trait]
    impl TaskExecutor for ErroringExecutor {
        async fn execute(
            &self,
            _task: &Task,
            _context: &ExecutionContext,
        ) -> Result<WorkerOutcome> {
            Err(riptide::RiptideError::Worker("boom".to_string()))
        }
    }

    let executor =
        WaveExecutor::new(ExecutorConfig::default()).with_executor(Arc::new(ErroringExecutor));

    let result = executor
        .execute_task_with_timeout(&Task::new("t1", "explode"), &ExecutionContext::default())
        .await;

    assert!(!result.success);
    assert!(result.error.as_ref().unwrap().contains("boom"));
}

#[tokio::test]
async fn rate_limiter_substitutes_for_executor() {
    struct CountingLimiter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RateLimiter for CountingLimiter {
        async fn execute_with_retry(
            &self,
            _task: &Task,
            _context: &ExecutionContext,
        ) -> Result<WorkerOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(WorkerOutcome::ok("limited ok"))
        }
    }

    let limiter = Arc::new(CountingLimiter {
        calls: AtomicUsize::new(0),
    });
    let plain = Arc::new(StaticExecutor::ok());
    let executor = WaveExecutor::new(ExecutorConfig::default())
        .with_executor(plain.clone())
        .with_rate_limiter(limiter.clone());

    let result = executor
        .execute_task_with_timeout(&Task::new("t1", "x"), &ExecutionContext::default())
        .await;

    assert!(result.success);
    assert_eq!(limiter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(plain.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn without_any_executor_tasks_fail_cleanly() {
    let executor = WaveExecutor::new(config_with_timeout(1000));
    let result = executor
        .execute_task_with_timeout(&Task::new("t1", "x"), &ExecutionContext::default())
        .await;

    assert!(!result.success);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn emits_lifecycle_events() {
    let executor = WaveExecutor::new(ExecutorConfig::default())
        .with_executor(Arc::new(StaticExecutor::ok()))
        .with_analyzer(Arc::new(StaticAnalyzer {
            waves: vec![Wave::new(1, tasks(1))],
        }));

    let mut rx = executor.events().subscribe();
    executor
        .execute_waves("wf-1", &ExecutionContext::default())
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind);
    }

    for expected in [
        EventKind::ExecutionStarted,
        EventKind::WaveStarted,
        EventKind::TaskStarted,
        EventKind::TaskCompleted,
        EventKind::WaveCompleted,
        EventKind::ExecutionCompleted,
    ] {
        assert_eq!(
            kinds.iter().filter(|k| **k == expected).count(),
            1,
            "expected exactly one {expected:?}"
        );
    }
}

#[tokio::test]
async fn registry_tracks_completion_and_cancellation() {
    let executor = WaveExecutor::new(ExecutorConfig::default())
        .with_executor(Arc::new(StaticExecutor::ok()));

    executor
        .execute_task_with_timeout(&Task::new("tracked", "x"), &ExecutionContext::default())
        .await;
    assert_eq!(
        executor.task_status("tracked"),
        Some(ExecutionStatus::Completed)
    );

    // Simulate an in-flight execution, then cancel everything.
    executor.registry().begin("in-flight", Some(1));
    let mut rx = executor.events().subscribe();
    executor.cancel_all();

    assert_eq!(
        executor.task_status("in-flight"),
        Some(ExecutionStatus::Cancelled)
    );
    // Completed tasks are untouched by cancellation.
    assert_eq!(
        executor.task_status("tracked"),
        Some(ExecutionStatus::Completed)
    );

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds.iter().filter(|k| **k == EventKind::TaskCancelled).count(),
        1
    );
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == EventKind::ExecutionCancelled)
            .count(),
        1
    );
}

#[tokio::test]
async fn slow_executor_still_counts_durations() {
    let executor = WaveExecutor::new(ExecutorConfig::default()).with_executor(Arc::new(
        StaticExecutor::ok().with_delay(Duration::from_millis(20)),
    ));

    let result = executor
        .execute_task_with_timeout(&Task::new("t1", "x"), &ExecutionContext::default())
        .await;

    assert!(result.success);
    assert!(result.duration_ms >= 20);
}
