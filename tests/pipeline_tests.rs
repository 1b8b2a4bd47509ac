//! End-to-end flow: dispatch through the wave executor, aggregate the wave,
//! then reconcile the file both tasks touched.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use riptide::config::{DispatcherConfig, ExecutorConfig};
use riptide::merge::MergeDecision;
use riptide::{
    ExecutionContext, ResultAggregator, Result, SemanticMergeEngine, SubagentDispatcher,
    SubagentRunner, Task, TaskSnapshot, WaveExecutor, WorkerOutcome,
};
use riptide::config::AggregatorConfig;

/// Worker that reports edits to a shared file plus one file of its own.
struct SharedFileRunner;

#[async_trait]
impl SubagentRunner for SharedFileRunner {
    async fn run(&self, _agent: &str, _prompt: &str, task: &Task) -> Result<WorkerOutcome> {
        Ok(WorkerOutcome::ok(format!("finished {}", task.id)).with_files(vec![
            "src/shared.js".to_string(),
            format!("src/{}.js", task.id),
        ]))
    }
}

#[tokio::test]
async fn waves_aggregate_into_conflicts_and_merge_resolves_them() {
    // Dispatch both tasks concurrently through the executor.
    let dispatcher = Arc::new(
        SubagentDispatcher::new(DispatcherConfig {
            retry_delay_ms: 1,
            ..DispatcherConfig::default()
        })
        .with_runner(Arc::new(SharedFileRunner)),
    );
    let executor = WaveExecutor::new(ExecutorConfig::default()).with_executor(dispatcher);

    let context = ExecutionContext::with_tasks(vec![
        Task::new("alpha", "extend shared module"),
        Task::new("beta", "extend shared module differently"),
    ]);
    let report = executor.execute_waves("wf-pipeline", &context).await.unwrap();

    assert!(report.success);
    assert_eq!(report.waves.len(), 1);

    // Aggregation flags the shared file.
    let aggregator = ResultAggregator::new(AggregatorConfig::default());
    let aggregation = aggregator.aggregate(&report.waves[0]);

    assert_eq!(aggregation.conflicts.len(), 1);
    assert_eq!(aggregation.conflicts[0].file, "src/shared.js");
    assert_eq!(aggregation.metrics.duplicate_file_edits, 1);

    // The merge engine reconciles the collision: distinct imports combine.
    let tmp = tempfile::tempdir().unwrap();
    let engine = SemanticMergeEngine::new(tmp.path());

    let base = "export const shared = 1;\n";
    let snapshots = HashMap::from([
        (
            "alpha".to_string(),
            TaskSnapshot::new("extend shared module").with_file(
                "src/shared.js",
                "import util from 'util';\nexport const shared = 1;\n",
            ),
        ),
        (
            "beta".to_string(),
            TaskSnapshot::new("extend shared module differently").with_file(
                "src/shared.js",
                "import path from 'path';\nexport const shared = 1;\n",
            ),
        ),
    ]);

    let outcome = engine
        .merge_file(&aggregation.conflicts[0].file, base, &snapshots)
        .await;

    assert_eq!(outcome.decision, MergeDecision::AutoMerged);
    let merged = outcome.merged_content.unwrap();
    assert!(merged.contains("import util from 'util';"));
    assert!(merged.contains("import path from 'path';"));
    assert!(merged.contains("export const shared = 1;"));
}
