//! Wave result aggregation: file-level conflict detection, warnings,
//! metrics, and report generation.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::config::AggregatorConfig;
use crate::domain::{TaskResult, WaveResult};
use crate::error::Result;
use crate::events::{EventBus, EventKind, ExecutionEvent};
use crate::merge::ConflictSeverity;
use crate::utils::{extract_path_tokens, truncate_with_marker, write_report_pair};

const OUTPUT_SUMMARY_MAX: usize = 500;
const MAX_EXTRACTED_FILES: usize = 20;

/// Manifest and entry-point files where concurrent edits are most dangerous.
const CRITICAL_FILE_NAMES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "Cargo.toml",
    "Cargo.lock",
    "pyproject.toml",
    "go.mod",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    pub success: bool,
    pub duration_ms: u64,

    #[serde(default)]
    pub files_modified: Vec<String>,

    #[serde(default)]
    pub output_summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Two or more tasks declaring edits to the same file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConflict {
    pub file: String,
    pub conflict_type: String,
    pub severity: ConflictSeverity,
    pub tasks: Vec<String>,
    pub resolution: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    LongDuration,
    NoFilesModified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationWarning {
    #[serde(rename = "type")]
    pub kind: WarningKind,
    pub task_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregationMetrics {
    pub total_tasks: usize,
    pub successful: usize,
    pub failed: usize,
    /// Rounded percentage, 100 when no tasks ran.
    pub success_rate: f64,
    pub total_duration_ms: u64,
    /// Count of distinct files across all tasks.
    pub files_modified: usize,
    /// Files touched by more than one task.
    pub duplicate_file_edits: usize,
    pub conflict_count: usize,
    pub warning_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveAggregation {
    pub wave_index: usize,
    pub completed_at: DateTime<Utc>,
    pub tasks: Vec<TaskSummary>,
    pub conflicts: Vec<FileConflict>,
    pub warnings: Vec<AggregationWarning>,
    pub metrics: AggregationMetrics,
}

/// Consolidated view over every wave of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedAggregation {
    pub waves: Vec<WaveAggregation>,
    pub all_tasks: Vec<TaskSummary>,
    pub all_conflicts: Vec<FileConflict>,
    pub total_waves: usize,
    pub overall_metrics: AggregationMetrics,
}

/// Consumes wave results, detects file-level conflicts, and emits reports.
pub struct ResultAggregator {
    config: AggregatorConfig,
    events: EventBus,
    history: RwLock<VecDeque<WaveAggregation>>,
}

impl ResultAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            events: EventBus::default(),
            history: RwLock::new(VecDeque::new()),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Aggregate one settled wave.
    pub fn aggregate(&self, wave: &WaveResult) -> WaveAggregation {
        let tasks: Vec<TaskSummary> = wave.results.iter().map(summarize_task).collect();

        let conflicts = if self.config.detect_conflicts {
            self.detect_file_conflicts(&wave.results)
        } else {
            Vec::new()
        };

        let warnings = self.collect_warnings(&wave.results);
        let metrics = self.calculate_metrics(&tasks, &conflicts, &warnings);

        if !conflicts.is_empty() {
            info!(
                wave = wave.wave_index,
                conflicts = conflicts.len(),
                "File conflicts detected"
            );
            self.events.emit(
                ExecutionEvent::new(EventKind::ConflictsDetected)
                    .with_wave(wave.wave_index)
                    .with_detail(json!({
                        "count": conflicts.len(),
                        "files": conflicts.iter().map(|c| c.file.clone()).collect::<Vec<_>>(),
                    })),
            );
        }

        let aggregation = WaveAggregation {
            wave_index: wave.wave_index,
            completed_at: Utc::now(),
            tasks,
            conflicts,
            warnings,
            metrics,
        };

        self.events.emit(
            ExecutionEvent::new(EventKind::AggregationComplete).with_wave(wave.wave_index),
        );

        let mut history = self.history.write();
        history.push_back(aggregation.clone());
        while history.len() > self.config.max_history {
            history.pop_front();
        }

        aggregation
    }

    /// Fold multiple waves into one consolidated view.
    pub fn aggregate_all(&self, waves: &[WaveResult]) -> ConsolidatedAggregation {
        let aggregations: Vec<WaveAggregation> = waves.iter().map(|w| self.aggregate(w)).collect();

        let all_tasks: Vec<TaskSummary> = aggregations
            .iter()
            .flat_map(|a| a.tasks.iter().cloned())
            .collect();
        let all_conflicts: Vec<FileConflict> = aggregations
            .iter()
            .flat_map(|a| a.conflicts.iter().cloned())
            .collect();
        let all_warnings: Vec<AggregationWarning> = aggregations
            .iter()
            .flat_map(|a| a.warnings.iter().cloned())
            .collect();

        let overall_metrics = self.calculate_metrics(&all_tasks, &all_conflicts, &all_warnings);

        ConsolidatedAggregation {
            total_waves: aggregations.len(),
            waves: aggregations,
            all_tasks,
            all_conflicts,
            overall_metrics,
        }
    }

    /// Group declared file modifications by file; any file touched by two or
    /// more tasks is a conflict.
    fn detect_file_conflicts(&self, results: &[TaskResult]) -> Vec<FileConflict> {
        let mut by_file: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

        for result in results {
            for file in &result.files_modified {
                by_file.entry(file).or_default().insert(&result.task_id);
            }
        }

        by_file
            .into_iter()
            .filter(|(_, tasks)| tasks.len() >= 2)
            .map(|(file, tasks)| {
                let tasks: Vec<String> = tasks.into_iter().map(str::to_string).collect();
                let resolution = suggest_resolution(file, &tasks);
                FileConflict {
                    file: file.to_string(),
                    conflict_type: "concurrent_modification".to_string(),
                    severity: assess_conflict_severity(file),
                    tasks,
                    resolution,
                }
            })
            .collect()
    }

    fn collect_warnings(&self, results: &[TaskResult]) -> Vec<AggregationWarning> {
        let mut warnings = Vec::new();

        for result in results {
            if result.duration_ms > self.config.long_task_warning_ms {
                warnings.push(AggregationWarning {
                    kind: WarningKind::LongDuration,
                    task_id: result.task_id.clone(),
                    message: format!(
                        "task ran for {}s, over the {}s threshold",
                        result.duration_ms / 1000,
                        self.config.long_task_warning_ms / 1000
                    ),
                });
            }

            if result.success && result.files_modified.is_empty() {
                warnings.push(AggregationWarning {
                    kind: WarningKind::NoFilesModified,
                    task_id: result.task_id.clone(),
                    message: "task succeeded but declared no modified files".to_string(),
                });
            }
        }

        warnings
    }

    pub fn calculate_metrics(
        &self,
        tasks: &[TaskSummary],
        conflicts: &[FileConflict],
        warnings: &[AggregationWarning],
    ) -> AggregationMetrics {
        let total_tasks = tasks.len();
        let successful = tasks.iter().filter(|t| t.success).count();
        let failed = total_tasks - successful;
        let success_rate = if total_tasks == 0 {
            100.0
        } else {
            (successful as f64 / total_tasks as f64 * 100.0).round()
        };

        let mut file_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for task in tasks {
            for file in &task.files_modified {
                *file_counts.entry(file).or_default() += 1;
            }
        }
        let files_modified = file_counts.len();
        let duplicate_file_edits = file_counts.values().filter(|&&count| count > 1).count();

        AggregationMetrics {
            total_tasks,
            successful,
            failed,
            success_rate,
            total_duration_ms: tasks.iter().map(|t| t.duration_ms).sum(),
            files_modified,
            duplicate_file_edits,
            conflict_count: conflicts.len(),
            warning_count: warnings.len(),
        }
    }

    /// Persist a JSON snapshot plus a Markdown summary; returns the JSON
    /// path.
    pub fn generate_report(&self, aggregation: &WaveAggregation) -> Result<PathBuf> {
        let report = json!({
            "started_at": aggregation.completed_at.to_rfc3339(),
            "wave_index": aggregation.wave_index,
            "tasks": aggregation.tasks,
            "results": aggregation.tasks,
            "conflicts": aggregation.conflicts,
            "warnings": aggregation.warnings,
            "metrics": aggregation.metrics,
            "status": if aggregation.metrics.failed == 0 { "success" } else { "partial_failure" },
        });
        let markdown = self.format_markdown(aggregation);
        let path = write_report_pair(&self.config.report_dir, "wave-report", &report, &markdown)?;
        debug!(path = %path.display(), "Wave report written");
        Ok(path)
    }

    pub fn format_markdown(&self, aggregation: &WaveAggregation) -> String {
        let metrics = &aggregation.metrics;
        let mut md = String::from("# Wave Results Report\n\n");
        md.push_str(&format!(
            "- Wave: {}\n- Completed: {}\n- Tasks: {} ({} ok, {} failed)\n- Success rate: {}%\n- Total duration: {}ms\n- Conflicts: {}\n\n",
            aggregation.wave_index,
            aggregation.completed_at.to_rfc3339(),
            metrics.total_tasks,
            metrics.successful,
            metrics.failed,
            metrics.success_rate,
            metrics.total_duration_ms,
            metrics.conflict_count
        ));

        md.push_str("## Tasks\n\n| Task | Agent | Result | Duration |\n|---|---|---|---|\n");
        for task in &aggregation.tasks {
            md.push_str(&format!(
                "| {} | {} | {} | {}ms |\n",
                task.task_id,
                task.agent.as_deref().unwrap_or("-"),
                if task.success { "ok" } else { "failed" },
                task.duration_ms
            ));
        }

        if !aggregation.conflicts.is_empty() {
            md.push_str("\n## Conflicts\n\n");
            for conflict in &aggregation.conflicts {
                md.push_str(&format!(
                    "- `{}` ({}): tasks {}: {}\n",
                    conflict.file,
                    conflict.severity,
                    conflict.tasks.join(", "),
                    conflict.resolution
                ));
            }
        }

        if !aggregation.warnings.is_empty() {
            md.push_str("\n## Warnings\n\n");
            for warning in &aggregation.warnings {
                md.push_str(&format!("- {}: {}\n", warning.task_id, warning.message));
            }
        }

        md
    }

    /// Best-effort scan of free-text output for path-like tokens.
    pub fn extract_files_from_output(&self, output: &str) -> Vec<String> {
        extract_path_tokens(output, MAX_EXTRACTED_FILES)
    }

    /// Bounded output excerpt for reports; long output is truncated with a
    /// marker.
    pub fn summarize_output(&self, output: &str) -> String {
        truncate_with_marker(output, OUTPUT_SUMMARY_MAX)
    }

    /// The most recent `limit` aggregations, oldest first.
    pub fn history(&self, limit: usize) -> Vec<WaveAggregation> {
        let history = self.history.read();
        history
            .iter()
            .skip(history.len().saturating_sub(limit))
            .cloned()
            .collect()
    }

    pub fn format_status(&self) -> String {
        let history = self.history.read();
        format!(
            "Result Aggregator\n  Conflict detection: {}\n  History: {}/{} aggregations\n",
            if self.config.detect_conflicts {
                "on"
            } else {
                "off"
            },
            history.len(),
            self.config.max_history
        )
    }
}

fn summarize_task(result: &TaskResult) -> TaskSummary {
    TaskSummary {
        task_id: result.task_id.clone(),
        agent: result.agent.clone(),
        success: result.success,
        duration_ms: result.duration_ms,
        files_modified: result.files_modified.clone(),
        output_summary: truncate_with_marker(&result.output, OUTPUT_SUMMARY_MAX),
        error: result.error.clone(),
    }
}

/// Severity tiering: manifests and entry points are critical, known config
/// patterns high, everything else medium.
pub fn assess_conflict_severity(file: &str) -> ConflictSeverity {
    let file_name = Path::new(file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file);

    if CRITICAL_FILE_NAMES.contains(&file_name)
        || file.contains("src/index.")
        || file.contains("src/main.")
    {
        return ConflictSeverity::Critical;
    }

    let is_config = file_name.contains(".config.")
        || file_name.ends_with("config.json")
        || file_name.starts_with(".env")
        || file_name.ends_with(".yml")
        || file_name.ends_with(".yaml");
    if is_config {
        return ConflictSeverity::High;
    }

    ConflictSeverity::Medium
}

/// Human-readable resolution hint per file kind.
pub fn suggest_resolution(file: &str, tasks: &[String]) -> String {
    let task_list = tasks.join(", ");

    if file.ends_with(".json") {
        return format!(
            "Both edits touch JSON; merge keys from tasks {task_list} manually or rerun them sequentially."
        );
    }

    let is_test_file = file.contains(".test.")
        || file.contains(".spec.")
        || file.contains("_test.")
        || file.contains("/tests/");
    if is_test_file {
        return format!(
            "Test-file conflict from tasks {task_list}; usually resolves automatically once both suites are regenerated."
        );
    }

    format!("Review manually: tasks {task_list} modified the same file concurrently.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator() -> ResultAggregator {
        ResultAggregator::new(AggregatorConfig::default())
    }

    fn ok_task(id: &str, files: &[&str]) -> TaskResult {
        TaskResult::success(id, "done")
            .with_files(files.iter().map(|f| f.to_string()).collect())
            .with_duration_ms(1000)
    }

    #[test]
    fn test_assess_conflict_severity() {
        assert_eq!(
            assess_conflict_severity("package.json"),
            ConflictSeverity::Critical
        );
        assert_eq!(
            assess_conflict_severity("src/index.ts"),
            ConflictSeverity::Critical
        );
        assert_eq!(
            assess_conflict_severity("app.config.js"),
            ConflictSeverity::High
        );
        assert_eq!(
            assess_conflict_severity("src/utils/helper.js"),
            ConflictSeverity::Medium
        );
    }

    #[test]
    fn test_suggest_resolution() {
        let tasks = vec!["t1".to_string(), "t2".to_string()];
        assert!(suggest_resolution("data.json", &tasks).contains("JSON"));
        assert!(suggest_resolution("app.test.js", &tasks).contains("automatically"));
        assert!(suggest_resolution("app.js", &tasks).contains("Review"));
    }

    #[test]
    fn test_aggregate_counts_and_metrics() {
        let ra = aggregator();
        let wave = WaveResult::new(1, vec![ok_task("t1", &["a.js"]), ok_task("t2", &["b.js"])]);

        let aggregation = ra.aggregate(&wave);
        assert_eq!(aggregation.tasks.len(), 2);
        assert_eq!(aggregation.metrics.total_tasks, 2);
        assert_eq!(aggregation.metrics.successful, 2);
        assert_eq!(aggregation.metrics.failed, 0);
        assert!(aggregation.conflicts.is_empty());
    }

    #[test]
    fn test_detects_shared_file_conflict() {
        let ra = aggregator();
        let wave = WaveResult::new(
            1,
            vec![ok_task("t1", &["shared.js"]), ok_task("t2", &["shared.js"])],
        );

        let aggregation = ra.aggregate(&wave);
        assert_eq!(aggregation.conflicts.len(), 1);
        assert_eq!(aggregation.conflicts[0].file, "shared.js");
        assert_eq!(aggregation.conflicts[0].tasks, vec!["t1", "t2"]);
    }

    #[test]
    fn test_conflict_detection_can_be_disabled() {
        let ra = ResultAggregator::new(AggregatorConfig {
            detect_conflicts: false,
            ..AggregatorConfig::default()
        });
        let wave = WaveResult::new(
            1,
            vec![ok_task("t1", &["shared.js"]), ok_task("t2", &["shared.js"])],
        );

        assert!(ra.aggregate(&wave).conflicts.is_empty());
    }

    #[test]
    fn test_warnings() {
        let ra = aggregator();
        let wave = WaveResult::new(
            1,
            vec![
                ok_task("slow", &["a.js"]).with_duration_ms(6 * 60 * 1000),
                ok_task("empty", &[]),
            ],
        );

        let aggregation = ra.aggregate(&wave);
        assert!(aggregation
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::LongDuration && w.task_id == "slow"));
        assert!(aggregation
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::NoFilesModified && w.task_id == "empty"));
    }

    #[test]
    fn test_metrics_distinct_and_duplicate_files() {
        let ra = aggregator();
        let tasks = vec![
            summarize_task(&ok_task("t1", &["a.js", "b.js"])),
            summarize_task(&ok_task("t2", &["b.js", "c.js"])),
        ];
        let metrics = ra.calculate_metrics(&tasks, &[], &[]);
        assert_eq!(metrics.files_modified, 3);
        assert_eq!(metrics.duplicate_file_edits, 1);
    }

    #[test]
    fn test_success_rate_rounding_and_empty() {
        let ra = aggregator();
        let tasks = vec![
            summarize_task(&ok_task("t1", &[])),
            summarize_task(&TaskResult::failure("t2", "boom").with_duration_ms(500)),
        ];
        let metrics = ra.calculate_metrics(&tasks, &[], &[]);
        assert_eq!(metrics.success_rate, 50.0);

        let empty = ra.calculate_metrics(&[], &[], &[]);
        assert_eq!(empty.success_rate, 100.0);
        assert_eq!(empty.total_tasks, 0);
    }

    #[test]
    fn test_history_bounded() {
        let ra = ResultAggregator::new(AggregatorConfig {
            max_history: 2,
            ..AggregatorConfig::default()
        });
        for index in 1..=3 {
            ra.aggregate(&WaveResult::new(index, vec![]));
        }
        let history = ra.history(10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].wave_index, 2);
    }

    #[test]
    fn test_aggregate_all_consolidates() {
        let ra = aggregator();
        let waves = vec![
            WaveResult::new(1, vec![ok_task("t1", &[])]),
            WaveResult::new(
                2,
                vec![TaskResult::failure("t2", "fail").with_duration_ms(10)],
            ),
        ];

        let consolidated = ra.aggregate_all(&waves);
        assert_eq!(consolidated.total_waves, 2);
        assert_eq!(consolidated.all_tasks.len(), 2);
        assert_eq!(consolidated.overall_metrics.successful, 1);
        assert_eq!(consolidated.overall_metrics.failed, 1);
    }

    #[test]
    fn test_format_markdown() {
        let ra = aggregator();
        let wave = WaveResult::new(
            1,
            vec![ok_task("t1", &["shared.js"]), ok_task("t2", &["shared.js"])],
        );
        let aggregation = ra.aggregate(&wave);
        let md = ra.format_markdown(&aggregation);

        assert!(md.contains("Wave Results Report"));
        assert!(md.contains("100"));
        assert!(md.contains("Conflicts"));
        assert!(md.contains("shared.js"));
    }

    #[test]
    fn test_format_status() {
        let ra = aggregator();
        assert!(ra.format_status().contains("Result Aggregator"));
    }

    #[test]
    fn test_summarize_output() {
        let ra = aggregator();
        assert_eq!(ra.summarize_output("short"), "short");

        let long = "x".repeat(600);
        let summary = ra.summarize_output(&long);
        assert!(summary.len() < 600);
        assert!(summary.contains("truncated"));
    }

    #[test]
    fn test_extract_files_from_output() {
        let ra = aggregator();
        assert!(ra.extract_files_from_output("").is_empty());
        let files = ra.extract_files_from_output("Created `src/app.js` and modified 'lib/utils.ts'");
        assert!(files.contains(&"src/app.js".to_string()));
    }

    #[test]
    fn test_generate_report_writes_files() {
        let tmp = tempfile::tempdir().unwrap();
        let ra = ResultAggregator::new(AggregatorConfig {
            report_dir: tmp.path().join("plan"),
            ..AggregatorConfig::default()
        });

        let aggregation = ra.aggregate(&WaveResult::new(1, vec![ok_task("t1", &["a.js"])]));
        let path = ra.generate_report(&aggregation).unwrap();

        assert!(path.exists());
        assert!(path.with_extension("md").exists());
    }
}
