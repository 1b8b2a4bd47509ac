//! Per-file merge orchestration.
//!
//! Drives each conflicting file through a small state machine with terminal
//! states AutoMerged / AiMerged / NeedsHumanReview / Failed. A failure on one
//! file never aborts the run for the others.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::analyzer::SemanticAnalyzer;
use super::auto::AutoMerger;
use super::detector::ConflictDetector;
use super::resolver::{AiResolver, AiResolverStats, CompletionClient, TaskVariant};
use super::rules::{CustomRulesLoader, FileCategory, MergeRules};
use super::types::{
    FileChangeAnalysis, MergeOutcome, MergeStrategy, SemanticConflict, TaskSnapshot,
};
use crate::config::{MergeEngineConfig, RulesConfig};
use crate::error::Result;
use crate::utils::write_report_pair;

/// Full result of one merge run across all contested files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub tasks: Vec<String>,
    pub results: Vec<MergeOutcome>,
    /// Files excluded by skip patterns, never analyzed.
    pub skipped: Vec<String>,
    pub status: String,
}

impl MergeReport {
    pub fn all_resolved(&self) -> bool {
        self.results.iter().all(|r| r.decision.is_resolved())
    }
}

pub struct SemanticMergeEngine {
    config: MergeEngineConfig,
    loader: CustomRulesLoader,
    analyzer: SemanticAnalyzer,
    auto_merger: AutoMerger,
    resolver: AiResolver,
    detector: RwLock<ConflictDetector>,
}

impl SemanticMergeEngine {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self::with_config(root_path, MergeEngineConfig::default(), &RulesConfig::default())
    }

    pub fn with_config(
        root_path: impl Into<PathBuf>,
        mut config: MergeEngineConfig,
        rules_config: &RulesConfig,
    ) -> Self {
        let root_path = root_path.into();
        // A relative report directory lives under the project root.
        if config.report_dir.is_relative() {
            config.report_dir = root_path.join(&config.report_dir);
        }
        let loader = CustomRulesLoader::with_config(root_path, rules_config);
        let rules = loader.merged_rules();
        let detector = ConflictDetector::from_rules(rules.clone());
        let resolver = AiResolver::new(rules.ai);

        Self {
            config,
            loader,
            analyzer: SemanticAnalyzer::new(),
            auto_merger: AutoMerger::new(),
            resolver,
            detector: RwLock::new(detector),
        }
    }

    /// Attach the completion capability used for AI resolution. Without one,
    /// ambiguous conflicts escalate straight to human review.
    pub fn with_completion_client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        let settings = self.loader.merged_rules().ai;
        self.resolver = AiResolver::new(settings).with_client(client);
        self
    }

    /// Merge every file that any task modified, one terminal decision per
    /// file.
    pub async fn merge_files(
        &self,
        base_contents: &HashMap<String, String>,
        snapshots: &HashMap<String, TaskSnapshot>,
    ) -> MergeReport {
        let started_at = Utc::now();
        let files = self.find_modified_files(snapshots);

        let mut tasks: Vec<String> = snapshots.keys().cloned().collect();
        tasks.sort();

        info!(files = files.len(), tasks = tasks.len(), "Starting merge run");

        let mut results = Vec::new();
        let mut skipped = Vec::new();

        for file in files {
            if !self.should_process_file(&file) {
                debug!(file = %file, "File matches skip patterns, not processed");
                skipped.push(file);
                continue;
            }

            let base = base_contents.get(&file).map(String::as_str).unwrap_or("");
            let outcome = self.merge_file(&file, base, snapshots).await;
            results.push(outcome);
        }

        let status = if results.iter().all(|r| r.decision.is_resolved()) {
            "success"
        } else {
            "needs_attention"
        };

        MergeReport {
            started_at,
            completed_at: Utc::now(),
            tasks,
            results,
            skipped,
            status: status.to_string(),
        }
    }

    /// Reconcile one file to a terminal decision. Internal errors are
    /// downgraded to `Failed` for this file only.
    pub async fn merge_file(
        &self,
        file_path: &str,
        base: &str,
        snapshots: &HashMap<String, TaskSnapshot>,
    ) -> MergeOutcome {
        match self.merge_file_inner(file_path, base, snapshots).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(file = %file_path, error = %e, "Merge pipeline fault");
                MergeOutcome::failed(file_path, e.to_string())
            }
        }
    }

    async fn merge_file_inner(
        &self,
        file_path: &str,
        base: &str,
        snapshots: &HashMap<String, TaskSnapshot>,
    ) -> Result<MergeOutcome> {
        match self.file_category(file_path) {
            FileCategory::Skip => {
                return Ok(MergeOutcome::needs_human_review(
                    file_path,
                    "file matches skip patterns",
                ));
            }
            FileCategory::HumanReview => {
                return Ok(MergeOutcome::needs_human_review(
                    file_path,
                    "manifest or lockfile changes require human review",
                ));
            }
            _ => {}
        }

        // Editors in sorted order so every downstream decision is
        // deterministic.
        let mut editors: Vec<(&str, &str)> = snapshots
            .iter()
            .filter_map(|(task_id, snapshot)| {
                snapshot
                    .files
                    .get(file_path)
                    .map(|content| (task_id.as_str(), content.as_str()))
            })
            .collect();
        editors.sort_by(|a, b| a.0.cmp(b.0));

        let task_ids: Vec<String> = editors.iter().map(|(id, _)| id.to_string()).collect();

        match editors.len() {
            0 => {
                return Ok(MergeOutcome::failed(
                    file_path,
                    "no task submitted content for this file",
                ));
            }
            1 => {
                // Single editor: apply that task's version as-is.
                return Ok(
                    MergeOutcome::auto_merged(file_path, editors[0].1).with_tasks(task_ids)
                );
            }
            _ => {}
        }

        let analyses: Vec<FileChangeAnalysis> = editors
            .iter()
            .map(|(task_id, content)| self.analyzer.analyze_diff(file_path, base, content, task_id))
            .collect();

        let conflicts = self.detector.read().detect_conflicts(&analyses);

        if conflicts.is_empty() {
            let merged = combine_non_conflicting(&editors, &analyses);
            debug!(file = %file_path, "No overlapping changes, taking the most-changed version");
            return Ok(MergeOutcome::auto_merged(file_path, merged).with_tasks(task_ids));
        }

        // Deterministic merge only applies when every overlap is combinable.
        if conflicts
            .iter()
            .all(|c| c.strategy == MergeStrategy::Combine)
        {
            let contents: HashMap<String, String> = editors
                .iter()
                .map(|(id, content)| (id.to_string(), content.to_string()))
                .collect();
            let attempt = self
                .auto_merger
                .try_auto_merge(&conflicts, file_path, base, &contents);
            if attempt.success {
                if let Some(merged) = attempt.merged_content {
                    return Ok(MergeOutcome::auto_merged(file_path, merged).with_tasks(task_ids));
                }
            }
        }

        let primary = most_severe(&conflicts);

        if conflicts
            .iter()
            .any(|c| c.strategy == MergeStrategy::HumanRequired)
        {
            return Ok(MergeOutcome::needs_human_review(
                file_path,
                format!(
                    "{} conflict on {} requires human judgment",
                    primary.severity, primary.target
                ),
            )
            .with_tasks(task_ids));
        }

        let variants: Vec<TaskVariant> = editors
            .iter()
            .zip(&analyses)
            .map(|((task_id, content), analysis)| TaskVariant {
                task_id: task_id.to_string(),
                intent: snapshots
                    .get(*task_id)
                    .map(|s| s.intent.clone())
                    .unwrap_or_default(),
                content: content.to_string(),
                changes: analysis.changes.clone(),
            })
            .collect();

        let outcome = self.resolver.resolve_conflict(primary, base, &variants).await;
        Ok(outcome.with_tasks(task_ids))
    }

    /// All file paths any task claims to have modified.
    pub fn find_modified_files(&self, snapshots: &HashMap<String, TaskSnapshot>) -> Vec<String> {
        let files: BTreeSet<String> = snapshots
            .values()
            .flat_map(|s| s.files.keys().cloned())
            .collect();
        files.into_iter().collect()
    }

    pub fn should_process_file(&self, file_path: &str) -> bool {
        self.file_category(file_path) != FileCategory::Skip
    }

    pub fn file_category(&self, file_path: &str) -> FileCategory {
        self.loader.file_category(file_path)
    }

    /// The effective merged rule set.
    pub fn rules(&self) -> MergeRules {
        self.loader.merged_rules()
    }

    /// Drop the rules cache and rebuild the detector so edited compatibility
    /// tables apply without a restart.
    pub fn reload_rules(&self) {
        self.loader.clear_cache();
        let rules = self.loader.merged_rules();
        *self.detector.write() = ConflictDetector::from_rules(rules);
        debug!("Merge rules reloaded");
    }

    pub fn ai_stats(&self) -> AiResolverStats {
        self.resolver.stats()
    }

    /// Persist a JSON + Markdown merge report pair; returns the JSON path.
    pub fn save_report(&self, report: &MergeReport) -> Result<PathBuf> {
        let json = serde_json::to_value(report)?;
        let markdown = format_markdown(report);
        write_report_pair(&self.config.report_dir, "merge-report", &json, &markdown)
    }
}

/// With no overlapping targets the edits are independent; taking the variant
/// with the most analyzed changes loses the least. A proper multi-way splice
/// is out of scope for pattern-based analysis.
fn combine_non_conflicting(editors: &[(&str, &str)], analyses: &[FileChangeAnalysis]) -> String {
    // Editors are sorted by task id, so ties resolve deterministically to
    // the later id.
    editors
        .iter()
        .zip(analyses)
        .max_by_key(|(_, analysis)| (analysis.changes.len(), analysis.lines_changed))
        .map(|((_, content), _)| content.to_string())
        .unwrap_or_default()
}

fn most_severe(conflicts: &[SemanticConflict]) -> &SemanticConflict {
    conflicts
        .iter()
        .max_by_key(|c| c.severity)
        .expect("conflict list is non-empty")
}

fn format_markdown(report: &MergeReport) -> String {
    let mut md = String::from("# Semantic Merge Report\n\n");
    md.push_str(&format!(
        "- Started: {}\n- Completed: {}\n- Status: {}\n- Tasks: {}\n\n",
        report.started_at.to_rfc3339(),
        report.completed_at.to_rfc3339(),
        report.status,
        report.tasks.join(", ")
    ));

    md.push_str("## Files\n\n| File | Decision | Confidence | Notes |\n|---|---|---|---|\n");
    for result in &report.results {
        let confidence = result
            .confidence
            .map(|c| format!("{c:.2}"))
            .unwrap_or_else(|| "-".to_string());
        let notes = result
            .reason
            .clone()
            .or_else(|| result.error.clone())
            .unwrap_or_default();
        md.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            result.file_path,
            result.decision.as_str(),
            confidence,
            notes
        ));
    }

    if !report.skipped.is_empty() {
        md.push_str("\n## Skipped\n\n");
        for file in &report.skipped {
            md.push_str(&format!("- {file}\n"));
        }
    }

    md
}
