//! Deterministic merging for compatible change combinations.

use std::collections::HashMap;

use super::analyzer::SemanticAnalyzer;
use super::types::{ChangeType, MergeStrategy, SemanticConflict};

/// Result of a deterministic merge attempt. Failure carries no side effects;
/// the engine falls through to AI resolution.
#[derive(Debug, Clone)]
pub struct AutoMergeAttempt {
    pub success: bool,
    pub merged_content: Option<String>,
    pub reason: Option<String>,
}

impl AutoMergeAttempt {
    fn merged(content: String) -> Self {
        Self {
            success: true,
            merged_content: Some(content),
            reason: None,
        }
    }

    fn unsupported(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            merged_content: None,
            reason: Some(reason.into()),
        }
    }
}

/// Merges without AI for the handful of combinations where a correct result
/// is mechanical. Currently that is the import-union case; everything else
/// is declined.
pub struct AutoMerger {
    analyzer: SemanticAnalyzer,
}

impl AutoMerger {
    pub fn new() -> Self {
        Self {
            analyzer: SemanticAnalyzer::new(),
        }
    }

    pub fn try_auto_merge(
        &self,
        conflicts: &[SemanticConflict],
        file_path: &str,
        base: &str,
        task_contents: &HashMap<String, String>,
    ) -> AutoMergeAttempt {
        if conflicts.is_empty() {
            return AutoMergeAttempt::unsupported("nothing to merge");
        }

        if conflicts
            .iter()
            .any(|c| c.strategy != MergeStrategy::Combine)
        {
            return AutoMergeAttempt::unsupported("strategy is not combinable");
        }

        let all_import_additions = conflicts
            .iter()
            .flat_map(|c| c.change_types.iter())
            .all(|t| *t == ChangeType::ImportAdded);

        if all_import_additions {
            return self.combine_imports(file_path, base, task_contents);
        }

        AutoMergeAttempt::unsupported("unsupported change combination")
    }

    /// Union of all import statements across the base and every task
    /// version, deduplicated, with the rest of the base left unchanged. New
    /// imports land directly after the base's import block.
    fn combine_imports(
        &self,
        file_path: &str,
        base: &str,
        task_contents: &HashMap<String, String>,
    ) -> AutoMergeAttempt {
        let language = self.analyzer.language_for_path(file_path);

        let base_imports = self.analyzer.extract_elements(base, language).imports;
        let mut known: Vec<String> = base_imports.iter().map(|i| i.text.clone()).collect();
        let mut additions: Vec<String> = Vec::new();

        // Sort task ids so the merged output is deterministic.
        let mut task_ids: Vec<_> = task_contents.keys().collect();
        task_ids.sort();

        for task_id in task_ids {
            let content = &task_contents[task_id];
            for import in self.analyzer.extract_elements(content, language).imports {
                if !known.contains(&import.text) {
                    known.push(import.text.clone());
                    additions.push(import.text);
                }
            }
        }

        if additions.is_empty() {
            return AutoMergeAttempt::merged(base.to_string());
        }

        let insertion_line = base_imports
            .iter()
            .map(|i| line_index_of_offset(base, i.offset))
            .max();

        let mut lines: Vec<String> = base.split('\n').map(str::to_string).collect();
        match insertion_line {
            Some(after) => {
                for (i, import) in additions.into_iter().enumerate() {
                    lines.insert(after + 1 + i, import);
                }
            }
            None => {
                for (i, import) in additions.into_iter().enumerate() {
                    lines.insert(i, import);
                }
            }
        }

        AutoMergeAttempt::merged(lines.join("\n"))
    }
}

impl Default for AutoMerger {
    fn default() -> Self {
        Self::new()
    }
}

fn line_index_of_offset(content: &str, offset: usize) -> usize {
    content[..offset.min(content.len())].matches('\n').count()
}
