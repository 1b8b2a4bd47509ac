//! Cross-task conflict detection over analyzed file changes.

use std::collections::HashSet;

use super::rules::MergeRules;
use super::types::{
    ChangeType, Compatibility, ConflictSeverity, FileChangeAnalysis, MergeStrategy,
    SemanticChange, SemanticConflict,
};

/// Compares the changes different tasks made to the same file and classifies
/// each overlapping pair through the compatibility rule table.
///
/// Built from a merged rule set; rebuild via the engine's `reload_rules` to
/// pick up rule-file edits.
pub struct ConflictDetector {
    rules: MergeRules,
}

impl ConflictDetector {
    pub fn new() -> Self {
        Self {
            rules: MergeRules::default(),
        }
    }

    pub fn from_rules(rules: MergeRules) -> Self {
        Self { rules }
    }

    /// Pure rule lookup for a pair of change types. Identical inputs always
    /// yield identical verdicts; unknown combinations default to
    /// incompatible / AI-required / medium.
    pub fn compatibility(&self, a: ChangeType, b: ChangeType) -> Compatibility {
        let entry = self
            .rules
            .compatibility
            .get(&format!("{}+{}", a.as_str(), b.as_str()))
            .or_else(|| {
                self.rules
                    .compatibility
                    .get(&format!("{}+{}", b.as_str(), a.as_str()))
            });

        match entry {
            Some(entry) => entry.resolve(),
            None => Compatibility {
                compatible: false,
                strategy: MergeStrategy::AiRequired,
                severity: ConflictSeverity::Medium,
            },
        }
    }

    /// Cross-compare per-task analyses of one file. Every overlapping change
    /// pair is reported, including compatible ones; the engine decides
    /// whether a deterministic merge applies.
    pub fn detect_conflicts(&self, analyses: &[FileChangeAnalysis]) -> Vec<SemanticConflict> {
        if analyses.len() < 2 {
            return Vec::new();
        }

        let mut conflicts = Vec::new();
        let mut seen = HashSet::new();

        for (i, left) in analyses.iter().enumerate() {
            for right in analyses.iter().skip(i + 1) {
                for change_a in &left.changes {
                    for change_b in &right.changes {
                        if collision_key(change_a) != collision_key(change_b) {
                            continue;
                        }

                        let dedup = (
                            left.task_id.clone(),
                            right.task_id.clone(),
                            collision_key(change_a).to_string(),
                            change_a.change_type,
                            change_b.change_type,
                        );
                        if !seen.insert(dedup) {
                            continue;
                        }

                        let verdict =
                            self.compatibility(change_a.change_type, change_b.change_type);

                        conflicts.push(SemanticConflict {
                            file_path: left.file_path.clone(),
                            target: change_a.target.clone(),
                            location: change_a.location.clone(),
                            change_types: [change_a.change_type, change_b.change_type],
                            tasks_involved: [left.task_id.clone(), right.task_id.clone()],
                            severity: verdict.severity,
                            strategy: verdict.strategy,
                        });
                    }
                }
            }
        }

        conflicts
    }
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Import changes collide as a section, not per module source: two tasks
/// touching the import block of one file must be reconciled together.
fn collision_key(change: &SemanticChange) -> &str {
    if change.change_type.is_import() {
        "__imports__"
    } else {
        &change.target
    }
}
