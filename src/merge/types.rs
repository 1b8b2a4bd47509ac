use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Classification of a structural edit detected between two file versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    ImportAdded,
    ImportRemoved,
    FunctionAdded,
    FunctionModified,
    FunctionRemoved,
    ClassAdded,
    ClassRemoved,
    VariableAdded,
    VariableModified,
    Unknown,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImportAdded => "import_added",
            Self::ImportRemoved => "import_removed",
            Self::FunctionAdded => "function_added",
            Self::FunctionModified => "function_modified",
            Self::FunctionRemoved => "function_removed",
            Self::ClassAdded => "class_added",
            Self::ClassRemoved => "class_removed",
            Self::VariableAdded => "variable_added",
            Self::VariableModified => "variable_modified",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_import(&self) -> bool {
        matches!(self, Self::ImportAdded | Self::ImportRemoved)
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy for reconciling a pair of change types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    Combine,
    TakeNewer,
    AiRequired,
    HumanRequired,
}

impl MergeStrategy {
    /// Parse a rule-file strategy string; unrecognized values fall back to
    /// AI resolution.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value {
            Some("combine") => Self::Combine,
            Some("take_newer") => Self::TakeNewer,
            Some("human_required") => Self::HumanRequired,
            _ => Self::AiRequired,
        }
    }
}

/// Conflict risk tier driving strategy selection and escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ConflictSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parse a rule-file severity string; unrecognized values default to
    /// medium.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value {
            Some("low") => Self::Low,
            Some("high") => Self::High,
            Some("critical") => Self::Critical,
            _ => Self::Medium,
        }
    }
}

impl std::fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of reconciling one conflicting file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeDecision {
    AutoMerged,
    AiMerged,
    NeedsHumanReview,
    Failed,
}

impl MergeDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoMerged => "auto_merged",
            Self::AiMerged => "ai_merged",
            Self::NeedsHumanReview => "needs_human_review",
            Self::Failed => "failed",
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::AutoMerged | Self::AiMerged)
    }
}

/// One structural change extracted by the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticChange {
    pub change_type: ChangeType,
    /// Name of the affected element (function/class name, import source).
    pub target: String,
    /// Human-readable location, e.g. "line 12".
    pub location: String,
}

/// Structural diff of one file between its base and a task's version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChangeAnalysis {
    pub file_path: String,
    pub task_id: String,
    pub language: String,
    pub changes: Vec<SemanticChange>,
    pub functions_added: Vec<String>,
    pub functions_removed: Vec<String>,
    pub lines_changed: usize,
}

/// What one task produced: its stated intent plus full per-file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSnapshot {
    #[serde(default)]
    pub intent: String,
    /// file path -> full content of that task's version
    #[serde(default)]
    pub files: HashMap<String, String>,
}

impl TaskSnapshot {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            files: HashMap::new(),
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

/// Compatibility verdict for a pair of change types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compatibility {
    pub compatible: bool,
    pub strategy: MergeStrategy,
    pub severity: ConflictSeverity,
}

/// A detected overlap between two tasks' changes to the same target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticConflict {
    pub file_path: String,
    pub target: String,
    pub location: String,
    pub change_types: [ChangeType; 2],
    pub tasks_involved: [String; 2],
    pub severity: ConflictSeverity,
    pub strategy: MergeStrategy,
}

/// Terminal merge result for one file. Once `Failed` or `NeedsHumanReview`
/// is reached, no further automatic attempt is made in the same run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub file_path: String,
    pub decision: MergeDecision,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub tasks_involved: Vec<String>,
}

impl MergeOutcome {
    pub fn auto_merged(file_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            decision: MergeDecision::AutoMerged,
            merged_content: Some(content.into()),
            confidence: Some(1.0),
            reason: None,
            error: None,
            tasks_involved: Vec::new(),
        }
    }

    pub fn ai_merged(
        file_path: impl Into<String>,
        content: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            decision: MergeDecision::AiMerged,
            merged_content: Some(content.into()),
            confidence: Some(confidence),
            reason: None,
            error: None,
            tasks_involved: Vec::new(),
        }
    }

    pub fn needs_human_review(file_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            decision: MergeDecision::NeedsHumanReview,
            merged_content: None,
            confidence: None,
            reason: Some(reason.into()),
            error: None,
            tasks_involved: Vec::new(),
        }
    }

    pub fn failed(file_path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            decision: MergeDecision::Failed,
            merged_content: None,
            confidence: None,
            reason: None,
            error: Some(error.into()),
            tasks_involved: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_tasks(mut self, tasks: Vec<String>) -> Self {
        self.tasks_involved = tasks;
        self
    }
}
