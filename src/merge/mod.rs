//! Semantic merge pipeline.
//!
//! When several tasks in a wave edit the same file, this module reconciles
//! their versions: lightweight structural analysis, a rule-driven conflict
//! detector, deterministic merging for the mechanical cases, AI resolution
//! for the ambiguous ones, and human escalation for everything else.

mod analyzer;
mod auto;
mod detector;
mod engine;
mod resolver;
mod rules;
mod types;

pub use analyzer::{count_changed_lines, extract_import_source, line_of_offset, SemanticAnalyzer};
pub use auto::{AutoMergeAttempt, AutoMerger};
pub use detector::ConflictDetector;
pub use engine::{MergeReport, SemanticMergeEngine};
pub use resolver::{AiResolver, AiResolverStats, CompletionClient, TaskVariant};
pub use rules::{
    deep_merge, AiSettings, CompatibilityEntry, CustomRulesLoader, FileCategory, FilePatternRules,
    LanguageRules, MergeRules,
};
pub use types::{
    ChangeType, Compatibility, ConflictSeverity, FileChangeAnalysis, MergeDecision, MergeOutcome,
    MergeStrategy, SemanticChange, SemanticConflict, TaskSnapshot,
};
