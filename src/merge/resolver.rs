//! AI-assisted conflict resolution for ambiguous merges.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::rules::AiSettings;
use super::types::{MergeOutcome, SemanticChange, SemanticConflict};
use crate::error::Result;
use crate::utils::estimate_tokens;

/// External text-completion capability. The response may contain a fenced
/// code block with the proposed merged file.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// One task's version of the conflicting file, with its stated intent and
/// analyzed changes.
#[derive(Debug, Clone)]
pub struct TaskVariant {
    pub task_id: String,
    pub intent: String,
    pub content: String,
    pub changes: Vec<SemanticChange>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AiResolverStats {
    pub calls_made: usize,
    pub estimated_tokens_used: usize,
}

/// Phrases in a completion that suggest the model could not resolve the
/// conflict cleanly.
const ERROR_INDICATORS: &[&str] = &["error", "cannot", "unable", "failed", "unclear", "not sure"];

/// Builds bounded context and issues a single completion call per conflict.
///
/// Oversized contexts are rejected before any call is made: a doomed or
/// expensive request is worth less than an honest escalation to a human.
pub struct AiResolver {
    settings: AiSettings,
    client: Option<Arc<dyn CompletionClient>>,
    calls_made: AtomicUsize,
    estimated_tokens_used: AtomicUsize,
    code_block: Regex,
}

impl AiResolver {
    pub fn new(settings: AiSettings) -> Self {
        Self {
            settings,
            client: None,
            calls_made: AtomicUsize::new(0),
            estimated_tokens_used: AtomicUsize::new(0),
            code_block: Regex::new(r"(?s)```[A-Za-z0-9_+-]*\n(.*?)```").unwrap(),
        }
    }

    pub fn with_client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn max_context_tokens(&self) -> usize {
        self.settings.max_context_tokens
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.settings.confidence_threshold
    }

    pub fn stats(&self) -> AiResolverStats {
        AiResolverStats {
            calls_made: self.calls_made.load(Ordering::Relaxed),
            estimated_tokens_used: self.estimated_tokens_used.load(Ordering::Relaxed),
        }
    }

    pub async fn resolve_conflict(
        &self,
        conflict: &SemanticConflict,
        base: &str,
        variants: &[TaskVariant],
    ) -> MergeOutcome {
        let file_path = &conflict.file_path;

        let estimated = estimate_tokens(base)
            + variants
                .iter()
                .map(|v| estimate_tokens(&v.content) + estimate_tokens(&v.intent))
                .sum::<usize>();

        if estimated > self.settings.max_context_tokens {
            debug!(
                file = %file_path,
                estimated,
                max = self.settings.max_context_tokens,
                "Conflict context exceeds token budget, escalating to human review"
            );
            return MergeOutcome::needs_human_review(
                file_path,
                format!(
                    "context too large for AI resolution ({} tokens > {})",
                    estimated, self.settings.max_context_tokens
                ),
            );
        }

        if !self.settings.enabled {
            return MergeOutcome::needs_human_review(file_path, "AI resolution disabled");
        }
        let Some(client) = &self.client else {
            return MergeOutcome::needs_human_review(file_path, "no completion client configured");
        };

        let context = self.build_context(conflict, base, variants);
        let prompt = self.build_merge_prompt(conflict, &context);

        self.calls_made.fetch_add(1, Ordering::Relaxed);
        self.estimated_tokens_used
            .fetch_add(estimated + estimate_tokens(&prompt), Ordering::Relaxed);

        let response = match client.complete(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!(file = %file_path, error = %e, "Completion call failed");
                return MergeOutcome::failed(file_path, format!("completion call failed: {e}"));
            }
        };

        let confidence = self.assess_confidence(&response);
        match self.extract_code_block(&response) {
            Some(code) if confidence >= self.settings.confidence_threshold => {
                MergeOutcome::ai_merged(file_path, code, confidence)
            }
            _ => MergeOutcome::needs_human_review(
                file_path,
                format!("AI confidence {confidence:.2} below threshold"),
            )
            .with_confidence(confidence),
        }
    }

    /// Bounded conflict context: file, location, severity, then each task's
    /// intent, change list, and full variant.
    pub fn build_context(
        &self,
        conflict: &SemanticConflict,
        base: &str,
        variants: &[TaskVariant],
    ) -> String {
        let mut context = format!(
            "## Conflict\nFile: {}\nLocation: {}\nSeverity: {}\n\n## Base version\n```\n{}\n```\n",
            conflict.file_path, conflict.location, conflict.severity, base
        );

        for variant in variants {
            context.push_str(&format!(
                "\n## Task {} ({})\nChanges: {}\n```\n{}\n```\n",
                variant.task_id,
                if variant.intent.is_empty() {
                    "(no stated intent)"
                } else {
                    variant.intent.as_str()
                },
                format_changes(&variant.changes),
                variant.content
            ));
        }

        context
    }

    pub fn build_merge_prompt(&self, conflict: &SemanticConflict, context: &str) -> String {
        format!(
            "You are a code merge specialist. Two or more automated tasks modified the same \
             file and their changes overlap at {}.\n\n{}\n\nProduce one merged version of the \
             file that preserves the intent of every task. Reply with a single fenced code \
             block containing the complete merged file, followed by a short explanation.",
            conflict.location, context
        )
    }

    /// Extract the first fenced code block from a completion.
    pub fn extract_code_block(&self, response: &str) -> Option<String> {
        self.code_block
            .captures(response)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim_end().to_string())
    }

    /// Heuristic confidence score: 0.5 baseline, +0.3 for a code block,
    /// +0.15 when no failure phrasing appears, clamped to [0, 1].
    pub fn assess_confidence(&self, response: &str) -> f64 {
        let mut confidence: f64 = 0.5;

        if response.contains("```") {
            confidence += 0.3;
        }

        let lower = response.to_lowercase();
        if !ERROR_INDICATORS.iter().any(|i| lower.contains(i)) {
            confidence += 0.15;
        }

        confidence.clamp(0.0, 1.0)
    }
}

fn format_changes(changes: &[SemanticChange]) -> String {
    if changes.is_empty() {
        return "(none analyzed)".to_string();
    }
    changes
        .iter()
        .map(|c| format!("{} {} ({})", c.change_type, c.target, c.location))
        .collect::<Vec<_>>()
        .join(", ")
}
