//! Optional memory collaborators consulted during context enrichment.
//!
//! All lookups are best-effort: a failing memory backend degrades the prompt,
//! never the dispatch.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Task;
use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryEntry {
    #[serde(default)]
    pub kind: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternHint {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// What the memory backend knows that is relevant to one task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryContext {
    #[serde(default)]
    pub relevant_memory: Vec<MemoryEntry>,
    #[serde(default)]
    pub suggested_patterns: Vec<PatternHint>,
}

/// A recorded pitfall from earlier runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gotcha {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workaround: Option<String>,
}

#[async_trait]
pub trait MemoryQuery: Send + Sync {
    async fn context_for_task(&self, task: &Task) -> Result<MemoryContext>;
}

#[async_trait]
pub trait GotchasMemory: Send + Sync {
    async fn recent_gotchas(&self, limit: usize) -> Result<Vec<Gotcha>>;
}

/// Context handed to the worker: caller vars plus whatever enrichment
/// succeeded.
#[derive(Debug, Clone, Default)]
pub struct EnrichedContext {
    pub vars: HashMap<String, String>,
    pub project: ProjectContext,
    pub memory: Vec<MemoryEntry>,
    pub patterns: Vec<PatternHint>,
    pub gotchas: Vec<Gotcha>,
}

/// Best-effort project identification, derived from caller vars.
#[derive(Debug, Clone, Default)]
pub struct ProjectContext {
    pub name: Option<String>,
    pub root: Option<String>,
}

impl ProjectContext {
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        Self {
            name: vars.get("project_name").cloned(),
            root: vars.get("project_root").cloned(),
        }
    }
}
