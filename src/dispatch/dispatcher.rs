//! Agent resolution and worker invocation with bounded retries.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::memory::{EnrichedContext, Gotcha, GotchasMemory, MemoryQuery, ProjectContext};
use crate::config::DispatcherConfig;
use crate::domain::{ExecutionContext, Task, TaskResult, WorkerOutcome};
use crate::error::Result;
use crate::events::{EventBus, EventKind, ExecutionEvent};
use crate::utils::keyword_overlap;

/// Upper bound on paths pulled out of free-text worker output.
const MAX_EXTRACTED_FILES: usize = 20;

/// How many gotchas to pull from memory before relevance filtering.
const GOTCHA_FETCH_LIMIT: usize = 50;

/// Description keywords mapped to the agent-mapping key they imply.
const DESCRIPTION_KEYWORDS: &[(&str, &[&str])] = &[
    ("database", &["database", "migration", "schema", "sql"]),
    ("test", &["test", "tests", "testing", "coverage"]),
    ("deploy", &["deploy", "deployment", "release", "rollout"]),
    ("docs", &["document", "documentation", "docs", "readme"]),
];

/// The worker capability that actually runs a task as a named agent.
#[async_trait]
pub trait SubagentRunner: Send + Sync {
    async fn run(&self, agent: &str, prompt: &str, task: &Task) -> Result<WorkerOutcome>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchLogEntry {
    pub entry_type: String,
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Resolves which agent handles a task, enriches its context, and invokes
/// the worker with bounded retries.
pub struct SubagentDispatcher {
    config: DispatcherConfig,
    agent_mapping: RwLock<HashMap<String, String>>,
    runner: Option<Arc<dyn SubagentRunner>>,
    memory: Option<Arc<dyn MemoryQuery>>,
    gotchas: Option<Arc<dyn GotchasMemory>>,
    events: EventBus,
    dispatch_log: RwLock<VecDeque<DispatchLogEntry>>,
}

impl SubagentDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        // Custom mappings layer over the built-in table.
        let mut mapping = DispatcherConfig::default_agent_mapping();
        mapping.extend(config.agent_mapping.clone());

        Self {
            config,
            agent_mapping: RwLock::new(mapping),
            runner: None,
            memory: None,
            gotchas: None,
            events: EventBus::default(),
            dispatch_log: RwLock::new(VecDeque::new()),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn SubagentRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryQuery>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_gotchas(mut self, gotchas: Arc<dyn GotchasMemory>) -> Self {
        self.gotchas = Some(gotchas);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Resolve the executing agent for a task.
    ///
    /// Precedence: explicit assignment, type mapping, tag membership,
    /// description keywords, configured default.
    pub fn resolve_agent(&self, task: &Task) -> String {
        if let Some(agent) = &task.agent {
            return normalize_agent(agent);
        }

        let mapping = self.agent_mapping.read();

        if let Some(task_type) = &task.task_type {
            if let Some(agent) = mapping.get(task_type.as_str()) {
                return agent.clone();
            }
        }

        for tag in &task.tags {
            if let Some(agent) = mapping.get(tag.as_str()) {
                return agent.clone();
            }
        }

        let description = task.description.to_lowercase();
        for (type_key, keywords) in DESCRIPTION_KEYWORDS {
            if keywords.iter().any(|k| description.contains(k)) {
                if let Some(agent) = mapping.get(*type_key) {
                    return agent.clone();
                }
            }
        }

        self.config.default_agent.clone()
    }

    /// Dispatch one task to its resolved agent.
    ///
    /// Always produces a `TaskResult`; worker failures are retried up to
    /// `max_retries` and then reported, never thrown.
    pub async fn dispatch(&self, task: &Task, context: &ExecutionContext) -> TaskResult {
        let agent = self.resolve_agent(task);
        let started = Instant::now();

        self.events.emit(
            ExecutionEvent::new(EventKind::DispatchStarted)
                .with_task(&task.id)
                .with_agent(&agent),
        );
        self.log("dispatch_started", Some(task.id.as_str()), Some(agent.as_str()), None);

        let Some(runner) = self.runner.clone() else {
            let error = "no subagent runner configured";
            self.events.emit(
                ExecutionEvent::new(EventKind::DispatchFailed)
                    .with_task(&task.id)
                    .with_agent(&agent)
                    .with_message(error),
            );
            self.log(
                "dispatch_failed",
                Some(task.id.as_str()),
                Some(agent.as_str()),
                Some(error),
            );
            return TaskResult::failure(&task.id, error)
                .with_agent(&agent)
                .with_duration_ms(started.elapsed().as_millis() as u64);
        };

        let enriched = self.enrich_context(task, context).await;
        let prompt = self.build_prompt(&agent, task, &enriched);

        let mut last_error = String::from("worker failed");
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                debug!(
                    task_id = %task.id,
                    attempt,
                    delay_ms = self.config.retry_delay_ms,
                    "Retrying dispatch"
                );
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
            }

            match runner.run(&agent, &prompt, task).await {
                Ok(outcome) if outcome.success => {
                    let files = if outcome.files_modified.is_empty() {
                        self.extract_modified_files(&outcome.output)
                    } else {
                        outcome.files_modified
                    };

                    info!(task_id = %task.id, agent = %agent, attempt, "Dispatch completed");
                    self.events.emit(
                        ExecutionEvent::new(EventKind::DispatchCompleted)
                            .with_task(&task.id)
                            .with_agent(&agent),
                    );
                    self.log(
                        "dispatch_completed",
                        Some(task.id.as_str()),
                        Some(agent.as_str()),
                        None,
                    );

                    return TaskResult::success(&task.id, outcome.output)
                        .with_agent(&agent)
                        .with_files(files)
                        .with_duration_ms(started.elapsed().as_millis() as u64);
                }
                Ok(outcome) => {
                    last_error = outcome
                        .error
                        .unwrap_or_else(|| "worker reported failure".to_string());
                    warn!(task_id = %task.id, attempt, error = %last_error, "Worker reported failure");
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(task_id = %task.id, attempt, error = %last_error, "Worker invocation failed");
                }
            }
        }

        self.events.emit(
            ExecutionEvent::new(EventKind::DispatchFailed)
                .with_task(&task.id)
                .with_agent(&agent)
                .with_message(&last_error),
        );
        self.log(
            "dispatch_failed",
            Some(task.id.as_str()),
            Some(agent.as_str()),
            Some(last_error.as_str()),
        );

        TaskResult::failure(&task.id, last_error)
            .with_agent(&agent)
            .with_duration_ms(started.elapsed().as_millis() as u64)
    }

    /// Merge the explicit context with best-effort memory lookups. Lookup
    /// failures are swallowed; they must never abort a dispatch.
    pub async fn enrich_context(&self, task: &Task, base: &ExecutionContext) -> EnrichedContext {
        let mut enriched = EnrichedContext {
            vars: base.vars.clone(),
            project: ProjectContext::from_vars(&base.vars),
            ..EnrichedContext::default()
        };

        if let Some(memory) = &self.memory {
            match memory.context_for_task(task).await {
                Ok(context) => {
                    enriched.memory = context.relevant_memory;
                    enriched.patterns = context.suggested_patterns;
                }
                Err(e) => {
                    debug!(task_id = %task.id, error = %e, "Memory lookup failed, continuing without it");
                }
            }
        }

        if let Some(gotchas) = &self.gotchas {
            match gotchas.recent_gotchas(GOTCHA_FETCH_LIMIT).await {
                Ok(all) => {
                    enriched.gotchas = all
                        .into_iter()
                        .filter(|g| self.is_relevant_gotcha(g, task))
                        .collect();
                }
                Err(e) => {
                    debug!(task_id = %task.id, error = %e, "Gotcha lookup failed, continuing without it");
                }
            }
        }

        enriched
    }

    /// Build the worker prompt: agent identity, task, acceptance criteria,
    /// file hints, and whatever enrichment survived.
    pub fn build_prompt(&self, agent: &str, task: &Task, context: &EnrichedContext) -> String {
        let mut prompt = format!(
            "You are {}, executing task {}.\n\n## Task\n{}\n",
            agent, task.id, task.description
        );

        if !task.acceptance_criteria.is_empty() {
            prompt.push_str("\n## Acceptance criteria\n");
            for criterion in &task.acceptance_criteria {
                prompt.push_str(&format!("- {criterion}\n"));
            }
        }

        if !task.files.is_empty() {
            prompt.push_str("\n## Files in scope\n");
            for file in &task.files {
                prompt.push_str(&format!("- {file}\n"));
            }
        }

        if !context.gotchas.is_empty() {
            prompt.push_str("\n## Known gotchas\n");
            for gotcha in &context.gotchas {
                let label = gotcha
                    .pattern
                    .as_deref()
                    .unwrap_or(gotcha.description.as_str());
                match &gotcha.workaround {
                    Some(workaround) => {
                        prompt.push_str(&format!("- {label}: {workaround}\n"));
                    }
                    None => prompt.push_str(&format!("- {label}\n")),
                }
            }
        }

        if !context.patterns.is_empty() {
            prompt.push_str("\n## Relevant patterns\n");
            for pattern in &context.patterns {
                prompt.push_str(&format!("- {}: {}\n", pattern.name, pattern.description));
            }
        }

        if !context.memory.is_empty() {
            prompt.push_str("\n## Prior context\n");
            for entry in &context.memory {
                prompt.push_str(&format!("- {}\n", entry.content));
            }
        }

        prompt
    }

    /// Best-effort scan of free-text worker output for path-like tokens.
    pub fn extract_modified_files(&self, output: &str) -> Vec<String> {
        crate::utils::extract_path_tokens(output, MAX_EXTRACTED_FILES)
    }

    /// A gotcha applies when its pattern appears in the description, its
    /// category matches the task type, or the two descriptions share at
    /// least two significant keywords.
    pub fn is_relevant_gotcha(&self, gotcha: &Gotcha, task: &Task) -> bool {
        let description = task.description.to_lowercase();

        if let Some(pattern) = &gotcha.pattern {
            if !pattern.is_empty() && description.contains(&pattern.to_lowercase()) {
                return true;
            }
        }

        if let (Some(category), Some(task_type)) = (&gotcha.category, &task.task_type) {
            if category.eq_ignore_ascii_case(task_type) {
                return true;
            }
        }

        keyword_overlap(&gotcha.description, &task.description) >= 2
    }

    /// A copy of the active agent mapping.
    pub fn agent_mapping(&self) -> HashMap<String, String> {
        self.agent_mapping.read().clone()
    }

    /// Merge new mappings over the active table.
    pub fn update_agent_mapping(&self, updates: HashMap<String, String>) {
        self.agent_mapping.write().extend(updates);
    }

    fn log(
        &self,
        entry_type: &str,
        task_id: Option<&str>,
        agent: Option<&str>,
        message: Option<&str>,
    ) {
        let mut log = self.dispatch_log.write();
        log.push_back(DispatchLogEntry {
            entry_type: entry_type.to_string(),
            created_at: Utc::now(),
            task_id: task_id.map(str::to_string),
            agent: agent.map(str::to_string),
            message: message.map(str::to_string),
        });
        while log.len() > self.config.max_log_size {
            log.pop_front();
        }
    }

    /// The most recent `limit` dispatch log entries, oldest first.
    pub fn recent_log(&self, limit: usize) -> Vec<DispatchLogEntry> {
        let log = self.dispatch_log.read();
        log.iter()
            .skip(log.len().saturating_sub(limit))
            .cloned()
            .collect()
    }

    pub fn format_status(&self) -> String {
        let mapping = self.agent_mapping.read();
        let mut pairs: Vec<_> = mapping.iter().collect();
        pairs.sort();

        let mut status = format!(
            "Subagent Dispatcher\n  Default agent: {}\n  Max retries: {}\n  Log entries: {}\n  Agent Mapping:\n",
            self.config.default_agent,
            self.config.max_retries,
            self.dispatch_log.read().len()
        );
        for (key, agent) in pairs {
            status.push_str(&format!("    {key} -> {agent}\n"));
        }
        status
    }
}

/// A dispatcher is a valid worker for the wave executor: dispatching covers
/// agent resolution, enrichment, and retries, then reports the outcome.
#[async_trait]
impl crate::executor::TaskExecutor for SubagentDispatcher {
    async fn execute(&self, task: &Task, context: &ExecutionContext) -> Result<WorkerOutcome> {
        let result = self.dispatch(task, context).await;
        Ok(WorkerOutcome {
            success: result.success,
            output: result.output,
            error: result.error,
            files_modified: result.files_modified,
        })
    }
}

/// Agent names are `@`-prefixed; normalize bare names.
fn normalize_agent(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.starts_with('@') {
        trimmed.to_string()
    } else {
        format!("@{trimmed}")
    }
}
