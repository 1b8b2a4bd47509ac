use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An atomic unit of work assigned to one agent.
///
/// Tasks are immutable inputs owned by an external planner; dependency
/// ordering is resolved before wave formation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,

    /// Explicit agent assignment, e.g. `@qa`. Takes precedence over mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// File hints from the planner, not the authoritative modification list.
    #[serde(default)]
    pub files: Vec<String>,

    #[serde(default)]
    pub acceptance_criteria: Vec<String>,

    /// A failed critical task aborts remaining waves under strict policy.
    #[serde(default)]
    pub critical: bool,

    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            agent: None,
            task_type: None,
            tags: Vec::new(),
            files: Vec::new(),
            acceptance_criteria: Vec::new(),
            critical: false,
            dependencies: Vec::new(),
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    pub fn with_acceptance_criteria(mut self, criteria: Vec<String>) -> Self {
        self.acceptance_criteria = criteria;
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }
}

/// A batch of dependency-free tasks executed with bounded concurrency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wave {
    pub index: usize,
    pub tasks: Vec<Task>,
}

impl Wave {
    pub fn new(index: usize, tasks: Vec<Task>) -> Self {
        Self { index, tasks }
    }
}

/// Caller-supplied execution context.
///
/// `tasks` doubles as the single-wave fallback source when no wave analyzer
/// is configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    #[serde(default)]
    pub tasks: Vec<Task>,

    #[serde(default)]
    pub vars: HashMap<String, String>,
}

impl ExecutionContext {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            vars: HashMap::new(),
        }
    }
}
