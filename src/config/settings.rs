use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Result, RiptideError};

/// Aggregate configuration for the execution core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RiptideConfig {
    pub executor: ExecutorConfig,
    pub dispatcher: DispatcherConfig,
    pub aggregator: AggregatorConfig,
    pub merge: MergeEngineConfig,
    pub rules: RulesConfig,
}

impl RiptideConfig {
    pub async fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join("config.toml");
        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, dir: &Path) -> Result<()> {
        self.validate()?;
        let config_path = dir.join("config.toml");
        let content =
            toml::to_string_pretty(self).map_err(|e| RiptideError::Config(e.to_string()))?;
        fs::write(&config_path, content).await?;
        Ok(())
    }

    /// Validate configuration values for consistency and safety.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.executor.max_parallel == 0 {
            errors.push("executor.max_parallel must be greater than 0");
        }
        if self.executor.task_timeout_ms == 0 {
            errors.push("executor.task_timeout_ms must be greater than 0");
        }

        if self.dispatcher.default_agent.is_empty() {
            errors.push("dispatcher.default_agent must not be empty");
        }
        if self.dispatcher.max_log_size == 0 {
            errors.push("dispatcher.max_log_size must be greater than 0");
        }

        if self.aggregator.max_history == 0 {
            errors.push("aggregator.max_history must be greater than 0");
        }
        if self.aggregator.long_task_warning_ms == 0 {
            errors.push("aggregator.long_task_warning_ms must be greater than 0");
        }

        if self.rules.cache_ttl_secs == 0 {
            errors.push("rules.cache_ttl_secs must be greater than 0");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RiptideError::Config(errors.join("; ")))
        }
    }
}

/// Wave executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Upper bound on concurrently running tasks within a wave.
    pub max_parallel: usize,
    /// Per-task deadline; expiry yields a failed result, never an error.
    pub task_timeout_ms: u64,
    /// When false, a failed critical task aborts all remaining waves.
    pub continue_on_non_critical_failure: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            task_timeout_ms: 10 * 60 * 1000,
            continue_on_non_critical_failure: true,
        }
    }
}

/// Subagent dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub default_agent: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_log_size: usize,
    /// Task type / tag to agent mapping, merged over the built-in table.
    pub agent_mapping: HashMap<String, String>,
}

impl DispatcherConfig {
    /// Built-in type-to-agent table. Custom mappings are layered on top.
    pub fn default_agent_mapping() -> HashMap<String, String> {
        [
            ("database", "@data-engineer"),
            ("migration", "@data-engineer"),
            ("test", "@qa"),
            ("testing", "@qa"),
            ("deploy", "@devops"),
            ("infra", "@devops"),
            ("docs", "@pm"),
            ("frontend", "@dev"),
            ("backend", "@dev"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_agent: "@dev".to_string(),
            max_retries: 2,
            retry_delay_ms: 2000,
            max_log_size: 100,
            agent_mapping: HashMap::new(),
        }
    }
}

/// Result aggregator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub detect_conflicts: bool,
    pub max_history: usize,
    /// Tasks running longer than this raise a `long_duration` warning.
    pub long_task_warning_ms: u64,
    pub report_dir: PathBuf,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            detect_conflicts: true,
            max_history: 50,
            long_task_warning_ms: 5 * 60 * 1000,
            report_dir: PathBuf::from(".riptide/reports"),
        }
    }
}

/// Semantic merge engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeEngineConfig {
    pub report_dir: PathBuf,
}

impl Default for MergeEngineConfig {
    fn default() -> Self {
        Self {
            report_dir: PathBuf::from(".riptide/merge"),
        }
    }
}

/// Custom merge-rules loading settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Project override file, relative to the project root.
    pub rules_file: PathBuf,
    pub cache_ttl_secs: u64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            rules_file: PathBuf::from(".riptide/merge-rules.toml"),
            cache_ttl_secs: 60,
        }
    }
}
