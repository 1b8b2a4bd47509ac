//! Merge rule configuration: compiled-in defaults plus project overrides.
//!
//! A project can drop a TOML override file next to its sources; values are
//! deep-merged over the defaults, with absent/null values leaving the
//! defaults untouched. The loader caches the merged result with a TTL and an
//! explicit invalidation hook so edited rules apply without a restart.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use glob::Pattern;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{Compatibility, ConflictSeverity, MergeStrategy};
use crate::config::RulesConfig;

/// Rule-file compatibility entry, stringly-typed as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityEntry {
    pub compatible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

impl CompatibilityEntry {
    fn new(compatible: bool, strategy: &str, severity: &str) -> Self {
        Self {
            compatible,
            strategy: Some(strategy.to_string()),
            severity: Some(severity.to_string()),
        }
    }

    pub fn resolve(&self) -> Compatibility {
        Compatibility {
            compatible: self.compatible,
            strategy: MergeStrategy::parse_or_default(self.strategy.as_deref()),
            severity: ConflictSeverity::parse_or_default(self.severity.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePatternRules {
    pub skip: Vec<String>,
    pub human_review: Vec<String>,
    pub ai_preferred: Vec<String>,
    pub auto_merge: Vec<String>,
}

impl Default for FilePatternRules {
    fn default() -> Self {
        Self {
            skip: string_vec(&[
                "node_modules/**",
                "target/**",
                "dist/**",
                "build/**",
                ".git/**",
                "*.min.js",
                "*.map",
            ]),
            human_review: string_vec(&[
                "package.json",
                "package-lock.json",
                "Cargo.toml",
                "Cargo.lock",
                "pyproject.toml",
                "poetry.lock",
                "go.mod",
                "go.sum",
                "yarn.lock",
                ".env*",
            ]),
            ai_preferred: string_vec(&[
                "src/**/*.ts",
                "src/**/*.tsx",
                "src/**/*.js",
                "src/**/*.jsx",
                "src/**/*.py",
                "src/**/*.rs",
            ]),
            auto_merge: string_vec(&["*.md", "docs/**", "*.txt"]),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageRules {
    pub extensions: Vec<String>,
    pub patterns: Vec<String>,
}

/// AI resolution settings, overridable from the rules file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub enabled: bool,
    pub max_context_tokens: usize,
    pub confidence_threshold: f64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_context_tokens: 4000,
            confidence_threshold: 0.7,
        }
    }
}

/// The full merged rule set driving the conflict detector and resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeRules {
    /// Keyed by "`change_type_a`+`change_type_b`"; lookups try both orders.
    pub compatibility: BTreeMap<String, CompatibilityEntry>,
    pub file_patterns: FilePatternRules,
    pub languages: BTreeMap<String, LanguageRules>,
    pub strategies: BTreeMap<String, String>,
    pub ai: AiSettings,
}

impl Default for MergeRules {
    fn default() -> Self {
        let mut compatibility = BTreeMap::new();
        let mut rule = |a: &str, b: &str, entry: CompatibilityEntry| {
            compatibility.insert(format!("{a}+{b}"), entry);
        };

        rule(
            "import_added",
            "import_added",
            CompatibilityEntry::new(true, "combine", "low"),
        );
        rule(
            "import_removed",
            "import_removed",
            CompatibilityEntry::new(true, "take_newer", "low"),
        );
        rule(
            "import_added",
            "import_removed",
            CompatibilityEntry::new(false, "ai_required", "medium"),
        );
        rule(
            "function_added",
            "function_added",
            CompatibilityEntry::new(false, "ai_required", "medium"),
        );
        rule(
            "function_modified",
            "function_modified",
            CompatibilityEntry::new(false, "ai_required", "high"),
        );
        rule(
            "function_removed",
            "function_modified",
            CompatibilityEntry::new(false, "human_required", "critical"),
        );
        rule(
            "function_removed",
            "function_removed",
            CompatibilityEntry::new(true, "take_newer", "low"),
        );
        rule(
            "function_added",
            "function_modified",
            CompatibilityEntry::new(false, "ai_required", "medium"),
        );
        rule(
            "class_added",
            "class_added",
            CompatibilityEntry::new(false, "ai_required", "medium"),
        );
        rule(
            "class_removed",
            "class_removed",
            CompatibilityEntry::new(true, "take_newer", "low"),
        );
        rule(
            "variable_added",
            "variable_added",
            CompatibilityEntry::new(false, "ai_required", "low"),
        );
        rule(
            "variable_modified",
            "variable_modified",
            CompatibilityEntry::new(false, "ai_required", "medium"),
        );

        let mut languages = BTreeMap::new();
        languages.insert(
            "javascript".to_string(),
            LanguageRules {
                extensions: string_vec(&[".js", ".jsx", ".mjs", ".cjs"]),
                patterns: Vec::new(),
            },
        );
        languages.insert(
            "typescript".to_string(),
            LanguageRules {
                extensions: string_vec(&[".ts", ".tsx"]),
                patterns: Vec::new(),
            },
        );
        languages.insert(
            "python".to_string(),
            LanguageRules {
                extensions: string_vec(&[".py"]),
                patterns: Vec::new(),
            },
        );
        languages.insert(
            "rust".to_string(),
            LanguageRules {
                extensions: string_vec(&[".rs"]),
                patterns: Vec::new(),
            },
        );

        let mut strategies = BTreeMap::new();
        strategies.insert("default".to_string(), "ai_required".to_string());
        strategies.insert("imports".to_string(), "combine".to_string());

        Self {
            compatibility,
            file_patterns: FilePatternRules::default(),
            languages,
            strategies,
            ai: AiSettings::default(),
        }
    }
}

/// Which processing lane a file falls into before any analysis runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Skip,
    HumanReview,
    AiPreferred,
    AutoMerge,
    Default,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::HumanReview => "human_review",
            Self::AiPreferred => "ai_preferred",
            Self::AutoMerge => "auto_merge",
            Self::Default => "default",
        }
    }
}

#[derive(Default)]
struct RulesCache {
    rules: Option<MergeRules>,
    loaded_at: Option<Instant>,
}

/// Loads project override rules and merges them over the defaults.
pub struct CustomRulesLoader {
    root_path: PathBuf,
    rules_path: PathBuf,
    ttl: Duration,
    cache: RwLock<RulesCache>,
}

impl CustomRulesLoader {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self::with_config(root_path, &RulesConfig::default())
    }

    pub fn with_config(root_path: impl Into<PathBuf>, config: &RulesConfig) -> Self {
        let root_path = root_path.into();
        let rules_path = root_path.join(&config.rules_file);
        Self {
            root_path,
            rules_path,
            ttl: Duration::from_secs(config.cache_ttl_secs),
            cache: RwLock::new(RulesCache::default()),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn rules_path(&self) -> &Path {
        &self.rules_path
    }

    pub fn default_rules(&self) -> MergeRules {
        MergeRules::default()
    }

    /// Read the raw project override file. Missing file is normal; a file
    /// that fails to parse is reported and ignored.
    pub fn load_custom_rules(&self) -> Option<serde_json::Value> {
        if !self.rules_path.exists() {
            return None;
        }
        let content = match fs::read_to_string(&self.rules_path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %self.rules_path.display(), error = %e, "Failed to read custom merge rules");
                return None;
            }
        };
        let value: toml::Value = match toml::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %self.rules_path.display(), error = %e, "Invalid custom merge rules, using defaults");
                return None;
            }
        };
        serde_json::to_value(value).ok()
    }

    /// The effective rule set: defaults with project overrides deep-merged
    /// on top. Cached until the TTL lapses or `clear_cache` is called.
    pub fn merged_rules(&self) -> MergeRules {
        if self.is_cache_valid() {
            if let Some(rules) = self.cache.read().rules.clone() {
                return rules;
            }
        }

        let merged = self.build_merged();
        let mut cache = self.cache.write();
        cache.rules = Some(merged.clone());
        cache.loaded_at = Some(Instant::now());
        merged
    }

    fn build_merged(&self) -> MergeRules {
        let defaults = MergeRules::default();
        let Some(custom) = self.load_custom_rules() else {
            return defaults;
        };

        let mut base = match serde_json::to_value(&defaults) {
            Ok(value) => value,
            Err(_) => return defaults,
        };
        deep_merge(&mut base, &custom);

        match serde_json::from_value(base) {
            Ok(rules) => {
                debug!(path = %self.rules_path.display(), "Custom merge rules applied");
                rules
            }
            Err(e) => {
                warn!(error = %e, "Custom merge rules do not match the schema, using defaults");
                defaults
            }
        }
    }

    pub fn is_cache_valid(&self) -> bool {
        let cache = self.cache.read();
        match (&cache.rules, cache.loaded_at) {
            (Some(_), Some(loaded_at)) => loaded_at.elapsed() < self.ttl,
            _ => false,
        }
    }

    pub fn clear_cache(&self) {
        let mut cache = self.cache.write();
        cache.rules = None;
        cache.loaded_at = None;
    }

    /// Check a path against glob patterns.
    pub fn matches_pattern(&self, path: &str, patterns: &[String]) -> bool {
        patterns.iter().any(|p| {
            Pattern::new(p)
                .map(|pattern| pattern.matches(path))
                .unwrap_or(false)
        })
    }

    /// Categorize a file for the merge pipeline. Skip wins over everything,
    /// then human review, then auto-merge, then AI preference.
    pub fn file_category(&self, path: &str) -> FileCategory {
        let rules = self.merged_rules();
        let patterns = &rules.file_patterns;
        let file_name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path);

        let matches = |candidates: &[String]| {
            self.matches_pattern(path, candidates) || self.matches_pattern(file_name, candidates)
        };

        if matches(&patterns.skip) {
            FileCategory::Skip
        } else if matches(&patterns.human_review) {
            FileCategory::HumanReview
        } else if matches(&patterns.auto_merge) {
            FileCategory::AutoMerge
        } else if matches(&patterns.ai_preferred) {
            FileCategory::AiPreferred
        } else {
            FileCategory::Default
        }
    }

    /// Look up a compatibility rule for a pair of change type names, trying
    /// both key orders.
    pub fn compatibility_rule(&self, a: &str, b: &str) -> Option<CompatibilityEntry> {
        let rules = self.merged_rules();
        rules
            .compatibility
            .get(&format!("{a}+{b}"))
            .or_else(|| rules.compatibility.get(&format!("{b}+{a}")))
            .cloned()
    }

    pub fn language_config(&self, language: &str) -> LanguageRules {
        self.merged_rules()
            .languages
            .get(language)
            .cloned()
            .unwrap_or_default()
    }

    pub fn ai_config(&self) -> AiSettings {
        self.merged_rules().ai
    }
}

/// Recursively merge `source` into `target`.
///
/// Null source values are skipped so an override file can never erase a
/// default by mistake; objects merge key-wise, everything else replaces.
pub fn deep_merge(target: &mut serde_json::Value, source: &serde_json::Value) {
    use serde_json::Value;

    match source {
        Value::Null => {}
        Value::Object(source_map) => {
            if let Value::Object(target_map) = target {
                for (key, source_value) in source_map {
                    if source_value.is_null() {
                        continue;
                    }
                    match target_map.get_mut(key) {
                        Some(target_value) => deep_merge(target_value, source_value),
                        None => {
                            target_map.insert(key.clone(), source_value.clone());
                        }
                    }
                }
            } else {
                *target = source.clone();
            }
        }
        other => *target = other.clone(),
    }
}

fn string_vec(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_rules_structure() {
        let rules = MergeRules::default();
        assert!(!rules.compatibility.is_empty());
        assert!(!rules.file_patterns.skip.is_empty());
        assert!(!rules.languages.is_empty());
        assert!(!rules.strategies.is_empty());
        assert!(rules.ai.enabled);
        assert_eq!(rules.ai.max_context_tokens, 4000);
    }

    #[test]
    fn test_load_custom_rules_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = CustomRulesLoader::new(tmp.path());
        assert!(loader.load_custom_rules().is_none());
        assert!(!loader.is_cache_valid());
    }

    #[test]
    fn test_merged_rules_defaults_without_custom_file() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = CustomRulesLoader::new(tmp.path());
        let rules = loader.merged_rules();
        assert!(rules.ai.enabled);
        assert!(loader.is_cache_valid());
    }

    #[test]
    fn test_custom_rules_override_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let rules_dir = tmp.path().join(".riptide");
        fs::create_dir_all(&rules_dir).unwrap();
        fs::write(
            rules_dir.join("merge-rules.toml"),
            r#"
[ai]
max_context_tokens = 9000

[compatibility."class_added+class_added"]
compatible = true
strategy = "combine"
severity = "low"
"#,
        )
        .unwrap();

        let loader = CustomRulesLoader::new(tmp.path());
        let rules = loader.merged_rules();

        assert_eq!(rules.ai.max_context_tokens, 9000);
        // Untouched defaults survive the merge.
        assert!((rules.ai.confidence_threshold - 0.7).abs() < f64::EPSILON);
        assert!(rules.ai.enabled);

        let entry = loader
            .compatibility_rule("class_added", "class_added")
            .unwrap();
        assert!(entry.compatible);
        assert_eq!(entry.strategy.as_deref(), Some("combine"));
    }

    #[test]
    fn test_clear_cache_forces_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = CustomRulesLoader::new(tmp.path());
        loader.merged_rules();
        assert!(loader.is_cache_valid());
        loader.clear_cache();
        assert!(!loader.is_cache_valid());
    }

    #[test]
    fn test_deep_merge_objects() {
        let mut target = json!({"a": 1, "b": {"c": 2, "d": 3}});
        deep_merge(&mut target, &json!({"b": {"c": 99}, "e": 5}));
        assert_eq!(target["a"], 1);
        assert_eq!(target["b"]["c"], 99);
        assert_eq!(target["b"]["d"], 3);
        assert_eq!(target["e"], 5);
    }

    #[test]
    fn test_deep_merge_skips_null() {
        let mut target = json!({"a": 1});
        deep_merge(&mut target, &json!({"a": null, "b": null}));
        assert_eq!(target["a"], 1);
        assert!(target.get("b").is_none());
    }

    #[test]
    fn test_matches_pattern() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = CustomRulesLoader::new(tmp.path());
        let patterns = string_vec(&["node_modules/**", "src/**/*.ts", "*.md"]);

        assert!(loader.matches_pattern("node_modules/foo/bar.js", &patterns));
        assert!(loader.matches_pattern("src/components/app.ts", &patterns));
        assert!(loader.matches_pattern("README.md", &patterns));
        assert!(!loader.matches_pattern("src/app.go", &patterns));
    }

    #[test]
    fn test_file_category() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = CustomRulesLoader::new(tmp.path());

        assert_eq!(
            loader.file_category("node_modules/x.js"),
            FileCategory::Skip
        );
        assert_eq!(loader.file_category("README.md"), FileCategory::AutoMerge);
        assert_eq!(
            loader.file_category("package.json"),
            FileCategory::HumanReview
        );
        assert_eq!(
            loader.file_category("src/components/App.tsx"),
            FileCategory::AiPreferred
        );
        assert_eq!(loader.file_category("random.xyz"), FileCategory::Default);
    }

    #[test]
    fn test_compatibility_rule_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = CustomRulesLoader::new(tmp.path());

        let entry = loader
            .compatibility_rule("import_added", "import_added")
            .unwrap();
        assert!(entry.compatible);

        // Reverse key order also resolves.
        let entry = loader
            .compatibility_rule("function_modified", "function_removed")
            .unwrap();
        assert!(!entry.compatible);
        assert_eq!(entry.severity.as_deref(), Some("critical"));

        assert!(loader.compatibility_rule("a", "b").is_none());
    }

    #[test]
    fn test_language_config() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = CustomRulesLoader::new(tmp.path());

        let js = loader.language_config("javascript");
        assert!(!js.extensions.is_empty());

        let unknown = loader.language_config("brainfuck");
        assert!(unknown.extensions.is_empty());
    }
}
