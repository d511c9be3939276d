//! Configuration for the audit engine
//!
//! Reads configuration from:
//! - `.auditrc.yaml` / `.auditrc.json` (project-level, see [`Config::discover`])
//! - any YAML or JSON file passed to [`Config::load`]
//! - named presets (`recommended`, `strict`, `minimal`) via `extends`

use crate::finding::Severity;
use crate::rule::{Category, RuleDefinition};
use crate::score::SeverityWeights;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Evaluate rules in parallel
    pub parallel: bool,

    /// Number of worker threads (0 = one per CPU)
    pub jobs: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            jobs: 0,
        }
    }
}

/// Rule configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Disabled rules
    pub disabled: Vec<String>,

    /// Enabled rules (empty = all)
    pub enabled: Vec<String>,

    /// Severity overrides (rule key -> severity)
    pub severity: HashMap<String, Severity>,

    /// Per-document rule ignores (glob over the logical path -> rule keys)
    pub per_file: HashMap<String, Vec<String>>,

    /// Custom condition rules
    pub custom: Vec<RuleDefinition>,
}

/// Normalization caps for category scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Cap applied to categories without an override
    pub default: f64,

    /// Per-category caps
    pub categories: BTreeMap<Category, f64>,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            default: 10.0,
            categories: BTreeMap::new(),
        }
    }
}

/// Scoring settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Deduction per finding by severity
    pub weights: SeverityWeights,

    pub normalization: NormalizationConfig,

    /// Weight of each category in the overall score (default 1)
    pub category_weights: BTreeMap<Category, f64>,
}

/// Severity escalation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// More images without alternative text than this escalates them all to critical
    pub missing_alt_threshold: usize,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            missing_alt_threshold: 5,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extend from other configuration files or presets
    pub extends: Vec<String>,

    /// Engine settings
    pub engine: EngineConfig,

    /// Rule configuration
    pub rules: RulesConfig,

    /// Scoring settings
    pub scoring: ScoringConfig,

    /// Severity escalation
    pub escalation: EscalationConfig,

    /// Rule categories to run (empty = all)
    pub categories: Vec<String>,
}

const CONFIG_NAMES: [&str; 4] = [
    ".auditrc.yaml",
    ".auditrc.yml",
    ".auditrc.json",
    "audit.yaml",
];

impl Config {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a preset configuration by name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "recommended" => Some(Self::preset_recommended()),
            "strict" => Some(Self::preset_strict()),
            "minimal" => Some(Self::preset_minimal()),
            _ => None,
        }
    }

    /// Recommended preset - everything except the noisiest rules
    fn preset_recommended() -> Self {
        let mut config = Self::default();
        config.rules.disabled = vec!["unused-selector".to_string()];
        config
    }

    /// Strict preset - every rule, minor issues weigh more
    fn preset_strict() -> Self {
        let mut config = Self::default();
        for key in ["heading-order", "bem-naming-check", "class-naming-case"] {
            config.rules.severity.insert(key.to_string(), Severity::Medium);
        }
        config.escalation.missing_alt_threshold = 0;
        config
    }

    /// Minimal preset - accessibility and forms only
    fn preset_minimal() -> Self {
        Self {
            categories: vec!["accessibility".to_string(), "forms".to_string()],
            ..Self::default()
        }
    }

    /// Parse YAML configuration (no `extends` resolution)
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load_with_depth(path, 0)?;
        config.validate()?;
        Ok(config)
    }

    /// Load with recursion depth limit (to prevent infinite loops)
    fn load_with_depth(path: &Path, depth: usize) -> Result<Self, ConfigError> {
        const MAX_DEPTH: usize = 10;
        if depth >= MAX_DEPTH {
            return Err(ConfigError::Invalid(
                "Maximum config inheritance depth exceeded".to_string(),
            ));
        }

        log::debug!("loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let mut config: Self = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown config file format: {}",
                    ext
                )))
            }
        };

        if !config.extends.is_empty() {
            let base_dir = path.parent().unwrap_or(Path::new("."));
            let mut base_config = Self::default();

            for extend in &config.extends.clone() {
                let extended = if let Some(preset) = Self::preset(extend) {
                    preset
                } else {
                    let extend_path = if Path::new(extend).is_absolute() {
                        PathBuf::from(extend)
                    } else {
                        base_dir.join(extend)
                    };
                    Self::load_with_depth(&extend_path, depth + 1)?
                };
                base_config.merge(extended);
            }

            base_config.merge(config);
            config = base_config;
        }

        Ok(config)
    }

    /// Find and load the first known config file in a directory
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        for name in &CONFIG_NAMES {
            let path = dir.join(name);
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        // Extends are not inherited

        // Engine settings left at their defaults do not override the base
        let engine_defaults = EngineConfig::default();
        if other.engine.jobs != engine_defaults.jobs {
            self.engine.jobs = other.engine.jobs;
        }
        if other.engine.parallel != engine_defaults.parallel {
            self.engine.parallel = other.engine.parallel;
        }

        self.rules.disabled.extend(other.rules.disabled);
        if !other.rules.enabled.is_empty() {
            self.rules.enabled = other.rules.enabled;
        }
        self.rules.severity.extend(other.rules.severity);
        for (pattern, rules) in other.rules.per_file {
            self.rules.per_file.entry(pattern).or_default().extend(rules);
        }
        for custom in other.rules.custom {
            self.rules.custom.retain(|c| c.id != custom.id);
            self.rules.custom.push(custom);
        }

        let defaults = ScoringConfig::default();
        if other.scoring.weights != defaults.weights {
            self.scoring.weights = other.scoring.weights;
        }
        if other.scoring.normalization.default != defaults.normalization.default {
            self.scoring.normalization.default = other.scoring.normalization.default;
        }
        self.scoring
            .normalization
            .categories
            .extend(other.scoring.normalization.categories);
        self.scoring
            .category_weights
            .extend(other.scoring.category_weights);

        if other.escalation != EscalationConfig::default() {
            self.escalation = other.escalation;
        }

        if !other.categories.is_empty() {
            self.categories = other.categories;
        }
    }

    /// Check values that would make scoring meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = &self.scoring.weights;
        for severity in Severity::ALL {
            let weight = weights.weight(severity);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "weight for {} must be a non-negative number, got {}",
                    severity, weight
                )));
            }
        }

        let caps = std::iter::once(self.scoring.normalization.default)
            .chain(self.scoring.normalization.categories.values().copied());
        for cap in caps {
            if !cap.is_finite() || cap <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "normalization cap must be positive, got {}",
                    cap
                )));
            }
        }

        for (category, weight) in &self.scoring.category_weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "weight for category {} must be non-negative, got {}",
                    category, weight
                )));
            }
        }

        for name in &self.categories {
            name.parse::<Category>().map_err(ConfigError::Invalid)?;
        }

        for pattern in self.rules.per_file.keys() {
            globset::Glob::new(pattern).map_err(|e| {
                ConfigError::Invalid(format!("invalid per_file pattern '{}': {}", pattern, e))
            })?;
        }

        Ok(())
    }

    /// Check if a rule is enabled
    pub fn is_rule_enabled(&self, rule_key: &str) -> bool {
        if self.rules.disabled.iter().any(|r| r == rule_key) {
            return false;
        }

        // If enabled list is not empty, rule must be in it
        if !self.rules.enabled.is_empty() {
            return self.rules.enabled.iter().any(|r| r == rule_key);
        }

        true
    }

    /// Check if a category is selected (empty selection = all)
    pub fn is_category_enabled(&self, category: Category) -> bool {
        self.categories.is_empty()
            || self
                .categories
                .iter()
                .any(|c| c.parse::<Category>().is_ok_and(|parsed| parsed == category))
    }

    /// Get severity override for a rule
    pub fn get_severity_override(&self, rule_key: &str) -> Option<Severity> {
        self.rules.severity.get(rule_key).copied()
    }

    /// Check if a rule should be ignored for a document
    pub fn should_ignore_rule_for_file(&self, rule_key: &str, path: &str) -> bool {
        for (pattern, rules) in &self.rules.per_file {
            if let Ok(glob) = globset::Glob::new(pattern) {
                let matcher = glob.compile_matcher();
                if matcher.is_match(path) && rules.iter().any(|r| r == "all" || r == rule_key) {
                    return true;
                }
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::new();
        assert!(config.engine.parallel);
        assert_eq!(config.engine.jobs, 0);
        assert_eq!(config.escalation.missing_alt_threshold, 5);
        assert_eq!(config.scoring.weights.critical, 4.0);
        assert_eq!(config.scoring.normalization.default, 10.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rule_enabled() {
        let mut config = Config::new();
        assert!(config.is_rule_enabled("any-rule"));

        config.rules.disabled.push("missing-h1".to_string());
        assert!(!config.is_rule_enabled("missing-h1"));
        assert!(config.is_rule_enabled("missing-alt"));

        config.rules.enabled = vec!["missing-alt".to_string()];
        assert!(!config.is_rule_enabled("missing-title"));
        assert!(config.is_rule_enabled("missing-alt"));
    }

    #[test]
    fn test_category_selection() {
        let mut config = Config::new();
        assert!(config.is_category_enabled(Category::Naming));

        config.categories = vec!["accessibility".to_string(), "file-structure".to_string()];
        assert!(config.is_category_enabled(Category::FileStructure));
        assert!(!config.is_category_enabled(Category::Naming));
    }

    #[test]
    fn test_severity_override() {
        let mut config = Config::new();
        config
            .rules
            .severity
            .insert("heading-order".to_string(), Severity::High);

        assert_eq!(config.get_severity_override("heading-order"), Some(Severity::High));
        assert_eq!(config.get_severity_override("missing-h1"), None);
    }

    #[test]
    fn test_per_file_ignore() {
        let mut config = Config::new();
        config.rules.per_file.insert(
            "legacy/**/*.html".to_string(),
            vec!["missing-lang".to_string()],
        );
        config
            .rules
            .per_file
            .insert("vendor/*.html".to_string(), vec!["all".to_string()]);

        assert!(config.should_ignore_rule_for_file("missing-lang", "legacy/old/index.html"));
        assert!(!config.should_ignore_rule_for_file("missing-alt", "legacy/old/index.html"));
        assert!(config.should_ignore_rule_for_file("missing-alt", "vendor/widget.html"));
        assert!(!config.should_ignore_rule_for_file("missing-lang", "index.html"));
    }

    #[test]
    fn test_yaml_deserialize() {
        let yaml = r#"
engine:
  parallel: false
  jobs: 4
rules:
  disabled:
    - unused-selector
  severity:
    heading-order: high
  custom:
    - id: no-marquee
      category: semantics
      severity: medium
      target:
        name: marquee
      condition: "true"
      message: "<{name}> is obsolete"
scoring:
  weights:
    low: 1.0
  normalization:
    default: 20
    categories:
      naming: 5
  category_weights:
    accessibility: 2
escalation:
  missing_alt_threshold: 3
categories: [accessibility, naming]
"#;

        let config = Config::from_yaml_str(yaml).unwrap();
        assert!(!config.engine.parallel);
        assert_eq!(config.engine.jobs, 4);
        assert_eq!(config.rules.disabled, vec!["unused-selector"]);
        assert_eq!(config.get_severity_override("heading-order"), Some(Severity::High));
        assert_eq!(config.rules.custom.len(), 1);
        assert_eq!(config.scoring.weights.low, 1.0);
        assert_eq!(config.scoring.weights.critical, 4.0);
        assert_eq!(config.scoring.normalization.default, 20.0);
        assert_eq!(config.scoring.normalization.categories[&Category::Naming], 5.0);
        assert_eq!(config.scoring.category_weights[&Category::Accessibility], 2.0);
        assert_eq!(config.escalation.missing_alt_threshold, 3);
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            Config::from_yaml_str("scoring:\n  normalization:\n    default: 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_yaml_str("scoring:\n  weights:\n    high: -1\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_yaml_str("categories: [layout]\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_yaml_str("rules:\n  per_file:\n    \"[\": [all]\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_yaml_str("engine: [1, 2]\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_load_with_preset_and_file_extends() {
        let dir = tempfile::tempdir().unwrap();

        let base = dir.path().join("base.json");
        std::fs::write(
            &base,
            r#"{ "rules": { "disabled": ["missing-title"] }, "escalation": { "missing_alt_threshold": 2 } }"#,
        )
        .unwrap();

        let main = dir.path().join(".auditrc.yaml");
        let mut file = std::fs::File::create(&main).unwrap();
        writeln!(
            file,
            "extends: [recommended, base.json]\nrules:\n  disabled: [missing-h1]\n"
        )
        .unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert!(!config.is_rule_enabled("unused-selector"));
        assert!(!config.is_rule_enabled("missing-title"));
        assert!(!config.is_rule_enabled("missing-h1"));
        assert_eq!(config.escalation.missing_alt_threshold, 2);
        assert!(config.extends.is_empty());
    }

    #[test]
    fn test_extends_keeps_base_engine_settings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base.yaml"), "engine:\n  parallel: false\n  jobs: 2\n").unwrap();

        let main = dir.path().join("main.yaml");
        std::fs::write(&main, "extends: [base.yaml]\nrules:\n  disabled: [missing-h1]\n").unwrap();

        let config = Config::load(&main).unwrap();
        assert!(!config.engine.parallel);
        assert_eq!(config.engine.jobs, 2);
        assert!(!config.is_rule_enabled("missing-h1"));
    }

    #[test]
    fn test_extends_cycle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.yaml");
        std::fs::write(&path, "extends: [loop.yaml]\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_discover_without_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert!(config.rules.disabled.is_empty());
    }

    #[test]
    fn test_presets() {
        assert!(Config::preset("recommended").is_some());
        assert!(Config::preset("nope").is_none());
        let minimal = Config::preset("minimal").unwrap();
        assert!(minimal.is_category_enabled(Category::Forms));
        assert!(!minimal.is_category_enabled(Category::Naming));
        let strict = Config::preset("strict").unwrap();
        assert_eq!(strict.get_severity_override("heading-order"), Some(Severity::Medium));
    }
}
