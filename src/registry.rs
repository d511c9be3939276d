//! Rule registry
//!
//! An ordered, frozen catalog of rules. Category order is the order in which
//! categories were first declared or registered; it drives report grouping
//! and the order of the score card.

use crate::condition::ConditionError;
use crate::config::Config;
use crate::rule::{Category, Rule};
use crate::rules::builtin_rules;
use std::collections::HashMap;
use thiserror::Error;

/// Error assembling the rule registry
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("duplicate rule key '{0}'")]
    DuplicateRuleKey(String),

    #[error("rule '{rule}' has an invalid condition: {source}")]
    InvalidCondition {
        rule: String,
        #[source]
        source: ConditionError,
    },

    #[error("invalid rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },
}

/// Collects rules before freezing them into a [`RuleRegistry`]
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    rules: Vec<Rule>,
    categories: Vec<Category>,
}

impl RegistryBuilder {
    /// Empty builder: no rules, no categories
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a category so it is scored even without rules
    pub fn declare_category(&mut self, category: Category) {
        if !self.categories.contains(&category) {
            self.categories.push(category);
        }
    }

    /// Add a category (builder pattern)
    pub fn with_category(mut self, category: Category) -> Self {
        self.declare_category(category);
        self
    }

    /// Queue a rule for registration
    pub fn register(&mut self, rule: Rule) {
        self.declare_category(rule.category);
        self.rules.push(rule);
    }

    /// Queue a rule (builder pattern)
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.register(rule);
        self
    }

    /// Freeze the registry, rejecting duplicate keys
    pub fn build(self) -> Result<RuleRegistry, ConfigurationError> {
        let mut index = HashMap::with_capacity(self.rules.len());
        for (i, rule) in self.rules.iter().enumerate() {
            if rule.key.trim().is_empty() {
                return Err(ConfigurationError::InvalidRule {
                    rule: rule.key.clone(),
                    message: "rule key is empty".to_string(),
                });
            }
            if index.insert(rule.key.clone(), i).is_some() {
                return Err(ConfigurationError::DuplicateRuleKey(rule.key.clone()));
            }
        }

        Ok(RuleRegistry {
            rules: self.rules,
            index,
            categories: self.categories,
        })
    }
}

/// The frozen rule catalog
#[derive(Debug)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
    index: HashMap<String, usize>,
    categories: Vec<Category>,
}

impl RuleRegistry {
    /// Start building a registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registry without rules
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            index: HashMap::new(),
            categories: Vec::new(),
        }
    }

    /// Built-in and custom rules, filtered and adjusted by configuration
    pub fn builtin(config: &Config) -> Result<Self, ConfigurationError> {
        let mut builder = RegistryBuilder::new();

        for category in Category::ALL {
            if config.is_category_enabled(category) {
                builder.declare_category(category);
            }
        }

        let custom = config
            .rules
            .custom
            .iter()
            .cloned()
            .map(|def| def.into_rule())
            .collect::<Result<Vec<_>, _>>()?;

        let mut skipped = 0;
        for mut rule in builtin_rules(config)?.into_iter().chain(custom) {
            if !config.is_rule_enabled(&rule.key) || !config.is_category_enabled(rule.category) {
                skipped += 1;
                continue;
            }
            if let Some(severity) = config.get_severity_override(&rule.key) {
                rule.severity = severity;
            }
            builder.register(rule);
        }

        let registry = builder.build()?;
        log::debug!(
            "registry built: {} rule(s), {} skipped by configuration",
            registry.len(),
            skipped
        );
        Ok(registry)
    }

    /// Rules in registration order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Look up a rule by key
    pub fn get(&self, key: &str) -> Option<&Rule> {
        self.index.get(key).map(|&i| &self.rules[i])
    }

    /// Check if a rule key is registered
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Categories in first-registration order
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Position of a category in registry order
    pub fn category_rank(&self, category: Category) -> Option<usize> {
        self.categories.iter().position(|c| *c == category)
    }

    /// Rules grouped by category, in registry order
    pub fn by_category(&self) -> Vec<(Category, Vec<&Rule>)> {
        self.categories
            .iter()
            .map(|&category| {
                let rules = self.rules.iter().filter(|r| r.category == category).collect();
                (category, rules)
            })
            .collect()
    }
}
