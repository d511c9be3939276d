//! Rule definition and evaluation

use crate::condition::{format_message, Condition};
use crate::finding::{Anchor, RawFinding, Severity};
use crate::model::StructuralModel;
use crate::registry::ConfigurationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Audit category, one score per category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Document outline and landmark structure
    Semantics,
    /// Alternative text, names, language
    Accessibility,
    /// Layout adapting to the viewport
    Responsiveness,
    /// Class naming conventions
    Naming,
    /// Form controls and labels
    Forms,
    /// Focus, hover and click affordances
    Interactions,
    /// Images and other referenced media
    Assets,
    /// How markup and styles are split into files
    FileStructure,
}

impl Category {
    /// Every category, in score card order
    pub const ALL: [Category; 8] = [
        Category::Semantics,
        Category::Accessibility,
        Category::Responsiveness,
        Category::Naming,
        Category::Forms,
        Category::Interactions,
        Category::Assets,
        Category::FileStructure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Semantics => "semantics",
            Category::Accessibility => "accessibility",
            Category::Responsiveness => "responsiveness",
            Category::Naming => "naming",
            Category::Forms => "forms",
            Category::Interactions => "interactions",
            Category::Assets => "assets",
            Category::FileStructure => "file-structure",
        }
    }

    /// Title-case name for report headings
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Semantics => "Semantics",
            Category::Accessibility => "Accessibility",
            Category::Responsiveness => "Responsiveness",
            Category::Naming => "Naming",
            Category::Forms => "Forms",
            Category::Interactions => "Interactions",
            Category::Assets => "Assets",
            Category::FileStructure => "File Structure",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "semantics" | "semantic" => Ok(Category::Semantics),
            "accessibility" | "a11y" => Ok(Category::Accessibility),
            "responsiveness" | "responsive" => Ok(Category::Responsiveness),
            "naming" => Ok(Category::Naming),
            "forms" | "form" => Ok(Category::Forms),
            "interactions" | "interaction" => Ok(Category::Interactions),
            "assets" => Ok(Category::Assets),
            "file-structure" | "structure" => Ok(Category::FileStructure),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// Rule-local evaluation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("rule '{rule}' failed: {message}")]
    Failed { rule: String, message: String },

    #[error("rule '{rule}' panicked: {message}")]
    Panicked { rule: String, message: String },
}

impl EvaluationError {
    /// Failure of a rule's check
    pub fn failed(rule: &Rule, message: impl Into<String>) -> Self {
        EvaluationError::Failed {
            rule: rule.key.clone(),
            message: message.into(),
        }
    }

    /// Key of the failing rule
    pub fn rule(&self) -> &str {
        match self {
            EvaluationError::Failed { rule, .. } | EvaluationError::Panicked { rule, .. } => rule,
        }
    }
}

/// The evaluation capability of a rule
///
/// Checks are stateless: they read the model and return findings.
pub trait Check: Send + Sync {
    fn evaluate(
        &self,
        rule: &Rule,
        model: &StructuralModel,
    ) -> Result<Vec<RawFinding>, EvaluationError>;
}

impl<F> Check for F
where
    F: Fn(&Rule, &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> + Send + Sync,
{
    fn evaluate(
        &self,
        rule: &Rule,
        model: &StructuralModel,
    ) -> Result<Vec<RawFinding>, EvaluationError> {
        self(rule, model)
    }
}

/// An audit rule
#[derive(Clone)]
pub struct Rule {
    /// Unique rule key (e.g., "missing-alt")
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    /// Registered severity, configuration overrides applied
    pub severity: Severity,
    pub category: Category,
    pub tags: Vec<String>,
    pub docs: Option<String>,
    check: Arc<dyn Check>,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("key", &self.key)
            .field("severity", &self.severity)
            .field("category", &self.category)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

impl Rule {
    /// Rule with a key, category, default severity and check
    pub fn new(key: &str, category: Category, severity: Severity, check: impl Check + 'static) -> Self {
        Self {
            key: key.to_string(),
            name: key.replace('-', " "),
            description: None,
            severity,
            category,
            tags: Vec::new(),
            docs: None,
            check: Arc::new(check),
        }
    }

    /// A declarative rule: `condition` is evaluated on every targeted element
    pub fn condition(
        key: &str,
        category: Category,
        severity: Severity,
        target: Target,
        condition: &str,
        message: &str,
    ) -> Result<Self, ConfigurationError> {
        let check = ConditionCheck::new(target, condition, message).map_err(|source| {
            ConfigurationError::InvalidCondition {
                rule: key.to_string(),
                source,
            }
        })?;
        Ok(Self::new(key, category, severity, check))
    }

    /// Set the display name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the description
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    /// Override the default severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    /// Link documentation
    pub fn with_docs(mut self, url: &str) -> Self {
        self.docs = Some(url.to_string());
        self
    }

    /// Check if the rule carries a tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Run the rule's check
    pub fn evaluate(&self, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
        self.check.evaluate(self, model)
    }

    /// A finding for this rule, help text taken from the description
    pub fn finding(&self, message: impl Into<String>, anchor: Anchor) -> RawFinding {
        let finding = RawFinding::new(&self.key, message, anchor);
        match &self.description {
            Some(help) => finding.with_help(help.clone()),
            None => finding,
        }
    }
}

/// Which elements a declarative rule applies to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Tag name pattern (e.g., "img", "h*"); all elements when absent
    #[serde(default)]
    pub name: Option<String>,

    /// Required parent tag
    #[serde(default)]
    pub parent: Option<String>,
}

impl Target {
    /// Target elements whose tag matches a name pattern
    pub fn tag(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            parent: None,
        }
    }

    /// Target every element
    pub fn any() -> Self {
        Self::default()
    }
}

/// Compiled form of a [`Target`]
#[derive(Debug)]
struct TargetMatcher {
    name: Option<Regex>,
    parent: Option<String>,
}

impl TargetMatcher {
    fn new(target: &Target) -> Result<Self, crate::condition::ConditionError> {
        let name = match &target.name {
            Some(pattern) => {
                let escaped = regex::escape(&pattern.to_ascii_lowercase())
                    .replace(r"\*", ".*")
                    .replace(r"\?", ".");
                let source = format!("^{}$", escaped);
                Some(Regex::new(&source).map_err(|source_err| {
                    crate::condition::ConditionError::InvalidRegex {
                        pattern: source,
                        source: source_err,
                    }
                })?)
            }
            None => None,
        };

        Ok(Self {
            name,
            parent: target.parent.as_ref().map(|p| p.to_ascii_lowercase()),
        })
    }

    fn matches(&self, model: &StructuralModel, id: crate::model::ElementId) -> bool {
        let element = model.element(id);
        if let Some(re) = &self.name {
            if !re.is_match(&element.tag) {
                return false;
            }
        }

        if let Some(parent_name) = &self.parent {
            return model
                .parent(id)
                .is_some_and(|p| p != model.root() && &model.element(p).tag == parent_name);
        }

        true
    }
}

/// Evaluates a condition expression on every targeted element
#[derive(Debug)]
struct ConditionCheck {
    target: TargetMatcher,
    condition: Condition,
    message: String,
}

impl ConditionCheck {
    fn new(
        target: Target,
        condition: &str,
        message: &str,
    ) -> Result<Self, crate::condition::ConditionError> {
        Ok(Self {
            target: TargetMatcher::new(&target)?,
            condition: Condition::parse(condition)?,
            message: message.to_string(),
        })
    }
}

impl Check for ConditionCheck {
    fn evaluate(
        &self,
        rule: &Rule,
        model: &StructuralModel,
    ) -> Result<Vec<RawFinding>, EvaluationError> {
        Ok(model
            .elements()
            .filter(|(id, _)| self.target.matches(model, *id))
            .filter(|(id, _)| self.condition.evaluate(model, *id))
            .map(|(id, _)| {
                rule.finding(
                    format_message(&self.message, model, id),
                    Anchor::element(model, id),
                )
            })
            .collect())
    }
}

/// A declarative rule as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Unique rule key
    #[serde(alias = "key")]
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub severity: Severity,

    pub category: Category,

    #[serde(default)]
    pub target: Target,

    /// Condition expression that triggers the rule
    pub condition: String,

    /// Message template (`{name}`, `{text}`, `{attributes.X}`)
    pub message: String,

    #[serde(default)]
    pub docs: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl RuleDefinition {
    /// Compile the definition into a rule
    pub fn into_rule(self) -> Result<Rule, ConfigurationError> {
        let mut rule = Rule::condition(
            &self.id,
            self.category,
            self.severity,
            self.target,
            &self.condition,
            &self.message,
        )?;
        if let Some(name) = &self.name {
            rule = rule.with_name(name);
        }
        if let Some(desc) = &self.description {
            rule = rule.with_description(desc);
        }
        if let Some(docs) = &self.docs {
            rule = rule.with_docs(docs);
        }
        for tag in &self.tags {
            rule = rule.with_tag(tag);
        }
        Ok(rule.with_tag("custom"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelBuilder, SourceText};

    fn model(markup: &str) -> StructuralModel {
        ModelBuilder::new(SourceText::new("index.html", markup))
            .build()
            .unwrap()
    }

    fn no_findings(_: &Rule, _: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
        Ok(Vec::new())
    }

    #[test]
    fn test_category_parse_and_display() {
        assert_eq!("file-structure".parse::<Category>(), Ok(Category::FileStructure));
        assert_eq!("File_Structure".parse::<Category>(), Ok(Category::FileStructure));
        assert_eq!("a11y".parse::<Category>(), Ok(Category::Accessibility));
        assert!("layout".parse::<Category>().is_err());
        assert_eq!(Category::FileStructure.to_string(), "file-structure");
        assert_eq!(Category::FileStructure.display_name(), "File Structure");
    }

    #[test]
    fn test_rule_builder() {
        let rule = Rule::new(
            "always-clean",
            Category::Semantics,
            Severity::Low,
            no_findings,
        )
        .with_name("Always clean")
        .with_description("Never reports")
        .with_tag("test");

        assert_eq!(rule.key, "always-clean");
        assert_eq!(rule.name, "Always clean");
        assert!(rule.has_tag("test"));
        assert!(!rule.has_tag("other"));
        assert!(format!("{:?}", rule).contains("always-clean"));
    }

    #[test]
    fn test_condition_rule_targets_tags() {
        let rule = Rule::condition(
            "heading-with-id",
            Category::Semantics,
            Severity::Info,
            Target::tag("h*"),
            "attributes.id",
            "<{name}> has id '{attributes.id}'",
        )
        .unwrap();

        let m = model(r#"<h1 id="top">A</h1><h2>B</h2><p id="sep">x</p><h3 id="c">C</h3>"#);
        let findings = rule.evaluate(&m).unwrap();
        let messages: Vec<_> = findings.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(messages, vec!["<h1> has id 'top'", "<h3> has id 'c'"]);
    }

    #[test]
    fn test_target_parent() {
        let rule = Rule::condition(
            "list-item-link",
            Category::Semantics,
            Severity::Info,
            Target {
                name: Some("a".to_string()),
                parent: Some("li".to_string()),
            },
            "true",
            "link in list",
        )
        .unwrap();

        let m = model(r#"<ul><li><a href="/">x</a></li></ul><a href="/">y</a>"#);
        assert_eq!(rule.evaluate(&m).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_condition_is_configuration_error() {
        let err = Rule::condition(
            "broken",
            Category::Assets,
            Severity::Low,
            Target::any(),
            "attributes.src =~ /[/",
            "x",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidCondition { ref rule, .. } if rule == "broken"));
    }

    #[test]
    fn test_rule_definition_from_yaml() {
        let yaml = r#"
id: no-marquee
severity: high
category: semantics
target:
  name: marquee
condition: "true"
message: "<{name}> is obsolete"
tags: [legacy]
"#;
        let def: RuleDefinition = serde_yaml::from_str(yaml).unwrap();
        let rule = def.into_rule().unwrap();
        assert_eq!(rule.severity, Severity::High);
        assert!(rule.has_tag("legacy"));
        assert!(rule.has_tag("custom"));

        let m = model("<marquee>hi</marquee>");
        let findings = rule.evaluate(&m).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "<marquee> is obsolete");
    }

    #[test]
    fn test_finding_carries_help() {
        let rule = Rule::new(
            "r",
            Category::Assets,
            Severity::Low,
            no_findings,
        )
        .with_description("Explain");
        let finding = rule.finding("msg", Anchor::Document);
        assert_eq!(finding.help.as_deref(), Some("Explain"));
        assert_eq!(finding.rule_key, "r");
    }
}
