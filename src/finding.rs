//! Findings produced by rule evaluation

use crate::model::{ElementId, SourceLocation, StructuralModel, StyleRuleId};
use crate::rule::Category;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Finding severity, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, no score impact by default
    Info,
    /// Minor issue, fix when convenient
    Low,
    /// Moderate issue, should fix
    #[default]
    Medium,
    /// Serious issue with user-visible impact
    High,
    /// Must fix; gates CI
    Critical,
}

impl Severity {
    /// All severities, most severe first
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    /// Lower-case name used in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Map from legacy linter severity names
    pub fn from_legacy(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "blocker" => Some(Severity::Critical),
            "error" => Some(Severity::High),
            "warning" | "warn" => Some(Severity::Medium),
            "hint" | "note" => Some(Severity::Info),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" => Ok(Severity::Info),
            other => Severity::from_legacy(other).ok_or_else(|| format!("unknown severity '{}'", s)),
        }
    }
}

/// What a finding points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Anchor {
    /// The document as a whole
    Document,
    Element {
        id: ElementId,
        location: SourceLocation,
    },
    StyleRule {
        id: StyleRuleId,
        location: SourceLocation,
    },
}

impl Anchor {
    /// Anchor at an element's start tag
    pub fn element(model: &StructuralModel, id: ElementId) -> Self {
        Anchor::Element {
            id,
            location: model.element(id).location,
        }
    }

    /// Anchor at a style rule's selector
    pub fn style_rule(model: &StructuralModel, id: StyleRuleId) -> Self {
        Anchor::StyleRule {
            id,
            location: model.style_rule(id).location,
        }
    }

    /// Source position, if the anchor has one
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            Anchor::Document => None,
            Anchor::Element { location, .. } | Anchor::StyleRule { location, .. } => {
                Some(*location)
            }
        }
    }

    fn identity_token(&self) -> String {
        match self {
            Anchor::Document => "document".to_string(),
            Anchor::Element { id, .. } => format!("element:{}", id.index()),
            Anchor::StyleRule { id, .. } => format!("style-rule:{}", id.index()),
        }
    }
}

/// Whether a finding reports an issue or a rule that could not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    #[default]
    Issue,
    EvaluationError,
}

/// A finding as emitted by a rule, before classification
#[derive(Debug, Clone, PartialEq)]
pub struct RawFinding {
    pub rule_key: String,
    /// One or more anchors
    pub anchors: Vec<Anchor>,
    pub message: String,
    /// Overrides the rule's registered severity when set
    pub severity: Option<Severity>,
    pub help: Option<String>,
    pub kind: FindingKind,
}

impl RawFinding {
    /// Finding for a rule with one anchor
    pub fn new(rule_key: &str, message: impl Into<String>, anchor: Anchor) -> Self {
        Self {
            rule_key: rule_key.to_string(),
            anchors: vec![anchor],
            message: message.into(),
            severity: None,
            help: None,
            kind: FindingKind::Issue,
        }
    }

    /// Add an anchor
    pub fn with_anchor(mut self, anchor: Anchor) -> Self {
        self.anchors.push(anchor);
        self
    }

    /// Add anchors
    pub fn with_anchors(mut self, anchors: impl IntoIterator<Item = Anchor>) -> Self {
        self.anchors.extend(anchors);
        self
    }

    /// Override the rule's severity for this finding
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Attach remediation help
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub(crate) fn with_kind(mut self, kind: FindingKind) -> Self {
        self.kind = kind;
        self
    }

    /// Anchors sorted and deduplicated
    pub(crate) fn normalized_anchors(&self) -> Vec<Anchor> {
        let mut anchors = self.anchors.clone();
        anchors.sort();
        anchors.dedup();
        if anchors.is_empty() {
            anchors.push(Anchor::Document);
        }
        anchors
    }
}

/// Stable identity of a (rule key, anchors) pair
pub fn finding_identity(rule_key: &str, anchors: &[Anchor]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rule_key.as_bytes());
    for anchor in anchors {
        hasher.update(b"|");
        hasher.update(anchor.identity_token().as_bytes());
    }
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// A deduplicated finding with resolved category and severity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedFinding {
    /// Hex SHA-256 prefix of rule key and anchors
    pub id: String,
    pub rule_key: String,
    pub category: Category,
    pub severity: Severity,
    pub message: String,
    /// Sorted, never empty
    pub anchors: Vec<Anchor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    pub kind: FindingKind,
}

impl ClassifiedFinding {
    /// Location of the first located anchor
    pub fn location(&self) -> Option<SourceLocation> {
        self.anchors.iter().find_map(Anchor::location)
    }

    /// Check if the finding reports a failed rule
    pub fn is_evaluation_error(&self) -> bool {
        self.kind == FindingKind::EvaluationError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(index: usize, line: usize) -> Anchor {
        Anchor::Element {
            id: ElementId(index),
            location: SourceLocation::new(line, 1),
        }
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Low > Severity::Info);
        assert_eq!(Severity::ALL[0], Severity::Critical);
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("critical".parse::<Severity>(), Ok(Severity::Critical));
        assert_eq!("HIGH".parse::<Severity>(), Ok(Severity::High));
        assert_eq!("error".parse::<Severity>(), Ok(Severity::High));
        assert_eq!("warning".parse::<Severity>(), Ok(Severity::Medium));
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Low.to_string(), "low");
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"critical\""
        );
    }

    #[test]
    fn test_identity_is_stable_and_distinct() {
        let a = finding_identity("missing-alt", &[element(3, 10)]);
        let b = finding_identity("missing-alt", &[element(3, 10)]);
        let c = finding_identity("missing-alt", &[element(4, 10)]);
        let d = finding_identity("link-without-text", &[element(3, 10)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_normalized_anchors() {
        let raw = RawFinding::new("bem-naming-check", "x", element(9, 4))
            .with_anchor(element(2, 1))
            .with_anchor(element(9, 4));
        assert_eq!(raw.normalized_anchors(), vec![element(2, 1), element(9, 4)]);

        let empty = RawFinding {
            anchors: Vec::new(),
            ..raw
        };
        assert_eq!(empty.normalized_anchors(), vec![Anchor::Document]);
    }

    #[test]
    fn test_anchor_location() {
        assert_eq!(Anchor::Document.location(), None);
        assert_eq!(element(1, 7).location(), Some(SourceLocation::new(7, 1)));
    }
}
