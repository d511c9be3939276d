//! Finding deduplication and classification

use crate::finding::{finding_identity, ClassifiedFinding, RawFinding};
use crate::registry::RuleRegistry;
use std::cmp::Reverse;
use std::collections::HashMap;

/// Turns raw findings into the ordered, deduplicated report list
pub struct Classifier<'a> {
    registry: &'a RuleRegistry,
}

impl<'a> Classifier<'a> {
    /// Classifier reading severities and categories from a registry
    pub fn new(registry: &'a RuleRegistry) -> Self {
        Self { registry }
    }

    /// Resolve category and severity, collapse duplicates and sort
    pub fn classify(&self, raw: Vec<RawFinding>) -> Vec<ClassifiedFinding> {
        let resolved = raw
            .into_iter()
            .filter_map(|finding| self.resolve(finding))
            .collect();
        self.deduplicate(resolved)
    }

    /// Collapse findings sharing an identity and restore report order
    ///
    /// The first message wins; severity is the highest among collapsed
    /// entries. Running this on already classified findings changes nothing.
    pub fn deduplicate(&self, findings: Vec<ClassifiedFinding>) -> Vec<ClassifiedFinding> {
        let mut merged: Vec<ClassifiedFinding> = Vec::with_capacity(findings.len());
        let mut index: HashMap<String, usize> = HashMap::new();

        for finding in findings {
            if !self.registry.contains(&finding.rule_key) {
                log::warn!("dropping finding for unregistered rule '{}'", finding.rule_key);
                continue;
            }
            match index.get(&finding.id) {
                Some(&i) => {
                    let existing = &mut merged[i];
                    existing.severity = existing.severity.max(finding.severity);
                }
                None => {
                    index.insert(finding.id.clone(), merged.len());
                    merged.push(finding);
                }
            }
        }

        merged.sort_by_cached_key(|f| {
            (
                self.registry.category_rank(f.category).unwrap_or(usize::MAX),
                Reverse(f.severity),
                f.location(),
                f.rule_key.clone(),
                f.id.clone(),
            )
        });
        merged
    }

    fn resolve(&self, finding: RawFinding) -> Option<ClassifiedFinding> {
        let Some(rule) = self.registry.get(&finding.rule_key) else {
            log::warn!("dropping finding for unregistered rule '{}'", finding.rule_key);
            return None;
        };

        let anchors = finding.normalized_anchors();
        Some(ClassifiedFinding {
            id: finding_identity(&finding.rule_key, &anchors),
            category: rule.category,
            severity: finding.severity.unwrap_or(rule.severity),
            rule_key: finding.rule_key,
            message: finding.message,
            anchors,
            help: finding.help,
            kind: finding.kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{Anchor, Severity};
    use crate::model::{ElementId, SourceLocation, StructuralModel};
    use crate::rule::{Category, EvaluationError, Rule};
    use pretty_assertions::assert_eq;

    fn noop(_: &Rule, _: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
        Ok(Vec::new())
    }

    fn registry() -> RuleRegistry {
        RuleRegistry::builder()
            .with_rule(Rule::new("naming-rule", Category::Naming, Severity::Low, noop))
            .with_rule(Rule::new("a11y-rule", Category::Accessibility, Severity::High, noop))
            .with_rule(Rule::new("other-a11y", Category::Accessibility, Severity::Medium, noop))
            .build()
            .unwrap()
    }

    fn element(index: usize, line: usize) -> Anchor {
        Anchor::Element {
            id: ElementId(index),
            location: SourceLocation::new(line, 1),
        }
    }

    #[test]
    fn test_resolves_category_and_severity() {
        let registry = registry();
        let classified = Classifier::new(&registry).classify(vec![
            RawFinding::new("a11y-rule", "default", element(1, 1)),
            RawFinding::new("a11y-rule", "escalated", element(2, 2)).with_severity(Severity::Critical),
        ]);
        assert_eq!(classified[0].severity, Severity::Critical);
        assert_eq!(classified[1].severity, Severity::High);
        assert!(classified.iter().all(|f| f.category == Category::Accessibility));
    }

    #[test]
    fn test_duplicates_collapse() {
        let registry = registry();
        let classified = Classifier::new(&registry).classify(vec![
            RawFinding::new("a11y-rule", "first", element(1, 1)).with_anchor(element(2, 2)),
            RawFinding::new("a11y-rule", "second", element(2, 2))
                .with_anchor(element(1, 1))
                .with_severity(Severity::Critical),
            RawFinding::new("a11y-rule", "distinct", element(3, 3)),
        ]);
        assert_eq!(classified.len(), 2);
        assert_eq!(classified[0].message, "first");
        assert_eq!(classified[0].severity, Severity::Critical);
    }

    #[test]
    fn test_sort_order() {
        let registry = registry();
        let classified = Classifier::new(&registry).classify(vec![
            RawFinding::new("a11y-rule", "late", element(5, 9)),
            RawFinding::new("naming-rule", "naming", element(1, 1)),
            RawFinding::new("other-a11y", "medium", element(2, 1)),
            RawFinding::new("a11y-rule", "document", Anchor::Document),
            RawFinding::new("a11y-rule", "early", element(3, 2)),
        ]);
        let messages: Vec<_> = classified.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(messages, vec!["naming", "document", "early", "late", "medium"]);
    }

    #[test]
    fn test_unknown_rule_dropped() {
        let registry = registry();
        let classified = Classifier::new(&registry)
            .classify(vec![RawFinding::new("ghost", "x", Anchor::Document)]);
        assert!(classified.is_empty());
    }

    #[test]
    fn test_reclassify_is_noop() {
        let registry = registry();
        let classifier = Classifier::new(&registry);
        let once = classifier.classify(vec![
            RawFinding::new("naming-rule", "a", element(4, 4)),
            RawFinding::new("a11y-rule", "b", element(1, 1)),
            RawFinding::new("a11y-rule", "b again", element(1, 1)),
        ]);
        let twice = classifier.deduplicate(once.clone());
        assert_eq!(once, twice);
    }
}
