//! Audit report handed to renderers

use crate::engine::RuleTiming;
use crate::finding::ClassifiedFinding;
use crate::rule::Category;
use crate::score::ScoreCard;
use serde::Serialize;

/// Result of auditing one document
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    /// Logical path of the audited markup
    pub path: String,
    /// Findings in report order
    pub findings: Vec<ClassifiedFinding>,
    pub score_card: ScoreCard,
    /// Findings removed by inline or per-file suppression
    pub suppressed: usize,
    /// Per-rule timings, slowest first
    pub timings: Vec<RuleTiming>,
}

impl AuditReport {
    /// Findings grouped by category, in score card order
    ///
    /// Every scored category appears, even without findings.
    pub fn by_category(&self) -> Vec<(Category, Vec<&ClassifiedFinding>)> {
        self.score_card
            .categories()
            .iter()
            .map(|score| {
                let findings = self
                    .findings
                    .iter()
                    .filter(|f| f.category == score.category)
                    .collect();
                (score.category, findings)
            })
            .collect()
    }

    /// Findings for one rule
    pub fn findings_for<'a>(&'a self, rule_key: &'a str) -> impl Iterator<Item = &'a ClassifiedFinding> + 'a {
        self.findings.iter().filter(move |f| f.rule_key == rule_key)
    }

    /// Check if any finding is critical
    pub fn has_critical(&self) -> bool {
        self.score_card.has_critical()
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::engine::Auditor;
    use crate::model::SourceText;
    use crate::rule::Category;

    #[test]
    fn test_by_category_lists_every_category() {
        let auditor = Auditor::new(Config::default()).unwrap();
        let report = auditor
            .audit(SourceText::new("index.html", "<img src=\"a.png\">"), Vec::new())
            .unwrap();

        let groups = report.by_category();
        assert_eq!(groups.len(), Category::ALL.len());
        let (category, findings) = &groups[1];
        assert_eq!(*category, Category::Accessibility);
        assert!(findings.iter().any(|f| f.rule_key == "missing-alt"));
        assert_eq!(report.findings_for("missing-alt").count(), 1);
    }

    #[test]
    fn test_json_output() {
        let auditor = Auditor::new(Config::default()).unwrap();
        let report = auditor
            .audit(SourceText::new("index.html", "<p>x</p>"), Vec::new())
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["path"], "index.html");
        assert!(json["findings"].as_array().is_some_and(|f| !f.is_empty()));
        assert!(json["score_card"]["overall"].is_number());
        assert!(report.has_critical());
    }
}
