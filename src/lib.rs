//! Markup Audit - static audit engine for HTML/CSS
//!
//! Produces a categorized, severity-ranked review of one HTML document and its
//! style sheets, plus a deterministic score per category.
//!
//! # Architecture
//!
//! ```text
//! SourceText -> ModelBuilder -> StructuralModel -> Evaluator (RuleRegistry)
//!     -> RawFinding -> Classifier -> ClassifiedFinding -> ScoreAggregator -> ScoreCard
//! ```
//!
//! The model is immutable once built, so rules evaluate in parallel without
//! locking. A rule that fails or panics is reported as an info finding and the
//! remaining rules still run.
//!
//! # Example
//!
//! ```no_run
//! use markup_audit::{Auditor, Config, SourceText};
//!
//! let auditor = Auditor::new(Config::default()).unwrap();
//! let report = auditor
//!     .audit(
//!         SourceText::new("index.html", std::fs::read("index.html").unwrap()),
//!         vec![SourceText::new("styles.css", std::fs::read("styles.css").unwrap())],
//!     )
//!     .unwrap();
//!
//! for finding in &report.findings {
//!     println!("[{}] {}: {}", finding.severity, finding.rule_key, finding.message);
//! }
//! println!("overall {:.1}/10", report.score_card.overall());
//! ```
//!
//! # Custom rules
//!
//! Declarative rules can be added through configuration:
//!
//! ```yaml
//! rules:
//!   custom:
//!     - id: no-marquee
//!       category: semantics
//!       severity: high
//!       target: { name: marquee }
//!       condition: "true"
//!       message: "<{name}> is obsolete"
//! ```

pub mod classifier;
pub mod condition;
pub mod config;
pub mod engine;
pub mod finding;
pub mod model;
pub mod registry;
pub mod report;
pub mod rule;
pub mod rules;
pub mod score;

// Re-export main types
pub use classifier::Classifier;
pub use condition::{format_message, Condition, ConditionError};
pub use config::{Config, ConfigError};
pub use engine::{AuditError, Auditor, CancellationToken, Evaluation, Evaluator, RuleTiming};
pub use finding::{Anchor, ClassifiedFinding, FindingKind, RawFinding, Severity};
pub use model::{
    Element, ElementId, ModelBuilder, ParseError, SourceLocation, SourceText, StructuralModel,
    StyleRule, StyleRuleId,
};
pub use registry::{ConfigurationError, RegistryBuilder, RuleRegistry};
pub use report::AuditReport;
pub use rule::{Category, Check, EvaluationError, Rule, RuleDefinition, Target};
pub use score::{CategoryScore, ScoreAggregator, ScoreCard, SeverityCounts, SeverityWeights};
