//! Core audit engine
//!
//! [`Evaluator`] runs every registered rule against one model, isolating rule
//! failures. [`Auditor`] drives the full pipeline: build, evaluate, filter
//! suppressions, classify, score.

use crate::classifier::Classifier;
use crate::config::Config;
use crate::finding::{Anchor, FindingKind, RawFinding, Severity};
use crate::model::{ModelBuilder, ParseError, SourceText, StructuralModel};
use crate::registry::{ConfigurationError, RuleRegistry};
use crate::report::AuditReport;
use crate::rule::{EvaluationError, Rule};
use crate::score::ScoreAggregator;
use rayon::prelude::*;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error aborting an audit run
#[derive(Debug, Error)]
pub enum AuditError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("audit cancelled")]
    Cancelled,
}

/// Per-rule timing statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleTiming {
    pub rule_key: String,
    /// Time spent evaluating the rule
    pub total_time: Duration,
    /// Number of findings the rule produced
    pub finding_count: usize,
}

impl RuleTiming {
    /// Empty timing for a rule
    pub fn new(rule_key: &str) -> Self {
        Self {
            rule_key: rule_key.to_string(),
            ..Default::default()
        }
    }
}

/// Cooperative cancellation flag, checked between pipeline phases
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every audit sharing this token
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), AuditError> {
        if self.is_cancelled() {
            return Err(AuditError::Cancelled);
        }
        Ok(())
    }
}

/// Output of one evaluation pass
#[derive(Debug, Default)]
pub struct Evaluation {
    /// Findings of every rule, in registry order
    pub findings: Vec<RawFinding>,
    /// Timings in registry order
    pub timings: Vec<RuleTiming>,
    /// Keys of rules that failed or panicked
    pub failed_rules: Vec<String>,
}

impl Evaluation {
    /// Timings sorted by total time, slowest first
    pub fn sorted_timings(&self) -> Vec<RuleTiming> {
        let mut timings = self.timings.clone();
        timings.sort_by(|a, b| {
            b.total_time
                .cmp(&a.total_time)
                .then_with(|| a.rule_key.cmp(&b.rule_key))
        });
        timings
    }
}

/// Runs registered rules against a model
///
/// The worker pool is built on first parallel use and reused by every later
/// evaluation (and by clones made after that).
#[derive(Debug, Clone)]
pub struct Evaluator {
    parallel: bool,
    jobs: usize,
    /// `None` once building failed: evaluate sequentially
    pool: OnceLock<Option<Arc<rayon::ThreadPool>>>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            parallel: true,
            jobs: 0,
            pool: OnceLock::new(),
        }
    }
}

impl Evaluator {
    /// Parallel evaluation on one thread per CPU
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluator honoring the `engine` section of a config
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_parallel(config.engine.parallel)
            .with_jobs(config.engine.jobs)
    }

    /// Turn parallel evaluation on or off
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the worker count (0 means one per CPU)
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self.pool = OnceLock::new();
        self
    }

    /// Evaluate every rule exactly once
    pub fn evaluate(&self, model: &StructuralModel, registry: &RuleRegistry) -> Evaluation {
        let rules = registry.rules();
        let outcomes: Vec<RuleOutcome> = if self.parallel && rules.len() > 1 {
            match self.thread_pool() {
                Some(pool) => pool.install(|| {
                    rules
                        .par_iter()
                        .map(|rule| evaluate_rule(rule, model))
                        .collect()
                }),
                None => rules.iter().map(|rule| evaluate_rule(rule, model)).collect(),
            }
        } else {
            rules.iter().map(|rule| evaluate_rule(rule, model)).collect()
        };

        let mut evaluation = Evaluation::default();
        for outcome in outcomes {
            if outcome.failed {
                evaluation.failed_rules.push(outcome.timing.rule_key.clone());
            }
            evaluation.findings.extend(outcome.findings);
            evaluation.timings.push(outcome.timing);
        }
        evaluation
    }

    fn thread_pool(&self) -> Option<&rayon::ThreadPool> {
        self.pool
            .get_or_init(|| {
                let threads = if self.jobs > 0 {
                    self.jobs
                } else {
                    num_cpus::get()
                };
                match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                    Ok(pool) => {
                        log::debug!("built evaluation pool with {} thread(s)", threads);
                        Some(Arc::new(pool))
                    }
                    Err(e) => {
                        log::warn!("failed to build thread pool, evaluating sequentially: {}", e);
                        None
                    }
                }
            })
            .as_deref()
    }
}

struct RuleOutcome {
    findings: Vec<RawFinding>,
    timing: RuleTiming,
    failed: bool,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn evaluate_rule(rule: &Rule, model: &StructuralModel) -> RuleOutcome {
    let start = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| rule.evaluate(model))).unwrap_or_else(
        |payload| {
            Err(EvaluationError::Panicked {
                rule: rule.key.clone(),
                message: panic_message(payload.as_ref()),
            })
        },
    );

    let mut timing = RuleTiming::new(&rule.key);
    timing.total_time = start.elapsed();

    match result {
        Ok(findings) => {
            timing.finding_count = findings.len();
            log::debug!(
                "rule {} produced {} finding(s) in {:?}",
                rule.key,
                findings.len(),
                timing.total_time
            );
            RuleOutcome {
                findings,
                timing,
                failed: false,
            }
        }
        Err(err) => {
            log::warn!("{}", err);
            let finding = RawFinding::new(
                &rule.key,
                format!("Rule could not be evaluated: {}", err),
                Anchor::Document,
            )
            .with_severity(Severity::Info)
            .with_kind(FindingKind::EvaluationError);
            timing.finding_count = 1;
            RuleOutcome {
                findings: vec![finding],
                timing,
                failed: true,
            }
        }
    }
}

/// Runs complete audits with one registry and configuration
#[derive(Debug)]
pub struct Auditor {
    config: Config,
    registry: RuleRegistry,
    evaluator: Evaluator,
    aggregator: ScoreAggregator,
}

impl Auditor {
    /// Auditor with the built-in rules selected by `config`
    pub fn new(config: Config) -> Result<Self, ConfigurationError> {
        let registry = RuleRegistry::builtin(&config)?;
        Ok(Self::with_registry(config, registry))
    }

    /// Auditor with a caller-assembled registry
    pub fn with_registry(config: Config, registry: RuleRegistry) -> Self {
        let evaluator = Evaluator::from_config(&config);
        let aggregator = ScoreAggregator::new(registry.categories().to_vec(), &config.scoring);
        Self {
            config,
            registry,
            evaluator,
            aggregator,
        }
    }

    /// Configuration the auditor was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Rules run by every audit
    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Audit one markup document and its style sheets
    pub fn audit(
        &self,
        markup: SourceText,
        style_sheets: Vec<SourceText>,
    ) -> Result<AuditReport, AuditError> {
        self.audit_with_cancellation(markup, style_sheets, &CancellationToken::new())
    }

    /// Audit one document, stopping between phases once `token` is cancelled
    pub fn audit_with_cancellation(
        &self,
        markup: SourceText,
        style_sheets: Vec<SourceText>,
        token: &CancellationToken,
    ) -> Result<AuditReport, AuditError> {
        token.check()?;
        let start = Instant::now();
        let mut builder = ModelBuilder::new(markup);
        for sheet in style_sheets {
            builder.add_style_sheet(sheet);
        }
        let model = builder.build()?;
        log::debug!(
            "built model for {}: {} element(s), {} style rule(s) in {:?}",
            model.path(),
            model.element_count(),
            model.style_rules().count(),
            start.elapsed()
        );

        self.audit_model(&model, token)
    }

    /// Audit an already built model
    pub fn audit_model(
        &self,
        model: &StructuralModel,
        token: &CancellationToken,
    ) -> Result<AuditReport, AuditError> {
        token.check()?;
        let start = Instant::now();
        let evaluation = self.evaluator.evaluate(model, &self.registry);
        log::debug!(
            "evaluated {} rule(s) on {} in {:?}, {} failed",
            self.registry.len(),
            model.path(),
            start.elapsed(),
            evaluation.failed_rules.len()
        );

        token.check()?;
        let timings = evaluation.sorted_timings();
        let (kept, suppressed): (Vec<_>, Vec<_>) = evaluation
            .findings
            .into_iter()
            .partition(|f| !self.is_suppressed(model, &f.rule_key));
        if !suppressed.is_empty() {
            log::debug!("{} finding(s) suppressed in {}", suppressed.len(), model.path());
        }

        let findings = Classifier::new(&self.registry).classify(kept);

        token.check()?;
        let score_card = self.aggregator.score(&findings);

        Ok(AuditReport {
            path: model.path().to_string(),
            findings,
            score_card,
            suppressed: suppressed.len(),
            timings,
        })
    }

    fn is_suppressed(&self, model: &StructuralModel, rule_key: &str) -> bool {
        model.is_rule_suppressed(rule_key)
            || self.config.should_ignore_rule_for_file(rule_key, model.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Category;
    use pretty_assertions::assert_eq;

    fn model(markup: &str) -> StructuralModel {
        ModelBuilder::new(SourceText::new("index.html", markup))
            .build()
            .unwrap()
    }

    fn one_per_image(rule: &Rule, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
        Ok(model
            .elements_by_tag("img")
            .map(|(id, _)| rule.finding("image", Anchor::element(model, id)))
            .collect())
    }

    fn failing(rule: &Rule, _: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
        Err(EvaluationError::failed(rule, "selector engine unavailable"))
    }

    fn panicking(_: &Rule, _: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
        panic!("index out of bounds")
    }

    fn registry() -> RuleRegistry {
        RuleRegistry::builder()
            .with_rule(Rule::new("images", Category::Assets, Severity::Low, one_per_image))
            .with_rule(Rule::new("failing", Category::Forms, Severity::High, failing))
            .with_rule(Rule::new("panicking", Category::Naming, Severity::Critical, panicking))
            .build()
            .unwrap()
    }

    #[test]
    fn test_failures_are_isolated() {
        let m = model("<img><img>");
        for evaluator in [Evaluator::new(), Evaluator::new().with_parallel(false)] {
            let evaluation = evaluator.evaluate(&m, &registry());
            assert_eq!(evaluation.failed_rules, vec!["failing", "panicking"]);
            assert_eq!(evaluation.findings.len(), 4);

            let errors: Vec<_> = evaluation
                .findings
                .iter()
                .filter(|f| f.kind == FindingKind::EvaluationError)
                .collect();
            assert_eq!(errors.len(), 2);
            assert!(errors.iter().all(|f| f.severity == Some(Severity::Info)));
            assert!(errors[1].message.contains("index out of bounds"));
        }
    }

    #[test]
    fn test_timings_cover_every_rule() {
        let evaluation = Evaluator::new().with_jobs(2).evaluate(&model("<img>"), &registry());
        let keys: Vec<_> = evaluation.timings.iter().map(|t| t.rule_key.as_str()).collect();
        assert_eq!(keys, vec!["images", "failing", "panicking"]);
        assert_eq!(evaluation.timings[0].finding_count, 1);
        assert_eq!(evaluation.sorted_timings().len(), 3);
    }

    #[test]
    fn test_thread_pool_is_reused() {
        let evaluator = Evaluator::new().with_jobs(2);
        let m = model("<img>");

        evaluator.evaluate(&m, &registry());
        let first: *const rayon::ThreadPool = evaluator.thread_pool().unwrap();
        evaluator.evaluate(&m, &registry());
        assert!(std::ptr::eq(first, evaluator.thread_pool().unwrap()));
        assert_eq!(evaluator.thread_pool().unwrap().current_num_threads(), 2);
    }

    #[test]
    fn test_audit_model_with_cancelled_token() {
        let auditor = Auditor::new(Config::default()).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let result = auditor.audit_model(&model("<main><h1>T</h1><img></main>"), &token);
        assert!(matches!(result, Err(AuditError::Cancelled)));
    }

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(AuditError::Cancelled)));
    }

    #[test]
    fn test_cancelled_audit_returns_no_report() {
        let auditor = Auditor::new(Config::default()).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let result = auditor.audit_with_cancellation(
            SourceText::new("index.html", "<p>x</p>"),
            Vec::new(),
            &token,
        );
        assert!(matches!(result, Err(AuditError::Cancelled)));
    }

    #[test]
    fn test_parse_error_aborts_audit() {
        let auditor = Auditor::new(Config::default()).unwrap();
        let result = auditor.audit(SourceText::new("index.html", "<div></span>"), Vec::new());
        assert!(matches!(result, Err(AuditError::Parse(_))));
    }

    #[test]
    fn test_suppression_counts() {
        let auditor = Auditor::new(Config::default()).unwrap();
        let markup = "<!-- audit-disable missing-alt --><main><h1>T</h1><img><img></main>";
        let report = auditor.audit(SourceText::new("index.html", markup), Vec::new()).unwrap();
        assert!(report.findings.iter().all(|f| f.rule_key != "missing-alt"));
        assert_eq!(report.suppressed, 2);
    }

    #[test]
    fn test_per_file_ignores() {
        let mut config = Config::default();
        config
            .rules
            .per_file
            .insert("legacy/**".to_string(), vec!["all".to_string()]);
        let auditor = Auditor::new(config).unwrap();

        let legacy = auditor
            .audit(SourceText::new("legacy/old.html", "<img>"), Vec::new())
            .unwrap();
        assert!(legacy.findings.is_empty());
        assert_eq!(legacy.score_card.overall(), 10.0);

        let current = auditor
            .audit(SourceText::new("site/index.html", "<img>"), Vec::new())
            .unwrap();
        assert!(!current.findings.is_empty());
    }
}
