//! Score aggregation
//!
//! Each category starts at 10 and loses points in proportion to the
//! weighted severity of its findings:
//!
//! ```text
//! score = 10 * (1 - min(1, deductions / normalization))
//! ```
//!
//! The overall score is the weighted mean of the category scores.

use crate::config::ScoringConfig;
use crate::finding::{ClassifiedFinding, Severity};
use crate::rule::Category;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Score of a category without findings
pub const MAX_SCORE: f64 = 10.0;

/// Deduction per finding, by severity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
    pub info: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            critical: 4.0,
            high: 2.0,
            medium: 1.0,
            low: 0.5,
            info: 0.0,
        }
    }
}

impl SeverityWeights {
    /// Penalty for one finding of a severity
    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }
}

/// Finding counts by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeverityCounts {
    /// Count for one severity
    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }

    fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Info => self.info += 1,
        }
    }

    /// Count over all severities
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.info
    }
}

/// Score of one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryScore {
    pub category: Category,
    /// In [0, 10], one decimal place
    pub score: f64,
    /// Sum of severity weights over the category's findings
    pub deductions: f64,
    pub findings: usize,
    /// Weight in the overall mean
    pub weight: f64,
}

/// Per-category and overall scores of one audit run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreCard {
    categories: Vec<CategoryScore>,
    overall: f64,
    counts: SeverityCounts,
}

impl ScoreCard {
    /// Category scores in registry order
    pub fn categories(&self) -> &[CategoryScore] {
        &self.categories
    }

    /// Score entry for a category
    pub fn category(&self, category: Category) -> Option<&CategoryScore> {
        self.categories.iter().find(|c| c.category == category)
    }

    /// Score for a category
    pub fn score(&self, category: Category) -> Option<f64> {
        self.category(category).map(|c| c.score)
    }

    /// Weighted mean of the category scores
    pub fn overall(&self) -> f64 {
        self.overall
    }

    /// Finding counts over every category
    pub fn counts(&self) -> &SeverityCounts {
        &self.counts
    }

    /// Whether any critical finding was reported (CI gate)
    pub fn has_critical(&self) -> bool {
        self.counts.critical > 0
    }
}

/// Computes a [`ScoreCard`] from classified findings
#[derive(Debug, Clone)]
pub struct ScoreAggregator {
    categories: Vec<Category>,
    weights: SeverityWeights,
    default_normalization: f64,
    normalization: BTreeMap<Category, f64>,
    category_weights: BTreeMap<Category, f64>,
}

impl ScoreAggregator {
    /// `categories` are scored in the given order
    pub fn new(categories: Vec<Category>, config: &ScoringConfig) -> Self {
        Self {
            categories,
            weights: config.weights,
            default_normalization: config.normalization.default,
            normalization: config.normalization.categories.clone(),
            category_weights: config.category_weights.clone(),
        }
    }

    /// Score classified findings
    pub fn score(&self, findings: &[ClassifiedFinding]) -> ScoreCard {
        let mut counts = SeverityCounts::default();
        let mut deductions: BTreeMap<Category, (f64, usize)> = BTreeMap::new();

        for finding in findings {
            counts.add(finding.severity);
            let entry = deductions.entry(finding.category).or_insert((0.0, 0));
            entry.0 += self.weights.weight(finding.severity).max(0.0);
            entry.1 += 1;
        }

        let categories: Vec<CategoryScore> = self
            .categories
            .iter()
            .map(|&category| {
                let (deducted, count) = deductions.get(&category).copied().unwrap_or((0.0, 0));
                let normalization = self
                    .normalization
                    .get(&category)
                    .copied()
                    .unwrap_or(self.default_normalization);
                CategoryScore {
                    category,
                    score: category_score(deducted, normalization),
                    deductions: deducted,
                    findings: count,
                    weight: self.category_weights.get(&category).copied().unwrap_or(1.0),
                }
            })
            .collect();

        let overall = overall_score(&categories);
        log::debug!(
            "scored {} finding(s) across {} categories: overall {:.1}",
            findings.len(),
            categories.len(),
            overall
        );

        ScoreCard {
            categories,
            overall,
            counts,
        }
    }
}

fn category_score(deductions: f64, normalization: f64) -> f64 {
    let ratio = if normalization > 0.0 {
        (deductions / normalization).min(1.0)
    } else if deductions > 0.0 {
        1.0
    } else {
        0.0
    };
    round_half_up((MAX_SCORE * (1.0 - ratio)).clamp(0.0, MAX_SCORE))
}

fn overall_score(categories: &[CategoryScore]) -> f64 {
    let (sum, total_weight) = categories
        .iter()
        .filter(|c| c.weight > 0.0)
        .fold((0.0, 0.0), |(sum, weight), c| {
            (sum + c.score * c.weight, weight + c.weight)
        });

    if total_weight <= 0.0 {
        return MAX_SCORE;
    }
    round_half_up((sum / total_weight).clamp(0.0, MAX_SCORE))
}

/// Round to one decimal place, halves away from zero
pub fn round_half_up(value: f64) -> f64 {
    // Clear binary noise first so 7.15 rounds like the decimal it represents
    let scaled = (value * 10.0 * 1e6).round() / 1e6;
    (scaled + 0.5).floor() / 10.0
}
