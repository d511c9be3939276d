//! Responsive layout rules

use crate::finding::{Anchor, RawFinding, Severity};
use crate::model::StructuralModel;
use crate::rule::{Category, EvaluationError, Rule};
use regex::Regex;
use std::sync::LazyLock;

/// Widths above this many pixels break small viewports
const FIXED_WIDTH_LIMIT: f64 = 600.0;

static PX_LENGTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)px\s*$").unwrap());

/// Viewport and layout rules
pub fn rules() -> Vec<Rule> {
    vec![
        Rule::new(
            "no-media-query",
            Category::Responsiveness,
            Severity::Critical,
            no_media_query,
        )
        .with_name("No width media query")
        .with_description("Add @media or @container rules conditioned on width so the layout adapts to small screens")
        .with_tag("layout"),
        Rule::new(
            "missing-viewport-meta",
            Category::Responsiveness,
            Severity::High,
            missing_viewport_meta,
        )
        .with_name("Missing viewport meta")
        .with_description("Add <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">")
        .with_tag("mobile"),
        Rule::new(
            "fixed-width-layout",
            Category::Responsiveness,
            Severity::Medium,
            fixed_width_layout,
        )
        .with_name("Fixed-width layout")
        .with_description("Prefer max-width or relative units over large pixel widths")
        .with_tag("layout"),
        Rule::new(
            "box-sizing-scope",
            Category::Responsiveness,
            Severity::Medium,
            box_sizing_scope,
        )
        .with_name("Narrow box-sizing reset")
        .with_description("Apply box-sizing: border-box globally (*, *::before, *::after) instead of per component")
        .with_tag("layout"),
    ]
}

fn no_media_query(rule: &Rule, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
    if model.conditional_blocks().iter().any(|b| b.is_width_query()) {
        return Ok(Vec::new());
    }
    Ok(vec![rule.finding(
        "No style sheet contains a width-based @media or @container rule",
        Anchor::Document,
    )])
}

fn missing_viewport_meta(
    rule: &Rule,
    model: &StructuralModel,
) -> Result<Vec<RawFinding>, EvaluationError> {
    let has_viewport = model.elements_by_tag("meta").any(|(_, e)| {
        e.get("name")
            .is_some_and(|n| n.trim().eq_ignore_ascii_case("viewport"))
    });
    if has_viewport {
        return Ok(Vec::new());
    }
    Ok(vec![rule.finding(
        "Document has no <meta name=\"viewport\">",
        Anchor::Document,
    )])
}

fn px_value(value: &str) -> Option<f64> {
    PX_LENGTH
        .captures(value)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn fixed_width_layout(
    rule: &Rule,
    model: &StructuralModel,
) -> Result<Vec<RawFinding>, EvaluationError> {
    let mut findings = Vec::new();
    for (id, style) in model.style_rules().filter(|(_, r)| !r.is_conditional()) {
        for property in ["width", "min-width"] {
            let Some(declaration) = style.declared(property) else {
                continue;
            };
            match px_value(&declaration.value) {
                Some(px) if px > FIXED_WIDTH_LIMIT => findings.push(rule.finding(
                    format!(
                        "`{}` sets {}: {} outside any media query",
                        style.selector, property, declaration.value
                    ),
                    Anchor::style_rule(model, id),
                )),
                _ => {}
            }
        }
    }
    Ok(findings)
}

fn box_sizing_scope(rule: &Rule, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
    let declaring: Vec<_> = model
        .style_rules()
        .filter(|(_, r)| {
            r.declared("box-sizing")
                .is_some_and(|d| d.value.trim().eq_ignore_ascii_case("border-box"))
        })
        .collect();

    let global = declaring
        .iter()
        .any(|(_, r)| r.selectors.iter().any(|s| s.is_universal()));
    if global {
        return Ok(Vec::new());
    }

    let mut anchors = declaring.iter().map(|(id, _)| Anchor::style_rule(model, *id));
    let Some(first) = anchors.next() else {
        return Ok(Vec::new());
    };
    Ok(vec![rule
        .finding(
            format!(
                "box-sizing: border-box is declared on {} selector(s) but never universally",
                declaring.len()
            ),
            first,
        )
        .with_anchors(anchors)])
}
