//! Interaction state rules

use super::{has_interactive_elements, targets_interactive, FOCUS_PSEUDO_CLASSES};
use crate::finding::{Anchor, RawFinding, Severity};
use crate::model::StructuralModel;
use crate::registry::ConfigurationError;
use crate::rule::{Category, EvaluationError, Rule, Target};

const HOVER_PSEUDO_CLASSES: &[&str] = &["hover"];

/// Focus and hover state rules
pub fn rules() -> Result<Vec<Rule>, ConfigurationError> {
    Ok(vec![
        Rule::new(
            "missing-focus-state",
            Category::Interactions,
            Severity::Critical,
            missing_focus_state,
        )
        .with_name("No focus style")
        .with_description("Style :focus or :focus-visible on links, buttons and controls so keyboard users can see where they are")
        .with_tag("wcag-2.4.7"),
        Rule::new(
            "outline-removed",
            Category::Interactions,
            Severity::High,
            outline_removed,
        )
        .with_name("Focus outline removed")
        .with_description("Replace a removed outline with another visible focus indicator")
        .with_tag("wcag-2.4.7"),
        Rule::new(
            "missing-hover-state",
            Category::Interactions,
            Severity::Low,
            missing_hover_state,
        )
        .with_name("No hover style")
        .with_description("Give interactive elements a :hover style as a pointer affordance"),
        Rule::condition(
            "clickable-non-interactive",
            Category::Interactions,
            Severity::Medium,
            Target::any(),
            "attributes.onclick && !(name =~ /^(a|button|input|select|textarea|summary|option|label)$/) && !attributes.role && !attributes.tabindex",
            "<{name}> has an onclick handler but cannot be reached by keyboard",
        )?
        .with_name("Click handler on non-interactive element")
        .with_description("Use a <button>, or add role and tabindex with keyboard handling")
        .with_tag("wcag-2.1.1"),
    ])
}

/// Check if any style rule styles an interactive element in one of the given states
fn has_state_rule(model: &StructuralModel, pseudo: &[&str]) -> bool {
    model.style_rules().any(|(_, rule)| {
        rule.selectors.iter().any(|selector| {
            selector.has_pseudo_class(pseudo) && targets_interactive(model, selector, pseudo)
        })
    })
}

fn missing_focus_state(
    rule: &Rule,
    model: &StructuralModel,
) -> Result<Vec<RawFinding>, EvaluationError> {
    if !has_interactive_elements(model) || has_state_rule(model, FOCUS_PSEUDO_CLASSES) {
        return Ok(Vec::new());
    }
    Ok(vec![rule.finding(
        "No style rule targets :focus, :focus-visible or :focus-within on an interactive element",
        Anchor::Document,
    )])
}

fn missing_hover_state(
    rule: &Rule,
    model: &StructuralModel,
) -> Result<Vec<RawFinding>, EvaluationError> {
    if !has_interactive_elements(model) || has_state_rule(model, HOVER_PSEUDO_CLASSES) {
        return Ok(Vec::new());
    }
    Ok(vec![rule.finding(
        "No style rule targets :hover on an interactive element",
        Anchor::Document,
    )])
}

fn removes_outline(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    matches!(value.as_str(), "none" | "0" | "0px")
}

fn outline_removed(rule: &Rule, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
    let mut findings = Vec::new();
    for (id, style) in model.style_rules() {
        let Some(declaration) = style.declared("outline") else {
            continue;
        };
        if !removes_outline(&declaration.value) {
            continue;
        }

        let targets_focus = style.selectors.iter().any(|selector| {
            selector.has_pseudo_class(FOCUS_PSEUDO_CLASSES)
                || targets_interactive(model, selector, FOCUS_PSEUDO_CLASSES)
        });
        if targets_focus {
            findings.push(rule.finding(
                format!(
                    "`{}` sets outline: {} on focusable elements",
                    style.selector, declaration.value
                ),
                Anchor::style_rule(model, id),
            ));
        }
    }
    Ok(findings)
}
