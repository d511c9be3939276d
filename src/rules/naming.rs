//! Class naming rules

use crate::finding::{Anchor, RawFinding, Severity};
use crate::model::{ElementId, StructuralModel};
use crate::rule::{Category, EvaluationError, Rule};
use std::collections::BTreeMap;

/// Class naming rules
pub fn rules() -> Vec<Rule> {
    vec![
        Rule::new("bem-naming-check", Category::Naming, Severity::Low, bem_naming_check)
            .with_name("Inconsistent BEM block")
            .with_description("Elements of one component should share a single block name; pick singular or plural and use it everywhere")
            .with_tag("bem"),
        Rule::new("class-naming-case", Category::Naming, Severity::Low, class_naming_case)
            .with_name("Upper-case class name")
            .with_description("Use lower-case, hyphen-separated class names")
            .with_tag("conventions"),
    ]
}

/// Class tokens mapped to the elements carrying them
fn class_usage(model: &StructuralModel) -> (Vec<&str>, BTreeMap<&str, Vec<ElementId>>) {
    let mut order = Vec::new();
    let mut usage: BTreeMap<&str, Vec<ElementId>> = BTreeMap::new();
    for (id, _) in model.elements() {
        for class in model.classes(id) {
            let entry = usage.entry(class.as_str()).or_default();
            if entry.is_empty() {
                order.push(class.as_str());
            }
            entry.push(id);
        }
    }
    (order, usage)
}

fn bem_block(token: &str) -> Option<&str> {
    token
        .split_once("__")
        .map(|(block, _)| block)
        .filter(|block| !block.is_empty())
}

fn bem_naming_check(rule: &Rule, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
    let (_, usage) = class_usage(model);

    let mut blocks: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for &token in usage.keys() {
        if let Some(block) = bem_block(token) {
            blocks.entry(block).or_default().push(token);
        }
    }

    let uses = |tokens: &[&str]| -> usize { tokens.iter().map(|t| usage[t].len()).sum() };

    let mut findings = Vec::new();
    for (plural, plural_tokens) in &blocks {
        let Some(singular) = plural.strip_suffix('s') else {
            continue;
        };
        let Some(singular_tokens) = blocks.get(singular) else {
            continue;
        };

        // The less common spelling is the outlier; a tie flags the plural
        let plural_wins = uses(plural_tokens.as_slice()) > uses(singular_tokens.as_slice());
        let (flagged, counterpart) = if plural_wins {
            (singular_tokens, plural_tokens)
        } else {
            (plural_tokens, singular_tokens)
        };
        let Some(&other) = counterpart.first() else {
            continue;
        };

        for &token in flagged {
            let mut anchors = usage[token]
                .iter()
                .chain(&usage[other])
                .map(|&id| Anchor::element(model, id));
            let Some(first) = anchors.next() else {
                continue;
            };
            findings.push(
                rule.finding(
                    format!(
                        "class \"{}\" uses block \"{}\" while \"{}\" uses \"{}\"",
                        token,
                        bem_block(token).unwrap_or(token),
                        other,
                        bem_block(other).unwrap_or(other)
                    ),
                    first,
                )
                .with_anchors(anchors),
            );
        }
    }

    Ok(findings)
}

fn class_naming_case(rule: &Rule, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
    let (order, usage) = class_usage(model);
    Ok(order
        .into_iter()
        .filter(|token| token.chars().any(|c| c.is_uppercase()))
        .filter_map(|token| {
            let mut anchors = usage[token].iter().map(|&id| Anchor::element(model, id));
            let first = anchors.next()?;
            Some(
                rule.finding(format!("class \"{}\" contains upper-case letters", token), first)
                    .with_anchors(anchors),
            )
        })
        .collect())
}
