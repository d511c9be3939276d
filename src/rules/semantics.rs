//! Document outline and landmark rules

use super::describe;
use crate::finding::{Anchor, RawFinding, Severity};
use crate::model::{ElementId, StructuralModel};
use crate::rule::{Category, EvaluationError, Rule};
use std::collections::BTreeMap;

/// Document outline and semantic markup rules
pub fn rules() -> Vec<Rule> {
    vec![
        Rule::new("missing-main", Category::Semantics, Severity::Medium, missing_main)
            .with_name("Missing main landmark")
            .with_description("Wrap the primary content in a <main> element so assistive technology can skip to it")
            .with_tag("landmarks"),
        Rule::new("missing-h1", Category::Semantics, Severity::Medium, missing_h1)
            .with_name("Missing top-level heading")
            .with_description("Give the page one <h1> describing its purpose")
            .with_tag("headings"),
        Rule::new("heading-order", Category::Semantics, Severity::Low, heading_order)
            .with_name("Skipped heading level")
            .with_description("Headings should descend one level at a time (h2 after h1, h3 after h2)")
            .with_tag("headings"),
        Rule::new("duplicate-id", Category::Semantics, Severity::High, duplicate_id)
            .with_name("Duplicate id")
            .with_description("Element ids must be unique; labels, fragments and scripts resolve only the first")
            .with_tag("ids"),
        Rule::new("missing-title", Category::Semantics, Severity::Medium, missing_title)
            .with_name("Missing document title")
            .with_description("Add a non-empty <title> to the document head")
            .with_tag("metadata"),
    ]
}

fn missing_main(rule: &Rule, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
    let has_main = model.elements().any(|(_, e)| {
        e.is("main") || e.get("role").is_some_and(|r| r.trim().eq_ignore_ascii_case("main"))
    });
    if has_main {
        return Ok(Vec::new());
    }
    Ok(vec![rule.finding("Document has no <main> landmark", Anchor::Document)])
}

fn missing_h1(rule: &Rule, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
    if model.elements_by_tag("h1").next().is_some() {
        return Ok(Vec::new());
    }
    Ok(vec![rule.finding("Document has no <h1> heading", Anchor::Document)])
}

fn heading_level(tag: &str) -> Option<u8> {
    match tag.as_bytes() {
        [b'h', level @ b'1'..=b'6'] => Some(level - b'0'),
        _ => None,
    }
}

fn heading_order(rule: &Rule, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
    let mut findings = Vec::new();
    let mut previous: Option<u8> = None;

    for (id, element) in model.elements() {
        let Some(level) = heading_level(&element.tag) else {
            continue;
        };
        if let Some(prev) = previous {
            if level > prev + 1 {
                findings.push(rule.finding(
                    format!("<h{}> follows <h{}>, skipping a heading level", level, prev),
                    Anchor::element(model, id),
                ));
            }
        }
        previous = Some(level);
    }

    Ok(findings)
}

fn duplicate_id(rule: &Rule, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
    // First-occurrence order keeps output stable
    let mut order: Vec<&str> = Vec::new();
    let mut by_id: BTreeMap<&str, Vec<ElementId>> = BTreeMap::new();
    for (id, _) in model.elements() {
        if let Some(value) = model.element_id(id) {
            let entry = by_id.entry(value).or_default();
            if entry.is_empty() {
                order.push(value);
            }
            entry.push(id);
        }
    }

    let mut findings = Vec::new();
    for value in order {
        let elements = &by_id[value];
        if elements.len() < 2 {
            continue;
        }
        let mut anchors = elements.iter().map(|&id| Anchor::element(model, id));
        let Some(first) = anchors.next() else {
            continue;
        };
        findings.push(
            rule.finding(
                format!("id \"{}\" is used by {} elements", value, elements.len()),
                first,
            )
            .with_anchors(anchors),
        );
    }

    Ok(findings)
}

fn missing_title(rule: &Rule, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
    let titles: Vec<_> = model.elements_by_tag("title").map(|(id, _)| id).collect();
    if titles.iter().any(|&id| !model.text_content(id).trim().is_empty()) {
        return Ok(Vec::new());
    }

    let finding = match titles.first() {
        Some(&id) => rule.finding(
            format!("{} is empty", describe(model, id)),
            Anchor::element(model, id),
        ),
        None => rule.finding("Document has no <title>", Anchor::Document),
    };
    Ok(vec![finding])
}
