//! Accessibility rules

use super::{describe, has_name_attribute};
use crate::config::Config;
use crate::finding::{Anchor, RawFinding, Severity};
use crate::model::{Element, ElementId, StructuralModel};
use crate::registry::ConfigurationError;
use crate::rule::{Category, Check, EvaluationError, Rule, Target};

/// Accessibility rules; `config` supplies the missing-alt escalation threshold
pub fn rules(config: &Config) -> Result<Vec<Rule>, ConfigurationError> {
    Ok(vec![
        Rule::new(
            "missing-alt",
            Category::Accessibility,
            Severity::High,
            MissingAlt {
                threshold: config.escalation.missing_alt_threshold,
            },
        )
        .with_name("Image without alternative text")
        .with_description("Describe informative images with alt text; mark decorative ones with role=\"presentation\" or aria-hidden=\"true\"")
        .with_tag("wcag-1.1.1"),
        Rule::new("missing-lang", Category::Accessibility, Severity::High, missing_lang)
            .with_name("Missing document language")
            .with_description("Set lang on <html> so screen readers pick the right pronunciation")
            .with_tag("wcag-3.1.1"),
        Rule::new(
            "link-without-text",
            Category::Accessibility,
            Severity::High,
            link_without_text,
        )
        .with_name("Link without text")
        .with_description("Links need visible text, an aria-label, or an image with alt text")
        .with_tag("wcag-2.4.4"),
        Rule::new(
            "button-without-name",
            Category::Accessibility,
            Severity::High,
            button_without_name,
        )
        .with_name("Button without accessible name")
        .with_description("Buttons need text content or an aria-label")
        .with_tag("wcag-4.1.2"),
        Rule::condition(
            "positive-tabindex",
            Category::Accessibility,
            Severity::Medium,
            Target::any(),
            "greaterThan(attributes.tabindex, 0)",
            "<{name}> has tabindex=\"{attributes.tabindex}\", which overrides the natural tab order",
        )?
        .with_name("Positive tabindex")
        .with_description("Use tabindex=\"0\" or reorder the markup instead of positive tabindex values")
        .with_tag("wcag-2.4.3"),
    ])
}

/// Reports images without usable alternative text.
///
/// Past `threshold` occurrences every finding is escalated to critical.
struct MissingAlt {
    threshold: usize,
}

impl MissingAlt {
    fn is_image(element: &Element) -> bool {
        match element.tag.as_str() {
            "img" | "area" => true,
            "input" => element
                .get("type")
                .is_some_and(|t| t.trim().eq_ignore_ascii_case("image")),
            _ => false,
        }
    }

    fn is_decorative(element: &Element) -> bool {
        let role = element.get("role").map(|r| r.trim().to_ascii_lowercase());
        matches!(role.as_deref(), Some("presentation" | "none"))
            || element
                .get("aria-hidden")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    fn problem(element: &Element) -> Option<&'static str> {
        match element.get("alt") {
            None => Some("has no alt attribute"),
            Some(alt) if alt.trim().is_empty() && !Self::is_decorative(element) => {
                Some("has empty alt text but is not marked decorative")
            }
            Some(_) => None,
        }
    }
}

impl Check for MissingAlt {
    fn evaluate(
        &self,
        rule: &Rule,
        model: &StructuralModel,
    ) -> Result<Vec<RawFinding>, EvaluationError> {
        let offending: Vec<(ElementId, &'static str)> = model
            .elements()
            .filter(|(_, e)| Self::is_image(e))
            .filter_map(|(id, e)| Self::problem(e).map(|p| (id, p)))
            .collect();

        let escalate = offending.len() > self.threshold;
        if escalate {
            log::debug!(
                "{}: {} images without alt text exceed threshold {}, escalating",
                model.path(),
                offending.len(),
                self.threshold
            );
        }

        Ok(offending
            .into_iter()
            .map(|(id, problem)| {
                let finding = rule.finding(
                    format!("{} {}", describe(model, id), problem),
                    Anchor::element(model, id),
                );
                if escalate {
                    finding.with_severity(Severity::Critical)
                } else {
                    finding
                }
            })
            .collect())
    }
}

fn missing_lang(rule: &Rule, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
    match model.elements_by_tag("html").next() {
        Some((id, html)) if html.non_empty("lang").is_none() => Ok(vec![rule.finding(
            "<html> has no lang attribute",
            Anchor::element(model, id),
        )]),
        Some(_) => Ok(Vec::new()),
        None => Ok(vec![rule.finding(
            "Document has no <html> element declaring a language",
            Anchor::Document,
        )]),
    }
}

fn has_image_with_alt(model: &StructuralModel, id: ElementId) -> bool {
    model.any_descendant(id, &|e: &Element| e.is("img") && e.non_empty("alt").is_some())
}

fn link_without_text(rule: &Rule, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
    Ok(model
        .elements_by_tag("a")
        .filter(|(_, e)| e.has("href"))
        .filter(|(id, e)| {
            model.text_content(*id).trim().is_empty()
                && !has_name_attribute(e)
                && !has_image_with_alt(model, *id)
        })
        .map(|(id, _)| {
            rule.finding(
                format!("{} has no text or accessible name", describe(model, id)),
                Anchor::element(model, id),
            )
        })
        .collect())
}

fn button_without_name(rule: &Rule, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
    Ok(model
        .elements_by_tag("button")
        .filter(|(id, e)| {
            model.text_content(*id).trim().is_empty()
                && !has_name_attribute(e)
                && !has_image_with_alt(model, *id)
        })
        .map(|(id, _)| {
            rule.finding(
                format!("{} has no accessible name", describe(model, id)),
                Anchor::element(model, id),
            )
        })
        .collect())
}
