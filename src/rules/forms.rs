//! Form control rules

use super::describe;
use crate::finding::{Anchor, RawFinding, Severity};
use crate::model::{Element, ElementId, StructuralModel};
use crate::registry::ConfigurationError;
use crate::rule::{Category, EvaluationError, Rule, Target};
use std::collections::HashSet;

/// Input types that never need a visible label
const UNLABELLED_INPUT_TYPES: &[&str] = &["hidden", "submit", "reset", "button", "image"];

/// Form rules
pub fn rules() -> Result<Vec<Rule>, ConfigurationError> {
    Ok(vec![
        Rule::new("missing-label", Category::Forms, Severity::Critical, missing_label)
            .with_name("Form control without label")
            .with_description("Associate every control with a <label for>, a wrapping <label>, or aria-label")
            .with_tag("wcag-1.3.1")
            .with_tag("wcag-4.1.2"),
        Rule::condition(
            "input-missing-type",
            Category::Forms,
            Severity::Low,
            Target::tag("input"),
            "!attributes.type",
            "<input> has no type attribute",
        )?
        .with_name("Input without type")
        .with_description("Declare the input type so browsers offer the right keyboard and validation"),
        Rule::condition(
            "button-missing-type",
            Category::Forms,
            Severity::Low,
            Target::tag("button"),
            "hasAncestor('form') && !attributes.type",
            "<button> inside a form has no type and defaults to submit",
        )?
        .with_name("Button without type")
        .with_description("Set type=\"button\" or type=\"submit\" on buttons inside forms"),
    ])
}

fn needs_label(element: &Element) -> bool {
    match element.tag.as_str() {
        "input" => {
            let kind = element
                .get("type")
                .map(|t| t.trim().to_ascii_lowercase())
                .unwrap_or_default();
            !UNLABELLED_INPUT_TYPES.contains(&kind.as_str())
        }
        "select" | "textarea" => true,
        _ => false,
    }
}

fn is_labelled(
    model: &StructuralModel,
    id: ElementId,
    element: &Element,
    label_targets: &HashSet<&str>,
) -> bool {
    element.non_empty("aria-label").is_some()
        || element.non_empty("aria-labelledby").is_some()
        || model
            .element_id(id)
            .is_some_and(|value| label_targets.contains(value))
        || model.ancestors(id).any(|a| model.element(a).is("label"))
}

fn missing_label(rule: &Rule, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
    let label_targets: HashSet<&str> = model
        .elements_by_tag("label")
        .filter_map(|(_, label)| label.non_empty("for"))
        .collect();

    Ok(model
        .elements()
        .filter(|(_, e)| needs_label(e))
        .filter(|(id, e)| !is_labelled(model, *id, e, &label_targets))
        .map(|(id, _)| {
            rule.finding(
                format!("{} has no associated label", describe(model, id)),
                Anchor::element(model, id),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::{model, run};

    #[test]
    fn test_label_for_matches_id() {
        let rules = rules().unwrap();
        let m = model(r#"<form><label for="x">Name</label><input id="x" type="text"></form>"#);
        assert!(run(&rules, "missing-label", &m).is_empty());
    }

    #[test]
    fn test_missing_label() {
        let rules = rules().unwrap();
        let m = model(
            r#"<form>
                <input id="email" type="email">
                <label>Phone <input type="tel"></label>
                <input type="search" aria-label="Search">
                <input type="hidden" name="token">
                <input type="submit">
                <select name="country"></select>
                <textarea></textarea>
            </form>"#,
        );
        let findings = run(&rules, "missing-label", &m);
        let messages: Vec<_> = findings.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "<input id=\"email\"> has no associated label",
                "<select name=\"country\"> has no associated label",
                "<textarea> has no associated label",
            ]
        );
    }

    #[test]
    fn test_input_missing_type() {
        let rules = rules().unwrap();
        let m = model(r#"<input name="q"><input type="text">"#);
        assert_eq!(run(&rules, "input-missing-type", &m).len(), 1);
    }

    #[test]
    fn test_button_missing_type() {
        let rules = rules().unwrap();
        let m = model(
            r#"<form><button>Send</button><button type="button">Reset</button></form><button>Outside</button>"#,
        );
        let findings = run(&rules, "button-missing-type", &m);
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].message,
            "<button> inside a form has no type and defaults to submit"
        );
    }
}
