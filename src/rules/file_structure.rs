//! Rules about where styles live

use super::describe;
use crate::finding::{Anchor, RawFinding, Severity};
use crate::model::StructuralModel;
use crate::registry::ConfigurationError;
use crate::rule::{Category, EvaluationError, Rule, Target};

/// Style sheet organization rules
pub fn rules() -> Result<Vec<Rule>, ConfigurationError> {
    Ok(vec![
        Rule::condition(
            "inline-style-attribute",
            Category::FileStructure,
            Severity::Low,
            Target::any(),
            "attributes.style",
            "<{name}> has an inline style attribute",
        )?
        .with_name("Inline style attribute")
        .with_description("Move inline styles into a style sheet class"),
        Rule::new(
            "embedded-style-block",
            Category::FileStructure,
            Severity::Low,
            embedded_style_block,
        )
        .with_name("Embedded style block")
        .with_description("Move <style> blocks into a linked style sheet so they can be cached and shared"),
        Rule::new(
            "no-linked-stylesheet",
            Category::FileStructure,
            Severity::Medium,
            no_linked_stylesheet,
        )
        .with_name("No linked style sheet")
        .with_description("Link an external style sheet with <link rel=\"stylesheet\">"),
        Rule::new(
            "unused-selector",
            Category::FileStructure,
            Severity::Info,
            unused_selector,
        )
        .with_name("Unused selector")
        .with_description("Remove style rules that match nothing in the document")
        .with_tag("dead-code"),
    ])
}

fn embedded_style_block(
    rule: &Rule,
    model: &StructuralModel,
) -> Result<Vec<RawFinding>, EvaluationError> {
    Ok(model
        .elements_by_tag("style")
        .map(|(id, _)| {
            rule.finding(
                format!("{} embeds styles in the markup", describe(model, id)),
                Anchor::element(model, id),
            )
        })
        .collect())
}

fn no_linked_stylesheet(
    rule: &Rule,
    model: &StructuralModel,
) -> Result<Vec<RawFinding>, EvaluationError> {
    if !model.linked_stylesheets().is_empty() || model.supplied_style_sheets().next().is_some() {
        return Ok(Vec::new());
    }
    Ok(vec![rule.finding(
        "Document links no external style sheet",
        Anchor::Document,
    )])
}

fn unused_selector(rule: &Rule, model: &StructuralModel) -> Result<Vec<RawFinding>, EvaluationError> {
    Ok(model
        .style_rules()
        .filter(|(_, style)| !style.selectors.is_empty())
        .filter(|(_, style)| model.select(&style.selectors).next().is_none())
        .map(|(id, style)| {
            rule.finding(
                format!("`{}` matches no element", style.selector),
                Anchor::style_rule(model, id),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::{model, model_with_css, run};

    #[test]
    fn test_inline_style_attribute() {
        let rules = rules().unwrap();
        let m = model(r#"<div style="color: red">a</div><p style="">b</p><span>c</span>"#);
        let findings = run(&rules, "inline-style-attribute", &m);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].message, "<div> has an inline style attribute");
    }

    #[test]
    fn test_embedded_style_block() {
        let rules = rules().unwrap();
        let m = model("<head><style>p { margin: 0 }</style><style></style></head>");
        assert_eq!(run(&rules, "embedded-style-block", &m).len(), 2);
    }

    #[test]
    fn test_no_linked_stylesheet() {
        let rules = rules().unwrap();
        assert_eq!(run(&rules, "no-linked-stylesheet", &model("<head></head>")).len(), 1);

        let linked = model(r#"<head><link rel="stylesheet" href="site.css"></head>"#);
        assert!(run(&rules, "no-linked-stylesheet", &linked).is_empty());

        let supplied = model_with_css("<head></head>", "p { margin: 0 }");
        assert!(run(&rules, "no-linked-stylesheet", &supplied).is_empty());
    }

    #[test]
    fn test_unused_selector() {
        let rules = rules().unwrap();
        let m = model_with_css(
            r#"<nav><a href="/" class="nav-link">x</a></nav>"#,
            ".nav-link:hover { color: red } .card, .missing { margin: 0 } nav > a { padding: 0 } .ghost { margin: 0 }",
        );
        let findings = run(&rules, "unused-selector", &m);
        let messages: Vec<_> = findings.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["`.card, .missing` matches no element", "`.ghost` matches no element"]
        );
    }
}
