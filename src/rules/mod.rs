//! Built-in audit rules, one module per category

mod accessibility;
mod assets;
mod file_structure;
mod forms;
mod interactions;
mod naming;
mod responsiveness;
mod semantics;

use crate::config::Config;
use crate::model::{ComplexSelector, Element, ElementId, StructuralModel};
use crate::registry::ConfigurationError;
use crate::rule::Rule;

/// All built-in rules, grouped by category in scoring order
pub fn builtin_rules(config: &Config) -> Result<Vec<Rule>, ConfigurationError> {
    let mut rules = Vec::new();
    rules.extend(semantics::rules());
    rules.extend(accessibility::rules(config)?);
    rules.extend(responsiveness::rules());
    rules.extend(naming::rules());
    rules.extend(forms::rules()?);
    rules.extend(interactions::rules()?);
    rules.extend(assets::rules()?);
    rules.extend(file_structure::rules()?);
    Ok(rules)
}

pub(crate) const FOCUS_PSEUDO_CLASSES: &[&str] = &["focus", "focus-visible", "focus-within"];

const INTERACTIVE_ROLES: &[&str] = &[
    "button", "link", "checkbox", "menuitem", "tab", "switch", "radio", "option",
];

/// Elements a user can focus or activate
pub(crate) fn is_interactive(element: &Element) -> bool {
    let native = match element.tag.as_str() {
        "a" | "area" => element.has("href"),
        "input" => !element
            .get("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("hidden")),
        "button" | "select" | "textarea" | "summary" => true,
        _ => false,
    };

    native
        || element.has("tabindex")
        || element
            .get("role")
            .is_some_and(|r| INTERACTIVE_ROLES.contains(&r.trim().to_ascii_lowercase().as_str()))
}

pub(crate) fn has_interactive_elements(model: &StructuralModel) -> bool {
    model.elements().any(|(_, e)| is_interactive(e))
}

/// Whether a selector addresses interactive elements: it is universal,
/// it matches one, or the compound carrying one of `pseudo` (read with the
/// compounds to its left) matches one
pub(crate) fn targets_interactive(
    model: &StructuralModel,
    selector: &ComplexSelector,
    pseudo: &[&str],
) -> bool {
    if selector.is_universal() {
        return true;
    }

    let pseudo_compounds: Vec<_> = selector
        .compounds()
        .into_iter()
        .filter(|c| c.has_pseudo_class(pseudo))
        .collect();
    model.elements().any(|(id, element)| {
        is_interactive(element)
            && (model.matches(selector, id)
                || pseudo_compounds
                    .iter()
                    .any(|c| !c.constrained || model.matches_from(selector, c.offset, id)))
    })
}

/// `aria-label`, `aria-labelledby` or `title` with content
pub(crate) fn has_name_attribute(element: &Element) -> bool {
    ["aria-label", "aria-labelledby", "title"]
        .iter()
        .any(|attr| element.non_empty(attr).is_some())
}

/// Short description of an element for messages (`<img src="hero.png">`)
pub(crate) fn describe(model: &StructuralModel, id: ElementId) -> String {
    let element = model.element(id);
    let key = ["id", "src", "href", "name", "class"]
        .iter()
        .find_map(|attr| element.non_empty(attr).map(|v| (attr, v)));
    match key {
        Some((attr, value)) => format!("<{} {}=\"{}\">", element.tag, attr, value),
        None => format!("<{}>", element.tag),
    }
}
