//! Structural model of an audited document
//!
//! One HTML document plus its style sheets, parsed into an arena of elements
//! and style rules with source positions. The model is built once by
//! [`ModelBuilder`] and never mutated afterwards, so rule evaluations can share
//! it across threads without locking.

mod builder;
pub mod css;
pub mod html;
pub mod selector;

pub use builder::{ModelBuilder, SourceText};
pub use selector::{ComplexSelector, Compound, ElementRef, SelectorList};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// Position in a source artifact (1-based)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    /// Create a location from a 1-based line and column
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Error building a structural model
///
/// Parse errors are fatal: no partial model is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{path}:{line}:{column}: closing tag </{tag}> has no matching open element")]
    UnmatchedClosingTag {
        path: String,
        tag: String,
        line: usize,
        column: usize,
    },

    #[error("{path}:{line}:{column}: tag <{tag}> is never closed with '>'")]
    UnterminatedTag {
        path: String,
        tag: String,
        line: usize,
        column: usize,
    },

    #[error("{path}:{line}:{column}: value of attribute '{attribute}' is never closed")]
    UnterminatedAttribute {
        path: String,
        attribute: String,
        line: usize,
        column: usize,
    },

    #[error("{path}:{line}:{column}: comment is never closed")]
    UnterminatedComment {
        path: String,
        line: usize,
        column: usize,
    },

    #[error("{path}:{line}:{column}: <{tag}> has no closing tag")]
    UnterminatedRawText {
        path: String,
        tag: String,
        line: usize,
        column: usize,
    },

    #[error("{path}:{line}:{column}: style block is never closed")]
    UnterminatedStyleBlock {
        path: String,
        line: usize,
        column: usize,
    },
}

impl ParseError {
    /// Logical path of the artifact that failed to parse
    pub fn path(&self) -> &str {
        match self {
            ParseError::UnmatchedClosingTag { path, .. }
            | ParseError::UnterminatedTag { path, .. }
            | ParseError::UnterminatedAttribute { path, .. }
            | ParseError::UnterminatedComment { path, .. }
            | ParseError::UnterminatedRawText { path, .. }
            | ParseError::UnterminatedStyleBlock { path, .. } => path,
        }
    }

    /// Location of the offending construct
    pub fn location(&self) -> SourceLocation {
        match self {
            ParseError::UnmatchedClosingTag { line, column, .. }
            | ParseError::UnterminatedTag { line, column, .. }
            | ParseError::UnterminatedAttribute { line, column, .. }
            | ParseError::UnterminatedComment { line, column, .. }
            | ParseError::UnterminatedRawText { line, column, .. }
            | ParseError::UnterminatedStyleBlock { line, column, .. } => {
                SourceLocation::new(*line, *column)
            }
        }
    }
}

/// Index of an element in the model arena
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ElementId(pub(crate) usize);

impl ElementId {
    /// Position in the arena (0 is the root)
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of a style rule in the model
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct StyleRuleId(pub(crate) usize);

impl StyleRuleId {
    /// Position in the model's rule list
    pub fn index(self) -> usize {
        self.0
    }
}

/// A markup element
#[derive(Debug, Clone)]
pub struct Element {
    /// Lower-cased tag name (`#document` for the synthetic root)
    pub tag: String,
    /// Attributes in source order, names lower-cased, no duplicate names
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order
    pub children: Vec<ElementId>,
    /// Enclosing element; `None` only for the root
    pub parent: Option<ElementId>,
    /// Direct text content, whitespace-collapsed
    pub text: Option<String>,
    pub location: SourceLocation,
}

impl Element {
    pub(crate) fn new(tag: &str, location: SourceLocation) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
            parent: None,
            text: None,
            location,
        }
    }

    /// Get an attribute value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Check if an attribute is present (even when empty)
    pub fn has(&self, name: &str) -> bool {
        self.attributes.iter().any(|(n, _)| n == name)
    }

    /// Get a trimmed, non-empty attribute value
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Check the tag name
    pub fn is(&self, tag: &str) -> bool {
        self.tag == tag
    }

    pub(crate) fn push_text(&mut self, text: &str) {
        match &mut self.text {
            Some(existing) => {
                existing.push(' ');
                existing.push_str(text);
            }
            None => self.text = Some(text.to_string()),
        }
    }
}

/// A single `property: value` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Lower-cased property name
    pub property: String,
    /// Value with any `!important` flag removed
    pub value: String,
    pub important: bool,
    pub location: SourceLocation,
}

/// A qualified style rule (`selector { declarations }`)
#[derive(Debug, Clone)]
pub struct StyleRule {
    pub selector: String,
    pub selectors: SelectorList,
    pub declarations: Vec<Declaration>,
    pub location: SourceLocation,
    /// Index of the owning style sheet
    pub sheet: usize,
    /// Preludes of the enclosing conditional group rules, outermost first
    pub conditions: Vec<String>,
}

impl StyleRule {
    /// Last declaration for a property (source order, later wins)
    pub fn declared(&self, property: &str) -> Option<&Declaration> {
        self.declarations
            .iter()
            .rev()
            .find(|d| d.property == property)
    }

    /// Check if the rule sits inside a conditional group rule
    pub fn is_conditional(&self) -> bool {
        !self.conditions.is_empty()
    }
}

/// Where a style sheet came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetOrigin {
    /// Handed to the builder by the artifact loader
    Supplied,
    /// A `<style>` element inside the markup
    Embedded(ElementId),
}

/// A parsed style sheet
#[derive(Debug, Clone)]
pub struct StyleSheet {
    pub path: String,
    pub origin: SheetOrigin,
    /// Range of this sheet's rules in the model's rule list
    pub rules: Range<usize>,
}

/// Kind of conditional group rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    Media,
    Supports,
    Container,
}

/// An `@media`, `@supports` or `@container` block
#[derive(Debug, Clone)]
pub struct ConditionalBlock {
    pub kind: ConditionKind,
    pub condition: String,
    pub location: SourceLocation,
    pub sheet: usize,
}

impl ConditionalBlock {
    /// Check if this block conditions on viewport or container width
    pub fn is_width_query(&self) -> bool {
        matches!(self.kind, ConditionKind::Media | ConditionKind::Container)
            && self.condition.to_ascii_lowercase().contains("width")
    }
}

/// Class tokens and id an element exposes for selector matching
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSelectors {
    pub classes: Vec<String>,
    pub id: Option<String>,
}

/// The immutable model of one audited document and its style sheets
#[derive(Debug)]
pub struct StructuralModel {
    path: String,
    elements: Vec<Element>,
    selectors: Vec<ElementSelectors>,
    style_rules: Vec<StyleRule>,
    style_sheets: Vec<StyleSheet>,
    conditional_blocks: Vec<ConditionalBlock>,
    suppressed_rules: BTreeSet<String>,
    has_doctype: bool,
}

impl StructuralModel {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        path: String,
        elements: Vec<Element>,
        selectors: Vec<ElementSelectors>,
        style_rules: Vec<StyleRule>,
        style_sheets: Vec<StyleSheet>,
        conditional_blocks: Vec<ConditionalBlock>,
        suppressed_rules: BTreeSet<String>,
        has_doctype: bool,
    ) -> Self {
        Self {
            path,
            elements,
            selectors,
            style_rules,
            style_sheets,
            conditional_blocks,
            suppressed_rules,
            has_doctype,
        }
    }

    /// Logical path of the markup document
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The synthetic `#document` root
    pub fn root(&self) -> ElementId {
        ElementId(0)
    }

    /// Get an element by id
    ///
    /// Panics if the id was not issued by this model.
    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.0]
    }

    /// Get an element by id, if it exists
    pub fn get_element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.0)
    }

    /// All elements except the root, in document order
    pub fn elements(&self) -> impl Iterator<Item = (ElementId, &Element)> + '_ {
        self.elements
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, e)| (ElementId(i), e))
    }

    /// Elements with the given tag, in document order
    pub fn elements_by_tag<'a>(
        &'a self,
        tag: &'a str,
    ) -> impl Iterator<Item = (ElementId, &'a Element)> + 'a {
        self.elements().filter(move |(_, e)| e.tag == tag)
    }

    /// Number of elements, root excluded
    pub fn element_count(&self) -> usize {
        self.elements.len().saturating_sub(1)
    }

    /// Parent of an element (the root for top-level elements)
    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.elements[id.0].parent
    }

    /// Ancestors from the parent up to (and excluding) the root
    pub fn ancestors(&self, id: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        let mut current = self.parent(id);
        std::iter::from_fn(move || {
            let next = current.filter(|p| p.0 != 0)?;
            current = self.parent(next);
            Some(next)
        })
    }

    /// Siblings before this element, nearest first
    pub fn previous_siblings(&self, id: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        let siblings: &[ElementId] = match self.parent(id) {
            Some(parent) => &self.elements[parent.0].children,
            None => &[],
        };
        let position = siblings.iter().position(|s| *s == id).unwrap_or(0);
        siblings[..position].iter().rev().copied()
    }

    /// Direct and descendant text, joined with single spaces
    pub fn text_content(&self, id: ElementId) -> String {
        let mut parts: Vec<&str> = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let element = &self.elements[current.0];
            if let Some(text) = &element.text {
                parts.push(text);
            }
            // Reversed so the first child is visited next
            stack.extend(element.children.iter().rev());
        }
        parts.join(" ")
    }

    /// Check if any descendant satisfies the predicate
    pub fn any_descendant(&self, id: ElementId, pred: &dyn Fn(&Element) -> bool) -> bool {
        let mut stack: Vec<ElementId> = self.elements[id.0].children.clone();
        while let Some(current) = stack.pop() {
            let element = &self.elements[current.0];
            if pred(element) {
                return true;
            }
            stack.extend(element.children.iter());
        }
        false
    }

    /// Class tokens of an element
    pub fn classes(&self, id: ElementId) -> &[String] {
        &self.selectors[id.0].classes
    }

    /// The `id` attribute of an element, if non-empty
    pub fn element_id(&self, id: ElementId) -> Option<&str> {
        self.selectors[id.0].id.as_deref()
    }

    /// Class tokens and id of an element
    pub fn selectors(&self, id: ElementId) -> &ElementSelectors {
        &self.selectors[id.0]
    }

    /// Get a style rule by id
    pub fn style_rule(&self, id: StyleRuleId) -> &StyleRule {
        &self.style_rules[id.0]
    }

    /// All style rules in sheet order
    pub fn style_rules(&self) -> impl Iterator<Item = (StyleRuleId, &StyleRule)> + '_ {
        self.style_rules
            .iter()
            .enumerate()
            .map(|(i, r)| (StyleRuleId(i), r))
    }

    /// Supplied sheets first, then embedded `<style>` blocks in document order
    pub fn style_sheets(&self) -> &[StyleSheet] {
        &self.style_sheets
    }

    /// Style sheets handed to the builder (embedded `<style>` blocks excluded)
    pub fn supplied_style_sheets(&self) -> impl Iterator<Item = &StyleSheet> + '_ {
        self.style_sheets
            .iter()
            .filter(|s| s.origin == SheetOrigin::Supplied)
    }

    /// Conditional group rules of every sheet, in sheet order
    pub fn conditional_blocks(&self) -> &[ConditionalBlock] {
        &self.conditional_blocks
    }

    /// `href`s of `<link rel="stylesheet">` elements, for the artifact loader
    pub fn linked_stylesheets(&self) -> Vec<&str> {
        self.elements_by_tag("link")
            .filter(|(_, e)| {
                e.get("rel").is_some_and(|rel| {
                    rel.split_ascii_whitespace()
                        .any(|r| r.eq_ignore_ascii_case("stylesheet"))
                })
            })
            .filter_map(|(_, e)| e.non_empty("href"))
            .collect()
    }

    /// Check if a rule is disabled by an `audit-disable` comment
    pub fn is_rule_suppressed(&self, rule_key: &str) -> bool {
        self.suppressed_rules.contains("all") || self.suppressed_rules.contains(rule_key)
    }

    /// Check if the markup opens with a `<!DOCTYPE>` declaration
    pub fn has_doctype(&self) -> bool {
        self.has_doctype
    }

    /// Check if a complex selector matches an element
    pub fn matches(&self, selector: &ComplexSelector, id: ElementId) -> bool {
        selector::matches_from(self, selector, 0, id)
    }

    /// Check if a selector matches an element starting from one of its
    /// compounds (see [`Compound::offset`])
    pub fn matches_from(&self, selector: &ComplexSelector, offset: usize, id: ElementId) -> bool {
        selector::matches_from(self, selector, offset, id)
    }

    /// Elements matched by any selector of the list
    pub fn select<'a>(
        &'a self,
        list: &'a SelectorList,
    ) -> impl Iterator<Item = ElementId> + 'a {
        self.elements()
            .map(|(id, _)| id)
            .filter(move |id| list.iter().any(|s| self.matches(s, *id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(markup: &str) -> StructuralModel {
        ModelBuilder::new(SourceText::new("index.html", markup))
            .build()
            .unwrap()
    }

    #[test]
    fn test_tree_invariants() {
        let m = model("<html><body><div><p>a</p><p>b</p></div></body></html>");
        for (id, element) in m.elements() {
            let parent = element.parent.expect("non-root element has a parent");
            assert!(m.element(parent).children.contains(&id));
        }
        assert!(m.element(m.root()).parent.is_none());
        assert_eq!(m.element_count(), 5);
    }

    #[test]
    fn test_ancestors_exclude_root() {
        let m = model("<div><section><span>x</span></section></div>");
        let (span, _) = m.elements_by_tag("span").next().unwrap();
        let tags: Vec<_> = m.ancestors(span).map(|a| m.element(a).tag.clone()).collect();
        assert_eq!(tags, vec!["section", "div"]);
    }

    #[test]
    fn test_text_content() {
        let m = model("<a href='/'>Read <b>more</b></a>");
        let (a, _) = m.elements_by_tag("a").next().unwrap();
        assert_eq!(m.text_content(a), "Read more");
    }

    #[test]
    fn test_deep_tree_walks() {
        let depth = 50_000;
        let markup = format!("<div>{}leaf</div>", "<span>".repeat(depth));
        let m = model(&markup);
        let (div, _) = m.elements_by_tag("div").next().unwrap();

        assert_eq!(m.text_content(div), "leaf");
        assert!(m.any_descendant(div, &|e| e.text.is_some()));
        assert!(!m.any_descendant(div, &|e| e.is("img")));
    }

    #[test]
    fn test_text_content_document_order() {
        let m = model("<p>one <b>two <i>three</i></b> <span>four</span></p>");
        let (p, _) = m.elements_by_tag("p").next().unwrap();
        assert_eq!(m.text_content(p), "one two three four");
    }

    #[test]
    fn test_previous_siblings() {
        let m = model("<ul><li id='a'></li><li id='b'></li><li id='c'></li></ul>");
        let ids: Vec<_> = m.elements_by_tag("li").map(|(id, _)| id).collect();
        let before: Vec<_> = m
            .previous_siblings(ids[2])
            .map(|s| m.element_id(s).unwrap().to_string())
            .collect();
        assert_eq!(before, vec!["b", "a"]);
    }

    #[test]
    fn test_linked_stylesheets() {
        let m = model(
            r#"<head><link rel="stylesheet" href="css/main.css"><link rel="icon" href="f.ico"></head>"#,
        );
        assert_eq!(m.linked_stylesheets(), vec!["css/main.css"]);
    }

    #[test]
    fn test_width_query_detection() {
        let block = ConditionalBlock {
            kind: ConditionKind::Media,
            condition: "screen and (max-width: 768px)".to_string(),
            location: SourceLocation::new(1, 1),
            sheet: 0,
        };
        assert!(block.is_width_query());

        let print = ConditionalBlock {
            condition: "print".to_string(),
            ..block.clone()
        };
        assert!(!print.is_width_query());

        let supports = ConditionalBlock {
            kind: ConditionKind::Supports,
            condition: "(width: 1px)".to_string(),
            ..block
        };
        assert!(!supports.is_width_query());
    }

    #[test]
    fn test_parse_error_location() {
        let err = ParseError::UnterminatedComment {
            path: "index.html".to_string(),
            line: 3,
            column: 7,
        };
        assert_eq!(err.location(), SourceLocation::new(3, 7));
        assert_eq!(err.path(), "index.html");
        assert_eq!(err.to_string(), "index.html:3:7: comment is never closed");
    }
}
