//! CSS selector support
//!
//! Selector lists are parsed with the `selectors` crate and matched against
//! the element arena through [`ElementRef`]. User-action and other dynamic
//! pseudo-classes (`:hover`, `:focus`, `:checked`) and pseudo-elements never
//! restrict a match: `a:hover` is considered to target every `a`. Structural
//! and logical pseudo-classes (`:first-child`, `:not()`, `:is()`) are
//! evaluated against the tree.

use super::{ElementId, StructuralModel};
use cssparser::{CowRcStr, ParseError, Parser, ParserInput, SourceLocation, ToCss};
use selectors::attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint};
use selectors::matching::{
    matches_selector, MatchingContext, MatchingForInvalidation, MatchingMode, NeedsSelectorFlags,
    QuirksMode, SelectorCaches,
};
use selectors::parser::{Combinator, Component, ParseRelative, Selector, SelectorImpl, SelectorParseErrorKind};
use selectors::{Element, OpaqueElement};
use std::fmt;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

// ============================================================================
// Selector implementation
// ============================================================================

/// String type for every selector atom
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CssString(pub String);

impl From<&str> for CssString {
    fn from(s: &str) -> Self {
        CssString(s.to_string())
    }
}

impl From<String> for CssString {
    fn from(s: String) -> Self {
        CssString(s)
    }
}

impl std::ops::Deref for CssString {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::borrow::Borrow<str> for CssString {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CssString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl ToCss for CssString {
    fn to_css<W>(&self, dest: &mut W) -> fmt::Result
    where
        W: fmt::Write,
    {
        dest.write_str(&self.0)
    }
}

impl precomputed_hash::PrecomputedHash for CssString {
    fn precomputed_hash(&self) -> u32 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.0.hash(&mut hasher);
        hasher.finish() as u32
    }
}

/// Selector implementation for audited documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditSelectorImpl;

impl SelectorImpl for AuditSelectorImpl {
    type ExtraMatchingData<'a> = ();
    type AttrValue = CssString;
    type Identifier = CssString;
    type LocalName = CssString;
    type NamespacePrefix = CssString;
    type NamespaceUrl = CssString;
    type BorrowedLocalName = str;
    type BorrowedNamespaceUrl = str;

    type NonTSPseudoClass = PseudoClass;
    type PseudoElement = PseudoElement;
}

/// A non-structural pseudo-class, kept by lower-cased name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PseudoClass(CssString);

impl PseudoClass {
    /// Lower-cased name without the colon
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl selectors::parser::NonTSPseudoClass for PseudoClass {
    type Impl = AuditSelectorImpl;

    fn is_active_or_hover(&self) -> bool {
        matches!(self.name(), "active" | "hover")
    }

    fn is_user_action_state(&self) -> bool {
        matches!(self.name(), "hover" | "active" | "focus")
    }
}

impl ToCss for PseudoClass {
    fn to_css<W>(&self, dest: &mut W) -> fmt::Result
    where
        W: fmt::Write,
    {
        dest.write_char(':')?;
        dest.write_str(self.name())
    }
}

/// A pseudo-element, kept by lower-cased name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PseudoElement(CssString);

impl PseudoElement {
    /// Lower-cased name without the colons
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl selectors::parser::PseudoElement for PseudoElement {
    type Impl = AuditSelectorImpl;
}

impl ToCss for PseudoElement {
    fn to_css<W>(&self, dest: &mut W) -> fmt::Result
    where
        W: fmt::Write,
    {
        dest.write_str("::")?;
        dest.write_str(self.name())
    }
}

/// Accepts any pseudo-class or pseudo-element name
struct PseudoClassParser;

impl<'i> selectors::parser::Parser<'i> for PseudoClassParser {
    type Impl = AuditSelectorImpl;
    type Error = SelectorParseErrorKind<'i>;

    fn parse_non_ts_pseudo_class(
        &self,
        _location: SourceLocation,
        name: CowRcStr<'i>,
    ) -> Result<PseudoClass, ParseError<'i, Self::Error>> {
        Ok(PseudoClass(name.to_ascii_lowercase().into()))
    }

    fn parse_non_ts_functional_pseudo_class<'t>(
        &self,
        name: CowRcStr<'i>,
        arguments: &mut Parser<'i, 't>,
        _after_part: bool,
    ) -> Result<PseudoClass, ParseError<'i, Self::Error>> {
        // Arguments (`:lang(en)`, `:dir(rtl)`) never restrict a match
        while arguments.next().is_ok() {}
        Ok(PseudoClass(name.to_ascii_lowercase().into()))
    }

    fn parse_pseudo_element(
        &self,
        _location: SourceLocation,
        name: CowRcStr<'i>,
    ) -> Result<PseudoElement, ParseError<'i, Self::Error>> {
        Ok(PseudoElement(name.to_ascii_lowercase().into()))
    }

    fn parse_is_and_where(&self) -> bool {
        true
    }
}

// ============================================================================
// Parsed selectors
// ============================================================================

/// One compound selector of a [`ComplexSelector`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    /// Offset of the compound's rightmost component in match order
    pub offset: usize,
    /// Carries a type, id, class, attribute, `:is()` or `:where()` constraint
    pub constrained: bool,
    /// Lower-cased pseudo-class names
    pub pseudo_classes: Vec<String>,
    /// Lower-cased pseudo-element names
    pub pseudo_elements: Vec<String>,
}

impl Compound {
    fn starting_at(offset: usize) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    /// Check if the compound carries one of the given pseudo-classes
    pub fn has_pseudo_class(&self, names: &[&str]) -> bool {
        self.pseudo_classes.iter().any(|p| names.contains(&p.as_str()))
    }
}

fn constrains(component: &Component<AuditSelectorImpl>) -> bool {
    matches!(
        component,
        Component::LocalName(_)
            | Component::ID(_)
            | Component::Class(_)
            | Component::AttributeInNoNamespaceExists { .. }
            | Component::AttributeInNoNamespace { .. }
            | Component::AttributeOther(_)
            | Component::Is(_)
            | Component::Where(_)
    )
}

/// A single selector of a selector list (`nav > a.link:hover`)
#[derive(Debug, Clone)]
pub struct ComplexSelector(Selector<AuditSelectorImpl>);

impl ComplexSelector {
    /// The parsed `selectors` representation
    pub fn selector(&self) -> &Selector<AuditSelectorImpl> {
        &self.0
    }

    /// Compounds from the subject leftwards; a pseudo-element stays with
    /// the compound it belongs to
    pub fn compounds(&self) -> Vec<Compound> {
        let mut compounds = vec![Compound::starting_at(0)];
        for (index, component) in self.0.iter_raw_match_order().enumerate() {
            if let Component::Combinator(combinator) = component {
                if !matches!(combinator, Combinator::PseudoElement) {
                    compounds.push(Compound::starting_at(index + 1));
                }
                continue;
            }

            let Some(current) = compounds.last_mut() else {
                continue;
            };
            match component {
                Component::NonTSPseudoClass(pseudo) => {
                    current.pseudo_classes.push(pseudo.name().to_string())
                }
                Component::PseudoElement(pseudo) => {
                    current.pseudo_elements.push(pseudo.name().to_string())
                }
                other if constrains(other) => current.constrained = true,
                _ => {}
            }
        }
        compounds
    }

    /// The rightmost compound (the element the rule styles)
    pub fn subject(&self) -> Compound {
        self.compounds().swap_remove(0)
    }

    /// A lone unconstrained compound such as `*`, `*::before` or `:focus-visible`
    pub fn is_universal(&self) -> bool {
        let compounds = self.compounds();
        compounds.len() == 1 && !compounds[0].constrained
    }

    /// Check if any compound carries one of the given pseudo-classes
    pub fn has_pseudo_class(&self, names: &[&str]) -> bool {
        self.compounds().iter().any(|c| c.has_pseudo_class(names))
    }
}

impl fmt::Display for ComplexSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.to_css(f)
    }
}

/// A comma-separated selector list
///
/// Selectors that fail to parse are dropped on their own, so one unsupported
/// selector does not discard its siblings.
#[derive(Debug, Clone, Default)]
pub struct SelectorList(Vec<ComplexSelector>);

impl SelectorList {
    /// Parse a selector list, keeping every selector that parses
    pub fn parse(text: &str) -> Self {
        let mut input = ParserInput::new(text);
        let mut parser = Parser::new(&mut input);
        let parsed = parser.parse_comma_separated_ignoring_errors(|parser| {
            selectors::parser::SelectorList::parse(&PseudoClassParser, parser, ParseRelative::No)
                .map(|list| list.slice().iter().cloned().map(ComplexSelector).collect::<Vec<_>>())
                .map_err(|e| {
                    log::debug!("unsupported selector in '{}': {:?}", text, e.kind);
                    e
                })
        });
        SelectorList(parsed.into_iter().flatten().collect())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ComplexSelector> {
        self.0.iter()
    }

    /// Selector at a position in the list
    pub fn get(&self, index: usize) -> Option<&ComplexSelector> {
        self.0.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

// ============================================================================
// Matching
// ============================================================================

/// An element of the model as seen by the `selectors` matcher
#[derive(Clone, Copy)]
pub struct ElementRef<'a> {
    model: &'a StructuralModel,
    id: ElementId,
}

impl<'a> ElementRef<'a> {
    /// Wrap an element of a model
    pub fn new(model: &'a StructuralModel, id: ElementId) -> Self {
        Self { model, id }
    }

    fn wrap(&self, id: ElementId) -> Self {
        Self::new(self.model, id)
    }

    fn element(&self) -> &'a super::Element {
        self.model.element(self.id)
    }

    /// Element children of the parent, root excluded
    fn siblings(&self) -> &'a [ElementId] {
        match self.model.parent(self.id) {
            Some(parent) => &self.model.element(parent).children,
            None => &[],
        }
    }
}

impl fmt::Debug for ElementRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> #{}", self.element().tag, self.id.index())
    }
}

impl Element for ElementRef<'_> {
    type Impl = AuditSelectorImpl;

    fn opaque(&self) -> OpaqueElement {
        OpaqueElement::new(self.element())
    }

    fn parent_element(&self) -> Option<Self> {
        self.model
            .parent(self.id)
            .filter(|parent| *parent != self.model.root())
            .map(|parent| self.wrap(parent))
    }

    fn parent_node_is_shadow_root(&self) -> bool {
        false
    }

    fn containing_shadow_host(&self) -> Option<Self> {
        None
    }

    // `a::before` is matched against `a` itself
    fn pseudo_element_originating_element(&self) -> Option<Self> {
        Some(*self)
    }

    fn is_pseudo_element(&self) -> bool {
        false
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        self.model.previous_siblings(self.id).next().map(|id| self.wrap(id))
    }

    fn next_sibling_element(&self) -> Option<Self> {
        let siblings = self.siblings();
        let position = siblings.iter().position(|s| *s == self.id)?;
        siblings.get(position + 1).map(|id| self.wrap(*id))
    }

    fn first_element_child(&self) -> Option<Self> {
        self.element().children.first().map(|id| self.wrap(*id))
    }

    fn is_html_element_in_html_document(&self) -> bool {
        true
    }

    fn has_local_name(&self, local_name: &str) -> bool {
        self.element().tag == local_name
    }

    fn has_namespace(&self, ns: &str) -> bool {
        ns.is_empty() || ns == HTML_NAMESPACE
    }

    fn is_same_type(&self, other: &Self) -> bool {
        self.element().tag == other.element().tag
    }

    fn attr_matches(
        &self,
        ns: &NamespaceConstraint<&CssString>,
        local_name: &CssString,
        operation: &AttrSelectorOperation<&CssString>,
    ) -> bool {
        if let NamespaceConstraint::Specific(url) = ns {
            if !(url.is_empty() || url.as_str() == HTML_NAMESPACE) {
                return false;
            }
        }

        let Some(value) = self.element().get(local_name.as_str()) else {
            return false;
        };
        match operation {
            AttrSelectorOperation::Exists => true,
            AttrSelectorOperation::WithValue {
                operator,
                case_sensitivity,
                value: expected,
            } => operator.eval_str(value, expected.as_str(), *case_sensitivity),
        }
    }

    fn match_non_ts_pseudo_class(
        &self,
        _pseudo: &PseudoClass,
        _context: &mut MatchingContext<Self::Impl>,
    ) -> bool {
        true
    }

    fn match_pseudo_element(
        &self,
        _pseudo: &PseudoElement,
        _context: &mut MatchingContext<Self::Impl>,
    ) -> bool {
        true
    }

    fn apply_selector_flags(&self, _flags: selectors::matching::ElementSelectorFlags) {}

    fn is_link(&self) -> bool {
        matches!(self.element().tag.as_str(), "a" | "area" | "link") && self.element().has("href")
    }

    fn is_html_slot_element(&self) -> bool {
        false
    }

    fn assigned_slot(&self) -> Option<Self> {
        None
    }

    fn has_id(&self, id: &CssString, case_sensitivity: CaseSensitivity) -> bool {
        self.model
            .element_id(self.id)
            .is_some_and(|actual| case_sensitivity.eq(actual.as_bytes(), id.as_bytes()))
    }

    fn has_class(&self, class: &CssString, case_sensitivity: CaseSensitivity) -> bool {
        self.model
            .classes(self.id)
            .iter()
            .any(|c| case_sensitivity.eq(c.as_bytes(), class.as_bytes()))
    }

    fn has_custom_state(&self, _name: &CssString) -> bool {
        false
    }

    fn imported_part(&self, _name: &CssString) -> Option<CssString> {
        None
    }

    fn is_part(&self, _name: &CssString) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        self.element().children.is_empty() && self.element().text.is_none()
    }

    fn is_root(&self) -> bool {
        self.parent_element().is_none()
    }

    fn add_element_unique_hashes(
        &self,
        _filter: &mut selectors::bloom::CountingBloomFilter<selectors::bloom::BloomStorageU8>,
    ) -> bool {
        false
    }
}

/// Match a selector from the compound at `offset` leftwards
pub(crate) fn matches_from(
    model: &StructuralModel,
    selector: &ComplexSelector,
    offset: usize,
    id: ElementId,
) -> bool {
    if id == model.root() {
        return false;
    }

    let mut caches = SelectorCaches::default();
    let mut context = MatchingContext::new(
        MatchingMode::Normal,
        None,
        &mut caches,
        QuirksMode::NoQuirks,
        NeedsSelectorFlags::No,
        MatchingForInvalidation::No,
    );
    matches_selector(&selector.0, offset, None, &ElementRef::new(model, id), &mut context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelBuilder, SourceText};

    fn model(markup: &str) -> StructuralModel {
        ModelBuilder::new(SourceText::new("index.html", markup))
            .build()
            .unwrap()
    }

    fn first(list: &SelectorList) -> &ComplexSelector {
        list.get(0).unwrap()
    }

    #[test]
    fn test_compound_structure() {
        let list = SelectorList::parse("a.nav-link#home[href^=\"/\"]:hover::after");
        let compounds = first(&list).compounds();
        assert_eq!(compounds.len(), 1);
        assert!(compounds[0].constrained);
        assert_eq!(compounds[0].pseudo_classes, vec!["hover"]);
        assert_eq!(compounds[0].pseudo_elements, vec!["after"]);
    }

    #[test]
    fn test_compounds_subject_first() {
        let list = SelectorList::parse("nav:focus-within > ul li + li ~ a");
        let compounds = first(&list).compounds();
        assert_eq!(compounds.len(), 5);
        assert_eq!(compounds[0].offset, 0);
        assert!(compounds[4].has_pseudo_class(&["focus-within"]));
        assert!(!first(&list).subject().has_pseudo_class(&["focus-within"]));
    }

    #[test]
    fn test_universal_selectors() {
        let list = SelectorList::parse("*, *::before, :focus-visible, ::selection, a:not(.x), :is(a, button):focus");
        assert_eq!(list.len(), 6);
        let universal: Vec<_> = list.iter().map(|s| s.is_universal()).collect();
        assert_eq!(universal, vec![true, true, true, true, false, false]);
        assert!(list.get(5).unwrap().has_pseudo_class(&["focus"]));
    }

    #[test]
    fn test_legacy_pseudo_element() {
        let list = SelectorList::parse("*:before");
        assert!(first(&list).is_universal());
        assert_eq!(first(&list).subject().pseudo_elements, vec!["before"]);
    }

    #[test]
    fn test_invalid_selector_is_dropped_alone() {
        let list = SelectorList::parse("a, ..broken, .ok");
        assert_eq!(list.len(), 2);
        assert_eq!(list.iter().map(|s| s.to_string()).collect::<Vec<_>>(), vec!["a", ".ok"]);
    }

    #[test]
    fn test_matches_descendant_and_child() {
        let m = model(r#"<nav class="site"><ul><li><a href="/">Home</a></li></ul></nav>"#);
        let (a, _) = m.elements_by_tag("a").next().unwrap();

        assert!(m.matches(first(&SelectorList::parse(".site a")), a));
        assert!(!m.matches(first(&SelectorList::parse("nav > a")), a));
        assert!(m.matches(first(&SelectorList::parse("nav > ul > li > a[href]")), a));
    }

    #[test]
    fn test_matches_siblings() {
        let m = model(r#"<div><h2>t</h2><p class="lead">a</p><p>b</p></div>"#);
        let ps: Vec<_> = m.elements_by_tag("p").map(|(id, _)| id).collect();

        let next = SelectorList::parse("h2 + p");
        assert!(m.matches(first(&next), ps[0]));
        assert!(!m.matches(first(&next), ps[1]));

        assert!(m.matches(first(&SelectorList::parse("h2 ~ p")), ps[1]));
        assert!(m.matches(first(&SelectorList::parse(".lead + p")), ps[1]));
        assert!(m.matches(first(&SelectorList::parse("p:last-child")), ps[1]));
        assert!(!m.matches(first(&SelectorList::parse("p:first-child")), ps[0]));
    }

    #[test]
    fn test_dynamic_pseudo_classes_do_not_restrict() {
        let m = model(r#"<button class="btn">Go</button>"#);
        let (button, _) = m.elements_by_tag("button").next().unwrap();
        let list = SelectorList::parse(".btn:hover, .btn:focus, .btn::after, .btn:lang(en)");
        assert_eq!(list.len(), 4);
        assert!(list.iter().all(|s| m.matches(s, button)));
    }

    #[test]
    fn test_attribute_operators() {
        let m = model(r#"<a href="https://example.com/doc.pdf" lang="en-US" rel="noopener external">x</a>"#);
        let (a, _) = m.elements_by_tag("a").next().unwrap();
        for sel in [
            "a[href$='.pdf']",
            "a[href*=example]",
            "a[lang|=en]",
            "a[rel~=external]",
            "a[href]",
            "a[rel^='NOOPENER' i]",
        ] {
            assert!(m.matches(first(&SelectorList::parse(sel)), a), "{} should match", sel);
        }
        assert!(!m.matches(first(&SelectorList::parse("a[rel=external]")), a));
    }

    #[test]
    fn test_quoted_attribute_values() {
        let m = model(r#"<div data-x="a~=b"></div><div data-x="b i"></div>"#);
        let divs: Vec<_> = m.elements_by_tag("div").map(|(id, _)| id).collect();

        let operator_in_value = SelectorList::parse(r#"[data-x="a~=b"]"#);
        assert!(m.matches(first(&operator_in_value), divs[0]));
        assert!(!m.matches(first(&operator_in_value), divs[1]));

        let space_in_value = SelectorList::parse(r#"[data-x="b i"]"#);
        assert!(m.matches(first(&space_in_value), divs[1]));
        assert!(!m.matches(first(&space_in_value), divs[0]));
    }

    #[test]
    fn test_root_never_matches() {
        let m = model("<p>x</p>");
        assert!(!m.matches(first(&SelectorList::parse("*")), m.root()));
    }

    #[test]
    fn test_matches_from_compound() {
        let m = model(r#"<nav><a href="/"><span>x</span></a></nav>"#);
        let (a, _) = m.elements_by_tag("a").next().unwrap();
        let list = SelectorList::parse("nav a:focus span");
        let selector = first(&list);
        assert!(!m.matches(selector, a));

        let focus = selector
            .compounds()
            .into_iter()
            .find(|c| c.has_pseudo_class(&["focus"]))
            .unwrap();
        assert!(m.matches_from(selector, focus.offset, a));
    }
}
