//! Structural model construction

use super::css::parse_stylesheet;
use super::html::parse_markup;
use super::{
    ElementSelectors, ParseError, SheetOrigin, SourceLocation, StructuralModel, StyleSheet,
};
use std::borrow::Cow;

/// A source artifact: logical path plus raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    /// Path used in findings and errors; never opened by the engine
    pub path: String,
    pub bytes: Vec<u8>,
}

impl SourceText {
    /// Wrap already-loaded bytes
    pub fn new(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            bytes: bytes.into(),
        }
    }

    /// Content as text; invalid UTF-8 sequences are replaced
    pub fn text(&self) -> Cow<'_, str> {
        let text = String::from_utf8_lossy(&self.bytes);
        if matches!(text, Cow::Owned(_)) {
            log::debug!("{}: invalid UTF-8 replaced", self.path);
        }
        text
    }
}

/// Builds a [`StructuralModel`] from one markup document and its style sheets
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    markup: SourceText,
    style_sheets: Vec<SourceText>,
}

impl ModelBuilder {
    /// Start a model for one markup document
    pub fn new(markup: SourceText) -> Self {
        Self {
            markup,
            style_sheets: Vec::new(),
        }
    }

    /// Add a supplied style sheet (builder pattern)
    pub fn with_style_sheet(mut self, sheet: SourceText) -> Self {
        self.style_sheets.push(sheet);
        self
    }

    /// Add a supplied style sheet
    pub fn add_style_sheet(&mut self, sheet: SourceText) {
        self.style_sheets.push(sheet);
    }

    /// Parse everything into an immutable model.
    ///
    /// Supplied sheets come first in the order they were added, followed by
    /// embedded `<style>` blocks in document order.
    pub fn build(&self) -> Result<StructuralModel, ParseError> {
        let markup_text = self.markup.text();
        let markup = parse_markup(&markup_text, &self.markup.path)?;

        let mut style_rules = Vec::new();
        let mut style_sheets = Vec::new();
        let mut conditional_blocks = Vec::new();

        for source in &self.style_sheets {
            let index = style_sheets.len();
            let parsed = parse_stylesheet(&source.text(), &source.path, index, SourceLocation::new(1, 1))?;
            let start = style_rules.len();
            style_rules.extend(parsed.rules);
            conditional_blocks.extend(parsed.conditional_blocks);
            style_sheets.push(StyleSheet {
                path: source.path.clone(),
                origin: SheetOrigin::Supplied,
                rules: start..style_rules.len(),
            });
        }

        for embedded in &markup.embedded_styles {
            let index = style_sheets.len();
            let parsed = parse_stylesheet(&embedded.content, &self.markup.path, index, embedded.location)?;
            let start = style_rules.len();
            style_rules.extend(parsed.rules);
            conditional_blocks.extend(parsed.conditional_blocks);
            style_sheets.push(StyleSheet {
                path: self.markup.path.clone(),
                origin: SheetOrigin::Embedded(embedded.element),
                rules: start..style_rules.len(),
            });
        }

        let selectors = markup
            .elements
            .iter()
            .map(|element| {
                let mut classes: Vec<String> = Vec::new();
                for token in element.get("class").unwrap_or_default().split_ascii_whitespace() {
                    if !classes.iter().any(|c| c == token) {
                        classes.push(token.to_string());
                    }
                }
                ElementSelectors {
                    classes,
                    id: element.non_empty("id").map(str::to_string),
                }
            })
            .collect();

        log::debug!(
            "{}: {} element(s), {} style rule(s) across {} sheet(s)",
            self.markup.path,
            markup.elements.len().saturating_sub(1),
            style_rules.len(),
            style_sheets.len()
        );

        Ok(StructuralModel::new(
            self.markup.path.clone(),
            markup.elements,
            selectors,
            style_rules,
            style_sheets,
            conditional_blocks,
            markup.suppressed_rules,
            markup.has_doctype,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_order_supplied_then_embedded() {
        let markup = "<html><head>\n<style>.inline { color: red }</style>\n</head><body></body></html>";
        let model = ModelBuilder::new(SourceText::new("index.html", markup))
            .with_style_sheet(SourceText::new("a.css", ".a { margin: 0 }"))
            .with_style_sheet(SourceText::new("b.css", ".b { margin: 0 } .c { margin: 0 }"))
            .build()
            .unwrap();

        let sheets = model.style_sheets();
        assert_eq!(sheets.len(), 3);
        assert_eq!(sheets[0].path, "a.css");
        assert_eq!(sheets[1].rules, 1..3);
        assert!(matches!(sheets[2].origin, SheetOrigin::Embedded(_)));
        assert_eq!(model.supplied_style_sheets().count(), 2);

        let selectors: Vec<_> = model.style_rules().map(|(_, r)| r.selector.as_str()).collect();
        assert_eq!(selectors, vec![".a", ".b", ".c", ".inline"]);
    }

    #[test]
    fn test_embedded_rule_locations_are_markup_positions() {
        let markup = "<head>\n  <style>\n    p { color: red }\n  </style>\n</head>";
        let model = ModelBuilder::new(SourceText::new("index.html", markup))
            .build()
            .unwrap();
        let (_, rule) = model.style_rules().next().unwrap();
        assert_eq!(rule.location, SourceLocation::new(3, 5));
    }

    #[test]
    fn test_classes_deduplicated_in_order() {
        let model = ModelBuilder::new(SourceText::new(
            "index.html",
            r#"<div class=" card  card--wide card " id=""></div>"#,
        ))
        .build()
        .unwrap();
        let (div, _) = model.elements_by_tag("div").next().unwrap();
        assert_eq!(model.classes(div), ["card", "card--wide"]);
        assert_eq!(model.element_id(div), None);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let bytes = b"<p>caf\xe9</p>".to_vec();
        let model = ModelBuilder::new(SourceText::new("index.html", bytes))
            .build()
            .unwrap();
        let (p, _) = model.elements_by_tag("p").next().unwrap();
        assert!(model.text_content(p).starts_with("caf"));
    }

    #[test]
    fn test_style_sheet_error_is_fatal() {
        let err = ModelBuilder::new(SourceText::new("index.html", "<p>x</p>"))
            .with_style_sheet(SourceText::new("broken.css", ".a { color: red"))
            .build()
            .unwrap_err();
        assert_eq!(err.path(), "broken.css");
    }

    #[test]
    fn test_build_is_repeatable() {
        let builder = ModelBuilder::new(SourceText::new("index.html", "<main><h1>Hi</h1></main>"));
        let first = builder.build().unwrap();
        let second = builder.build().unwrap();
        assert_eq!(first.element_count(), second.element_count());
    }
}
