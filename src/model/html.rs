//! Markup parser
//!
//! A tolerant HTML tokenizer that builds the element arena. It accepts the
//! usual real-world shortcuts (void elements, unquoted attribute values,
//! unclosed elements, stray closing tags) and fails only on input it cannot
//! recover a tree from.

use super::{Element, ElementId, ParseError, SourceLocation};
use std::collections::BTreeSet;

/// Elements that never have content
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose content is read verbatim up to the closing tag
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Comment prefix that disables rules for the whole document
const SUPPRESSION_PREFIX: &str = "audit-disable";

/// Content of an embedded `<style>` element
#[derive(Debug, Clone)]
pub struct EmbeddedStyle {
    pub element: ElementId,
    pub content: String,
    /// Where the content starts in the markup
    pub location: SourceLocation,
}

/// Result of parsing one markup document
#[derive(Debug, Default)]
pub struct ParsedMarkup {
    /// Element arena, index 0 is the `#document` root
    pub elements: Vec<Element>,
    pub embedded_styles: Vec<EmbeddedStyle>,
    pub suppressed_rules: BTreeSet<String>,
    pub has_doctype: bool,
}

/// Parse markup into an element arena
pub fn parse_markup(content: &str, path: &str) -> Result<ParsedMarkup, ParseError> {
    MarkupParser::new(content, path).parse()
}

/// Check if a tag never has content or a closing tag
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

struct MarkupParser<'a> {
    src: &'a str,
    lower: String,
    path: &'a str,
    pos: usize,
    line_starts: Vec<usize>,
    elements: Vec<Element>,
    stack: Vec<ElementId>,
    embedded_styles: Vec<EmbeddedStyle>,
    suppressed_rules: BTreeSet<String>,
    has_doctype: bool,
}

impl<'a> MarkupParser<'a> {
    fn new(src: &'a str, path: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(src.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self {
            src,
            lower: src.to_ascii_lowercase(),
            path,
            pos: 0,
            line_starts,
            elements: vec![Element::new("#document", SourceLocation::new(1, 1))],
            stack: vec![ElementId(0)],
            embedded_styles: Vec::new(),
            suppressed_rules: BTreeSet::new(),
            has_doctype: false,
        }
    }

    fn parse(mut self) -> Result<ParsedMarkup, ParseError> {
        while self.pos < self.src.len() {
            let rest = &self.src[self.pos..];
            if rest.starts_with("<!--") {
                self.parse_comment()?;
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                self.parse_declaration()?;
            } else if rest.starts_with("</") && self.byte_at(self.pos + 2).is_ascii_alphabetic() {
                self.parse_end_tag()?;
            } else if rest.starts_with('<') && self.byte_at(self.pos + 1).is_ascii_alphabetic() {
                self.parse_start_tag()?;
            } else {
                self.parse_text();
            }
        }

        if self.stack.len() > 1 {
            log::debug!(
                "{}: {} element(s) still open at end of input, closing implicitly",
                self.path,
                self.stack.len() - 1
            );
        }

        Ok(ParsedMarkup {
            elements: self.elements,
            embedded_styles: self.embedded_styles,
            suppressed_rules: self.suppressed_rules,
            has_doctype: self.has_doctype,
        })
    }

    fn byte_at(&self, pos: usize) -> u8 {
        self.src.as_bytes().get(pos).copied().unwrap_or(0)
    }

    fn locate(&self, pos: usize) -> SourceLocation {
        let line = self.line_starts.partition_point(|&start| start <= pos);
        let column = pos - self.line_starts[line.saturating_sub(1)] + 1;
        SourceLocation::new(line, column)
    }

    fn current(&self) -> ElementId {
        self.stack.last().copied().unwrap_or(ElementId(0))
    }

    fn parse_comment(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        let body_start = start + 4;
        let Some(end) = self.src[body_start..].find("-->") else {
            let loc = self.locate(start);
            return Err(ParseError::UnterminatedComment {
                path: self.path.to_string(),
                line: loc.line,
                column: loc.column,
            });
        };

        let body = self.src[body_start..body_start + end].trim();
        if let Some(keys) = body.strip_prefix(SUPPRESSION_PREFIX) {
            for key in keys.split(|c: char| c == ',' || c.is_whitespace()) {
                if !key.is_empty() {
                    self.suppressed_rules.insert(key.to_string());
                }
            }
        }

        self.pos = body_start + end + 3;
        Ok(())
    }

    /// `<!DOCTYPE ...>`, `<![CDATA[...]]>`, `<?xml ...?>`
    fn parse_declaration(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        let Some(end) = self.src[start..].find('>') else {
            let loc = self.locate(start);
            return Err(ParseError::UnterminatedTag {
                path: self.path.to_string(),
                tag: "!".to_string(),
                line: loc.line,
                column: loc.column,
            });
        };

        if self.lower[start..].starts_with("<!doctype") {
            self.has_doctype = true;
        }
        self.pos = start + end + 1;
        Ok(())
    }

    fn read_name(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.src.len() {
            let b = self.byte_at(self.pos);
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.') {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.src[start..self.pos].to_ascii_lowercase()
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.src.len() && self.byte_at(self.pos).is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn unterminated_tag(&self, tag: &str, start: usize) -> ParseError {
        let loc = self.locate(start);
        ParseError::UnterminatedTag {
            path: self.path.to_string(),
            tag: tag.to_string(),
            line: loc.line,
            column: loc.column,
        }
    }

    fn parse_start_tag(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.pos += 1;
        let tag = self.read_name();
        let mut element = Element::new(&tag, self.locate(start));
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            if self.pos >= self.src.len() {
                return Err(self.unterminated_tag(&tag, start));
            }

            match self.byte_at(self.pos) {
                b'>' => {
                    self.pos += 1;
                    break;
                }
                b'/' if self.byte_at(self.pos + 1) == b'>' => {
                    self_closing = true;
                    self.pos += 2;
                    break;
                }
                b'/' => {
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }

            let (name, value) = self.parse_attribute(&tag, start)?;
            if name.is_empty() {
                continue;
            }
            if element.has(&name) {
                log::warn!(
                    "{}:{}: duplicate attribute '{}' on <{}>, keeping the first",
                    self.path,
                    element.location,
                    name,
                    tag
                );
                continue;
            }
            element.attributes.push((name, value));
        }

        let parent = self.current();
        element.parent = Some(parent);
        let id = ElementId(self.elements.len());
        self.elements.push(element);
        self.elements[parent.0].children.push(id);

        if is_void_element(&tag) || self_closing {
            return Ok(());
        }

        if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
            return self.parse_raw_text(id, &tag, start);
        }

        self.stack.push(id);
        Ok(())
    }

    fn parse_attribute(&mut self, tag: &str, tag_start: usize) -> Result<(String, String), ParseError> {
        let name_start = self.pos;
        while self.pos < self.src.len() {
            let b = self.byte_at(self.pos);
            if b.is_ascii_whitespace() || matches!(b, b'=' | b'>' | b'/') {
                break;
            }
            self.pos += 1;
        }

        if self.pos == name_start {
            // Stray '=' or similar: skip one byte and carry on
            self.pos += 1;
            return Ok((String::new(), String::new()));
        }

        let name = self.src[name_start..self.pos].to_ascii_lowercase();
        self.skip_whitespace();

        if self.byte_at(self.pos) != b'=' {
            return Ok((name, String::new()));
        }

        self.pos += 1;
        self.skip_whitespace();
        if self.pos >= self.src.len() {
            return Err(self.unterminated_tag(tag, tag_start));
        }

        let quote = self.byte_at(self.pos);
        let value = if quote == b'"' || quote == b'\'' {
            let value_start = self.pos + 1;
            let Some(end) = self.src[value_start..].find(quote as char) else {
                let loc = self.locate(name_start);
                return Err(ParseError::UnterminatedAttribute {
                    path: self.path.to_string(),
                    attribute: name,
                    line: loc.line,
                    column: loc.column,
                });
            };
            self.pos = value_start + end + 1;
            decode_entities(&self.src[value_start..value_start + end])
        } else {
            let value_start = self.pos;
            while self.pos < self.src.len() {
                let b = self.byte_at(self.pos);
                if b.is_ascii_whitespace() || b == b'>' {
                    break;
                }
                self.pos += 1;
            }
            decode_entities(&self.src[value_start..self.pos])
        };

        Ok((name, value))
    }

    fn parse_raw_text(&mut self, id: ElementId, tag: &str, start: usize) -> Result<(), ParseError> {
        let content_start = self.pos;
        let closing = format!("</{}", tag);
        let Some(offset) = self.lower[content_start..].find(&closing) else {
            let loc = self.locate(start);
            let path = self.path.to_string();
            return Err(if tag == "style" {
                ParseError::UnterminatedStyleBlock {
                    path,
                    line: loc.line,
                    column: loc.column,
                }
            } else {
                ParseError::UnterminatedRawText {
                    path,
                    tag: tag.to_string(),
                    line: loc.line,
                    column: loc.column,
                }
            });
        };

        let content_end = content_start + offset;
        let content = &self.src[content_start..content_end];

        match tag {
            "style" => self.embedded_styles.push(EmbeddedStyle {
                element: id,
                content: content.to_string(),
                location: self.locate(content_start),
            }),
            "title" | "textarea" => {
                let text = collapse_whitespace(&decode_entities(content));
                if !text.is_empty() {
                    self.elements[id.0].push_text(&text);
                }
            }
            _ => {}
        }

        let Some(close) = self.src[content_end..].find('>') else {
            return Err(self.unterminated_tag(tag, content_end));
        };
        self.pos = content_end + close + 1;
        Ok(())
    }

    fn parse_end_tag(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.pos += 2;
        let tag = self.read_name();
        let Some(close) = self.src[self.pos..].find('>') else {
            return Err(self.unterminated_tag(&tag, start));
        };
        self.pos += close + 1;

        if is_void_element(&tag) {
            // `</br>` and friends carry no structure
            return Ok(());
        }

        let open = self
            .stack
            .iter()
            .rposition(|id| id.0 != 0 && self.elements[id.0].tag == tag);

        match open {
            Some(index) => {
                let implicit = self.stack.len() - 1 - index;
                if implicit > 0 {
                    log::warn!(
                        "{}:{}: </{}> implicitly closes {} element(s)",
                        self.path,
                        self.locate(start),
                        tag,
                        implicit
                    );
                }
                self.stack.truncate(index);
                Ok(())
            }
            // Content still follows: drop the closer and keep building
            None if !self.src[self.pos..].trim().is_empty() => {
                log::warn!(
                    "{}:{}: stray </{}> has no open element, ignored",
                    self.path,
                    self.locate(start),
                    tag
                );
                Ok(())
            }
            // Nothing follows it: unrecoverable
            None => {
                let loc = self.locate(start);
                Err(ParseError::UnmatchedClosingTag {
                    path: self.path.to_string(),
                    tag,
                    line: loc.line,
                    column: loc.column,
                })
            }
        }
    }

    fn parse_text(&mut self) {
        let start = self.pos;
        // A '<' that does not open a tag is plain text
        let search_from = if self.byte_at(start) == b'<' { start + 1 } else { start };
        let end = self.src[search_from..]
            .find('<')
            .map(|i| search_from + i)
            .unwrap_or(self.src.len());
        self.pos = end;

        let text = collapse_whitespace(&decode_entities(&self.src[start..end]));
        if !text.is_empty() {
            let current = self.current();
            self.elements[current.0].push_text(&text);
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the common character references
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_reference(&rest[1..semi]).map(|c| (c, semi)));

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(&['x', 'X'][..]) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }

    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        "copy" => Some('©'),
        _ => None,
    }
}
