//! Style sheet parser
//!
//! Tokenizes with `cssparser` and reads qualified rules and their
//! declarations, descending into `@media`, `@supports`, `@container` and
//! `@layer` blocks. Other block at-rules (`@keyframes`, `@font-face`,
//! `@page`) are skipped whole.
//!
//! Only an unclosed comment or a block left open at end of input is fatal;
//! everything else is recovered from with a warning.

use super::{ConditionKind, ConditionalBlock, Declaration, ParseError, SelectorList, SourceLocation, StyleRule};
use cssparser::{Delimiter, ParseError as CssParseError, Parser, ParserInput, SourcePosition, Token};

/// Blocks nested deeper than this are not scanned for unclosed comments
const MAX_CHECKED_DEPTH: usize = 64;

/// Rules and conditional blocks of one style sheet
#[derive(Debug, Default)]
pub struct ParsedSheet {
    pub rules: Vec<StyleRule>,
    pub conditional_blocks: Vec<ConditionalBlock>,
}

/// Parse a style sheet.
///
/// `origin` is where the sheet's first byte sits in its artifact, so rules
/// of an embedded `<style>` block report markup positions.
pub fn parse_stylesheet(
    content: &str,
    path: &str,
    sheet: usize,
    origin: SourceLocation,
) -> Result<ParsedSheet, ParseError> {
    let mut sheet_parser = SheetParser::new(content, path, sheet, origin);

    let mut input = ParserInput::new(content);
    sheet_parser.check_structure(&mut Parser::new(&mut input), 0)?;

    let mut input = ParserInput::new(content);
    sheet_parser.parse_rule_list(&mut Parser::new(&mut input), &mut Vec::new());

    Ok(ParsedSheet {
        rules: sheet_parser.rules,
        conditional_blocks: sheet_parser.conditional_blocks,
    })
}

struct SheetParser<'a> {
    path: &'a str,
    sheet: usize,
    origin: SourceLocation,
    line_starts: Vec<usize>,
    rules: Vec<StyleRule>,
    conditional_blocks: Vec<ConditionalBlock>,
}

impl<'a> SheetParser<'a> {
    fn new(content: &str, path: &'a str, sheet: usize, origin: SourceLocation) -> Self {
        let line_starts = std::iter::once(0)
            .chain(content.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self {
            path,
            sheet,
            origin,
            line_starts,
            rules: Vec::new(),
            conditional_blocks: Vec::new(),
        }
    }

    fn locate(&self, pos: SourcePosition) -> SourceLocation {
        let pos = pos.byte_index();
        let line = self.line_starts.partition_point(|&start| start <= pos).max(1);
        let column = pos - self.line_starts[line - 1] + 1;
        if line == 1 {
            SourceLocation::new(self.origin.line, self.origin.column + column - 1)
        } else {
            SourceLocation::new(self.origin.line + line - 1, column)
        }
    }

    fn error_at(
        &self,
        pos: SourcePosition,
        make: impl FnOnce(String, usize, usize) -> ParseError,
    ) -> ParseError {
        let loc = self.locate(pos);
        make(self.path.to_string(), loc.line, loc.column)
    }

    /// Find unclosed comments and top-level blocks left open at end of input.
    ///
    /// An unclosed inner block runs to end of input, so its outermost
    /// enclosing block is the one reported.
    fn check_structure<'i, 't>(&self, input: &mut Parser<'i, 't>, depth: usize) -> Result<(), ParseError> {
        let mut prelude_start = None;
        loop {
            let start = input.position();
            let token = match input.next_including_whitespace_and_comments() {
                Ok(token) => token.clone(),
                Err(_) => return Ok(()),
            };

            match token {
                Token::WhiteSpace(_) => continue,
                Token::Comment(_) => {
                    let text = input.slice_from(start);
                    if text.len() < 4 || !text.ends_with("*/") {
                        return Err(self.error_at(start, |path, line, column| {
                            ParseError::UnterminatedComment { path, line, column }
                        }));
                    }
                    continue;
                }
                Token::Semicolon | Token::CloseCurlyBracket => {
                    prelude_start = None;
                    continue;
                }
                _ => {}
            }

            let opens_block = matches!(
                token,
                Token::CurlyBracketBlock
                    | Token::Function(_)
                    | Token::ParenthesisBlock
                    | Token::SquareBracketBlock
            );
            if !opens_block {
                prelude_start.get_or_insert(start);
                continue;
            }
            if depth >= MAX_CHECKED_DEPTH {
                log::debug!("{}:{}: nesting too deep, not scanned", self.path, self.locate(start));
                continue;
            }

            let mut inner: Result<(), ParseError> = Ok(());
            let mut inner_end = None;
            let _ = input.parse_nested_block(|block| {
                inner = self.check_structure(block, depth + 1);
                inner_end = Some(block.position().byte_index());
                Ok::<(), CssParseError<'i, ()>>(())
            });
            inner?;

            if matches!(token, Token::CurlyBracketBlock) {
                let block_start = prelude_start.take().unwrap_or(start);
                // A closed block leaves the outer parser past its '}'
                let closed = inner_end.is_some_and(|end| input.position().byte_index() > end);
                if depth == 0 && !closed {
                    return Err(self.error_at(block_start, |path, line, column| {
                        ParseError::UnterminatedStyleBlock { path, line, column }
                    }));
                }
            } else {
                prelude_start.get_or_insert(start);
            }
        }
    }

    /// Parse rules until the end of the current block
    fn parse_rule_list<'i, 't>(&mut self, input: &mut Parser<'i, 't>, conditions: &mut Vec<String>) {
        loop {
            input.skip_whitespace();
            let start = input.state();
            let token = match input.next() {
                Ok(token) => token.clone(),
                Err(_) => return,
            };

            match token {
                Token::AtKeyword(name) => {
                    let name = name.to_ascii_lowercase();
                    self.parse_at_rule(input, &name, start.position(), conditions);
                }
                Token::Semicolon | Token::CDO | Token::CDC => {}
                Token::CloseCurlyBracket => {
                    log::warn!("{}:{}: stray '}}' ignored", self.path, self.locate(start.position()));
                }
                _ => {
                    input.reset(&start);
                    self.parse_qualified_rule(input, conditions);
                }
            }
        }
    }

    fn parse_at_rule<'i, 't>(
        &mut self,
        input: &mut Parser<'i, 't>,
        name: &str,
        start: SourcePosition,
        conditions: &mut Vec<String>,
    ) {
        let prelude_start = input.position();
        loop {
            let before = input.position();
            let token = match input.next() {
                Ok(token) => token.clone(),
                // Statement at-rule running to the end of its block
                Err(_) => return,
            };

            match token {
                Token::Semicolon => return,
                Token::CurlyBracketBlock => {
                    let prelude = clean_text(input.slice(prelude_start..before));
                    let kind = match name {
                        "media" => Some(ConditionKind::Media),
                        "supports" => Some(ConditionKind::Supports),
                        "container" => Some(ConditionKind::Container),
                        _ => None,
                    };

                    match kind {
                        Some(kind) => {
                            self.conditional_blocks.push(ConditionalBlock {
                                kind,
                                condition: prelude.clone(),
                                location: self.locate(start),
                                sheet: self.sheet,
                            });
                            conditions.push(prelude);
                            self.parse_nested_rule_list(input, conditions);
                            conditions.pop();
                        }
                        None if name == "layer" => self.parse_nested_rule_list(input, conditions),
                        // The tokenizer skips the unread block on the next call
                        None => log::trace!("{}:{}: skipping @{} block", self.path, self.locate(start), name),
                    }
                    return;
                }
                _ => {}
            }
        }
    }

    fn parse_nested_rule_list<'i, 't>(&mut self, input: &mut Parser<'i, 't>, conditions: &mut Vec<String>) {
        let _ = input.parse_nested_block(|block| {
            self.parse_rule_list(block, conditions);
            Ok::<(), CssParseError<'i, ()>>(())
        });
    }

    fn parse_qualified_rule<'i, 't>(&mut self, input: &mut Parser<'i, 't>, conditions: &[String]) {
        let start = input.position();
        loop {
            let before = input.state();
            let token = match input.next() {
                Ok(token) => token.clone(),
                Err(_) => {
                    log::warn!(
                        "{}:{}: trailing text without a declaration block ignored",
                        self.path,
                        self.locate(start)
                    );
                    return;
                }
            };

            match token {
                Token::CurlyBracketBlock => {
                    let selector = clean_text(input.slice(start..before.position()));
                    let declarations = input
                        .parse_nested_block(|block| {
                            Ok::<_, CssParseError<'i, ()>>(self.parse_declarations(block))
                        })
                        .unwrap_or_default();

                    self.rules.push(StyleRule {
                        selectors: SelectorList::parse(&selector),
                        selector,
                        declarations,
                        location: self.locate(start),
                        sheet: self.sheet,
                        conditions: conditions.to_vec(),
                    });
                    return;
                }
                Token::CloseCurlyBracket => {
                    input.reset(&before);
                    log::warn!(
                        "{}:{}: text without a declaration block ignored",
                        self.path,
                        self.locate(start)
                    );
                    return;
                }
                _ => {}
            }
        }
    }

    fn parse_declarations<'i, 't>(&self, input: &mut Parser<'i, 't>) -> Vec<Declaration> {
        let mut declarations = Vec::new();
        loop {
            input.skip_whitespace();
            if input.is_exhausted() {
                return declarations;
            }
            if input.try_parse(|i| i.expect_semicolon()).is_ok() {
                continue;
            }

            let start = input.position();
            let parsed = input.parse_until_after(Delimiter::Semicolon, |input| {
                parse_declaration(input).map(|(property, value, important)| Declaration {
                    property,
                    value,
                    important,
                    location: self.locate(start),
                })
            });

            match parsed {
                Ok(declaration) => declarations.push(declaration),
                Err(_) => log::warn!(
                    "{}:{}: malformed declaration '{}' ignored",
                    self.path,
                    self.locate(start),
                    clean_text(input.slice_from(start).trim_end_matches(';'))
                ),
            }
        }
    }
}

/// `property: value [!important]` up to the end of the delimited input
fn parse_declaration<'i, 't>(input: &mut Parser<'i, 't>) -> Result<(String, String, bool), CssParseError<'i, ()>> {
    let property = input.expect_ident()?.to_ascii_lowercase();
    input.expect_colon()?;

    let value_start = input.position();
    let mut bang = None;
    loop {
        let before = input.position();
        let token = match input.next() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        bang = match token {
            Token::Delim('!') if input.try_parse(|i| i.expect_ident_matching("important")).is_ok() => {
                Some(before)
            }
            _ => None,
        };
    }

    let value_end = bang.unwrap_or_else(|| input.position());
    let value = clean_text(input.slice(value_start..value_end));
    Ok((property, value, bang.is_some()))
}

/// Source text with comments dropped and whitespace collapsed
fn clean_text(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(open) = rest.find("/*") {
        text.push_str(&rest[..open]);
        text.push(' ');
        rest = match rest[open + 2..].find("*/") {
            Some(close) => &rest[open + 2 + close + 2..],
            None => "",
        };
    }
    text.push_str(rest);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
