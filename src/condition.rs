//! Condition expressions for declarative rules
//!
//! A condition is evaluated against one element:
//!
//! ```text
//! attributes.tabindex && greaterThan(attributes.tabindex, 0)
//! name == 'img' && !attributes.alt
//! hasAncestor('form') && !attributes.type
//! attributes.src =~ /(?i)\.bmp$/
//! ```
//!
//! Supported: `attributes.X` (presence), `name`, `text`, `==`, `!=`,
//! `=~ /re/`, `!`, `&&`, `||`, parentheses, `hasChild('tag')`,
//! `hasAncestor('tag')`, `hasClass('c')`, `isEmpty(path)` and
//! `greaterThan(path, n)`.

use crate::model::{ElementId, StructuralModel};
use regex::Regex;
use thiserror::Error;

/// Error compiling a condition expression
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("empty expression")]
    Empty,

    #[error("unknown value path '{0}'")]
    UnknownPath(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{function}' expects {expected} argument(s)")]
    Arity { function: String, expected: usize },

    #[error("'{0}' is not a number")]
    InvalidNumber(String),

    #[error("invalid regex /{pattern}/: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A value read from an element
#[derive(Debug, Clone, PartialEq, Eq)]
enum ValuePath {
    Attribute(String),
    Name,
    Text,
}

impl ValuePath {
    fn parse(s: &str) -> Result<Self, ConditionError> {
        let s = s.trim();
        if let Some(attr) = s.strip_prefix("attributes.") {
            if !attr.is_empty() {
                return Ok(ValuePath::Attribute(attr.to_ascii_lowercase()));
            }
        }
        match s {
            "name" | "tag" => Ok(ValuePath::Name),
            "text" => Ok(ValuePath::Text),
            _ => Err(ConditionError::UnknownPath(s.to_string())),
        }
    }

    fn get(&self, model: &StructuralModel, id: ElementId) -> Option<String> {
        let element = model.element(id);
        match self {
            ValuePath::Attribute(name) => element.get(name).map(String::from),
            ValuePath::Name => Some(element.tag.clone()),
            ValuePath::Text => Some(model.text_content(id)).filter(|t| !t.is_empty()),
        }
    }
}

#[derive(Debug)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Eq(ValuePath, String),
    Ne(ValuePath, String),
    Matches(ValuePath, Regex),
    HasChild(String),
    HasAncestor(String),
    HasClass(String),
    IsEmpty(ValuePath),
    GreaterThan(ValuePath, f64),
    Exists(ValuePath),
    Literal(bool),
}

/// A compiled condition expression
#[derive(Debug)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    /// Parse a condition expression
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        Ok(Self {
            source: source.to_string(),
            expr: parse_expr(source)?,
        })
    }

    /// The expression as written
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against one element
    pub fn evaluate(&self, model: &StructuralModel, id: ElementId) -> bool {
        eval(&self.expr, model, id)
    }
}

fn parse_expr(condition: &str) -> Result<Expr, ConditionError> {
    let condition = condition.trim();
    if condition.is_empty() {
        return Err(ConditionError::Empty);
    }

    if let Some(idx) = find_logical_operator(condition, "||") {
        return Ok(Expr::Or(
            Box::new(parse_expr(&condition[..idx])?),
            Box::new(parse_expr(&condition[idx + 2..])?),
        ));
    }

    if let Some(idx) = find_logical_operator(condition, "&&") {
        return Ok(Expr::And(
            Box::new(parse_expr(&condition[..idx])?),
            Box::new(parse_expr(&condition[idx + 2..])?),
        ));
    }

    if let Some(rest) = condition.strip_prefix('!') {
        if !rest.starts_with('=') {
            return Ok(Expr::Not(Box::new(parse_expr(rest)?)));
        }
    }

    if condition.starts_with('(') && condition.ends_with(')') {
        return parse_expr(&condition[1..condition.len() - 1]);
    }

    if let Some(idx) = condition.find("=~") {
        let path = ValuePath::parse(&condition[..idx])?;
        let raw = condition[idx + 2..].trim();
        let pattern = raw
            .strip_prefix('/')
            .and_then(|p| p.strip_suffix('/'))
            .unwrap_or(raw);
        let regex = Regex::new(pattern).map_err(|source| ConditionError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })?;
        return Ok(Expr::Matches(path, regex));
    }

    if let Some(idx) = condition.find("!=") {
        let path = ValuePath::parse(&condition[..idx])?;
        return Ok(Expr::Ne(path, unquote(&condition[idx + 2..]).to_string()));
    }

    if let Some(idx) = condition.find("==") {
        let path = ValuePath::parse(&condition[..idx])?;
        return Ok(Expr::Eq(path, unquote(&condition[idx + 2..]).to_string()));
    }

    if let Some(open) = condition.find('(') {
        if condition.ends_with(')') {
            let function = condition[..open].trim();
            let args: Vec<&str> = split_arguments(&condition[open + 1..condition.len() - 1]);
            return parse_function(function, &args);
        }
    }

    match condition {
        "true" => Ok(Expr::Literal(true)),
        "false" => Ok(Expr::Literal(false)),
        _ => Ok(Expr::Exists(ValuePath::parse(condition)?)),
    }
}

fn parse_function(function: &str, args: &[&str]) -> Result<Expr, ConditionError> {
    let expect = |expected: usize| {
        if args.len() == expected {
            Ok(())
        } else {
            Err(ConditionError::Arity {
                function: function.to_string(),
                expected,
            })
        }
    };

    match function {
        "hasChild" => {
            expect(1)?;
            Ok(Expr::HasChild(unquote(args[0]).to_ascii_lowercase()))
        }
        "hasAncestor" => {
            expect(1)?;
            Ok(Expr::HasAncestor(unquote(args[0]).to_ascii_lowercase()))
        }
        "hasClass" => {
            expect(1)?;
            Ok(Expr::HasClass(unquote(args[0]).to_string()))
        }
        "isEmpty" => {
            expect(1)?;
            Ok(Expr::IsEmpty(ValuePath::parse(args[0])?))
        }
        "greaterThan" => {
            expect(2)?;
            let raw = unquote(args[1]);
            let n = raw
                .parse::<f64>()
                .map_err(|_| ConditionError::InvalidNumber(raw.to_string()))?;
            Ok(Expr::GreaterThan(ValuePath::parse(args[0])?, n))
        }
        other => Err(ConditionError::UnknownFunction(other.to_string())),
    }
}

fn eval(expr: &Expr, model: &StructuralModel, id: ElementId) -> bool {
    match expr {
        Expr::Or(a, b) => eval(a, model, id) || eval(b, model, id),
        Expr::And(a, b) => eval(a, model, id) && eval(b, model, id),
        Expr::Not(e) => !eval(e, model, id),
        Expr::Eq(path, expected) => path.get(model, id).is_some_and(|v| &v == expected),
        Expr::Ne(path, expected) => path.get(model, id).is_none_or(|v| &v != expected),
        Expr::Matches(path, re) => path.get(model, id).is_some_and(|v| re.is_match(&v)),
        Expr::HasChild(tag) => model
            .element(id)
            .children
            .iter()
            .any(|c| tag == "*" || &model.element(*c).tag == tag),
        Expr::HasAncestor(tag) => model.ancestors(id).any(|a| &model.element(a).tag == tag),
        Expr::HasClass(class) => model.classes(id).iter().any(|c| c == class),
        Expr::IsEmpty(path) => path.get(model, id).is_none_or(|v| v.trim().is_empty()),
        Expr::GreaterThan(path, n) => path
            .get(model, id)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .is_some_and(|v| v > *n),
        Expr::Exists(path) => path.get(model, id).is_some(),
        Expr::Literal(value) => *value,
    }
}

/// Substitute `{name}`, `{text}` and `{attributes.X}` placeholders
pub fn format_message(template: &str, model: &StructuralModel, id: ElementId) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            result.push_str(&rest[open..]);
            return result;
        };

        let placeholder = &after[..close];
        match ValuePath::parse(placeholder) {
            Ok(path) => {
                let value = path.get(model, id);
                result.push_str(value.as_deref().unwrap_or("(unknown)"));
            }
            Err(_) => {
                result.push('{');
                result.push_str(placeholder);
                result.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    result.push_str(rest);
    result
}

/// Byte position of a logical operator at parenthesis depth zero,
/// outside quoted strings and `/regex/` literals
fn find_logical_operator(s: &str, op: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => quote = Some(c),
            '/' if s[..i].trim_end().ends_with("=~") => quote = Some('/'),
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }

        if depth == 0 && s[i..].starts_with(op) {
            return Some(i);
        }
    }

    None
}

fn split_arguments(s: &str) -> Vec<&str> {
    if s.trim().is_empty() {
        return Vec::new();
    }
    let mut arguments = Vec::new();
    let mut rest = s;
    while let Some(comma) = find_logical_operator(rest, ",") {
        arguments.push(rest[..comma].trim());
        rest = &rest[comma + 1..];
    }
    arguments.push(rest.trim());
    arguments
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches('"').trim_matches('\'')
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

    fn first(model: &StructuralModel, tag: &str) -> ElementId {
        model.elements_by_tag(tag).next().unwrap().0
    }

    fn check(condition: &str, model: &StructuralModel, id: ElementId) -> bool {
        Condition::parse(condition).unwrap().evaluate(model, id)
    }

    #[test]
    fn test_find_logical_operator() {
        assert_eq!(find_logical_operator("a && b", "&&"), Some(2));
        assert_eq!(find_logical_operator("a || b", "||"), Some(2));
        assert_eq!(find_logical_operator("(a && b) || c", "||"), Some(9));
        assert_eq!(find_logical_operator("(a || b) && c", "&&"), Some(9));
        assert_eq!(find_logical_operator("(a || b)", "||"), None);
        assert_eq!(find_logical_operator("text == 'a || b'", "||"), None);
        assert_eq!(find_logical_operator("name =~ /a||b/", "||"), None);
    }

    #[test]
    fn test_attribute_presence_and_comparison() {
        let m = model(r#"<input type="text" name="q">"#);
        let input = first(&m, "input");
        assert!(check("attributes.type", &m, input));
        assert!(!check("attributes.id", &m, input));
        assert!(check("attributes.type == 'text'", &m, input));
        assert!(check("attributes.type != \"email\"", &m, input));
        assert!(check("attributes.id != 'x'", &m, input));
        assert!(check("name == input && !attributes.required", &m, input));
    }

    #[test]
    fn test_regex_and_grouping() {
        let m = model(r#"<img src="photos/HERO.BMP?v=2">"#);
        let img = first(&m, "img");
        assert!(check(r"attributes.src =~ /(?i)\.(bmp|tiff?)(\?.*)?$/", &m, img));
        assert!(check("(attributes.width || attributes.src) && !attributes.alt", &m, img));
        assert!(!check("!(attributes.src)", &m, img));
    }

    #[test]
    fn test_functions() {
        let m = model(
            r#"<form><div class="row"><button onclick="go()" tabindex="3"><span>Go</span></button><p></p></div></form>"#,
        );
        let button = first(&m, "button");
        let p = first(&m, "p");
        assert!(check("hasAncestor('form')", &m, button));
        assert!(check("hasChild('span')", &m, button));
        assert!(check("hasChild('*')", &m, button));
        assert!(!check("hasChild('img')", &m, button));
        assert!(check("greaterThan(attributes.tabindex, 0)", &m, button));
        assert!(!check("greaterThan(attributes.tabindex, 5)", &m, button));
        assert!(check("isEmpty(text)", &m, p));
        assert!(!check("isEmpty(text)", &m, button));
        assert!(check("hasClass('row')", &m, m.parent(button).unwrap()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Condition::parse(""), Err(ConditionError::Empty)));
        assert!(matches!(
            Condition::parse("attributes.src =~ /([a-z/"),
            Err(ConditionError::InvalidRegex { .. })
        ));
        assert!(matches!(
            Condition::parse("countChildren('li')"),
            Err(ConditionError::UnknownFunction(_))
        ));
        assert!(matches!(
            Condition::parse("greaterThan(attributes.x)"),
            Err(ConditionError::Arity { expected: 2, .. })
        ));
        assert!(matches!(
            Condition::parse("kind == 'element'"),
            Err(ConditionError::UnknownPath(_))
        ));
    }

    #[test]
    fn test_format_message() {
        let m = model(r#"<img src="a.png" class="hero">"#);
        let img = first(&m, "img");
        assert_eq!(
            format_message("<{name}> '{attributes.src}' lacks {attributes.alt} {x}", &m, img),
            "<img> 'a.png' lacks (unknown) {x}"
        );
    }
}
