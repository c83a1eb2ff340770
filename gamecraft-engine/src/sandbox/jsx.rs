//! JSX compilation
//!
//! The second sandbox gate. Turns component source into a plain JavaScript
//! factory expression:
//!
//! ```text
//! (function (h, Fragment, React, useState, ..., theme) {
//!     "use strict";
//!     var globalThis, window, document, ...;
//!     <compiled source>
//!     return typeof Game === "function" ? Game : undefined;
//! })
//! ```
//!
//! Everything the component may touch arrives as a parameter; the ambient
//! names are shadowed by local `var`s. The factory body is handed to the
//! engine's `Function` constructor, which parses it as a function body on
//! its own: syntax errors surface here and not at render time, and nothing
//! in the source can close the factory early or run at compile time.

use super::smoke::{function_from_body, SmokeRunner};
use crate::error::{self, Error};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// Parameters the factory receives, in order
pub const FACTORY_PARAMS: [&str; 10] = [
    "h",
    "Fragment",
    "React",
    "useState",
    "useEffect",
    "useRef",
    "useMemo",
    "useCallback",
    "useReducer",
    "theme",
];

const SHADOWED_GLOBALS: &str =
    "globalThis, window, document, self, parent, top, fetch, XMLHttpRequest, WebSocket, localStorage, sessionStorage, indexedDB, Function";

/// A compile failure with its position in the submitted source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileError {
    pub message: String,
    /// 1-based line and column, when the position is known
    pub position: Option<(usize, usize)>,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some((line, column)) => write!(f, "{}:{}: {}", line, column, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<CompileError> for Error {
    fn from(e: CompileError) -> Self {
        error::compile_failed(e.message, e.position)
    }
}

/// Turns component source into an executable factory expression
pub trait SourceCompiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<String, CompileError>;
}

/// The default compiler: JSX transform plus an engine parse check
#[derive(Debug, Clone, Default)]
pub struct JsxCompiler;

impl JsxCompiler {
    pub fn new() -> Self {
        Self
    }

    /// The transform alone, without the engine parse check
    pub fn transform(&self, source: &str) -> Result<String, CompileError> {
        let stripped = strip_exports(source);
        Transformer::new(&stripped).run()
    }
}

impl SourceCompiler for JsxCompiler {
    fn compile(&self, source: &str) -> Result<String, CompileError> {
        let body = factory_body(&self.transform(source)?);

        // Constructing the function parses the body; it never runs it
        let mut context = SmokeRunner::default().limited_context();
        function_from_body(&mut context, &FACTORY_PARAMS, &body).map_err(|e| engine_error(&e.to_string()))?;

        Ok(format!("(function ({}) {{{}}})", FACTORY_PARAMS.join(", "), body))
    }
}

fn factory_body(transformed: &str) -> String {
    // The prologue is one line, so source line N is body line N + 1
    format!(
        " \"use strict\"; var {};\n{}\nreturn typeof Game === \"function\" ? Game : undefined;\n",
        SHADOWED_GLOBALS, transformed
    )
}

static ENGINE_POSITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"line (\d+), col(?:umn)? (\d+)").unwrap_or_else(|e| panic!("invalid position pattern: {}", e))
});

fn engine_error(message: &str) -> CompileError {
    let position = ENGINE_POSITION.captures(message).and_then(|caps| {
        let line: usize = caps[1].parse().ok()?;
        let column: usize = caps[2].parse().ok()?;
        // The engine parses the body after a leading newline, one line
        // ahead of the prologue
        Some((line.saturating_sub(2).max(1), column))
    });
    CompileError {
        message: message.to_string(),
        position,
    }
}

/// Drop `export` / `export default` prefixes; a bare `export default Game;`
/// line is removed entirely. Line structure is preserved.
fn strip_exports(source: &str) -> String {
    source
        .split('\n')
        .map(|line| {
            let trimmed = line.trim_start();
            let indent = &line[..line.len() - trimmed.len()];
            if let Some(rest) = trimmed.strip_prefix("export default ") {
                let rest = rest.trim_start();
                if rest.starts_with("function") || rest.starts_with("class") {
                    format!("{}{}", indent, rest)
                } else {
                    String::new()
                }
            } else if let Some(rest) = trimmed.strip_prefix("export ") {
                format!("{}{}", indent, rest.trim_start())
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Transformer
// ============================================================================

/// Keywords after which an expression (and so JSX or a regex) may start
const EXPRESSION_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "do", "else", "in", "of", "new", "delete", "void", "throw", "yield",
    "await", "instanceof",
];

#[derive(PartialEq)]
enum Stop {
    Eof,
    /// Unbalanced `}`, consumed but not emitted
    Brace,
}

struct Transformer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    out: String,
}

impl Transformer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            out: String::with_capacity(source.len() + source.len() / 4),
        }
    }

    fn run(mut self) -> Result<String, CompileError> {
        self.js(Stop::Eof)?;
        Ok(self.out)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn copy(&mut self) -> Option<char> {
        let c = self.bump()?;
        self.out.push(c);
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError {
            message: message.into(),
            position: Some((self.line, self.column)),
        }
    }

    /// Run `f` with a fresh output buffer and return what it wrote
    fn capture(&mut self, f: impl FnOnce(&mut Self) -> Result<(), CompileError>) -> Result<String, CompileError> {
        let saved = std::mem::take(&mut self.out);
        let result = f(self);
        let captured = std::mem::replace(&mut self.out, saved);
        result.map(|_| captured)
    }

    // ------------------------------------------------------------------------
    // JavaScript
    // ------------------------------------------------------------------------

    fn js(&mut self, stop: Stop) -> Result<(), CompileError> {
        // Positions of the `{` still open at this level
        let mut open: Vec<(usize, usize)> = Vec::new();
        let mut expr_allowed = true;

        while let Some(c) = self.peek() {
            match c {
                '/' if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.copy();
                    }
                }
                '/' if self.peek_at(1) == Some('*') => {
                    let (line, column) = (self.line, self.column);
                    self.copy();
                    self.copy();
                    loop {
                        match self.peek() {
                            Some('*') if self.peek_at(1) == Some('/') => {
                                self.copy();
                                self.copy();
                                break;
                            }
                            Some(_) => {
                                self.copy();
                            }
                            None => {
                                return Err(CompileError {
                                    message: "unterminated block comment".into(),
                                    position: Some((line, column)),
                                })
                            }
                        }
                    }
                }
                '"' | '\'' => {
                    self.string(c)?;
                    expr_allowed = false;
                }
                '`' => {
                    self.template()?;
                    expr_allowed = false;
                }
                '/' if expr_allowed => {
                    self.regex()?;
                    expr_allowed = false;
                }
                '<' if expr_allowed && self.starts_element() => {
                    let element = self.element()?;
                    self.out.push_str(&element);
                    expr_allowed = false;
                }
                '{' => {
                    open.push((self.line, self.column));
                    self.copy();
                    expr_allowed = true;
                }
                '}' => {
                    if open.pop().is_none() {
                        if stop == Stop::Brace {
                            self.bump();
                            return Ok(());
                        }
                        return Err(self.error("unexpected `}`"));
                    }
                    self.copy();
                    // `{}/1` divides; a block followed by a regex literal is
                    // rare enough to spell with parentheses
                    expr_allowed = false;
                }
                ')' | ']' => {
                    self.copy();
                    expr_allowed = false;
                }
                c if is_ident_start(c) || c.is_ascii_digit() => {
                    let start = self.pos;
                    while self.peek().is_some_and(|c| is_ident_part(c) || (c == '.' && self.chars[start].is_ascii_digit())) {
                        self.copy();
                    }
                    let word: String = self.chars[start..self.pos].iter().collect();
                    expr_allowed = EXPRESSION_KEYWORDS.contains(&word.as_str());
                }
                c if c.is_whitespace() => {
                    self.copy();
                }
                _ => {
                    self.copy();
                    expr_allowed = true;
                }
            }
        }

        if stop == Stop::Brace {
            return Err(self.error("unterminated `{` expression"));
        }
        if let Some(&(line, column)) = open.last() {
            return Err(CompileError {
                message: "unclosed `{`".into(),
                position: Some((line, column)),
            });
        }
        Ok(())
    }

    fn string(&mut self, quote: char) -> Result<(), CompileError> {
        let (line, column) = (self.line, self.column);
        self.copy();
        loop {
            match self.peek() {
                Some('\\') => {
                    self.copy();
                    self.copy();
                }
                Some(c) if c == quote => {
                    self.copy();
                    return Ok(());
                }
                Some('\n') | None => {
                    return Err(CompileError {
                        message: "unterminated string literal".into(),
                        position: Some((line, column)),
                    })
                }
                Some(_) => {
                    self.copy();
                }
            }
        }
    }

    fn template(&mut self) -> Result<(), CompileError> {
        let (line, column) = (self.line, self.column);
        self.copy();
        loop {
            match self.peek() {
                Some('\\') => {
                    self.copy();
                    self.copy();
                }
                Some('`') => {
                    self.copy();
                    return Ok(());
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.copy();
                    self.copy();
                    self.js(Stop::Brace)?;
                    self.out.push('}');
                }
                Some(_) => {
                    self.copy();
                }
                None => {
                    return Err(CompileError {
                        message: "unterminated template literal".into(),
                        position: Some((line, column)),
                    })
                }
            }
        }
    }

    fn regex(&mut self) -> Result<(), CompileError> {
        let (line, column) = (self.line, self.column);
        self.copy();
        let mut in_class = false;
        loop {
            match self.peek() {
                Some('\\') => {
                    self.copy();
                    self.copy();
                }
                Some('[') => {
                    in_class = true;
                    self.copy();
                }
                Some(']') => {
                    in_class = false;
                    self.copy();
                }
                Some('/') if !in_class => {
                    self.copy();
                    while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
                        self.copy();
                    }
                    return Ok(());
                }
                Some('\n') | None => {
                    return Err(CompileError {
                        message: "unterminated regular expression".into(),
                        position: Some((line, column)),
                    })
                }
                Some(_) => {
                    self.copy();
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // JSX
    // ------------------------------------------------------------------------

    fn starts_element(&self) -> bool {
        matches!(self.peek_at(1), Some(c) if c == '>' || is_ident_start(c))
    }

    fn skip_markup_space(&mut self, newlines: &mut usize) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            if c == '\n' {
                *newlines += 1;
            }
            self.bump();
        }
    }

    fn tag_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_ident_part(c) || c == '.' || c == '-' || c == ':' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        name
    }

    /// Parse one element starting at `<` and return its `h(...)` call.
    /// Newlines inside markup are re-emitted before the closing paren so
    /// later line numbers still match the source.
    fn element(&mut self) -> Result<String, CompileError> {
        let (open_line, open_column) = (self.line, self.column);
        let mut newlines = 0usize;
        self.bump();
        self.skip_markup_space(&mut newlines);

        let name = self.tag_name();
        let tag = if name.is_empty() {
            "Fragment".to_string()
        } else if name.starts_with(|c: char| c.is_ascii_lowercase()) && !name.contains('.') {
            js_string(&name)
        } else {
            name.clone()
        };

        let mut groups: Vec<PropGroup> = Vec::new();
        let self_closing = loop {
            self.skip_markup_space(&mut newlines);
            match self.peek() {
                Some('/') if self.peek_at(1) == Some('>') => {
                    self.bump();
                    self.bump();
                    break true;
                }
                Some('>') => {
                    self.bump();
                    break false;
                }
                Some('{') => {
                    self.bump();
                    self.skip_markup_space(&mut newlines);
                    if !(self.peek() == Some('.') && self.peek_at(1) == Some('.') && self.peek_at(2) == Some('.')) {
                        return Err(self.error("expected `...` spread in attribute position"));
                    }
                    self.pos += 3;
                    self.column += 3;
                    let expr = self.capture(|t| t.js(Stop::Brace))?;
                    groups.push(PropGroup::Spread(expr));
                }
                Some(c) if is_ident_start(c) => {
                    let attr = self.tag_name();
                    self.skip_markup_space(&mut newlines);
                    let value = if self.peek() == Some('=') {
                        self.bump();
                        self.skip_markup_space(&mut newlines);
                        self.attribute_value(&mut newlines)?
                    } else {
                        "true".to_string()
                    };
                    match groups.last_mut() {
                        Some(PropGroup::Literal(props)) => props.push((attr, value)),
                        _ => groups.push(PropGroup::Literal(vec![(attr, value)])),
                    }
                }
                Some(c) => return Err(self.error(format!("unexpected `{}` in <{}> tag", c, name))),
                None => {
                    return Err(CompileError {
                        message: format!("unclosed <{}> tag", name),
                        position: Some((open_line, open_column)),
                    })
                }
            }
        };

        let mut children = Vec::new();
        if !self_closing {
            self.children(&name, open_line, open_column, &mut children, &mut newlines)?;
        }

        let mut call = format!("h({}, {}", tag, props_expr(&groups));
        for child in children {
            call.push_str(", ");
            call.push_str(&child);
        }
        for _ in 0..newlines {
            call.push('\n');
        }
        call.push(')');
        Ok(call)
    }

    fn attribute_value(&mut self, newlines: &mut usize) -> Result<String, CompileError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                let (line, column) = (self.line, self.column);
                self.bump();
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == quote => break,
                        Some(c) => {
                            if c == '\n' {
                                *newlines += 1;
                            }
                            value.push(c);
                        }
                        None => {
                            return Err(CompileError {
                                message: "unterminated attribute string".into(),
                                position: Some((line, column)),
                            })
                        }
                    }
                }
                Ok(js_string(&decode_entities(&value)))
            }
            Some('{') => {
                self.bump();
                let expr = self.capture(|t| t.js(Stop::Brace))?;
                if expr.trim().is_empty() {
                    return Err(self.error("empty expression in attribute value"));
                }
                Ok(format!("({})", expr))
            }
            Some('<') if self.starts_element() => self.element(),
            _ => Err(self.error("expected attribute value")),
        }
    }

    fn children(
        &mut self,
        name: &str,
        open_line: usize,
        open_column: usize,
        children: &mut Vec<String>,
        newlines: &mut usize,
    ) -> Result<(), CompileError> {
        loop {
            match self.peek() {
                Some('<') if self.peek_at(1) == Some('/') => {
                    self.bump();
                    self.bump();
                    self.skip_markup_space(newlines);
                    let closing = self.tag_name();
                    self.skip_markup_space(newlines);
                    if self.peek() != Some('>') {
                        return Err(self.error(format!("expected `>` to close </{}>", closing)));
                    }
                    self.bump();
                    if closing != name {
                        return Err(self.error(format!(
                            "mismatched closing tag: expected </{}>, found </{}>",
                            name, closing
                        )));
                    }
                    return Ok(());
                }
                Some('<') => {
                    let child = self.element()?;
                    children.push(child);
                }
                Some('{') => {
                    self.bump();
                    let expr = self.capture(|t| t.js(Stop::Brace))?;
                    if !is_blank_expression(&expr) {
                        children.push(format!("({})", expr));
                    } else {
                        *newlines += expr.matches('\n').count();
                    }
                }
                Some(_) => {
                    let mut text = String::new();
                    while let Some(c) = self.peek() {
                        if c == '<' || c == '{' {
                            break;
                        }
                        text.push(c);
                        self.bump();
                    }
                    *newlines += text.matches('\n').count();
                    let normalized = normalize_text(&text);
                    if !normalized.is_empty() {
                        children.push(js_string(&decode_entities(&normalized)));
                    }
                }
                None => {
                    return Err(CompileError {
                        message: format!("unclosed <{}> element", name),
                        position: Some((open_line, open_column)),
                    })
                }
            }
        }
    }
}

enum PropGroup {
    Literal(Vec<(String, String)>),
    Spread(String),
}

fn props_expr(groups: &[PropGroup]) -> String {
    let literal = |props: &[(String, String)]| {
        let fields: Vec<String> = props.iter().map(|(k, v)| format!("{}: {}", js_string(k), v)).collect();
        format!("{{{}}}", fields.join(", "))
    };
    match groups {
        [] => "null".to_string(),
        [PropGroup::Literal(props)] => literal(props),
        _ => {
            let parts: Vec<String> = groups
                .iter()
                .map(|g| match g {
                    PropGroup::Literal(props) => literal(props),
                    PropGroup::Spread(expr) => format!("({})", expr),
                })
                .collect();
            format!("Object.assign({{}}, {})", parts.join(", "))
        }
    }
}

/// JSX whitespace rules: lines are trimmed (except the outer edges of the
/// first and last line), blank lines dropped, the rest joined by one space.
fn normalize_text(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let last = lines.len() - 1;
    let mut kept = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let mut l = line.trim_end_matches('\r');
        if i != 0 {
            l = l.trim_start();
        }
        if i != last {
            l = l.trim_end();
        }
        if !l.is_empty() {
            kept.push(l);
        }
    }
    kept.join(" ")
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&nbsp;", "\u{a0}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&times;", "\u{d7}")
        .replace("&amp;", "&")
}

fn is_blank_expression(expr: &str) -> bool {
    let mut rest = expr.trim();
    while let Some(after) = rest.strip_prefix("/*") {
        match after.find("*/") {
            Some(end) => rest = after[end + 2..].trim_start(),
            None => return false,
        }
    }
    rest.is_empty()
}

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
