//! Static source policy
//!
//! The first sandbox gate. Runs on the raw component source before anything
//! is compiled, with comments and string contents masked out so prose cannot
//! trip a rule. Every violated rule is reported, not just the first.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    EntryPoint,
    Size,
    Network,
    DynamicEvaluation,
    Storage,
    AmbientGlobal,
    ModuleImport,
}

impl RuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::EntryPoint => "entry_point",
            RuleCategory::Size => "size",
            RuleCategory::Network => "network",
            RuleCategory::DynamicEvaluation => "dynamic_evaluation",
            RuleCategory::Storage => "storage",
            RuleCategory::AmbientGlobal => "ambient_global",
            RuleCategory::ModuleImport => "module_import",
        }
    }
}

/// One violated rule, with the first line it was seen on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub rule: &'static str,
    pub category: RuleCategory,
    pub line: Option<usize>,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {} ({})", line, self.message, self.category.as_str()),
            None => write!(f, "{} ({})", self.message, self.category.as_str()),
        }
    }
}

struct Rule {
    name: &'static str,
    category: RuleCategory,
    pattern: Regex,
    /// `obj.name` does not count as a use of the global `name`
    skip_member_access: bool,
    message: &'static str,
}

fn rule(
    name: &'static str,
    category: RuleCategory,
    pattern: &str,
    skip_member_access: bool,
    message: &'static str,
) -> Rule {
    Rule {
        name,
        category,
        // Patterns are literals in this file; a bad one is a programming error
        pattern: Regex::new(pattern).unwrap_or_else(|e| panic!("invalid policy pattern {}: {}", name, e)),
        skip_member_access,
        message,
    }
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    use RuleCategory::*;
    vec![
        rule("fetch", Network, r"\bfetch\s*\(", true, "network access via fetch"),
        rule("xhr", Network, r"\bXMLHttpRequest\b", false, "network access via XMLHttpRequest"),
        rule("websocket", Network, r"\bWebSocket\b", false, "network access via WebSocket"),
        rule("event_source", Network, r"\bEventSource\b", false, "network access via EventSource"),
        rule("beacon", Network, r"\bsendBeacon\b", false, "network access via sendBeacon"),
        rule("eval", DynamicEvaluation, r"\beval\s*\(", true, "dynamic evaluation via eval"),
        rule("new_function", DynamicEvaluation, r"\bnew\s+Function\b", false, "dynamic evaluation via new Function"),
        rule("function_ctor", DynamicEvaluation, r"\bFunction\s*\(", true, "dynamic evaluation via Function()"),
        rule("dynamic_import", DynamicEvaluation, r"\bimport\s*\(", true, "dynamic import()"),
        rule("require", DynamicEvaluation, r"\brequire\s*\(", true, "module loading via require()"),
        rule(
            "string_timer",
            DynamicEvaluation,
            r#"\bset(?:Timeout|Interval)\s*\(\s*["'`]"#,
            true,
            "timer with a string body",
        ),
        rule("local_storage", Storage, r"\blocalStorage\b", false, "persistent storage via localStorage"),
        rule("session_storage", Storage, r"\bsessionStorage\b", false, "persistent storage via sessionStorage"),
        rule("indexed_db", Storage, r"\bindexedDB\b", false, "persistent storage via indexedDB"),
        rule("cookie", Storage, r"\bdocument\s*\.\s*cookie\b", false, "persistent storage via document.cookie"),
        rule(
            "ambient_global",
            AmbientGlobal,
            r"\b(?:window|document|globalThis|self|parent|top|process)\s*(?:\.[A-Za-z_$]|\[)",
            true,
            "access to an ambient global",
        ),
        rule(
            "ambient_alias",
            AmbientGlobal,
            r"[=(,]\s*(?:window|document|globalThis|self|parent|top|process)\s*[;,)\n]",
            false,
            "aliasing an ambient global",
        ),
        rule(
            "import_statement",
            ModuleImport,
            r#"(?m)^\s*import\s*(?:[\w${*]|["'])"#,
            false,
            "module import statement (React and hooks are provided as identifiers)",
        ),
    ]
});

static ENTRY_POINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:export\s+(?:default\s+)?)?(?:function\s+Game\s*\(|(?:const|let)\s+Game\s*=)")
        .unwrap_or_else(|e| panic!("invalid entry point pattern: {}", e))
});

/// Static checks over component source
#[derive(Debug, Clone)]
pub struct SourcePolicy {
    pub max_lines: usize,
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self {
            max_lines: super::MAX_SOURCE_LINES,
        }
    }
}

impl SourcePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the source; an empty result means the gate passed
    pub fn check(&self, source: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        let code = mask_literals(source);

        if !ENTRY_POINT.is_match(&code) {
            violations.push(Violation {
                rule: "entry_point",
                category: RuleCategory::EntryPoint,
                line: None,
                message: "no `function Game(` or `const Game =` entry point".into(),
            });
        }

        let lines = source.lines().count();
        if lines > self.max_lines {
            violations.push(Violation {
                rule: "max_lines",
                category: RuleCategory::Size,
                line: None,
                message: format!("{} lines exceeds the ceiling of {}", lines, self.max_lines),
            });
        }

        for rule in RULES.iter() {
            let hit = rule.pattern.find_iter(&code).find(|m| {
                !(rule.skip_member_access && code[..m.start()].trim_end().ends_with('.'))
            });
            if let Some(m) = hit {
                violations.push(Violation {
                    rule: rule.name,
                    category: rule.category,
                    line: Some(line_of(&code, m.start())),
                    message: rule.message.into(),
                });
            }
        }

        violations
    }
}

fn line_of(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count() + 1
}

/// Blank out comments and string/template text, keeping delimiters, newlines
/// and template `${}` expressions so offsets and lines still line up.
fn mask_literals(source: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum Mode {
        Code,
        LineComment,
        BlockComment,
        Quoted(char),
        Template,
    }

    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut mode = Mode::Code;
    let mut depth = 0usize;
    let mut resume: Vec<usize> = Vec::new();
    let blank = |c: char| if c == '\n' { '\n' } else { ' ' };

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match mode {
            Mode::Code => match c {
                '/' if next == Some('/') => {
                    mode = Mode::LineComment;
                    out.push_str("  ");
                    i += 2;
                    continue;
                }
                '/' if next == Some('*') => {
                    mode = Mode::BlockComment;
                    out.push_str("  ");
                    i += 2;
                    continue;
                }
                '"' | '\'' => {
                    mode = Mode::Quoted(c);
                    out.push(c);
                }
                '`' => {
                    mode = Mode::Template;
                    out.push(c);
                }
                '{' => {
                    depth += 1;
                    out.push(c);
                }
                '}' => {
                    if resume.last() == Some(&depth) {
                        resume.pop();
                        mode = Mode::Template;
                    }
                    depth = depth.saturating_sub(1);
                    out.push(c);
                }
                _ => out.push(c),
            },
            Mode::LineComment => {
                if c == '\n' {
                    mode = Mode::Code;
                }
                out.push(blank(c));
            }
            Mode::BlockComment => {
                if c == '*' && next == Some('/') {
                    mode = Mode::Code;
                    out.push_str("  ");
                    i += 2;
                    continue;
                }
                out.push(blank(c));
            }
            Mode::Quoted(quote) => {
                if c == '\\' {
                    out.push(' ');
                    if let Some(n) = next {
                        out.push(blank(n));
                    }
                    i += 2;
                    continue;
                }
                if c == quote || c == '\n' {
                    mode = Mode::Code;
                    out.push(c);
                } else {
                    out.push(blank(c));
                }
            }
            Mode::Template => {
                if c == '\\' {
                    out.push(' ');
                    if let Some(n) = next {
                        out.push(blank(n));
                    }
                    i += 2;
                    continue;
                }
                if c == '`' {
                    mode = Mode::Code;
                    out.push(c);
                } else if c == '$' && next == Some('{') {
                    depth += 1;
                    resume.push(depth);
                    mode = Mode::Code;
                    out.push_str("${");
                    i += 2;
                    continue;
                } else {
                    out.push(blank(c));
                }
            }
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules_hit(source: &str) -> Vec<&'static str> {
        SourcePolicy::new().check(source).into_iter().map(|v| v.rule).collect()
    }

    #[test]
    fn test_clean_component_passes() {
        let source = r#"
function Game({ config, onComplete }) {
  const [score, setScore] = useState(0);
  // fetch is not available here, and that's fine
  const label = "Open the window";
  return <div style={{ top: 0 }} onClick={() => onComplete(score)}>{label}</div>;
}
"#;
        assert!(SourcePolicy::new().check(source).is_empty(), "{:?}", SourcePolicy::new().check(source));
    }

    #[test]
    fn test_missing_entry_point() {
        assert_eq!(rules_hit("function Main() { return null; }"), vec!["entry_point"]);
        assert!(rules_hit("export default function Game() {}").is_empty());
        assert!(rules_hit("const Game = () => null;").is_empty());
    }

    #[test]
    fn test_every_category_reported() {
        let source = r#"import React from "react";
function Game() {
  fetch("/api");
  eval("1");
  const k = localStorage.getItem("k");
  window.alert("x");
  setTimeout("tick()", 10);
  return null;
}"#;
        let violations = SourcePolicy::new().check(source);
        let rules: Vec<_> = violations.iter().map(|v| v.rule).collect();
        for expected in ["fetch", "eval", "local_storage", "ambient_global", "string_timer", "import_statement"] {
            assert!(rules.contains(&expected), "missing {} in {:?}", expected, rules);
        }
        let fetch = violations.iter().find(|v| v.rule == "fetch").unwrap();
        assert_eq!(fetch.line, Some(3));
    }

    #[test]
    fn test_member_access_is_not_a_global() {
        assert!(rules_hit("function Game() { return api.fetch(1) + obj.self.x; }").is_empty());
        assert_eq!(rules_hit("function Game() { navigator.sendBeacon('/x'); }"), vec!["beacon"]);
    }

    #[test]
    fn test_template_expressions_are_scanned() {
        let hits = rules_hit("function Game() { return `${fetch('/x')}`; }");
        assert_eq!(hits, vec!["fetch"]);
        assert!(rules_hit("function Game() { return `fetch(later)`; }").is_empty());
    }

    #[test]
    fn test_line_ceiling() {
        let mut source = String::from("function Game() {\n");
        for i in 0..700 {
            source.push_str(&format!("  const v{} = {};\n", i, i));
        }
        source.push('}');
        assert_eq!(rules_hit(&source), vec!["max_lines"]);
    }
}
