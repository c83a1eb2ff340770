//! # Edit Engine
//!
//! Applies model-proposed edits to component source. Edits are anchored on
//! text rather than line numbers, so a stale view of the source produces a
//! per-operation error instead of a silently misplaced change.

use crate::error::{self, Error};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditOperation {
    /// Replace the single occurrence of `search`
    Replace { search: String, replace: String },
    /// Insert `content` as a new line after the single line equal to `anchor`
    InsertAfter { anchor: String, content: String },
    /// Discard the source and start over
    FullRewrite { content: String },
}

impl EditOperation {
    pub fn name(&self) -> &'static str {
        match self {
            EditOperation::Replace { .. } => "replace",
            EditOperation::InsertAfter { .. } => "insert_after",
            EditOperation::FullRewrite { .. } => "full_rewrite",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditError {
    /// Position of the failing operation in the submitted batch
    pub index: usize,
    pub message: String,
}

impl From<EditError> for Error {
    fn from(e: EditError) -> Self {
        error::edit_failed(e.index, e.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditOutcome {
    pub source: String,
    pub applied: usize,
    pub errors: Vec<EditError>,
    pub rewritten: bool,
}

/// Apply a batch of edits.
///
/// A `full_rewrite` anywhere in the batch wins: the first one is applied
/// alone and everything else is ignored. Otherwise operations apply in
/// order, each against the result of the previous ones; a failing operation
/// leaves the text as it was and is reported in `errors`.
pub fn apply_edits(source: &str, edits: &[EditOperation]) -> EditOutcome {
    if let Some(content) = edits.iter().find_map(|op| match op {
        EditOperation::FullRewrite { content } => Some(content),
        _ => None,
    }) {
        return EditOutcome {
            source: content.clone(),
            applied: 1,
            errors: Vec::new(),
            rewritten: true,
        };
    }

    let mut current = source.to_string();
    let mut applied = 0;
    let mut errors = Vec::new();

    for (index, op) in edits.iter().enumerate() {
        let result = match op {
            EditOperation::Replace { search, replace } => apply_replace(&current, search, replace),
            EditOperation::InsertAfter { anchor, content } => apply_insert_after(&current, anchor, content),
            EditOperation::FullRewrite { .. } => unreachable!("full_rewrite handled above"),
        };
        match result {
            Ok(next) => {
                current = next;
                applied += 1;
            }
            Err(message) => {
                tracing::debug!(event = "edit_rejected", index, op = op.name(), %message);
                errors.push(EditError { index, message });
            }
        }
    }

    EditOutcome {
        source: current,
        applied,
        errors,
        rewritten: false,
    }
}

fn apply_replace(source: &str, search: &str, replace: &str) -> Result<String, String> {
    if search.is_empty() {
        return Err("replace: search text is empty".into());
    }
    match source.matches(search).count() {
        0 => Err(format!("replace: search text not found: {}", preview(search))),
        1 => Ok(source.replacen(search, replace, 1)),
        n => Err(format!(
            "replace: search text is ambiguous ({} occurrences), include more context: {}",
            n,
            preview(search)
        )),
    }
}

fn apply_insert_after(source: &str, anchor: &str, content: &str) -> Result<String, String> {
    let anchor = anchor.trim();
    if anchor.is_empty() {
        return Err("insert_after: anchor is empty".into());
    }

    let lines: Vec<&str> = source.split('\n').collect();
    let hits: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.trim() == anchor)
        .map(|(i, _)| i)
        .collect();

    match hits.as_slice() {
        [] => Err(format!("insert_after: anchor line not found: {}", preview(anchor))),
        [at] => {
            let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 1);
            out.extend_from_slice(&lines[..=*at]);
            out.push(content);
            out.extend_from_slice(&lines[at + 1..]);
            Ok(out.join("\n"))
        }
        many => Err(format!(
            "insert_after: anchor matches {} lines, use a unique line: {}",
            many.len(),
            preview(anchor)
        )),
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 60;
    let first = text.lines().next().unwrap_or_default();
    if first.chars().count() > MAX || text.contains('\n') {
        let cut: String = first.chars().take(MAX).collect();
        format!("'{}...'", cut)
    } else {
        format!("'{}'", first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamecraft_error::ErrorKind;

    const SOURCE: &str = "function Game({ config }) {\n  const [n, setN] = useState(0);\n  return <div>{n}</div>;\n}";

    fn replace(search: &str, replace: &str) -> EditOperation {
        EditOperation::Replace {
            search: search.into(),
            replace: replace.into(),
        }
    }

    #[test]
    fn test_replace_is_idempotent_safe() {
        let op = replace("useState(0)", "useState(1)");
        let first = apply_edits(SOURCE, &[op.clone()]);
        assert_eq!(first.applied, 1);
        assert!(first.source.contains("useState(1)"));

        // Second application finds nothing and leaves the text alone
        let second = apply_edits(&first.source, &[op]);
        assert_eq!(second.applied, 0);
        assert_eq!(second.source, first.source);
        assert_eq!(second.errors[0].index, 0);
        assert!(second.errors[0].message.contains("not found"));
    }

    #[test]
    fn test_full_rewrite_wins() {
        let edits = vec![
            replace("useState(0)", "useState(5)"),
            EditOperation::FullRewrite { content: "function Game() { return null; }".into() },
            replace("n", "m"),
            EditOperation::FullRewrite { content: "ignored".into() },
        ];
        let outcome = apply_edits(SOURCE, &edits);
        assert_eq!(outcome.applied, 1);
        assert!(outcome.rewritten);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.source, "function Game() { return null; }");
    }

    #[test]
    fn test_ambiguous_replace_leaves_text_unchanged() {
        let outcome = apply_edits(SOURCE, &[replace("n", "x")]);
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.source, SOURCE);
        assert!(outcome.errors[0].message.contains("ambiguous"));
    }

    #[test]
    fn test_insert_after_trimmed_anchor() {
        let op = EditOperation::InsertAfter {
            anchor: "const [n, setN] = useState(0);   ".into(),
            content: "  const done = n > 3;".into(),
        };
        let outcome = apply_edits(SOURCE, &[op]);
        assert_eq!(outcome.applied, 1);
        let lines: Vec<&str> = outcome.source.lines().collect();
        assert_eq!(lines[2], "  const done = n > 3;");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_sequential_application_and_partial_failure() {
        let edits = vec![
            replace("useState(0)", "useState(2)"),
            EditOperation::InsertAfter { anchor: "".into(), content: "x".into() },
            replace("useState(2)", "useState(3)"),
        ];
        let outcome = apply_edits(SOURCE, &edits);
        assert_eq!(outcome.applied, 2);
        assert!(outcome.source.contains("useState(3)"));
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].index, 1);

        let err: Error = outcome.errors[0].clone().into();
        assert_eq!(err.kind(), ErrorKind::EditFailed);
    }

    #[test]
    fn test_operations_deserialize_from_tool_arguments() {
        let ops: Vec<EditOperation> = serde_json::from_str(
            r#"[{"type":"replace","search":"a","replace":"b"},{"type":"full_rewrite","content":"c"}]"#,
        )
        .unwrap();
        assert_eq!(ops[1].name(), "full_rewrite");
    }
}
