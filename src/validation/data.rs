//! JSON data context validation

use serde_json::Value;

use crate::diagnostics::{Diagnostic, DiagnosticSource};
use crate::engine::Context;

/// Error type for data context parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataParseError {
    pub diagnostics: Vec<Diagnostic>,
}

impl std::fmt::Display for DataParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.diagnostics.first() {
            Some(first) => write!(f, "Invalid data context: {}", first),
            None => write!(f, "Invalid data context"),
        }
    }
}

impl std::error::Error for DataParseError {}

/// Parse the data pane into a render context.
///
/// Empty or whitespace-only text is an empty context. Anything else must be
/// a JSON object.
pub fn parse_context(text: &str) -> Result<Context, DataParseError> {
    if text.trim().is_empty() {
        return Ok(Context::new());
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => {
            let (line, column) = first_token_position(text);
            Err(DataParseError {
                diagnostics: vec![Diagnostic::error(
                    DiagnosticSource::Data,
                    line,
                    column,
                    "JSON data should be an object (dictionary)",
                )],
            })
        }
        Err(err) => {
            let mut message = err.to_string();
            if let Some(idx) = message.rfind(" at line ") {
                message.truncate(idx);
            }
            Err(DataParseError {
                diagnostics: vec![Diagnostic::error(
                    DiagnosticSource::Data,
                    err.line(),
                    err.column().saturating_sub(1),
                    format!("JSON syntax error: {}", message),
                )],
            })
        }
    }
}

/// Validate the data pane; empty when the text is a usable context.
pub fn validate_data(text: &str) -> Vec<Diagnostic> {
    match parse_context(text) {
        Ok(_) => Vec::new(),
        Err(err) => err.diagnostics,
    }
}

fn first_token_position(text: &str) -> (usize, usize) {
    let (mut line, mut column) = (1, 0);
    for c in text.chars() {
        match c {
            '\n' => {
                line += 1;
                column = 0;
            }
            c if c.is_whitespace() => column += 1,
            _ => break,
        }
    }
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;

    #[test]
    fn test_empty_object_is_valid() {
        assert!(validate_data("{}").is_empty());
    }

    #[test]
    fn test_blank_text_is_empty_context() {
        let context = parse_context("  \n\t").unwrap();
        assert!(context.is_empty());
    }

    #[test]
    fn test_malformed_json_points_at_token() {
        let diagnostics = validate_data("{not json");
        assert_eq!(diagnostics.len(), 1);
        let d = &diagnostics[0];
        assert_eq!(d.line, 1);
        assert_eq!(d.column, 1);
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.source, DiagnosticSource::Data);
        assert!(d.message.starts_with("JSON syntax error: "));
        assert!(!d.message.contains(" at line "));
    }

    #[test]
    fn test_error_on_later_line() {
        let diagnostics = validate_data("{\n  \"a\": 1,\n  \"b\": }\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line, 3);
    }

    #[test]
    fn test_top_level_must_be_object() {
        let diagnostics = validate_data("  [1, 2]");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].message,
            "JSON data should be an object (dictionary)"
        );
        assert_eq!(diagnostics[0].column, 2);
    }

    #[test]
    fn test_parse_context_keeps_key_order() {
        let context = parse_context(r#"{"z": 1, "a": 2}"#).unwrap();
        let keys: Vec<&String> = context.keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }
}
