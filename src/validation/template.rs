//! Structural validation of Velocity templates
//!
//! Walks the Velocity tokenizer's output, so comments, unparsed blocks and
//! escapes are skipped exactly the way they are highlighted.

use crate::diagnostics::{Diagnostic, DiagnosticSource};
use crate::syntax::{
    split_lines, HighlightSpan, LineState, StyleTag, Tokenizer, VelocityTokenizer, ARG_DIRECTIVES,
};

/// Directives that open a block closed by `#end`
const BLOCK_DIRECTIVES: &[&str] = &["if", "foreach", "macro", "define"];

#[derive(Debug)]
struct OpenBlock {
    name: String,
    line: usize,
    column: usize,
    saw_else: bool,
}

/// Where a multi-line construct started (1-based line, 0-based column)
#[derive(Debug, Clone)]
struct Opened {
    line: usize,
    column: usize,
    name: String,
}

/// Check directive nesting, references and directive arguments.
///
/// Never fails; returns an empty list when the template has no problems.
pub fn validate_template(text: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut blocks: Vec<OpenBlock> = Vec::new();
    let mut open_args: Option<Opened> = None;
    let mut open_region: Option<Opened> = None;
    let mut state = LineState::Normal;

    for (idx, line) in split_lines(text).into_iter().enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let line_no = idx + 1;
        let chars: Vec<char> = line.chars().collect();
        let incoming = state;
        let (spans, end_state) = VelocityTokenizer.highlight_line(line, incoming);

        for (i, span) in spans.iter().enumerate() {
            let text: String = chars[span.start..span.end()].iter().collect();
            match span.style {
                StyleTag::Directive => {
                    let name = directive_name(&text);
                    check_directive(
                        &name,
                        line_no,
                        span,
                        &spans[i + 1..],
                        &chars,
                        &mut blocks,
                        &mut diagnostics,
                    );
                }
                StyleTag::Error => diagnostics.push(Diagnostic::error(
                    DiagnosticSource::Template,
                    line_no,
                    span.start,
                    format!("Malformed reference `{}`", truncate(&text, 40)),
                )),
                _ => {}
            }
        }

        match end_state {
            LineState::InDirectiveArgs { .. } => {
                if !matches!(incoming, LineState::InDirectiveArgs { .. }) {
                    open_args = spans
                        .iter()
                        .rev()
                        .find(|s| matches!(s.style, StyleTag::Directive | StyleTag::Macro))
                        .map(|s| Opened {
                            line: line_no,
                            column: s.start,
                            name: chars[s.start..s.end()].iter().collect(),
                        });
                }
            }
            LineState::InBlockComment | LineState::InUnparsed => {
                if incoming != end_state {
                    let style = if end_state == LineState::InBlockComment {
                        StyleTag::Comment
                    } else {
                        StyleTag::Unparsed
                    };
                    let column = spans
                        .iter()
                        .rev()
                        .find(|s| s.style == style)
                        .map_or(0, |s| s.start);
                    open_region = Some(Opened {
                        line: line_no,
                        column,
                        name: String::new(),
                    });
                }
            }
            LineState::Normal => {
                open_args = None;
                open_region = None;
            }
        }
        state = end_state;
    }

    for block in blocks {
        diagnostics.push(Diagnostic::error(
            DiagnosticSource::Template,
            block.line,
            block.column,
            format!("#{} is never closed with #end", block.name),
        ));
    }

    match state {
        LineState::InDirectiveArgs { .. } => {
            if let Some(opened) = open_args {
                diagnostics.push(Diagnostic::error(
                    DiagnosticSource::Template,
                    opened.line,
                    opened.column,
                    format!("Unclosed argument list for {}", opened.name),
                ));
            }
        }
        LineState::InBlockComment => {
            if let Some(opened) = open_region {
                diagnostics.push(Diagnostic::warning(
                    DiagnosticSource::Template,
                    opened.line,
                    opened.column,
                    "Unterminated block comment",
                ));
            }
        }
        LineState::InUnparsed => {
            if let Some(opened) = open_region {
                diagnostics.push(Diagnostic::warning(
                    DiagnosticSource::Template,
                    opened.line,
                    opened.column,
                    "Unterminated unparsed block",
                ));
            }
        }
        LineState::Normal => {}
    }

    crate::diagnostics::sort_diagnostics(&mut diagnostics);
    diagnostics
}

fn check_directive(
    name: &str,
    line_no: usize,
    span: &HighlightSpan,
    rest: &[HighlightSpan],
    chars: &[char],
    blocks: &mut Vec<OpenBlock>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let column = span.start;
    let error =
        |message: String| Diagnostic::error(DiagnosticSource::Template, line_no, column, message);

    match name {
        "end" => {
            if blocks.pop().is_none() {
                diagnostics.push(error("Unexpected #end with no open block".to_string()));
            }
        }
        "elseif" | "else" => match blocks.last_mut() {
            Some(block) if block.name == "if" => {
                if block.saw_else {
                    diagnostics.push(error(format!("#{} after #else", name)));
                } else if name == "else" {
                    block.saw_else = true;
                }
            }
            _ => diagnostics.push(error(format!("#{} without matching #if", name))),
        },
        _ => {}
    }

    if BLOCK_DIRECTIVES.contains(&name) {
        blocks.push(OpenBlock {
            name: name.to_string(),
            line: line_no,
            column,
            saw_else: false,
        });
    }

    if !ARG_DIRECTIVES.contains(&name) {
        return;
    }

    let opens = rest
        .first()
        .filter(|s| s.style == StyleTag::Punctuation && chars[s.start] == '(')
        .is_some_and(|s| chars[span.end()..s.start].iter().all(|c| *c == ' ' || *c == '\t'));
    if !opens {
        diagnostics.push(error(format!("#{} requires arguments in parentheses", name)));
        return;
    }

    // Only checked when the argument list closes on this line
    let Some(args) = argument_spans(rest, chars) else {
        return;
    };
    let has = |style: StyleTag, word: &str| {
        args.iter()
            .any(|s| s.style == style && chars[s.start..s.end()].iter().collect::<String>() == word)
    };
    match name {
        "set" if !has(StyleTag::Operator, "=") => {
            diagnostics.push(error("#set requires an assignment `$name = value`".to_string()));
        }
        "foreach" if !has(StyleTag::Keyword, "in") => {
            diagnostics.push(error("#foreach requires `$item in $collection`".to_string()));
        }
        _ => {}
    }
}

/// Spans between the opening `(` (first of `rest`) and its matching `)`.
/// None when the list is still open at the end of the line.
fn argument_spans<'a>(rest: &'a [HighlightSpan], chars: &[char]) -> Option<&'a [HighlightSpan]> {
    let mut depth = 0usize;
    for (i, span) in rest.iter().enumerate() {
        if span.style != StyleTag::Punctuation {
            continue;
        }
        match chars[span.start] {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&rest[1..i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn directive_name(text: &str) -> String {
    text.trim_start_matches('#')
        .trim_start_matches('{')
        .trim_end_matches('}')
        .to_string()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;

    fn lines_of(diagnostics: &[Diagnostic]) -> Vec<usize> {
        diagnostics.iter().map(|d| d.line).collect()
    }

    #[test]
    fn test_balanced_template_is_clean() {
        let template = "\
#set($total = 0)
#foreach($item in $items)
  #if($item.price > 10)
    $item.name
  #elseif($item.price > 5)
    cheap
  #else
    free
  #end
  #set($total = $total + 1)
#end
#macro(greet $who)Hello $who#end
#greet('Ann')";
        assert_eq!(validate_template(template), vec![]);
    }

    #[test]
    fn test_extra_end_reports_its_line() {
        let template = "#if($a)\nyes\n#end\n#end\n";
        let diagnostics = validate_template(template);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line, 4);
        assert_eq!(diagnostics[0].severity, Severity::Error);
    }

    #[test]
    fn test_unclosed_block_reports_opener() {
        let diagnostics = validate_template("text\n  #foreach($i in [1..3])\n$i\n");
        assert_eq!(lines_of(&diagnostics), vec![2]);
        assert_eq!(diagnostics[0].column, 2);
        assert!(diagnostics[0].message.contains("#foreach"));
    }

    #[test]
    fn test_else_outside_if() {
        let diagnostics = validate_template("#foreach($i in $list)#else#end");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("without matching #if"));
    }

    #[test]
    fn test_elseif_after_else() {
        let diagnostics = validate_template("#if($a)\n#else\n#elseif($b)\n#end");
        assert_eq!(lines_of(&diagnostics), vec![3]);
    }

    #[test]
    fn test_directives_in_comments_are_ignored() {
        let template = "## #end\n#* #if\n#end *#\n#[[ #foreach ]]#";
        assert_eq!(validate_template(template), vec![]);
    }

    #[test]
    fn test_malformed_reference() {
        let diagnostics = validate_template("Hello ${name");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].column, 6);
        assert!(diagnostics[0].message.contains("${name"));
    }

    #[test]
    fn test_directive_without_arguments() {
        let diagnostics = validate_template("#if $a\n#end");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("requires arguments"));
    }

    #[test]
    fn test_set_and_foreach_argument_shape() {
        let diagnostics = validate_template("#set($a)\n#foreach($i $list)#end");
        assert_eq!(lines_of(&diagnostics), vec![1, 2]);
        assert!(diagnostics[0].message.contains("#set"));
        assert!(diagnostics[1].message.contains("#foreach"));
    }

    #[test]
    fn test_comparison_is_not_assignment() {
        let diagnostics = validate_template("#set($a == 1)");
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_multiline_arguments_are_accepted() {
        let template = "#if($a &&\n    $b)\nyes\n#end";
        assert_eq!(validate_template(template), vec![]);
    }

    #[test]
    fn test_arguments_open_at_end_of_document() {
        let diagnostics = validate_template("line\n#set($a = [1,\n2");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line, 2);
        assert!(diagnostics[0].message.contains("#set"));
    }

    #[test]
    fn test_unterminated_comment_is_warning() {
        let diagnostics = validate_template("a\nb #* open\nc");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (2, 2));
    }

    #[test]
    fn test_empty_template_has_no_diagnostics() {
        assert!(validate_template("").is_empty());
    }
}
