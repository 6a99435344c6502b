//! JSON tokenizer
//!
//! JSON has no multi-line tokens, so every line starts and ends in
//! [`LineState::Normal`].

use super::{HighlightSpan, LineState, SpanBuilder, StyleTag, Tokenizer};

/// Tokenizer for JSON data documents
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTokenizer;

impl Tokenizer for JsonTokenizer {
    fn name(&self) -> &'static str {
        "JSON"
    }

    fn highlight_line(&self, line: &str, _state: LineState) -> (Vec<HighlightSpan>, LineState) {
        let chars: Vec<char> = line.chars().collect();
        let mut spans = SpanBuilder::default();
        let mut pos = 0;

        while pos < chars.len() {
            let c = chars[pos];
            match c {
                '"' => {
                    let Some(close) = string_end(&chars, pos) else {
                        spans.push(pos, chars.len(), StyleTag::Error);
                        break;
                    };
                    let after = skip_whitespace(&chars, close);
                    let style = if chars.get(after) == Some(&':') {
                        StyleTag::Key
                    } else {
                        StyleTag::String
                    };
                    spans.push(pos, close, style);
                    pos = close;
                }
                '{' | '}' | '[' | ']' | ':' | ',' => {
                    spans.push(pos, pos + 1, StyleTag::Punctuation);
                    pos += 1;
                }
                '-' | '0'..='9' => {
                    let end = number_end(&chars, pos);
                    spans.push(pos, end, StyleTag::Number);
                    pos = end.max(pos + 1);
                }
                c if c.is_ascii_alphabetic() => {
                    let mut end = pos;
                    while chars.get(end).is_some_and(|c| c.is_ascii_alphanumeric()) {
                        end += 1;
                    }
                    let word: String = chars[pos..end].iter().collect();
                    let style = match word.as_str() {
                        "true" | "false" | "null" => StyleTag::Literal,
                        _ => StyleTag::Error,
                    };
                    spans.push(pos, end, style);
                    pos = end;
                }
                _ => pos += 1,
            }
        }

        (spans.finish(), LineState::Normal)
    }
}

/// Index just past the closing quote of the string opening at `start`
fn string_end(chars: &[char], start: usize) -> Option<usize> {
    let mut pos = start + 1;
    while pos < chars.len() {
        match chars[pos] {
            '\\' => pos += 2,
            '"' => return Some(pos + 1),
            _ => pos += 1,
        }
    }
    None
}

fn skip_whitespace(chars: &[char], start: usize) -> usize {
    let mut pos = start;
    while chars.get(pos).is_some_and(|c| c.is_whitespace()) {
        pos += 1;
    }
    pos
}

fn number_end(chars: &[char], start: usize) -> usize {
    let mut end = start;
    if chars.get(end) == Some(&'-') {
        end += 1;
    }
    while chars
        .get(end)
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        end += 1;
    }
    end
}
