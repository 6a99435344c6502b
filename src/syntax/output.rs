//! Rendered output tokenizer
//!
//! Marks HTML tags, URLs, e-mail addresses and numbers in rendered text.
//! Tags win over everything else; nothing spans lines.

use super::velocity::starts_with;
use super::{HighlightSpan, LineState, SpanBuilder, StyleTag, Tokenizer};

/// Tokenizer for the rendered output pane
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputTokenizer;

impl Tokenizer for OutputTokenizer {
    fn name(&self) -> &'static str {
        "Output"
    }

    fn highlight_line(&self, line: &str, _state: LineState) -> (Vec<HighlightSpan>, LineState) {
        let chars: Vec<char> = line.chars().collect();
        let mut spans = SpanBuilder::default();
        let mut pos = 0;

        while pos < chars.len() {
            let c = chars[pos];
            let at_boundary = pos == 0 || !is_word_char(chars[pos - 1]);

            if c == '<' {
                if let Some(close) = chars[pos + 1..].iter().position(|c| *c == '>') {
                    if close > 0 {
                        let end = pos + 1 + close + 1;
                        spans.push(pos, end, StyleTag::Tag);
                        pos = end;
                        continue;
                    }
                }
            }

            if starts_with(&chars, pos, "http://") || starts_with(&chars, pos, "https://") {
                let mut end = pos;
                while chars
                    .get(end)
                    .is_some_and(|c| !c.is_whitespace() && !matches!(c, '<' | '>' | '"'))
                {
                    end += 1;
                }
                spans.push(pos, end, StyleTag::Url);
                pos = end;
                continue;
            }

            if at_boundary && is_local_char(c) {
                if let Some(end) = email_end(&chars, pos) {
                    spans.push(pos, end, StyleTag::Email);
                    pos = end;
                    continue;
                }
            }

            if at_boundary && c.is_ascii_digit() {
                let end = number_end(&chars, pos);
                if !chars.get(end).is_some_and(|c| is_word_char(*c)) {
                    spans.push(pos, end, StyleTag::Number);
                    pos = end;
                    continue;
                }
            }

            if is_word_char(c) {
                while chars.get(pos).is_some_and(|c| is_word_char(*c)) {
                    pos += 1;
                }
            } else {
                pos += 1;
            }
        }

        (spans.finish(), LineState::Normal)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_local_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '%' | '+' | '-')
}

/// End of an e-mail address starting at `start`: a local part, `@`, and a
/// domain whose last label is at least two letters.
fn email_end(chars: &[char], start: usize) -> Option<usize> {
    let mut at = start;
    while chars.get(at).is_some_and(|c| is_local_char(*c)) {
        at += 1;
    }
    if at == start || chars.get(at) != Some(&'@') {
        return None;
    }

    let mut end = at + 1;
    while chars
        .get(end)
        .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'))
    {
        end += 1;
    }
    while end > at + 1 && !chars[end - 1].is_ascii_alphabetic() {
        end -= 1;
    }

    let dot = at + 1 + chars[at + 1..end].iter().rposition(|c| *c == '.')?;
    let tld = &chars[dot + 1..end];
    let valid = dot > at + 1 && tld.len() >= 2 && tld.iter().all(|c| c.is_ascii_alphabetic());
    valid.then_some(end)
}

fn number_end(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while chars.get(end).is_some_and(|c| c.is_ascii_digit()) {
        end += 1;
    }
    if chars.get(end) == Some(&'.') && chars.get(end + 1).is_some_and(|c| c.is_ascii_digit()) {
        end += 1;
        while chars.get(end).is_some_and(|c| c.is_ascii_digit()) {
            end += 1;
        }
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn styles(line: &str) -> Vec<(String, StyleTag)> {
        let chars: Vec<char> = line.chars().collect();
        OutputTokenizer
            .highlight_line(line, LineState::Normal)
            .0
            .iter()
            .map(|s| (chars[s.start..s.end()].iter().collect(), s.style))
            .collect()
    }

    fn piece(text: &str, style: StyleTag) -> (String, StyleTag) {
        (text.to_string(), style)
    }

    #[test]
    fn test_tags_and_numbers() {
        assert_eq!(
            styles("<li class=\"x\">Item 3.5</li>"),
            vec![
                piece("<li class=\"x\">", StyleTag::Tag),
                piece("3.5", StyleTag::Number),
                piece("</li>", StyleTag::Tag),
            ]
        );
    }

    #[test]
    fn test_url_stops_at_tag() {
        assert_eq!(
            styles("see https://example.com/a?b=1<br>"),
            vec![
                piece("https://example.com/a?b=1", StyleTag::Url),
                piece("<br>", StyleTag::Tag),
            ]
        );
    }

    #[test]
    fn test_email_address() {
        assert_eq!(
            styles("Mail ann.lee+news@mail.example.org."),
            vec![piece("ann.lee+news@mail.example.org", StyleTag::Email)]
        );
        assert!(styles("user@localhost").is_empty());
    }

    #[test]
    fn test_numbers_need_word_boundaries() {
        assert_eq!(
            styles("42px v2 7 items"),
            vec![piece("7", StyleTag::Number)]
        );
    }

    #[test]
    fn test_lone_angle_bracket_is_text() {
        assert_eq!(styles("a < b"), vec![]);
        assert_eq!(styles("c <> d"), vec![]);
    }
}
